use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            validate_password, ApiResponse, Credentials, CredentialsRequest, DeleteRequest,
            ProfileResponse,
        },
        error::AuthError,
        extractors::AuthUser,
    },
    state::AppState,
};

type ApiError = (StatusCode, Json<ApiResponse>);

const INVALID_CREDENTIALS: &str = "invalid login or password";
const INTERNAL: &str = "internal server error";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route("/user", delete(delete_user))
}

fn reject(status: StatusCode, msg: &str) -> ApiError {
    (status, Json(ApiResponse::error(msg)))
}

fn bad_json(e: JsonRejection) -> ApiError {
    warn!(error = %e, "malformed request body");
    reject(StatusCode::BAD_REQUEST, "malformed request body")
}

fn credentials(
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Credentials, ApiError> {
    let Json(req) = payload.map_err(bad_json)?;
    Credentials::try_from(req).map_err(|msg| {
        warn!(reason = msg, "invalid credentials payload");
        reject(StatusCode::BAD_REQUEST, msg)
    })
}

fn server_fault(e: &AuthError) -> ApiError {
    error!(error = %e, "request failed");
    reject(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse>), ApiError> {
    let creds = credentials(payload)?;

    let user = match state.users.register_user(&creds).await {
        Ok(u) => u,
        Err(AuthError::AlreadyExists) => {
            return Err(reject(
                StatusCode::CONFLICT,
                "user with this login already exists",
            ))
        }
        Err(e) => return Err(server_fault(&e)),
    };

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok().with_user_id(user.id)),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let creds = credentials(payload)?;

    let user = match state.users.authenticate_user(&creds).await {
        Ok(u) => u,
        // unknown login and wrong password look the same to the client
        Err(AuthError::NotFound | AuthError::IncorrectCredentials) => {
            return Err(reject(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS))
        }
        Err(e) => return Err(server_fault(&e)),
    };

    let token = state.jwt.issue(&user).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        reject(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL)
    })?;

    info!(user_id = user.id, "token issued");
    Ok(Json(ApiResponse::ok().with_token(token)))
}

#[instrument]
pub async fn profile(AuthUser(user_id): AuthUser) -> Json<ProfileResponse> {
    Json(ProfileResponse { user_id })
}

#[instrument(skip(state, payload))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let Json(req) = payload.map_err(bad_json)?;
    validate_password(&req.password).map_err(|msg| reject(StatusCode::BAD_REQUEST, msg))?;

    let user = match state.users.get_user_by_id(user_id, &req.password).await {
        Ok(u) => u,
        Err(AuthError::NotFound | AuthError::IncorrectCredentials) => {
            return Err(reject(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS))
        }
        Err(e) => return Err(server_fault(&e)),
    };

    match state.users.delete_user(&user).await {
        Ok(()) => Ok(Json(ApiResponse::ok())),
        Err(AuthError::NotFound) => Err(reject(
            StatusCode::BAD_REQUEST,
            "user could not be deleted",
        )),
        Err(e) => Err(server_fault(&e)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Method, Request},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{
        error::AuthResult,
        memory_repo::MemoryUserStore,
        repo::UserStore,
        repo_types::{NewUser, User},
    };

    /// Behaves like the in-memory store, except that the row has always been
    /// removed by someone else by the time `delete` runs.
    struct RacedDeleteStore(MemoryUserStore);

    #[async_trait]
    impl UserStore for RacedDeleteStore {
        async fn create(&self, user: NewUser) -> AuthResult<User> {
            self.0.create(user).await
        }

        async fn find_all(&self) -> AuthResult<Vec<User>> {
            self.0.find_all().await
        }

        async fn find_by_login(&self, login: &str) -> AuthResult<User> {
            self.0.find_by_login(login).await
        }

        async fn find_by_id(&self, id: i32) -> AuthResult<User> {
            self.0.find_by_id(id).await
        }

        async fn update(&self, user: &User) -> AuthResult<User> {
            self.0.update(user).await
        }

        async fn delete(&self, _id: i32) -> AuthResult<()> {
            Err(AuthError::NotFound)
        }
    }

    fn app() -> Router {
        crate::app::build_app(AppState::fake())
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn full_account_lifecycle() {
        let app = app();
        let alice = json!({"login": "alice", "password": "s3cr3t"});

        let (status, body) = call(&app, Method::POST, "/register", None, Some(alice.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "ok");
        let user_id = body["user_id"].as_i64().unwrap();
        assert!(user_id >= 1);

        let (status, body) = call(&app, Method::POST, "/login", None, Some(alice.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let wrong = json!({"login": "alice", "password": "wrong"});
        let (status, body) = call(&app, Method::POST, "/login", None, Some(wrong)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.get("token").is_none());

        let (status, body) = call(&app, Method::GET, "/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"].as_i64(), Some(user_id));

        let pw = json!({"password": "s3cr3t"});
        let (status, _) = call(&app, Method::DELETE, "/user", Some(&token), Some(pw.clone())).await;
        assert_eq!(status, StatusCode::OK);

        // account is gone: re-verification fails before the delete is attempted
        let (status, _) = call(&app, Method::DELETE, "/user", Some(&token), Some(pw)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, Method::POST, "/login", None, Some(alice)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let app = app();
        let body = json!({"login": "bob", "password": "pw"});
        let (status, _) = call(&app, Method::POST, "/register", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = call(&app, Method::POST, "/register", None, Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn unknown_login_and_wrong_password_look_alike() {
        let app = app();
        let reg = json!({"login": "carol", "password": "pw"});
        call(&app, Method::POST, "/register", None, Some(reg)).await;

        let (s1, b1) = call(
            &app,
            Method::POST,
            "/login",
            None,
            Some(json!({"login": "carol", "password": "bad"})),
        )
        .await;
        let (s2, b2) = call(
            &app,
            Method::POST,
            "/login",
            None,
            Some(json!({"login": "nobody", "password": "bad"})),
        )
        .await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!((s1, b1), (s2, b2));
    }

    #[tokio::test]
    async fn bad_requests_get_400() {
        let app = app();
        let (status, _) = call(
            &app,
            Method::POST,
            "/register",
            None,
            Some(json!({"login": "", "password": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call(&app, Method::POST, "/login", None, Some(json!({"login": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let app = app();
        let (status, _) = call(&app, Method::GET, "/profile", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, Method::GET, "/profile", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            Method::DELETE,
            "/user",
            Some("garbage"),
            Some(json!({"password": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn delete_with_wrong_password_is_unauthorized() {
        let app = app();
        let creds = json!({"login": "dave", "password": "pw"});
        call(&app, Method::POST, "/register", None, Some(creds.clone())).await;
        let (_, body) = call(&app, Method::POST, "/login", None, Some(creds.clone())).await;
        let token = body["token"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            Method::DELETE,
            "/user",
            Some(&token),
            Some(json!({"password": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, Method::DELETE, "/user", Some(&token), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::POST, "/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn concurrent_delete_is_a_bad_request() {
        let store = Arc::new(RacedDeleteStore(MemoryUserStore::new()));
        let app = crate::app::build_app(AppState::fake_with_store(store));
        let creds = json!({"login": "erin", "password": "pw"});
        call(&app, Method::POST, "/register", None, Some(creds.clone())).await;
        let (_, body) = call(&app, Method::POST, "/login", None, Some(creds)).await;
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            Method::DELETE,
            "/user",
            Some(&token),
            Some(json!({"password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "user could not be deleted");
    }
}
