use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_PASSWORD_BYTES: usize = 128;

/// Request body for registration and login.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub login: String,
    pub password: String,
}

/// Request body for account deletion; the principal comes from the token.
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub password: String,
}

/// Validated (login, plaintext password) pair handed to the user service.
/// Never persisted.
#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

impl TryFrom<CredentialsRequest> for Credentials {
    type Error = &'static str;

    fn try_from(req: CredentialsRequest) -> Result<Self, Self::Error> {
        let login = req.login.trim().to_string();
        if !is_valid_login(&login) {
            return Err("invalid login");
        }
        validate_password(&req.password)?;
        Ok(Self {
            login,
            password: req.password,
        })
    }
}

pub(crate) fn is_valid_login(login: &str) -> bool {
    lazy_static! {
        static ref LOGIN_RE: Regex = Regex::new(r"^\S{1,64}$").unwrap();
    }
    LOGIN_RE.is_match(login)
}

pub(crate) fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.is_empty() {
        return Err("password is required");
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err("password too long");
    }
    Ok(())
}

/// Response envelope shared by every user route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
            error: None,
            user_id: None,
            token: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(msg.into()),
            user_id: None,
            token: None,
        }
    }

    pub fn with_user_id(mut self, id: i32) -> Self {
        self.user_id = Some(id);
        self
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }
}

/// Body of `GET /profile`.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(login: &str, password: &str) -> CredentialsRequest {
        CredentialsRequest {
            login: login.into(),
            password: password.into(),
        }
    }

    #[test]
    fn credentials_are_trimmed_and_validated() {
        let creds = Credentials::try_from(req("  alice ", "s3cr3t")).unwrap();
        assert_eq!(creds.login, "alice");
        assert_eq!(creds.password, "s3cr3t");

        assert!(Credentials::try_from(req("", "x")).is_err());
        assert!(Credentials::try_from(req("   ", "x")).is_err());
        assert!(Credentials::try_from(req("two words", "x")).is_err());
        assert!(Credentials::try_from(req(&"a".repeat(65), "x")).is_err());
        assert!(Credentials::try_from(req("alice", "")).is_err());
        assert!(Credentials::try_from(req("alice", &"p".repeat(129))).is_err());
    }

    #[test]
    fn debug_hides_password() {
        let creds = Credentials::try_from(req("alice", "s3cr3t")).unwrap();
        let printed = format!("{creds:?}");
        assert!(printed.contains("alice"));
        assert!(!printed.contains("s3cr3t"));
    }

    #[test]
    fn response_skips_empty_fields() {
        let json = serde_json::to_string(&ApiResponse::ok().with_user_id(3)).unwrap();
        assert_eq!(json, r#"{"status":"ok","user_id":3}"#);

        let json = serde_json::to_string(&ApiResponse::error("nope")).unwrap();
        assert_eq!(json, r#"{"status":"error","error":"nope"}"#);
    }
}
