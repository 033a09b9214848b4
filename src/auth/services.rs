use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::{
    dto::Credentials,
    error::{AuthError, AuthResult},
    password::{hash_password, verify_against_dummy, verify_password},
    repo::UserStore,
    repo_types::{NewUser, User},
};
use crate::events::{publish_event, EventPublisher, LifecycleEvent};

/// Registration, authentication, re-verification and deletion of users.
///
/// Each call is a single request/response; the only state is the store and the
/// event publisher, both shared across requests.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    events: Arc<dyn EventPublisher>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, events }
    }

    /// Hashes the password and creates the user. A failed event publish is
    /// logged and does not fail the registration.
    #[instrument(skip(self, creds), fields(login = %creds.login))]
    pub async fn register_user(&self, creds: &Credentials) -> AuthResult<User> {
        let hash = hash_password(&creds.password)?;

        let user = match self.store.create(NewUser::new(&creds.login, hash)).await {
            Ok(u) => u,
            Err(AuthError::AlreadyExists) => {
                warn!("login already taken");
                return Err(AuthError::AlreadyExists);
            }
            Err(e) => {
                error!(error = %e, "create user failed");
                return Err(e);
            }
        };

        info!(user_id = user.id, "user registered");
        self.notify(LifecycleEvent::registered(user.id, &user.login)).await;
        Ok(user)
    }

    /// Looks the user up by login and checks the password.
    ///
    /// Unknown login is `NotFound` and a wrong password is `IncorrectCredentials`;
    /// callers facing clients must present both the same way. An unknown login
    /// still pays for one Argon2 verification.
    #[instrument(skip(self, creds), fields(login = %creds.login))]
    pub async fn authenticate_user(&self, creds: &Credentials) -> AuthResult<User> {
        let user = match self.store.find_by_login(&creds.login).await {
            Ok(user) => user,
            Err(AuthError::NotFound) => {
                verify_against_dummy(&creds.password);
                warn!("login unknown");
                return Err(AuthError::NotFound);
            }
            Err(e) => {
                error!(error = %e, "find_by_login failed");
                return Err(e);
            }
        };

        self.check_password(&user, &creds.password)?;

        info!(user_id = user.id, "user authenticated");
        self.notify(LifecycleEvent::authenticated(user.id, &user.login)).await;
        Ok(user)
    }

    /// Re-verifies a caller that already holds an id, e.g. before deletion.
    #[instrument(skip(self, password))]
    pub async fn get_user_by_id(&self, id: i32, password: &str) -> AuthResult<User> {
        let user = self.store.find_by_id(id).await.map_err(|e| {
            if e.is_server_fault() {
                error!(error = %e, "find_by_id failed");
            }
            e
        })?;
        self.check_password(&user, password)?;
        Ok(user)
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn delete_user(&self, user: &User) -> AuthResult<()> {
        self.store.delete(user.id).await.map_err(|e| {
            match &e {
                AuthError::NotFound => warn!("user already gone"),
                other => error!(error = %other, "delete user failed"),
            }
            e
        })?;
        info!(login = %user.login, "user deleted");
        Ok(())
    }

    fn check_password(&self, user: &User, password: &str) -> AuthResult<()> {
        if verify_password(password, &user.password_hash)? {
            Ok(())
        } else {
            warn!(user_id = user.id, "password mismatch");
            Err(AuthError::IncorrectCredentials)
        }
    }

    async fn notify(&self, event: LifecycleEvent) {
        if let Err(e) = publish_event(self.events.as_ref(), &event).await {
            error!(error = %e, key = event.key(), "lifecycle event not delivered");
        }
    }
}
