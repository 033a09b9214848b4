use crate::auth::{jwt::JwtKeys, services::UserService};
use crate::config::AppConfig;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
    pub jwt: JwtKeys,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn from_parts(users: UserService, config: Arc<AppConfig>) -> Self {
        let jwt = JwtKeys::from_config(&config.jwt);
        Self { users, jwt, config }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::auth::memory_repo::MemoryUserStore;

        Self::fake_with_store(Arc::new(MemoryUserStore::new()))
    }

    /// Test state over a caller-provided store.
    #[cfg(test)]
    pub fn fake_with_store(store: Arc<dyn crate::auth::repo::UserStore>) -> Self {
        use crate::events::fake::RecordingPublisher;

        let config = AppConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some("test-secret".into()),
            "JWT_ISSUER" => Some("test-issuer".into()),
            _ => None,
        })
        .expect("test config");

        let users = UserService::new(store, Arc::new(RecordingPublisher::default()));
        Self::from_parts(users, Arc::new(config))
    }
}
