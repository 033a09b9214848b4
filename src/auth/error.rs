use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Outcomes of the user lifecycle core.
///
/// `AlreadyExists`, `NotFound` and `IncorrectCredentials` are domain outcomes the
/// transport translates into client statuses. `Hashing` and `Storage` are server
/// faults whose detail only goes to the log.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user with this login already exists")]
    AlreadyExists,

    #[error("user not found")]
    NotFound,

    #[error("incorrect login or password")]
    IncorrectCredentials,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("{op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl AuthError {
    /// True for faults that must surface as an opaque 500.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::Hashing(_) | Self::Storage { .. })
    }
}
