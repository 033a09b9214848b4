use serde::{Deserialize, Serialize};

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i32,
    pub login: String,
    /// Issued at, unix seconds.
    pub iat: usize,
    /// Expires at, unix seconds.
    pub exp: usize,
    pub iss: String,
}
