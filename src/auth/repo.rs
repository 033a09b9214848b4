use async_trait::async_trait;
use sqlx::PgPool;

use super::error::{AuthError, AuthResult};
use crate::auth::repo_types::{NewUser, User};

/// Persistence contract for users.
///
/// Implementations translate "no row" into [`AuthError::NotFound`] and a unique
/// login violation into [`AuthError::AlreadyExists`]; every other fault is
/// returned as [`AuthError::Storage`] tagged with the operation.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> AuthResult<User>;
    // Store contract only; no HTTP route lists or edits users.
    #[allow(dead_code)]
    async fn find_all(&self) -> AuthResult<Vec<User>>;
    async fn find_by_login(&self, login: &str) -> AuthResult<User>;
    async fn find_by_id(&self, id: i32) -> AuthResult<User>;
    /// Full replace of login and password hash; `updated_at` is refreshed.
    #[allow(dead_code)]
    async fn update(&self, user: &User) -> AuthResult<User>;
    /// Deleting an id that does not exist is `NotFound`, not a no-op.
    async fn delete(&self, id: i32) -> AuthResult<()>;
}

pub(crate) fn map_db_err(op: &'static str, err: sqlx::Error) -> AuthError {
    match err {
        sqlx::Error::RowNotFound => AuthError::NotFound,
        sqlx::Error::Database(ref db) if db.is_unique_violation() => AuthError::AlreadyExists,
        source => AuthError::Storage { op, source },
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: NewUser) -> AuthResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (login, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, login, password_hash, created_at, updated_at
            "#,
        )
        .bind(&user.login)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err("auth.repo.create", e))
    }

    async fn find_all(&self) -> AuthResult<Vec<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, login, password_hash, created_at, updated_at
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| map_db_err("auth.repo.find_all", e))
    }

    async fn find_by_login(&self, login: &str) -> AuthResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, login, password_hash, created_at, updated_at
            FROM users
            WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err("auth.repo.find_by_login", e))
    }

    async fn find_by_id(&self, id: i32) -> AuthResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, login, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err("auth.repo.find_by_id", e))
    }

    async fn update(&self, user: &User) -> AuthResult<User> {
        // fetch_one turns "zero rows updated" into RowNotFound
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET login = $2, password_hash = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, login, password_hash, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.login)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err("auth.repo.update", e))
    }

    async fn delete(&self, id: i32) -> AuthResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| map_db_err("auth.repo.delete", e))?;
        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound);
        }
        Ok(())
    }
}
