use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{
    error::{AuthError, AuthResult},
    repo::UserStore,
    repo_types::{NewUser, User},
};

/// In-memory store with the same error semantics as the Postgres one.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    last_id: i32,
    users: BTreeMap<i32, User>,
}

impl Inner {
    fn login_taken(&self, login: &str, except: Option<i32>) -> bool {
        self.users
            .values()
            .any(|u| u.login == login && Some(u.id) != except)
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: NewUser) -> AuthResult<User> {
        let mut inner = self.inner.lock().unwrap();
        if inner.login_taken(&user.login, None) {
            return Err(AuthError::AlreadyExists);
        }
        inner.last_id += 1;
        let stored = User {
            id: inner.last_id,
            login: user.login,
            password_hash: user.password_hash,
            created_at: user.created_at,
            updated_at: user.updated_at,
        };
        inner.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_all(&self) -> AuthResult<Vec<User>> {
        Ok(self.inner.lock().unwrap().users.values().cloned().collect())
    }

    async fn find_by_login(&self, login: &str) -> AuthResult<User> {
        self.inner
            .lock()
            .unwrap()
            .users
            .values()
            .find(|u| u.login == login)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn find_by_id(&self, id: i32) -> AuthResult<User> {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(&id)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn update(&self, user: &User) -> AuthResult<User> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.users.contains_key(&user.id) {
            return Err(AuthError::NotFound);
        }
        if inner.login_taken(&user.login, Some(user.id)) {
            return Err(AuthError::AlreadyExists);
        }
        let stored = inner.users.get_mut(&user.id).ok_or(AuthError::NotFound)?;
        stored.login = user.login.clone();
        stored.password_hash = user.password_hash.clone();
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(stored.clone())
    }

    async fn delete(&self, id: i32) -> AuthResult<()> {
        self.inner
            .lock()
            .unwrap()
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or(AuthError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let store = MemoryUserStore::new();
        let a = store.create(NewUser::new("a", "h")).await.unwrap();
        store.delete(a.id).await.unwrap();
        let b = store.create(NewUser::new("a", "h")).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn update_checks_existence_and_uniqueness() {
        let store = MemoryUserStore::new();
        let a = store.create(NewUser::new("a", "h")).await.unwrap();
        store.create(NewUser::new("b", "h")).await.unwrap();

        let mut renamed = a.clone();
        renamed.login = "b".into();
        assert!(matches!(store.update(&renamed).await, Err(AuthError::AlreadyExists)));

        renamed.login = "c".into();
        assert_eq!(store.update(&renamed).await.unwrap().login, "c");

        renamed.id = 42;
        assert!(matches!(store.update(&renamed).await, Err(AuthError::NotFound)));
    }
}
