use super::{Lifecycle, NewUser, StoreError, UserRecord, UserStore, hash_password};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// In-process [`UserStore`] backed by a map keyed by username.
///
/// Usernames and emails are unique. Records are lost on
/// [`close`](UserStore::close) and when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Lifecycle<HashMap<String, UserRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.is_closed() {
            return Err(StoreError::Closed);
        }
        if !inner.is_open() {
            *inner = Lifecycle::Open(HashMap::new());
            tracing::debug!("In-memory user store initialized");
        }
        Ok(())
    }

    async fn create(&self, user: NewUser) -> Result<(), StoreError> {
        user.validate()?;

        let mut inner = self.inner.write();
        let users = inner.get_mut()?;

        if users.contains_key(&user.username) {
            return Err(StoreError::Duplicate { field: "username" });
        }
        if users.values().any(|record| record.email == user.email) {
            return Err(StoreError::Duplicate { field: "email" });
        }

        let now = Utc::now();
        let record = UserRecord {
            key: Uuid::new_v4().to_string(),
            password: hash_password(&user.password),
            username: user.username,
            email: user.email,
            name: user.name,
            surname: user.surname,
            age: user.age,
            created_at: now,
            updated_at: now,
        };
        users.insert(record.username.clone(), record);

        Ok(())
    }

    async fn get(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.inner.read().get()?.get(username).cloned())
    }

    async fn update(&self, username: &str, new_password: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if let Some(record) = inner.get_mut()?.get_mut(username) {
            record.password = hash_password(new_password);
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<(), StoreError> {
        self.inner.write().get_mut()?.remove(username);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        *self.inner.write() = Lifecycle::Closed;
        tracing::debug!("In-memory user store closed");
        Ok(())
    }
}
