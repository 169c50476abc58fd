//! User record storage.
//!
//! The HTTP layer only sees the [`UserStore`] capability. It is injected at
//! startup and must be [`initialize`](UserStore::initialize)d before the
//! first request is accepted.
//!
//! # Structure
//!
//! - [`SqliteStore`]: persistent store on an SQLite database. Uniqueness of
//!   usernames and emails is enforced by the schema.
//! - [`MemoryStore`]: process-local map, for tests and throwaway runs.
//!
//! Passwords never reach a store in plaintext form: every implementation
//! persists [`hash_password`] of the submitted value.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Failures reported by a [`UserStore`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("User store is not initialized")]
    NotInitialized,

    #[error("User store is closed")]
    Closed,

    /// A unique column already holds the submitted value.
    #[error("A user with this {field} already exists")]
    Duplicate { field: &'static str },

    #[error("Invalid user record: {reason}")]
    InvalidInput { reason: String },

    /// The backing database failed (connection, query or decoding).
    #[error("Database error: {reason}")]
    Database { reason: String },
}

/// Lowercase hex SHA-256 digest of the UTF-8 bytes of `password`.
///
/// ```
/// use offload_core::store::hash_password;
///
/// assert_eq!(
///     hash_password("secret"),
///     "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
/// );
/// ```
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Fields submitted to create a user. `password` is plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub age: i64,
}

impl NewUser {
    /// Every text field must be non-blank and `age` positive.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] naming the first offending field.
    pub fn validate(&self) -> Result<(), StoreError> {
        let fields = [
            ("username", &self.username),
            ("password", &self.password),
            ("email", &self.email),
            ("name", &self.name),
            ("surname", &self.surname),
        ];

        if let Some((field, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(StoreError::InvalidInput {
                reason: format!("`{field}` must not be empty"),
            });
        }
        if self.age <= 0 {
            return Err(StoreError::InvalidInput {
                reason: "`age` must be a positive integer".to_string(),
            });
        }

        Ok(())
    }
}

/// A stored user. `password` holds the hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub key: String,
    pub username: String,
    pub password: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub age: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/read/update/delete access to flat user records keyed by username.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Prepares the backing storage. Must complete before any other call.
    async fn initialize(&self) -> Result<(), StoreError>;

    /// Inserts a user, hashing its password.
    async fn create(&self, user: NewUser) -> Result<(), StoreError>;

    async fn get(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Replaces the password of `username`. Unknown users are ignored.
    async fn update(&self, username: &str, new_password: &str) -> Result<(), StoreError>;

    /// Removes `username`. Unknown users are ignored.
    async fn delete(&self, username: &str) -> Result<(), StoreError>;

    /// Releases the backing storage; later calls fail with
    /// [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}

/// Open/closed state shared by the store implementations. `T` is whatever
/// backs the store while it is open.
#[derive(Debug)]
enum Lifecycle<T> {
    Uninitialized,
    Open(T),
    Closed,
}

impl<T> Default for Lifecycle<T> {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl<T> Lifecycle<T> {
    fn get(&self) -> Result<&T, StoreError> {
        match self {
            Self::Open(inner) => Ok(inner),
            Self::Uninitialized => Err(StoreError::NotInitialized),
            Self::Closed => Err(StoreError::Closed),
        }
    }

    fn get_mut(&mut self) -> Result<&mut T, StoreError> {
        match self {
            Self::Open(inner) => Ok(inner),
            Self::Uninitialized => Err(StoreError::NotInitialized),
            Self::Closed => Err(StoreError::Closed),
        }
    }

    fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn alice() -> NewUser {
        NewUser {
            username: "alice".to_string(),
            password: "secret".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            surname: "Liddell".to_string(),
            age: 30,
        }
    }

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        let hash = hash_password("");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(hash_password("a"), hash_password("b"));
    }

    #[test]
    fn validation_rejects_blank_fields_and_bad_age() {
        assert!(alice().validate().is_ok());

        let blank = NewUser {
            email: "  ".to_string(),
            ..alice()
        };
        assert!(matches!(
            blank.validate(),
            Err(StoreError::InvalidInput { reason }) if reason.contains("email")
        ));

        let ageless = NewUser { age: 0, ..alice() };
        assert!(ageless.validate().is_err());

        let negative = NewUser { age: -3, ..alice() };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn lifecycle_reports_state() {
        let mut lifecycle = Lifecycle::<u8>::default();
        assert_eq!(lifecycle.get(), Err(StoreError::NotInitialized));

        lifecycle = Lifecycle::Open(7);
        assert!(lifecycle.is_open());
        *lifecycle.get_mut().unwrap() += 1;
        assert_eq!(lifecycle.get(), Ok(&8));

        lifecycle = Lifecycle::Closed;
        assert!(lifecycle.is_closed());
        assert_eq!(lifecycle.get(), Err(StoreError::Closed));
    }
}
