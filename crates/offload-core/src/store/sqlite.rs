use super::{Lifecycle, NewUser, StoreError, UserRecord, UserStore, hash_password};
use async_trait::async_trait;
use chrono::Utc;
use core::str::FromStr;
use parking_lot::RwLock;
use sqlx::{
    Row,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
};
use std::path::Path;
use uuid::Uuid;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        key TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        surname TEXT NOT NULL,
        age INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )";

const SELECT_USER: &str = "
    SELECT key, username, password, email, name, surname, age, created_at, updated_at
    FROM users
    WHERE username = ?";

/// Persistent [`UserStore`] on an SQLite database.
///
/// [`initialize`](UserStore::initialize) opens a connection pool and creates
/// the `users` table if it does not exist, so records survive a restart.
/// Duplicate usernames and emails are rejected by the table's `UNIQUE`
/// constraints.
#[derive(Debug)]
pub struct SqliteStore {
    options: SqliteConnectOptions,
    max_connections: u32,
    inner: RwLock<Lifecycle<SqlitePool>>,
}

impl SqliteStore {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

    pub fn new(options: SqliteConnectOptions) -> Self {
        Self {
            options,
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            inner: RwLock::default(),
        }
    }

    /// Store on the database file at `path`, created on first use.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::new(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
        )
    }

    /// Store on a `sqlite:` connection URL such as `sqlite://db.sqlite`. The
    /// database file is created on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the URL cannot be parsed.
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        Ok(Self::new(options))
    }

    #[must_use]
    pub fn with_max_connections(self, max_connections: u32) -> Self {
        Self {
            max_connections: max_connections.max(1),
            ..self
        }
    }

    fn pool(&self) -> Result<SqlitePool, StoreError> {
        self.inner.read().get().cloned()
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        if self.inner.read().is_closed() {
            return Err(StoreError::Closed);
        }
        if self.inner.read().is_open() {
            return Ok(());
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(self.options.clone())
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;

        // Another caller may have opened or closed the store meanwhile.
        let unused = {
            let mut inner = self.inner.write();
            if inner.is_open() || inner.is_closed() {
                Some(pool)
            } else {
                *inner = Lifecycle::Open(pool);
                None
            }
        };
        if let Some(pool) = unused {
            pool.close().await;
        }

        let state = self.inner.read().get().map(|_| ());
        if state.is_ok() {
            tracing::debug!("SQLite user store initialized");
        }
        state
    }

    async fn create(&self, user: NewUser) -> Result<(), StoreError> {
        user.validate()?;
        let pool = self.pool()?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO users (key, username, password, email, name, surname, age, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user.username)
        .bind(hash_password(&user.password))
        .bind(user.email)
        .bind(user.name)
        .bind(user.surname)
        .bind(user.age)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await?;

        Ok(())
    }

    async fn get(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let pool = self.pool()?;

        let row = sqlx::query(SELECT_USER)
            .bind(username)
            .fetch_optional(&pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn update(&self, username: &str, new_password: &str) -> Result<(), StoreError> {
        let pool = self.pool()?;

        sqlx::query("UPDATE users SET password = ?, updated_at = ? WHERE username = ?")
            .bind(hash_password(new_password))
            .bind(Utc::now())
            .bind(username)
            .execute(&pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<(), StoreError> {
        let pool = self.pool()?;

        sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(username)
            .execute(&pool)
            .await?;

        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        let previous = core::mem::replace(&mut *self.inner.write(), Lifecycle::Closed);
        if let Lifecycle::Open(pool) = previous {
            pool.close().await;
            tracing::debug!("SQLite user store closed");
        }
        Ok(())
    }
}

fn record_from_row(row: &SqliteRow) -> Result<UserRecord, StoreError> {
    Ok(UserRecord {
        key: row.try_get("key")?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        surname: row.try_get("surname")?,
        age: row.try_get("age")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                let message = db.message();
                let field = if message.contains("users.email") {
                    "email"
                } else if message.contains("users.username") {
                    "username"
                } else {
                    "key"
                };
                return Self::Duplicate { field };
            }
        }

        Self::Database {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::alice;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> SqliteStore {
        let store = SqliteStore::open(dir.path().join("users.db"));
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn create_then_get_round_trips_every_column() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.create(alice()).await.unwrap();

        let record = store.get("alice").await.unwrap().unwrap();
        assert_eq!(record.username, "alice");
        assert_eq!(record.password, hash_password("secret"));
        assert_eq!(record.email, "alice@example.com");
        assert_eq!(record.name, "Alice");
        assert_eq!(record.surname, "Liddell");
        assert_eq!(record.age, 30);
        assert_eq!(record.created_at, record.updated_at);
        assert!(Uuid::parse_str(&record.key).is_ok());

        assert_eq!(store.get("bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unique_constraints_reject_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.create(alice()).await.unwrap();

        let same_name = NewUser {
            email: "other@example.com".to_string(),
            ..alice()
        };
        assert_eq!(
            store.create(same_name).await,
            Err(StoreError::Duplicate { field: "username" })
        );

        let same_email = NewUser {
            username: "alice2".to_string(),
            ..alice()
        };
        assert_eq!(
            store.create(same_email).await,
            Err(StoreError::Duplicate { field: "email" })
        );
    }

    #[tokio::test]
    async fn update_rehashes_and_unknown_users_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.create(alice()).await.unwrap();
        let before = store.get("alice").await.unwrap().unwrap();

        store.update("alice", "changed").await.unwrap();
        store.update("ghost", "x").await.unwrap();
        store.delete("ghost").await.unwrap();

        let after = store.get("alice").await.unwrap().unwrap();
        assert_eq!(after.password, hash_password("changed"));
        assert_eq!(after.key, before.key);
        assert!(after.updated_at >= before.updated_at);

        store.delete("alice").await.unwrap();
        assert_eq!(store.get("alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();

        let store = open_store(&dir).await;
        store.create(alice()).await.unwrap();
        store.close().await.unwrap();

        let reopened = open_store(&dir).await;
        let record = reopened.get("alice").await.unwrap().unwrap();
        assert_eq!(record.password, hash_password("secret"));

        // The schema is kept, so the constraint still holds.
        assert_eq!(
            reopened.create(alice()).await,
            Err(StoreError::Duplicate { field: "username" })
        );
    }

    #[tokio::test]
    async fn lifecycle_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("users.db"));
        assert_eq!(store.get("alice").await, Err(StoreError::NotInitialized));

        store.initialize().await.unwrap();
        store.initialize().await.unwrap();

        store.close().await.unwrap();
        assert_eq!(store.get("alice").await, Err(StoreError::Closed));
        assert_eq!(store.initialize().await, Err(StoreError::Closed));
    }

    #[test]
    fn from_url_accepts_sqlite_urls() {
        assert!(SqliteStore::from_url("sqlite://db.sqlite").is_ok());
        assert!(matches!(
            SqliteStore::from_url("sqlite://db.sqlite?mode=bogus"),
            Err(StoreError::Database { .. })
        ));
    }

    #[tokio::test]
    async fn works_behind_a_trait_object() {
        let dir = tempfile::tempdir().unwrap();
        let store: Box<dyn UserStore> = Box::new(SqliteStore::open(dir.path().join("users.db")));
        store.initialize().await.unwrap();
        store.create(alice()).await.unwrap();
        assert!(store.get("alice").await.unwrap().is_some());
    }
}
