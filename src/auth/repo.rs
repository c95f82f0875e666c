use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

const EMAIL_CONSTRAINT: &str = "users_email_key";

#[derive(Debug, Error)]
pub enum CreateUserError {
    #[error("username already registered")]
    DuplicateUsername,
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence for user accounts. Implementations own username/email
/// uniqueness: a conflicting `create` must fail with the matching
/// `Duplicate*` variant, never insert a second row.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn create(&self, new: NewUser) -> Result<User, CreateUserError>;
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
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("find user by username")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> Result<User, CreateUserError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_insert_error)
    }
}

fn map_insert_error(e: sqlx::Error) -> CreateUserError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some(EMAIL_CONSTRAINT) => CreateUserError::DuplicateEmail,
                // users_username_key
                _ => CreateUserError::DuplicateUsername,
            };
        }
    }
    CreateUserError::Other(anyhow::Error::new(e).context("insert user"))
}

/// Process-local store for tests and database-less development runs.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, CreateUserError> {
        // check and insert under one write lock, like a unique index would
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.username == new.username) {
            return Err(CreateUserError::DuplicateUsername);
        }
        if users.iter().any(|u| u.email == new.email) {
            return Err(CreateUserError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
        }
    }

    #[tokio::test]
    async fn memory_store_create_and_find() {
        let store = MemoryUserStore::new();
        let created = store
            .create(new_user("alice", "alice@example.com"))
            .await
            .expect("create");

        let by_name = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        let by_email = store
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, created.id);
        assert!(store.find_by_username("Alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_enforces_uniqueness() {
        let store = MemoryUserStore::new();
        store
            .create(new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        let err = store
            .create(new_user("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, CreateUserError::DuplicateUsername));

        let err = store
            .create(new_user("alice2", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, CreateUserError::DuplicateEmail));
    }

    #[tokio::test]
    async fn concurrent_registrations_yield_one_row() {
        let store = std::sync::Arc::new(MemoryUserStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .create(new_user("racer", &format!("racer{i}@example.com")))
                    .await
            }));
        }
        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(CreateUserError::DuplicateUsername) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);
    }

    #[test]
    fn serialized_user_hides_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "secret-hash".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("secret-hash"));
    }
}
