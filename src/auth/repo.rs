use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;

pub use crate::auth::repo_types::{NewUser, User};

const PG_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Credential store. Email uniqueness is enforced here, not by callers.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create(&self, new_user: NewUser) -> Result<User, RepoError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn create(&self, new_user: NewUser) -> Result<User, RepoError> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, hashed_password, full_name)
            VALUES ($1, $2, $3)
            RETURNING id, email, hashed_password, full_name, is_active, created_at, updated_at
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.hashed_password)
        .bind(&new_user.full_name)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(PG_UNIQUE_VIOLATION) => {
                Err(RepoError::DuplicateEmail)
            }
            Err(e) => Err(RepoError::Backend(anyhow::Error::new(e).context("insert user"))),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, hashed_password, full_name, is_active, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| anyhow::Error::new(e).context("select user by email"))?;
        Ok(user)
    }
}

/// Process-local store keyed by email. The write lock covers the duplicate
/// check and the insert.
#[derive(Default)]
pub struct InMemoryUserRepo {
    users: RwLock<HashMap<String, User>>,
    next_id: AtomicI64,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Flips the active flag, refreshing `updated_at`. Returns false if the
    /// email is unknown.
    pub async fn set_active(&self, email: &str, active: bool) -> bool {
        let mut users = self.users.write().await;
        match users.get_mut(email) {
            Some(user) => {
                user.is_active = active;
                user.updated_at = OffsetDateTime::now_utc();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserRepo for InMemoryUserRepo {
    async fn create(&self, new_user: NewUser) -> Result<User, RepoError> {
        let mut users = self.users.write().await;
        if users.contains_key(&new_user.email) {
            return Err(RepoError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            email: new_user.email,
            hashed_password: new_user.hashed_password,
            full_name: new_user.full_name,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.email.clone(), user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        Ok(self.users.read().await.get(email).cloned())
    }
}
