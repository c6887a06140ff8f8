//! Persistence ports used by the session engine.
//!
//! Every trait has a PostgreSQL adapter and an in-memory adapter.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::user::{ConfirmAccount, RefreshToken, Role, User};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} already exists")]
    Duplicate { entity: &'static str },

    #[error("{entity} does not exist")]
    NotFound { entity: &'static str },

    #[error("SQL request failed: {0}")]
    Sql(#[from] sqlx::Error),
}

/// Port for user persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Fails with [`StorageError::Duplicate`] on a used
    /// email.
    async fn create(&self, user: &User) -> Result<()>;

    /// Find a user by ID.
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Find a user by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Overwrite mutable fields of an existing user.
    ///
    /// Fails with [`StorageError::NotFound`] when no user has this ID.
    async fn update(&self, user: &User) -> Result<()>;
}

/// Port for role lookup.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Find a role by its name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>>;
}

/// Port for refresh token persistence.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    /// Store a new refresh token.
    async fn store(&self, token: &RefreshToken) -> Result<()>;

    /// Find a refresh token by its value.
    async fn find(&self, token: &str) -> Result<Option<RefreshToken>>;

    /// Delete a refresh token. Returns whether a row was removed.
    async fn delete(&self, token: &str) -> Result<bool>;

    /// Delete every token created before `cutoff`. Returns the count.
    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Port for confirmation token persistence.
#[async_trait]
pub trait ConfirmAccountRepository: Send + Sync {
    /// Store a new confirmation token.
    async fn store(&self, record: &ConfirmAccount) -> Result<()>;

    /// Atomically remove and return a token.
    ///
    /// Among concurrent callers with the same token, only one gets `Some`.
    async fn take(&self, token: &str) -> Result<Option<ConfirmAccount>>;

    /// Delete every token expired before `now`. Returns the count.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Every port the session engine needs, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
    pub confirmations: Arc<dyn ConfirmAccountRepository>,
}

impl Repositories {
    /// Use a single backend for every port.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserRepository
            + RoleRepository
            + RefreshTokenRepository
            + ConfirmAccountRepository
            + 'static,
    {
        Self {
            users: store.clone(),
            roles: store.clone(),
            refresh_tokens: store.clone(),
            confirmations: store,
        }
    }
}
