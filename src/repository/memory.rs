//! In-memory storage, for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    ConfirmAccountRepository, RefreshTokenRepository, Result, RoleRepository,
    StorageError, UserRepository,
};
use crate::user::{ConfirmAccount, RefreshToken, Role, User};

/// Keep every record in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    roles: RwLock<HashMap<String, Role>>,
    refresh_tokens: RwLock<HashMap<String, RefreshToken>>,
    confirmations: RwLock<HashMap<String, ConfirmAccount>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `roles`.
    pub fn with_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        let roles = roles.into_iter().map(|r| (r.name.clone(), r)).collect();
        Self {
            roles: RwLock::new(roles),
            ..Default::default()
        }
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    /// Confirmation tokens held for a user.
    pub async fn confirmations_of(&self, user_id: &str) -> Vec<ConfirmAccount> {
        self.confirmations
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Refresh tokens held for a user.
    pub async fn refresh_tokens_of(&self, user_id: &str) -> Vec<RefreshToken> {
        self.refresh_tokens
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(StorageError::Duplicate { entity: "email" });
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update(&self, user: &User) -> Result<()> {
        match self.users.write().await.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            },
            None => Err(StorageError::NotFound { entity: "user" }),
        }
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.roles.read().await.get(name).cloned())
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryStore {
    async fn store(&self, token: &RefreshToken) -> Result<()> {
        let mut tokens = self.refresh_tokens.write().await;
        if tokens.contains_key(&token.token) {
            return Err(StorageError::Duplicate {
                entity: "refresh token",
            });
        }
        tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn find(&self, token: &str) -> Result<Option<RefreshToken>> {
        Ok(self.refresh_tokens.read().await.get(token).cloned())
    }

    async fn delete(&self, token: &str) -> Result<bool> {
        Ok(self.refresh_tokens.write().await.remove(token).is_some())
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tokens = self.refresh_tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.created_at >= cutoff);
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl ConfirmAccountRepository for MemoryStore {
    async fn store(&self, record: &ConfirmAccount) -> Result<()> {
        let mut confirmations = self.confirmations.write().await;
        if confirmations.contains_key(&record.token) {
            return Err(StorageError::Duplicate {
                entity: "confirmation token",
            });
        }
        confirmations.insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn take(&self, token: &str) -> Result<Option<ConfirmAccount>> {
        Ok(self.confirmations.write().await.remove(token))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut confirmations = self.confirmations.write().await;
        let before = confirmations.len();
        confirmations.retain(|_, c| !c.is_expired(now));
        Ok((before - confirmations.len()) as u64)
    }
}
