//! Opaque refresh tokens.

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::config::MIN_REFRESH_TOKEN_LENGTH;
use crate::crypto::random_token;
use crate::repository::RefreshTokenRepository;
use crate::session::Result;
use crate::user::RefreshToken;

/// Mint, resolve and revoke refresh tokens.
#[derive(Clone)]
pub struct RefreshTokenStore {
    repo: Arc<dyn RefreshTokenRepository>,
    clock: Arc<dyn Clock>,
    length: usize,
    ttl: Duration,
}

impl RefreshTokenStore {
    /// Create a new [`RefreshTokenStore`].
    ///
    /// `length` is raised to the minimal accepted length.
    pub fn new(
        repo: Arc<dyn RefreshTokenRepository>,
        clock: Arc<dyn Clock>,
        length: usize,
        ttl_days: i64,
    ) -> Self {
        Self {
            repo,
            clock,
            length: length.max(MIN_REFRESH_TOKEN_LENGTH),
            ttl: Duration::days(ttl_days),
        }
    }

    /// Generate and persist a new token for `user_id`.
    pub async fn issue(&self, user_id: &str) -> Result<String> {
        let record = RefreshToken {
            token: random_token(self.length),
            user_id: user_id.to_owned(),
            created_at: self.clock.now(),
        };
        self.repo.store(&record).await?;

        tracing::debug!(user_id, "refresh token issued");
        Ok(record.token)
    }

    /// Owner of a live token, `None` when unknown or too old.
    pub async fn resolve(&self, token: &str) -> Result<Option<String>> {
        let Some(record) = self.repo.find(token).await? else {
            return Ok(None);
        };

        if record.created_at + self.ttl < self.clock.now() {
            return Ok(None);
        }

        Ok(Some(record.user_id))
    }

    /// Delete a token. Returns whether this call removed it.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        Ok(self.repo.delete(token).await?)
    }

    /// Delete tokens that no longer resolve.
    pub async fn purge_expired(&self) -> Result<u64> {
        let cutoff = self.clock.now() - self.ttl;
        Ok(self.repo.purge_created_before(cutoff).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::repository::MemoryStore;

    fn store(clock: Arc<ManualClock>) -> RefreshTokenStore {
        RefreshTokenStore::new(Arc::new(MemoryStore::new()), clock, 10, 15)
    }

    #[tokio::test]
    async fn test_issue_and_resolve() {
        let store = store(Arc::new(ManualClock::new(Utc::now())));

        let mut tokens = HashSet::new();
        for i in 0..50 {
            let user_id = format!("user-{}", i % 5);
            let token = store.issue(&user_id).await.unwrap();

            assert!(token.len() >= MIN_REFRESH_TOKEN_LENGTH);
            assert_eq!(store.resolve(&token).await.unwrap(), Some(user_id));
            assert!(tokens.insert(token));
        }
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = store(Arc::new(ManualClock::new(Utc::now())));
        let token = store.issue("user").await.unwrap();

        assert!(store.revoke(&token).await.unwrap());
        assert!(!store.revoke(&token).await.unwrap());
        assert_eq!(store.resolve(&token).await.unwrap(), None);
        assert!(!store.revoke("never-issued").await.unwrap());
    }

    #[tokio::test]
    async fn test_old_token_does_not_resolve() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = store(Arc::clone(&clock));
        let token = store.issue("user").await.unwrap();

        clock.advance(Duration::days(15));
        assert!(store.resolve(&token).await.unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert_eq!(store.resolve(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = store(Arc::clone(&clock));
        let old = store.issue("user").await.unwrap();

        clock.advance(Duration::days(15));
        let fresh = store.issue("user").await.unwrap();
        assert_eq!(store.purge_expired().await.unwrap(), 0);

        clock.advance(Duration::seconds(1));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(!store.revoke(&old).await.unwrap());
        assert_eq!(store.resolve(&fresh).await.unwrap(), Some("user".into()));
    }
}
