//! Single-use account confirmation tokens.

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::crypto::random_token;
use crate::repository::ConfirmAccountRepository;
use crate::session::{Result, SessionError};
use crate::user::ConfirmAccount;

const TOKEN_LENGTH: usize = 64;

/// Create and consume confirmation tokens.
#[derive(Clone)]
pub struct ConfirmationStore {
    repo: Arc<dyn ConfirmAccountRepository>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl ConfirmationStore {
    /// Create a new [`ConfirmationStore`]. `window` is in seconds.
    pub fn new(
        repo: Arc<dyn ConfirmAccountRepository>,
        clock: Arc<dyn Clock>,
        window: i64,
    ) -> Self {
        Self {
            repo,
            clock,
            window: Duration::seconds(window),
        }
    }

    /// Persist a fresh token for `user_id`, valid for the configured window.
    pub async fn create(&self, user_id: &str) -> Result<ConfirmAccount> {
        let record = ConfirmAccount {
            token: random_token(TOKEN_LENGTH),
            user_id: user_id.to_owned(),
            expire_at: self.clock.now() + self.window,
        };
        self.repo.store(&record).await?;

        Ok(record)
    }

    /// Claim a token. The record is gone afterwards, even when expired.
    pub async fn consume(&self, token: &str) -> Result<ConfirmAccount> {
        let record = self
            .repo
            .take(token)
            .await?
            .ok_or(SessionError::InvalidToken)?;

        if record.is_expired(self.clock.now()) {
            tracing::debug!(user_id = %record.user_id, "confirmation token expired");
            return Err(SessionError::TokenExpired);
        }

        Ok(record)
    }

    /// Put back a claimed token when its confirmation could not be applied.
    pub async fn restore(&self, record: &ConfirmAccount) -> Result<()> {
        self.repo.store(record).await?;
        Ok(())
    }

    /// Delete tokens nobody consumed in time.
    pub async fn purge_expired(&self) -> Result<u64> {
        Ok(self.repo.purge_expired(self.clock.now()).await?)
    }
}
