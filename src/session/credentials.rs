//! Credential verification.

use std::sync::Arc;

use async_trait::async_trait;

use crate::crypto::PasswordManager;
use crate::repository::UserRepository;
use crate::session::Result;

/// Port checking an identifier and secret against stored credentials.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `true` when `secret` matches. Unknown identifiers never match.
    async fn verify(&self, identifier: &str, secret: &str) -> Result<bool>;
}

/// Verify passwords against Argon2 hashes of the user store.
pub struct PasswordCredentials {
    users: Arc<dyn UserRepository>,
    passwords: Arc<PasswordManager>,
}

impl PasswordCredentials {
    pub fn new(
        users: Arc<dyn UserRepository>,
        passwords: Arc<PasswordManager>,
    ) -> Self {
        Self { users, passwords }
    }
}

#[async_trait]
impl CredentialVerifier for PasswordCredentials {
    async fn verify(&self, identifier: &str, secret: &str) -> Result<bool> {
        let Some(user) = self.users.find_by_email(identifier).await? else {
            return Ok(self.passwords.verify_absent(secret));
        };

        Ok(self.passwords.verify_password(secret, &user.password))
    }
}
