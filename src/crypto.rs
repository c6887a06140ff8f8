//! Cryptographic logics.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// Generate an opaque alphanumeric token from the OS random source.
pub fn random_token(length: usize) -> String {
    Alphanumeric.sample_string(&mut OsRng, length)
}

/// Secret hashed at startup to build the stand-in PHC string.
const DUMMY_PASSWORD: &str = "authority-absent-account";

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
pub struct PasswordManager {
    params: Params,
    /// Hash with the live parameters, checked when no account matches.
    dummy_hash: String,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        let mut manager = Self {
            params,
            dummy_hash: String::new(),
        };
        manager.dummy_hash = manager.hash_password(DUMMY_PASSWORD)?;

        Ok(manager)
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC string.
    ///
    /// A malformed PHC string never matches.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> bool {
        let Ok(parsed) = PasswordHash::new(phc_hash) else {
            tracing::warn!("stored password is not a valid PHC string");
            return false;
        };

        self.argon2()
            .verify_password(password.as_ref(), &parsed)
            .is_ok()
    }

    /// Spend the cost of a real verification, then fail.
    ///
    /// Used when the identifier has no account, so the response time does
    /// not tell whether it exists.
    pub fn verify_absent(&self, password: impl AsRef<[u8]>) -> bool {
        let _ = self.verify_password(password, &self.dummy_hash);
        false
    }
}

#[cfg(test)]
pub(crate) fn fast_password_manager() -> PasswordManager {
    PasswordManager::new(Some(ArgonConfig {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    }))
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argon2() {
        let pwd = fast_password_manager();
        let hash = pwd.hash_password("StRong_PaÂ§$W0rD").unwrap();

        assert!(hash.starts_with("$argon2id$v=19$"));
        assert!(pwd.verify_password("StRong_PaÂ§$W0rD", &hash));
        assert!(!pwd.verify_password("wrong password", &hash));
        assert!(!pwd.verify_password("StRong_PaÂ§$W0rD", "not-a-phc"));
    }

    #[test]
    fn test_random_token() {
        let first = random_token(25);
        let second = random_token(25);

        assert_eq!(first.len(), 25);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first, second);
    }

    #[test]
    fn test_absent_account_hash() {
        let pwd = fast_password_manager();
        let dummy = PasswordHash::new(&pwd.dummy_hash).unwrap();
        let real = pwd.hash_password("StRong_PaÂ§$W0rD").unwrap();
        let real = PasswordHash::new(&real).unwrap();

        assert_eq!(dummy.algorithm, real.algorithm);
        assert_eq!(dummy.params, real.params);
        assert!(!pwd.verify_absent(DUMMY_PASSWORD));
        assert!(!pwd.verify_absent("anything"));
    }

    #[test]
    fn test_invalid_params() {
        let config = ArgonConfig {
            memory_cost: 1,
            ..Default::default()
        };
        assert!(PasswordManager::new(Some(config)).is_err());
    }
}
