//! Failures of the session engine.

use crate::crypto::CryptoError;
use crate::repository::StorageError;

pub type Result<T> = std::result::Result<T, SessionError>;

/// Enum representing session lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Operator must create the role.
    #[error("required role `{role}` does not exist")]
    Configuration { role: String },

    #[error("invalid email or password")]
    Authentication,
    #[error("your account has been deactivated")]
    AccountDisabled,
    #[error("your account is not confirmed yet")]
    AccountNotConfirmed,

    #[error("email address is already in use")]
    EmailTaken,

    #[error("token is invalid")]
    InvalidToken,
    #[error("token has expired")]
    TokenExpired,
    #[error("token is malformed or has a wrong signature")]
    MalformedToken,

    /// A stored invariant does not hold.
    #[error("internal inconsistency: {details}")]
    InternalInconsistency { details: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("internal error")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl SessionError {
    /// Short label used on metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Authentication => "authentication",
            Self::AccountDisabled => "account_disabled",
            Self::AccountNotConfirmed => "account_not_confirmed",
            Self::EmailTaken => "email_taken",
            Self::InvalidToken => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::MalformedToken => "malformed_token",
            Self::InternalInconsistency { .. } => "internal_inconsistency",
            Self::Storage(_) => "storage",
            Self::Crypto(_) => "crypto",
            Self::Internal(_) => "internal",
        }
    }

    /// Logged once, where it turns into a response.
    pub(crate) fn inconsistency(details: impl Into<String>) -> Self {
        Self::InternalInconsistency {
            details: details.into(),
        }
    }
}
