//! Accounts and the records tied to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic location of a user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Profile attributes, opaque to the session engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub timezone: String,
    pub gender: Option<String>,
    pub avatar: Option<String>,
    pub coordinates: Option<Coordinates>,
}

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip)]
    pub password: String,
    #[serde(flatten)]
    pub profile: Profile,
    pub roles: Vec<String>,
    pub enabled: bool,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether a session may be opened for this account.
    pub fn check_state(&self) -> Result<(), crate::session::SessionError> {
        if !self.enabled {
            return Err(crate::session::SessionError::AccountDisabled);
        }
        if !self.confirmed {
            return Err(crate::session::SessionError::AccountNotConfirmed);
        }
        Ok(())
    }
}

/// Named permission grouping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub name: String,
    pub description: Option<String>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Opaque long-lived token owned by a user.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshToken {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Single-use token proving control of the registered email.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct ConfirmAccount {
    pub token: String,
    pub user_id: String,
    pub expire_at: DateTime<Utc>,
}

impl ConfirmAccount {
    /// Expired strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at < now
    }
}

/// Normalize an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
