//! Session and account lifecycle.
//!
//! [`SessionService`] turns verified credentials into token pairs and moves
//! accounts from unconfirmed to confirmed.

mod confirmation;
mod credentials;
mod error;
pub(crate) mod events;
mod refresh;

pub use confirmation::ConfirmationStore;
pub use credentials::{CredentialVerifier, PasswordCredentials};
pub use error::{Result, SessionError};
pub use events::{
    ConfirmationWorker, RegistrationEvent, RegistrationPublisher, spawn_purge,
};
pub use refresh::RefreshTokenStore;

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::Configuration;
use crate::crypto::PasswordManager;
use crate::repository::{
    RoleRepository, Repositories, StorageError, UserRepository,
};
use crate::token::{Claims, TokenIssuer};
use crate::user::{Profile, User, normalize_email};

/// Data needed to create an account.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub profile: Profile,
}

/// Token pair given on login or refresh.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry, milliseconds since epoch.
    pub expires_at: i64,
}

/// Orchestrates registration, login, confirmation and refresh.
pub struct SessionService {
    users: Arc<dyn UserRepository>,
    roles: Arc<dyn RoleRepository>,
    credentials: Arc<dyn CredentialVerifier>,
    passwords: Arc<PasswordManager>,
    issuer: TokenIssuer,
    refresh_tokens: RefreshTokenStore,
    confirmations: ConfirmationStore,
    events: RegistrationPublisher,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    /// Create a new [`SessionService`].
    ///
    /// Credentials are checked against the Argon2 hashes of `repos.users`.
    pub fn new(
        config: &Configuration,
        repos: Repositories,
        passwords: Arc<PasswordManager>,
        clock: Arc<dyn Clock>,
        events: RegistrationPublisher,
    ) -> Self {
        let issuer =
            TokenIssuer::new(&config.url, &config.token.secret, config.token.ttl)
                .with_audience(config.audience());

        Self {
            credentials: Arc::new(PasswordCredentials::new(
                Arc::clone(&repos.users),
                Arc::clone(&passwords),
            )),
            refresh_tokens: RefreshTokenStore::new(
                repos.refresh_tokens,
                Arc::clone(&clock),
                config.refresh_token.length,
                config.refresh_token.ttl_days,
            ),
            confirmations: ConfirmationStore::new(
                repos.confirmations,
                Arc::clone(&clock),
                config.registration.confirmation_window,
            ),
            users: repos.users,
            roles: repos.roles,
            passwords,
            issuer,
            events,
            clock,
        }
    }

    /// Replace the credential verifier.
    pub fn with_credentials(
        mut self,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Create an unconfirmed account holding `role`.
    ///
    /// The confirmation email is sent later by the registration worker.
    pub async fn register(&self, account: NewAccount, role: &str) -> Result<User> {
        let result = self.create_account(account, role).await;
        observe("register", &result);
        result
    }

    async fn create_account(&self, account: NewAccount, role: &str) -> Result<User> {
        let role = self.roles.find_by_name(role).await?.ok_or_else(|| {
            tracing::error!(role, "default role is missing, create it first");
            SessionError::Configuration {
                role: role.to_owned(),
            }
        })?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: normalize_email(&account.email),
            password: self.passwords.hash_password(&account.password)?,
            profile: account.profile,
            roles: vec![role.name],
            enabled: true,
            confirmed: false,
            created_at: self.clock.now(),
        };

        self.users.create(&user).await.map_err(|err| match err {
            StorageError::Duplicate { .. } => SessionError::EmailTaken,
            err => err.into(),
        })?;

        tracing::info!(user_id = %user.id, "account created");

        self.events.publish(RegistrationEvent {
            user_id: user.id.clone(),
            email: user.email.clone(),
            name: format!(
                "{} {}",
                user.profile.first_name, user.profile.last_name
            ),
        });

        Ok(user)
    }

    /// Exchange credentials for a token pair.
    ///
    /// Unknown identifiers and wrong secrets both give
    /// [`SessionError::Authentication`].
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Session> {
        let result = self.authenticate(identifier, secret).await;
        observe("login", &result);
        result
    }

    async fn authenticate(&self, identifier: &str, secret: &str) -> Result<Session> {
        let email = normalize_email(identifier);

        if !self.credentials.verify(&email, secret).await? {
            return Err(SessionError::Authentication);
        }

        let user = self.users.find_by_email(&email).await?.ok_or_else(|| {
            SessionError::inconsistency("verified credentials have no account")
        })?;
        user.check_state()?;

        self.open_session(&user).await
    }

    /// Consume a confirmation token and mark its owner as confirmed.
    pub async fn confirm_account(&self, token: &str) -> Result<User> {
        let result = self.confirm(token).await;
        observe("confirm", &result);
        result
    }

    async fn confirm(&self, token: &str) -> Result<User> {
        let record = self.confirmations.consume(token).await?;

        match self.apply_confirmation(&record.user_id).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "account confirmed");
                Ok(user)
            },
            Err(err @ SessionError::Storage(_)) => {
                // The token is claimed, give it back so the user can retry.
                if let Err(restore) = self.confirmations.restore(&record).await {
                    tracing::error!(user_id = %record.user_id, %restore, "confirmation token lost");
                }
                Err(err)
            },
            Err(err) => Err(err),
        }
    }

    async fn apply_confirmation(&self, user_id: &str) -> Result<User> {
        let mut user = self.users.find_by_id(user_id).await?.ok_or_else(|| {
            SessionError::inconsistency(format!(
                "confirmation token of unknown user {user_id}"
            ))
        })?;
        user.confirmed = true;
        self.users.update(&user).await?;

        Ok(user)
    }

    /// Rotate a refresh token: revoke it and open a new session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        let result = self.rotate(refresh_token).await;
        observe("refresh", &result);
        result
    }

    async fn rotate(&self, refresh_token: &str) -> Result<Session> {
        let user_id = self
            .refresh_tokens
            .resolve(refresh_token)
            .await?
            .ok_or(SessionError::InvalidToken)?;

        // Lost a race against another exchange of the same token.
        if !self.refresh_tokens.revoke(refresh_token).await? {
            return Err(SessionError::InvalidToken);
        }

        let user = self.users.find_by_id(&user_id).await?.ok_or_else(|| {
            SessionError::inconsistency(format!(
                "refresh token of unknown user {user_id}"
            ))
        })?;
        user.check_state()?;

        self.open_session(&user).await
    }

    /// Revoke a refresh token. Unknown tokens are ignored.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        if self.refresh_tokens.revoke(refresh_token).await? {
            tracing::debug!("refresh token revoked");
        }
        Ok(())
    }

    /// Account behind already decoded access token claims.
    pub async fn current_user(&self, claims: &Claims) -> Result<User> {
        let user = self
            .users
            .find_by_id(&claims.sub)
            .await?
            .ok_or(SessionError::InvalidToken)?;
        user.check_state()?;

        Ok(user)
    }

    async fn open_session(&self, user: &User) -> Result<Session> {
        let access = self
            .issuer
            .create_token(&user.id, &user.roles, self.clock.now())?;
        let refresh_token = self.refresh_tokens.issue(&user.id).await?;

        Ok(Session {
            access_token: access.token,
            refresh_token,
            expires_at: access.expires_at,
        })
    }
}

fn observe<T>(operation: &'static str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(err) => err.reason(),
    };
    metrics::counter!("auth_operations_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}
