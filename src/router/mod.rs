//! HTTP API.
pub mod confirm;
pub mod login;
pub mod register;
pub mod status;
pub mod token;
pub mod users;

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ServerError;

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<S, T> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Application state backed by memory, with every confirmation email
/// forwarded to `mail`.
#[cfg(test)]
pub(crate) struct TestState {
    pub state: crate::AppState,
    pub store: std::sync::Arc<crate::repository::MemoryStore>,
    pub mail: tokio::sync::mpsc::UnboundedReceiver<crate::mail::Message>,
}

#[cfg(test)]
pub(crate) fn state_with(
    store: std::sync::Arc<crate::repository::MemoryStore>,
) -> TestState {
    use std::sync::Arc;

    let mut config = crate::config::Configuration::default();
    config.token.secret = "test-secret".into();

    let (tx, mail) = tokio::sync::mpsc::unbounded_channel();
    let state = crate::AppState::new(
        Arc::new(config),
        crate::repository::Repositories::from_store(store.clone()),
        crate::crypto::fast_password_manager(),
        Arc::new(crate::session::events::ChannelMailer(tx)),
        Arc::new(crate::clock::SystemClock),
    );

    TestState { state, store, mail }
}

#[cfg(test)]
pub(crate) fn state() -> TestState {
    state_with(std::sync::Arc::new(crate::repository::MemoryStore::with_roles(
        [crate::user::Role::new("user")],
    )))
}
