//! Credential login.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::session::Session;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, max = 255, message = "Email is required."))]
    pub email: String,
    #[validate(length(min = 1, max = 255, message = "Password is required."))]
    pub password: String,
}

/// Handler to log in an user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Session>> {
    Ok(Json(state.session.login(&body.email, &body.password).await?))
}
