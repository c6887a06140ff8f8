//! Account confirmation with the emailed token.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, max = 255, message = "Token is required."))]
    pub token: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub message: String,
}

/// Handler to confirm an account.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    state.session.confirm_account(&body.token).await?;

    Ok(Json(Response {
        message: "Account confirmed.".to_owned(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::router::login::tests::{post, register};
    use crate::router::state;

    #[tokio::test]
    async fn test_confirm_handler() {
        let mut test = state();
        let token = register(&mut test, "a@x.com").await;

        let (status, body) =
            post(&test, "/auth/confirm-account", json!({ "token": token })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Account confirmed.");

        let (status, body) =
            post(&test, "/auth/confirm-account", json!({ "token": token })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "token is invalid");
    }

    #[tokio::test]
    async fn test_confirm_unknown_token() {
        let test = state();

        let (status, _) =
            post(&test, "/auth/confirm-account", json!({ "token": "nope" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            post(&test, "/auth/confirm-account", json!({ "token": "" })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
