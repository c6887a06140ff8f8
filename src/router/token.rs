//! Refresh token exchange and revocation.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::session::Session;

fn validate_grant_type(
    grant_type: &str,
) -> std::result::Result<(), ValidationError> {
    // RFC 6749 section 6: only `refresh_token` grants are accepted here.
    if grant_type != "refresh_token" {
        return Err(ValidationError::new("invalid_grant_type"));
    }

    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[validate(length(min = 1, max = 255))]
    pub refresh_token: String,
    #[validate(custom(
        function = "validate_grant_type",
        message = "\"grantType\" must be \"refresh_token\"."
    ))]
    pub grant_type: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LogoutBody {
    #[validate(length(min = 1, max = 255))]
    pub refresh_token: String,
}

/// Handler to get a new token pair with a refresh token.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Session>> {
    Ok(Json(state.session.refresh(&body.refresh_token).await?))
}

/// Handler to revoke a refresh token.
pub async fn logout(
    State(state): State<AppState>,
    Valid(body): Valid<LogoutBody>,
) -> Result<StatusCode> {
    state.session.logout(&body.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::router::login::tests::{login, post};
    use crate::router::state;

    #[tokio::test]
    async fn test_refresh_handler() {
        let mut test = state();
        let session = login(&mut test, "a@x.com").await;
        let refresh_token = session["refreshToken"].clone();

        let (status, body) = post(
            &test,
            "/auth/token",
            json!({ "refreshToken": refresh_token, "grantType": "refresh_token" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["refreshToken"], refresh_token);

        // Old token was rotated.
        let (status, _) = post(
            &test,
            "/auth/token",
            json!({ "refreshToken": refresh_token, "grantType": "refresh_token" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_wrong_grant() {
        let mut test = state();
        let session = login(&mut test, "a@x.com").await;

        let (status, _) = post(
            &test,
            "/auth/token",
            json!({ "refreshToken": session["refreshToken"], "grantType": "password" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_logout_handler() {
        let mut test = state();
        let session = login(&mut test, "a@x.com").await;
        let refresh_token = session["refreshToken"].clone();

        for _ in 0..2 {
            let (status, _) = post(
                &test,
                "/auth/logout",
                json!({ "refreshToken": refresh_token }),
            )
            .await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }

        let (status, _) = post(
            &test,
            "/auth/token",
            json!({ "refreshToken": refresh_token, "grantType": "refresh_token" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
