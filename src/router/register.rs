//! Account registration.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::session::NewAccount;
use crate::user::{Coordinates, Profile, User};

fn validate_coordinates(
    coordinates: &Coordinates,
) -> std::result::Result<(), ValidationError> {
    if !(-90.0..=90.0).contains(&coordinates.lat)
        || !(-180.0..=180.0).contains(&coordinates.lon)
    {
        return Err(ValidationError::new("coordinates"));
    }

    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
    #[validate(must_match(
        other = "password",
        message = "Passwords do not match."
    ))]
    pub confirm_password: String,
    #[validate(length(min = 1, max = 64, message = "First name is required."))]
    pub first_name: String,
    #[validate(length(min = 1, max = 64, message = "Last name is required."))]
    pub last_name: String,
    #[validate(length(min = 1, max = 64, message = "Timezone is required."))]
    pub timezone: String,
    #[validate(length(max = 32))]
    pub gender: Option<String>,
    #[validate(url(message = "Avatar must be an URL."))]
    pub avatar: Option<String>,
    #[validate(custom(
        function = "validate_coordinates",
        message = "Coordinates are out of range."
    ))]
    pub coordinates: Option<Coordinates>,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<User>)> {
    let account = NewAccount {
        email: body.email,
        password: body.password,
        profile: Profile {
            first_name: body.first_name,
            last_name: body.last_name,
            timezone: body.timezone,
            gender: body.gender,
            avatar: body.avatar,
            coordinates: body.coordinates,
        },
    };

    let user = state
        .session
        .register(account, &state.config.registration.default_role)
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::http::Method;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use super::*;
    use crate::repository::MemoryStore;
    use crate::router::{state, state_with};
    use crate::{app, make_request};

    pub(crate) fn body(email: &str) -> Value {
        json!({
            "email": email,
            "password": "StRoNg_PaSsWoRd1",
            "confirmPassword": "StRoNg_PaSsWoRd1",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "timezone": "Europe/London",
            "coordinates": { "lat": 51.5, "lon": -0.12 },
        })
    }

    #[tokio::test]
    async fn test_register_handler() {
        let mut test = state();
        let app = app(test.state.clone());

        let response = make_request(
            app,
            Method::POST,
            "/auth/register",
            body("a@x.com").to_string(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["email"], "a@x.com");
        assert_eq!(body["confirmed"], false);
        assert_eq!(body["roles"], json!(["user"]));
        assert_eq!(body["coordinates"]["lat"], 51.5);
        assert!(body.get("password").is_none());

        let message = test.mail.recv().await.unwrap();
        assert_eq!(message.to, "a@x.com");
        assert_eq!(message.name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_register_invalid_body() {
        let test = state();

        let mut mismatch = body("a@x.com");
        mismatch["confirmPassword"] = json!("other");
        let mut no_timezone = body("a@x.com");
        no_timezone["timezone"] = json!("");
        let mut bad_email = body("a@x.com");
        bad_email["email"] = json!("not-an-email");

        for payload in [mismatch, no_timezone, bad_email] {
            let response = make_request(
                app(test.state.clone()),
                Method::POST,
                "/auth/register",
                payload.to_string(),
                None,
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }

        assert_eq!(test.store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_twice() {
        let test = state();

        let first = make_request(
            app(test.state.clone()),
            Method::POST,
            "/auth/register",
            body("a@x.com").to_string(),
            None,
        )
        .await;
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = make_request(
            app(test.state.clone()),
            Method::POST,
            "/auth/register",
            body("A@x.com").to_string(),
            None,
        )
        .await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_register_without_role() {
        let test = state_with(std::sync::Arc::new(MemoryStore::new()));

        let response = make_request(
            app(test.state.clone()),
            Method::POST,
            "/auth/register",
            body("a@x.com").to_string(),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(test.store.user_count().await, 0);
    }
}
