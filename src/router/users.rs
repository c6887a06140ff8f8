//! Users-related HTTP API.

use axum::extract::{Request, State};
use axum::http::header;
use axum::response::Response;
use axum::routing::get;
use axum::{Extension, Json, Router, middleware};

use crate::AppState;
use crate::error::ServerError;
use crate::session::SessionError;
use crate::user::User;

const BEARER: &str = "Bearer ";

/// Custom middleware for authentification.
///
/// Puts the [`User`] behind the bearer token in request extensions.
async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response, ServerError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BEARER))
        .ok_or(ServerError::Unauthorized)?;

    let claims = state
        .session
        .issuer()
        .decode(token)
        .map_err(|_| ServerError::Unauthorized)?;

    let user = match state.session.current_user(&claims).await {
        Ok(user) => user,
        Err(SessionError::InvalidToken) => return Err(ServerError::Unauthorized),
        Err(err) => return Err(err.into()),
    };

    req.extensions_mut().insert::<User>(user);
    Ok(next.run(req).await)
}

/// Return the authenticated user.
async fn me(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /users/@me` goes to `me`. Authorization required.
        .route("/@me", get(me))
        .route_layer(middleware::from_fn_with_state(state, auth))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;

    use crate::router::login::tests::login;
    use crate::router::state;
    use crate::user::User;
    use crate::repository::UserRepository;
    use crate::{app, make_request};

    #[tokio::test]
    async fn test_me_handler() {
        let mut test = state();
        let session = login(&mut test, "a@x.com").await;
        let token = session["accessToken"].as_str().unwrap();

        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            "/users/@me",
            String::default(),
            Some(token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["email"], "a@x.com");
        assert_eq!(body["confirmed"], true);
    }

    #[tokio::test]
    async fn test_me_without_token() {
        let test = state();

        for token in [None, Some("garbage")] {
            let response = make_request(
                app(test.state.clone()),
                Method::GET,
                "/users/@me",
                String::default(),
                token,
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_me_disabled() {
        let mut test = state();
        let session = login(&mut test, "a@x.com").await;
        let token = session["accessToken"].as_str().unwrap();

        let mut user: User = UserRepository::find_by_email(test.store.as_ref(), "a@x.com")
            .await
            .unwrap()
            .unwrap();
        user.enabled = false;
        UserRepository::update(test.store.as_ref(), &user).await.unwrap();

        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            "/users/@me",
            String::default(),
            Some(token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
