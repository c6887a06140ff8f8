//! Public configuration page for front-end identification.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Structured configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    name: String,
    version: String,
    url: String,
}

/// Public server status (configuration).
pub async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        name: state.config.name.clone(),
        version: state.config.version().to_owned(),
        url: state.config.url.clone(),
    })
}

/// Render Prometheus metrics.
pub async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;

    use super::*;
    use crate::router::state;
    use crate::{app, make_request};

    #[tokio::test]
    async fn test_status_handler() {
        let test = state();

        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            "/status.json",
            String::default(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Status = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.name, test.state.config.name);
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(body.url, test.state.config.url);
    }
}
