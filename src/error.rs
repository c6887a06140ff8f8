//! Error handler for authority.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::session::SessionError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid 'Authorization' header")]
    Unauthorized,
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/problem+json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

fn session_response(err: &SessionError) -> ResponseError {
    let response = ResponseError::default()
        .title("Request could not be completed.")
        .details(&err.to_string())
        .status(StatusCode::BAD_REQUEST);

    match err {
        SessionError::Configuration { role } => {
            tracing::error!(%role, "registration refused, role is missing");
            response
                .title("Server is not ready to accept registrations.")
                .details("registration is not available")
        },
        SessionError::Authentication
        | SessionError::AccountDisabled
        | SessionError::AccountNotConfirmed => {
            response.title("Authentication failed.")
        },
        SessionError::InvalidToken
        | SessionError::TokenExpired
        | SessionError::MalformedToken => response.title("Invalid token."),
        SessionError::EmailTaken => response
            .title("Account already exists.")
            .status(StatusCode::CONFLICT),
        SessionError::InternalInconsistency { .. }
        | SessionError::Storage(_)
        | SessionError::Crypto(_)
        | SessionError::Internal(_) => {
            tracing::error!(%err, reason = err.reason(), "server returned 500 status");
            ResponseError::default()
        },
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = match &self {
            ServerError::Validation(validation_errors) => ResponseError::default()
                .title("There were validation errors with your request.")
                .details(&self.to_string())
                .status(StatusCode::UNPROCESSABLE_ENTITY)
                .errors(validation_errors),

            ServerError::Axum(rejection) => ResponseError::default()
                .title("Request body could not be read.")
                .details(&rejection.body_text())
                .status(rejection.status()),

            ServerError::Session(err) => session_response(err),

            ServerError::Unauthorized => ResponseError::default()
                .title("Missing or invalid 'Authorization' header.")
                .details(&self.to_string())
                .status(StatusCode::UNAUTHORIZED),
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/problem+json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
