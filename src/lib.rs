//! Authority registers accounts, confirms them by email and hands out
//! session tokens.

#![forbid(unsafe_code)]
pub mod clock;
pub mod config;
pub mod crypto;
mod database;
pub mod error;
pub mod mail;
pub mod repository;
mod router;
pub mod session;
pub mod telemetry;
pub mod token;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::clock::{Clock, SystemClock};
use crate::config::Configuration;
use crate::crypto::PasswordManager;
use crate::mail::{MailManager, Mailer};
use crate::repository::{MemoryStore, PgStore, Repositories};
use crate::session::{
    ConfirmationStore, ConfirmationWorker, RefreshTokenStore, SessionService,
    spawn_purge,
};
use crate::user::Role;

const PURGE_PERIOD: Duration = Duration::from_secs(60 * 60);

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
    token: Option<&str>,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub session: Arc<SessionService>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the session engine and start its background tasks.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        config: Arc<Configuration>,
        repos: Repositories,
        passwords: PasswordManager,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let confirmations = ConfirmationStore::new(
            Arc::clone(&repos.confirmations),
            Arc::clone(&clock),
            config.registration.confirmation_window,
        );
        let (events, _) = ConfirmationWorker::new(
            confirmations.clone(),
            mailer,
            config.registration.confirmation_url.clone(),
        )
        .spawn();
        let refresh_tokens = RefreshTokenStore::new(
            Arc::clone(&repos.refresh_tokens),
            Arc::clone(&clock),
            config.refresh_token.length,
            config.refresh_token.ttl_days,
        );
        spawn_purge(confirmations, refresh_tokens, PURGE_PERIOD);

        let session = SessionService::new(
            &config,
            repos,
            Arc::new(passwords),
            clock,
            events,
        );

        Self {
            config,
            session: Arc::new(session),
            metrics: None,
        }
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let auth_router = Router::new()
        // `POST /auth/register` goes to `register`.
        .route("/register", post(router::register::handler))
        // `POST /auth/login` goes to `login`.
        .route("/login", post(router::login::handler))
        // `POST /auth/confirm-account` goes to `confirm`.
        .route("/confirm-account", post(router::confirm::handler))
        // `POST /auth/token` exchanges a refresh token.
        .route("/token", post(router::token::handler))
        .route("/logout", post(router::token::logout));

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(router::status::metrics))
        .nest("/auth", auth_router)
        .nest("/users", router::users::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let path = std::env::var("CONFIG_PATH").unwrap_or_default();
    let config = Configuration::default().path(path.into()).read()?;

    if config.token.secret.is_empty() {
        return Err("missing `token.secret` entry or `TOKEN_SECRET` variable".into());
    }

    let repos = match &config.postgres {
        Some(postgres) => {
            let pool = database::connect(postgres).await?;
            Repositories::from_store(Arc::new(PgStore::new(pool)))
        },
        None => {
            tracing::warn!(
                role = %config.registration.default_role,
                "missing `postgres` entry on `config.yaml` file, data stay in memory"
            );
            let role = Role::new(config.registration.default_role.clone());
            Repositories::from_store(Arc::new(MemoryStore::with_roles([role])))
        },
    };

    let passwords = PasswordManager::new(config.argon2.clone())?;

    // handle mail sender.
    let mail = if let Some(cfg) = &config.mail {
        MailManager::new(cfg).await?
    } else {
        tracing::warn!("missing `mail` entry, confirmation emails are not sent");
        MailManager::default()
    };

    let metrics = telemetry::setup_metrics_recorder()?;

    let mut state = AppState::new(
        config,
        repos,
        passwords,
        Arc::new(mail),
        Arc::new(SystemClock),
    );
    state.metrics = Some(metrics);

    Ok(state)
}
