//! Configuration manager for authority.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const SECRET_ENV: &str = "TOKEN_SECRET";

/// Smallest refresh token accepted by the session engine.
pub const MIN_REFRESH_TOKEN_LENGTH: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Public URL of current instance, also used as token issuer.
    pub url: String,
    /// Listening port.
    pub port: u16,
    #[serde(skip_deserializing)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to access tokens.
    #[serde(skip_serializing)]
    pub token: Token,
    /// Related to refresh tokens.
    #[serde(skip_serializing)]
    pub refresh_token: RefreshToken,
    /// Related to user registration.
    #[serde(skip_serializing)]
    pub registration: Registration,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to automatic mail sending.
    #[serde(skip_serializing)]
    pub mail: Option<Mail>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").into(),
            url: "http://localhost:8080/".into(),
            port: 8080,
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            token: Token::default(),
            refresh_token: RefreshToken::default(),
            registration: Registration::default(),
            postgres: None,
            argon2: None,
            mail: None,
        }
    }
}

/// Json Web Token configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    /// HMAC signing secret. `TOKEN_SECRET` takes precedence.
    pub secret: String,
    /// Access token time-to-live, in seconds.
    pub ttl: u64,
    /// Update token audience.
    /// Default is the instance URL.
    pub audience: Option<String>,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            secret: String::default(),
            ttl: 60 * 15, // 15 minutes.
            audience: None,
        }
    }
}

/// Refresh token configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshToken {
    /// Number of alphanumeric characters.
    pub length: usize,
    /// Days before an unused token stops resolving.
    pub ttl_days: i64,
}

impl Default for RefreshToken {
    fn default() -> Self {
        Self {
            length: 64,
            ttl_days: 15,
        }
    }
}

/// Registration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Registration {
    /// Role given to every new account. Must exist in role store.
    pub default_role: String,
    /// Lifetime of a confirmation token, in seconds.
    pub confirmation_window: i64,
    /// Front-end page receiving the token as `token` query parameter.
    pub confirmation_url: Option<String>,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            default_role: "user".into(),
            confirmation_window: 60 * 60 * 24 * 2, // 2 days.
            confirmation_url: None,
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing, in KiB.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// RabbitMQ mail queue configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// Hostname:(?port) for RabbitMQ instance.
    pub address: String,
    /// RabbitMQ default vhost.
    pub vhost: Option<String>,
    /// RabbitMQ username to access queue.
    pub username: String,
    /// RabbitMQ password to access queue.
    pub password: String,
    /// Max channel connections.
    pub pool: Option<u16>,
    /// Queue name to send mailing events.
    pub queue: String,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Token audience, instance URL when unset.
    pub fn audience(&self) -> &str {
        self.token.audience.as_deref().unwrap_or(&self.url)
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path: &Path = if self.path.is_file() {
            &self.path
        } else {
            Path::new(DEFAULT_CONFIG_PATH)
        };

        let mut config = match File::open(file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file)
            {
                Ok(config) => config,
                Err(err) => self.error(err),
            },
            Err(err) => self.error(err),
        };

        config.version = VERSION.to_owned();
        config.url = self.normalize_url(&config.url)?;
        config.registration.confirmation_url = config
            .registration
            .confirmation_url
            .map(|u| self.normalize_url(&u))
            .transpose()?;

        if let Ok(secret) = std::env::var(SECRET_ENV) {
            config.token.secret = secret;
        }

        if config.refresh_token.length < MIN_REFRESH_TOKEN_LENGTH {
            tracing::warn!(
                length = config.refresh_token.length,
                minimum = MIN_REFRESH_TOKEN_LENGTH,
                "refresh token length raised to minimum"
            );
            config.refresh_token.length = MIN_REFRESH_TOKEN_LENGTH;
        }

        Ok(Arc::new(config))
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
name: accounts
url: auth.example.com
token:
  secret: s3cr3t
registration:
  default_role: member
"#;
        let config: Configuration = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.name, "accounts");
        assert_eq!(config.token.secret, "s3cr3t");
        assert_eq!(config.token.ttl, 900);
        assert_eq!(config.registration.default_role, "member");
        assert_eq!(config.registration.confirmation_window, 172_800);
        assert_eq!(config.refresh_token.length, 64);
        assert!(config.postgres.is_none());
    }

    #[test]
    fn test_normalize_url() {
        let config = Configuration::default();
        assert_eq!(
            config.normalize_url("auth.example.com").unwrap(),
            "https://auth.example.com/"
        );
        assert_eq!(
            config.normalize_url("http://localhost:8080").unwrap(),
            "http://localhost:8080/"
        );
    }

    #[test]
    fn test_audience_falls_back_to_url() {
        let mut config = Configuration::default();
        assert_eq!(config.audience(), config.url);

        config.token.audience = Some("api.example.com".into());
        assert_eq!(config.audience(), "api.example.com");
    }
}
