//! Send emails to users through the Maily queue.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{
    AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo,
};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, RecoveryConfig,
};
use serde::Serialize;
use url::Url;

use crate::config::Mail;
use crate::crypto::random_token;

const DEFAULT_AMPQ_HOST: &str = "localhost";
const DEFAULT_AMPQ_PORT: u16 = 5672;
const DEFAULT_AMPQ_VHOST: &str = "/";

const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/cloudevents+json";
const DATA_CONTENT_TYPE: &str = "application/json";
const CLOUDEVENT_VERSION: &str = "1.0";
const ID_LENGTH: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid mail queue address: {0}")]
    Url(#[from] url::ParseError),
    #[error("unsupported AMQP scheme `{0}`")]
    Scheme(String),
    #[error(transparent)]
    Amqp(#[from] lapin::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Maily templates list.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Ask user to prove they own the address.
    ConfirmAccount,
}

/// A message for one recipient.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Message {
    pub template: Template,
    pub to: String,
    pub name: String,
    /// Link or raw token the user must present back.
    pub action: String,
}

/// Port for sending emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), MailError>;
}

#[derive(Debug, Serialize)]
struct Cloudevent {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: Message,
}

/// Maily instance manager.
///
/// Without connection, messages are only logged.
#[derive(Debug, Clone, Default)]
pub struct MailManager {
    queue: String,
    conn: Option<Arc<Connection>>,
}

impl MailManager {
    /// Create a new [`MailManager`].
    pub async fn new(config: &Mail) -> Result<Self, MailError> {
        let addr = Url::parse(&config.address)?;
        let uri = AMQPUri {
            scheme: AMQPScheme::from_str(addr.scheme())
                .map_err(|_| MailError::Scheme(addr.scheme().to_owned()))?,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.username.clone(),
                    password: config.password.clone(),
                },
                host: addr.host_str().unwrap_or(DEFAULT_AMPQ_HOST).into(),
                port: addr.port().unwrap_or(DEFAULT_AMPQ_PORT),
            },
            vhost: config
                .vhost
                .clone()
                .unwrap_or(DEFAULT_AMPQ_VHOST.to_string()),
            query: AMQPQueryString {
                channel_max: config.pool,
                ..Default::default()
            },
        };

        let recovery_config =
            RecoveryConfig::default().auto_recover_connection();
        let conn_config = ConnectionProperties::default()
            .with_connection_name("authority_maily_client".into())
            .with_experimental_recovery_config(recovery_config);
        let conn = Connection::connect_uri(uri, conn_config).await?;

        tracing::info!(%addr, queue = %config.queue, "rabbitmq connected");

        Ok(Self {
            queue: config.queue.clone(),
            conn: Some(Arc::new(conn)),
        })
    }

    async fn create_channel(
        conn: Arc<Connection>,
        queue: &str,
    ) -> Result<Channel, MailError> {
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    fn create_event(data: Message) -> Cloudevent {
        Cloudevent {
            specversion: CLOUDEVENT_VERSION,
            r#type: "com.authority.email",
            source: "com.authority.session",
            id: random_token(ID_LENGTH),
            time: Utc::now().to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data,
        }
    }
}

#[async_trait]
impl Mailer for MailManager {
    async fn send(&self, message: Message) -> Result<(), MailError> {
        let Some(conn) = &self.conn else {
            tracing::debug!(template = ?message.template, "no mail queue, event dropped");
            return Ok(());
        };
        let channel = Self::create_channel(Arc::clone(conn), &self.queue).await?;

        let template = message.template;
        let payload = serde_json::to_vec(&Self::create_event(message))?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_encoding(CONTENT_ENCODING.into())
                    .with_content_type(CONTENT_TYPE.into()),
            )
            .await?;

        tracing::trace!(?template, "event sent");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloudevent_shape() {
        let event = MailManager::create_event(Message {
            template: Template::ConfirmAccount,
            to: "a@x.com".into(),
            name: "Ada".into(),
            action: "token".into(),
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["specversion"], "1.0");
        assert_eq!(json["datacontenttype"], "application/json");
        assert_eq!(json["data"]["template"], "confirm_account");
        assert_eq!(json["data"]["to"], "a@x.com");
        assert_eq!(json["id"].as_str().unwrap().len(), ID_LENGTH);
    }

    #[tokio::test]
    async fn test_without_queue() {
        let mail = MailManager::default();
        let message = Message {
            template: Template::ConfirmAccount,
            to: "a@x.com".into(),
            name: "Ada".into(),
            action: "token".into(),
        };

        assert!(mail.send(message).await.is_ok());
    }
}
