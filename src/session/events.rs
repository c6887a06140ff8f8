//! Work triggered by a completed registration, done off the request path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::mail::{Mailer, Message, Template};
use crate::session::{ConfirmationStore, RefreshTokenStore};

/// Emitted once a new account is persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistrationEvent {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

/// Sending half of the registration queue. Never blocks.
#[derive(Clone, Debug)]
pub struct RegistrationPublisher {
    tx: mpsc::UnboundedSender<RegistrationEvent>,
}

impl RegistrationPublisher {
    /// Queue an event. A stopped worker only loses the email.
    pub fn publish(&self, event: RegistrationEvent) {
        if let Err(err) = self.tx.send(event) {
            tracing::error!(user_id = %err.0.user_id, "registration worker is gone");
        }
    }
}

/// Consume registration events: create the confirmation token, then mail it.
pub struct ConfirmationWorker {
    confirmations: ConfirmationStore,
    mailer: Arc<dyn Mailer>,
    confirmation_url: Option<String>,
}

impl ConfirmationWorker {
    /// Create a new [`ConfirmationWorker`].
    ///
    /// With a `confirmation_url`, the email carries `{url}?token={token}`.
    pub fn new(
        confirmations: ConfirmationStore,
        mailer: Arc<dyn Mailer>,
        confirmation_url: Option<String>,
    ) -> Self {
        Self {
            confirmations,
            mailer,
            confirmation_url,
        }
    }

    /// Run the worker on its own task.
    ///
    /// The task ends when every publisher is dropped.
    pub fn spawn(self) -> (RegistrationPublisher, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<RegistrationEvent>();

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.handle(event).await;
            }
            tracing::debug!("registration worker stopped");
        });

        (RegistrationPublisher { tx }, handle)
    }

    async fn handle(&self, event: RegistrationEvent) {
        let record = match self.confirmations.create(&event.user_id).await {
            Ok(record) => record,
            Err(err) => {
                metrics::counter!("confirmation_emails_total", "outcome" => "token_error")
                    .increment(1);
                tracing::error!(user_id = %event.user_id, %err, "cannot create confirmation token");
                return;
            },
        };

        let message = Message {
            template: Template::ConfirmAccount,
            to: event.email,
            name: event.name,
            action: self.action(&record.token),
        };

        match self.mailer.send(message).await {
            Ok(()) => {
                metrics::counter!("confirmation_emails_total", "outcome" => "sent")
                    .increment(1);
                tracing::info!(user_id = %event.user_id, "confirmation email queued");
            },
            Err(err) => {
                metrics::counter!("confirmation_emails_total", "outcome" => "mail_error")
                    .increment(1);
                tracing::error!(user_id = %event.user_id, %err, "cannot send confirmation email");
            },
        }
    }

    fn action(&self, token: &str) -> String {
        match &self.confirmation_url {
            Some(url) => format!("{url}?token={token}"),
            None => token.to_owned(),
        }
    }
}

/// Periodically delete confirmation tokens that expired unused and refresh
/// tokens past their lifetime.
pub fn spawn_purge(
    confirmations: ConfirmationStore,
    refresh_tokens: RefreshTokenStore,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match confirmations.purge_expired().await {
                Ok(0) => {},
                Ok(count) => tracing::info!(count, "expired confirmation tokens purged"),
                Err(err) => tracing::error!(%err, "confirmation purge failed"),
            }
            match refresh_tokens.purge_expired().await {
                Ok(0) => {},
                Ok(count) => tracing::info!(count, "expired refresh tokens purged"),
                Err(err) => tracing::error!(%err, "refresh token purge failed"),
            }
        }
    })
}

/// Mailer forwarding every message to a channel.
#[cfg(test)]
pub(crate) struct ChannelMailer(pub mpsc::UnboundedSender<Message>);

#[cfg(test)]
#[async_trait::async_trait]
impl Mailer for ChannelMailer {
    async fn send(&self, message: Message) -> Result<(), crate::mail::MailError> {
        let _ = self.0.send(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::repository::MemoryStore;

    fn worker(
        url: Option<&str>,
    ) -> (
        Arc<MemoryStore>,
        ConfirmationWorker,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let repo = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = ConfirmationWorker::new(
            ConfirmationStore::new(repo.clone(), clock, 3600),
            Arc::new(ChannelMailer(tx)),
            url.map(str::to_owned),
        );
        (repo, worker, rx)
    }

    fn event(user_id: &str) -> RegistrationEvent {
        RegistrationEvent {
            user_id: user_id.into(),
            email: format!("{user_id}@x.com"),
            name: "Ada Lovelace".into(),
        }
    }

    #[tokio::test]
    async fn test_one_token_per_event() {
        let (repo, worker, mut rx) = worker(None);
        let (publisher, handle) = worker.spawn();

        publisher.publish(event("a"));
        publisher.publish(event("b"));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.to, "a@x.com");
        assert_eq!(second.to, "b@x.com");
        assert_eq!(first.template, Template::ConfirmAccount);

        let tokens = repo.confirmations_of("a").await;
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].token, first.action);

        drop(publisher);
        handle.await.unwrap();
        assert_eq!(repo.confirmations_of("b").await.len(), 1);
    }

    #[tokio::test]
    async fn test_action_with_url() {
        let (repo, worker, mut rx) = worker(Some("https://app.example.com/confirm"));
        let (publisher, _handle) = worker.spawn();

        publisher.publish(event("a"));
        let message = rx.recv().await.unwrap();
        let token = repo.confirmations_of("a").await[0].token.clone();

        assert_eq!(
            message.action,
            format!("https://app.example.com/confirm?token={token}")
        );
    }

    #[tokio::test]
    async fn test_purge_task() {
        let repo = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let confirmations = ConfirmationStore::new(repo.clone(), clock.clone(), 3600);
        let refresh_tokens = RefreshTokenStore::new(repo.clone(), clock.clone(), 25, 15);

        confirmations.create("a").await.unwrap();
        refresh_tokens.issue("a").await.unwrap();
        clock.advance(chrono::Duration::days(16));

        let handle = spawn_purge(confirmations, refresh_tokens, Duration::from_millis(5));
        for _ in 0..200 {
            if repo.confirmations_of("a").await.is_empty()
                && repo.refresh_tokens_of("a").await.is_empty()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.abort();

        assert!(repo.confirmations_of("a").await.is_empty());
        assert!(repo.refresh_tokens_of("a").await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_without_worker() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        RegistrationPublisher { tx }.publish(event("a"));
    }
}
