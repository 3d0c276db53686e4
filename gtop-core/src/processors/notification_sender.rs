//! NotificationSender processor.
//!
//! Drains the notification outbox:
//! - wakes on `OrderEvent::NotificationQueued` and on a fixed sweep interval
//! - sends each due row through a [`Notifier`] (Telegram in production)
//! - marks rows delivered, or reschedules them with exponential backoff
//!   (2^attempts seconds, capped at 2^11) until the attempt budget is spent
//!
//! Delivery failures are logged and never reach the order flow.

use crate::config::NotificationConfig;
use crate::events::{OrderEvent, OrderEventReceiver};
use crate::repository::Repository;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

/// Backoff exponent cap (2^11 = 2048 seconds).
const MAX_RETRY_EXPONENT: u32 = 11;

/// Attempts before a row is abandoned.
pub const MAX_ATTEMPTS: i32 = 12;

const SWEEP_INTERVAL: Duration = Duration::from_secs(15);
const BATCH_SIZE: i64 = 50;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("notification rejected with status {status}: {description}")]
    Rejected { status: u16, description: String },

    #[error("invalid notification endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A chat channel operator alerts are posted to.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Posts alerts through the Telegram Bot API `sendMessage` method.
///
/// Reads its settings on every send so a SIGHUP reload takes effect
/// immediately. Without Telegram settings the alert is only logged.
pub struct TelegramNotifier {
    config: Arc<RwLock<NotificationConfig>>,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(
        config: Arc<RwLock<NotificationConfig>>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            config,
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let Some(telegram) = self.config.read().await.telegram.clone() else {
            info!(alert = %text, "No chat channel configured, alert logged only");
            return Ok(());
        };

        let url = telegram
            .api_base
            .join(&format!("bot{}/sendMessage", telegram.bot_token))?;
        let response = self
            .http_client
            .post(url)
            .json(&SendMessage {
                chat_id: &telegram.chat_id,
                text,
                disable_web_page_preview: true,
            })
            .send()
            .await?;

        let status = response.status();
        let reply: Option<TelegramReply> = response.json().await.ok();
        match reply {
            Some(TelegramReply { ok: true, .. }) if status.is_success() => Ok(()),
            reply => Err(NotifyError::Rejected {
                status: status.as_u16(),
                description: reply
                    .and_then(|r| r.description)
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub delivered: u32,
    pub rescheduled: u32,
}

pub struct NotificationSender {
    repo: Arc<dyn Repository>,
    notifier: Arc<dyn Notifier>,
    events_rx: OrderEventReceiver,
    shutdown_rx: watch::Receiver<bool>,
}

impl NotificationSender {
    pub fn new(
        repo: Arc<dyn Repository>,
        notifier: Arc<dyn Notifier>,
        events_rx: OrderEventReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            repo,
            notifier,
            events_rx,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        info!("NotificationSender started");
        // rows left over from before a restart
        self.drain_logged().await;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("NotificationSender received shutdown signal");
                        break;
                    }
                }

                event = self.events_rx.recv() => match event {
                    Some(OrderEvent::NotificationQueued { order_id, status }) => {
                        debug!(order_id = %order_id, status = %status, "Notification queued");
                        self.drain_logged().await;
                    }
                    None => {
                        info!("Order event channel closed");
                        break;
                    }
                },

                _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                    self.drain_logged().await;
                }
            }
        }

        info!("NotificationSender shutdown complete");
    }

    async fn drain_logged(&self) {
        if let Err(e) = self.drain().await {
            error!(error = %e, "Failed to drain notification outbox");
        }
    }

    /// Send every due row once.
    pub async fn drain(&self) -> Result<DrainStats, sqlx::Error> {
        let due = self.repo.due_notifications(BATCH_SIZE, MAX_ATTEMPTS).await?;
        let mut stats = DrainStats::default();

        for entry in due {
            match self.notifier.notify(&entry.message).await {
                Ok(()) => {
                    self.repo.mark_notification_delivered(entry.id).await?;
                    stats.delivered += 1;
                    debug!(outbox_id = entry.id, order_id = %entry.order_id, "Notification delivered");
                }
                Err(e) => {
                    let delay = calculate_retry_delay(entry.attempts.max(0) as u32);
                    self.repo
                        .reschedule_notification(entry.id, delay.as_secs() as i64, e.to_string())
                        .await?;
                    stats.rescheduled += 1;
                    if entry.attempts + 1 >= MAX_ATTEMPTS {
                        error!(
                            outbox_id = entry.id,
                            order_id = %entry.order_id,
                            error = %e,
                            "Notification abandoned after final attempt"
                        );
                    } else {
                        warn!(
                            outbox_id = entry.id,
                            order_id = %entry.order_id,
                            error = %e,
                            attempts = entry.attempts + 1,
                            retry_in_secs = delay.as_secs(),
                            "Notification delivery failed"
                        );
                    }
                }
            }
        }

        Ok(stats)
    }
}

/// Calculate the next retry delay based on retry count.
///
/// Uses exponential backoff: 2^retry_count seconds.
pub fn calculate_retry_delay(retry_count: u32) -> Duration {
    let seconds = 2u64.pow(retry_count.min(MAX_RETRY_EXPONENT));
    Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::OrderStatus;
    use crate::events::order_event_channel;
    use crate::repository::OrderRepository;
    use crate::entities::orders::OrderTransition;
    use crate::testing::{InMemoryRepository, RecordingNotifier, sample_order};
    use rust_decimal::Decimal;

    #[test]
    fn test_retry_delay_calculation() {
        assert_eq!(calculate_retry_delay(0), Duration::from_secs(1));
        assert_eq!(calculate_retry_delay(1), Duration::from_secs(2));
        assert_eq!(calculate_retry_delay(2), Duration::from_secs(4));
        assert_eq!(calculate_retry_delay(10), Duration::from_secs(1024));
        assert_eq!(calculate_retry_delay(11), Duration::from_secs(2048));
        assert_eq!(calculate_retry_delay(12), Duration::from_secs(2048));
        assert_eq!(calculate_retry_delay(100), Duration::from_secs(2048));
    }

    async fn complete_order(repo: &InMemoryRepository) {
        let order = repo.insert_order(sample_order(OrderStatus::Processing, Decimal::TEN));
        repo.transition_order(OrderTransition {
            order_id: order.id,
            from: OrderStatus::Processing,
            to: OrderStatus::Completed,
            status_message: "done".to_string(),
            delivery_items: None,
        })
        .await
        .unwrap()
        .unwrap();
    }

    fn sender(repo: Arc<InMemoryRepository>, notifier: Arc<RecordingNotifier>) -> NotificationSender {
        let (_tx, rx) = order_event_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        NotificationSender::new(repo, notifier, rx, shutdown_rx)
    }

    #[tokio::test]
    async fn test_drain_delivers_due_rows() {
        let repo = Arc::new(InMemoryRepository::new());
        let notifier = Arc::new(RecordingNotifier::new());
        complete_order(&repo).await;

        let stats = sender(repo.clone(), notifier.clone()).drain().await.unwrap();
        assert_eq!(stats, DrainStats { delivered: 1, rescheduled: 0 });
        assert_eq!(notifier.sent().len(), 1);
        assert!(notifier.sent()[0].contains("completed"));
        assert!(repo.outbox()[0].delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_send_is_rescheduled_not_propagated() {
        let repo = Arc::new(InMemoryRepository::new());
        let notifier = Arc::new(RecordingNotifier::failing());
        complete_order(&repo).await;

        let sender = sender(repo.clone(), notifier);
        let stats = sender.drain().await.unwrap();
        assert_eq!(stats, DrainStats { delivered: 0, rescheduled: 1 });

        let row = &repo.outbox()[0];
        assert_eq!(row.attempts, 1);
        assert!(row.delivered_at.is_none());
        assert!(row.last_error.is_some());

        // not due again until the backoff passes
        assert_eq!(sender.drain().await.unwrap(), DrainStats::default());
    }
}
