/// Notification outbox dispatcher
///
/// Polls the `notifications` collection for pending records, renders
/// and sends each one, then marks it sent under a version
/// precondition so two workers draining the same outbox never
/// double-mark a record. Delivery is at-least-once: a crash between
/// send and mark re-sends that record on the next cycle.
///
/// # Polling Strategy
///
/// - Poll interval: 5 seconds (configurable)
/// - Batch size: 20 records (configurable)
/// - Ordering: FIFO (oldest pending first)
/// - A record failing more than `max_attempts` times is parked as
///   `failed` and never retried automatically

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use synchro_core::entities::{Notification, NotificationStatus};
use synchro_core::error::StoreError;
use synchro_core::store::{collections, DocumentStore, Filter, Query};

use crate::render::render;
use crate::sender::NotificationSender;

/// Dispatcher tuning knobs.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Delay between outbox polls.
    pub poll_interval: Duration,

    /// Maximum records handled per cycle.
    pub batch_size: usize,

    /// Attempts before a record is parked as failed.
    pub max_attempts: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            poll_interval: Duration::from_secs(5),
            batch_size: 20,
            max_attempts: 5,
        }
    }
}

/// What one dispatch cycle accomplished.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Records delivered and marked sent.
    pub sent: usize,

    /// Records that failed and will be retried.
    pub retried: usize,

    /// Records parked as failed after exhausting attempts.
    pub gave_up: usize,
}

/// The outbox polling and delivery loop.
pub struct Dispatcher {
    store: Arc<dyn DocumentStore>,
    sender: Arc<dyn NotificationSender>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        sender: Arc<dyn NotificationSender>,
        config: DispatcherConfig,
    ) -> Self {
        Dispatcher {
            store,
            sender,
            config,
        }
    }

    /// Runs the polling loop until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            sender = self.sender.name(),
            interval_secs = self.config.poll_interval.as_secs(),
            "dispatcher started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("dispatcher shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_cycle().await {
                        tracing::error!(error = %e, "dispatch cycle failed");
                    }
                }
            }
        }
    }

    /// Drains one batch of pending notifications.
    pub async fn run_cycle(&self) -> Result<DispatchOutcome, StoreError> {
        let query = Query::new().filter(Filter::eq(
            "status",
            NotificationStatus::Pending.as_str(),
        ));
        let records = self.store.query(collections::NOTIFICATIONS, query).await?;

        let mut pending = Vec::new();
        for record in &records {
            match Notification::from_record(record) {
                Ok(notification) => pending.push(notification),
                Err(e) => {
                    tracing::warn!(id = %record.id, error = %e, "skipping malformed notification");
                }
            }
        }
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pending.truncate(self.config.batch_size);

        let mut outcome = DispatchOutcome::default();
        for notification in pending {
            match self.deliver(&notification).await {
                Delivery::Sent => outcome.sent += 1,
                Delivery::Retried => outcome.retried += 1,
                Delivery::GaveUp => outcome.gave_up += 1,
                Delivery::Skipped => {}
            }
        }

        if outcome != DispatchOutcome::default() {
            tracing::info!(
                sent = outcome.sent,
                retried = outcome.retried,
                gave_up = outcome.gave_up,
                "dispatch cycle complete"
            );
        }
        Ok(outcome)
    }

    async fn deliver(&self, notification: &Notification) -> Delivery {
        let email = render(&notification.payload);

        match self.sender.send(&email).await {
            Ok(()) => {
                let patch = json!({ "status": NotificationStatus::Sent });
                match self
                    .store
                    .update(
                        collections::NOTIFICATIONS,
                        &notification.id,
                        patch,
                        Some(notification.version),
                    )
                    .await
                {
                    Ok(_) => {
                        tracing::debug!(
                            id = %notification.id,
                            to = %email.recipient_email,
                            "notification sent"
                        );
                        Delivery::Sent
                    }
                    // Another worker claimed it between our read and
                    // this mark; their outcome stands.
                    Err(StoreError::VersionConflict { .. }) => Delivery::Skipped,
                    Err(e) => {
                        tracing::warn!(id = %notification.id, error = %e, "failed to mark notification sent");
                        Delivery::Skipped
                    }
                }
            }
            Err(send_err) => {
                let attempts = notification.attempts + 1;
                let exhausted = attempts >= self.config.max_attempts;
                let status = if exhausted {
                    NotificationStatus::Failed
                } else {
                    NotificationStatus::Pending
                };
                tracing::warn!(
                    id = %notification.id,
                    attempts,
                    exhausted,
                    error = %send_err,
                    "notification delivery failed"
                );

                let patch = json!({
                    "status": status,
                    "attempts": attempts,
                    "lastError": send_err.to_string(),
                });
                if let Err(e) = self
                    .store
                    .update(
                        collections::NOTIFICATIONS,
                        &notification.id,
                        patch,
                        Some(notification.version),
                    )
                    .await
                {
                    tracing::warn!(id = %notification.id, error = %e, "failed to record delivery failure");
                    return Delivery::Skipped;
                }
                if exhausted {
                    Delivery::GaveUp
                } else {
                    Delivery::Retried
                }
            }
        }
    }
}

enum Delivery {
    Sent,
    Retried,
    GaveUp,
    Skipped,
}
