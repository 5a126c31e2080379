use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use ulid::Ulid;

use crate::model::{Booking, RoomState, UserState, to_datetime};
use crate::observability;

/// What the guest is told about a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingNotice {
    pub booking_id: Ulid,
    pub recipient: String,
    pub guest_name: String,
    pub room_name: String,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub total_price: Decimal,
}

impl BookingNotice {
    pub fn new(booking: &Booking, room: &RoomState, user: &UserState) -> Self {
        Self {
            booking_id: booking.id,
            recipient: user.email.clone(),
            guest_name: user.name.clone(),
            room_name: room.name.clone(),
            check_in: to_datetime(booking.span.start),
            check_out: to_datetime(booking.span.end),
            total_price: booking.total_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "notice", rename_all = "snake_case")]
pub enum Notification {
    Confirmation(BookingNotice),
    Cancellation(BookingNotice),
}

impl Notification {
    pub fn label(&self) -> &'static str {
        match self {
            Notification::Confirmation(_) => "confirmation",
            Notification::Cancellation(_) => "cancellation",
        }
    }

    pub fn booking_id(&self) -> Ulid {
        match self {
            Notification::Confirmation(n) | Notification::Cancellation(n) => n.booking_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Sends booking mail (or whatever the deployment wires in).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(&self, notice: &BookingNotice) -> Result<(), NotifyError>;
    async fn send_cancellation(&self, notice: &BookingNotice) -> Result<(), NotifyError>;
}

/// Default notifier: writes the notice to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_confirmation(&self, notice: &BookingNotice) -> Result<(), NotifyError> {
        tracing::info!(
            booking_id = %notice.booking_id,
            to = %notice.recipient,
            room = %notice.room_name,
            total = %notice.total_price,
            "booking confirmation"
        );
        Ok(())
    }

    async fn send_cancellation(&self, notice: &BookingNotice) -> Result<(), NotifyError> {
        tracing::info!(
            booking_id = %notice.booking_id,
            to = %notice.recipient,
            room = %notice.room_name,
            "booking cancellation"
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a mail relay.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, url: url.into() })
    }

    async fn post(&self, notification: Notification) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(&notification).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "relay answered {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_confirmation(&self, notice: &BookingNotice) -> Result<(), NotifyError> {
        self.post(Notification::Confirmation(notice.clone())).await
    }

    async fn send_cancellation(&self, notice: &BookingNotice) -> Result<(), NotifyError> {
        self.post(Notification::Cancellation(notice.clone())).await
    }
}

/// Producer side of the notification queue. Enqueueing never fails the caller.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Notification>,
}

pub type OutboxReceiver = mpsc::UnboundedReceiver<Notification>;

impl Outbox {
    pub fn new() -> (Self, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, notification: Notification) {
        let booking_id = notification.booking_id();
        if self.tx.send(notification).is_err() {
            tracing::warn!(%booking_id, "notification dispatcher is gone, dropping notice");
            metrics::counter!(observability::NOTIFICATIONS_DROPPED_TOTAL).increment(1);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Deliver one notification, doubling the backoff after each failure.
pub async fn deliver(notifier: &dyn Notifier, notification: &Notification, policy: RetryPolicy) -> bool {
    let mut backoff = policy.initial_backoff;
    for attempt in 1..=policy.max_attempts.max(1) {
        let result = match notification {
            Notification::Confirmation(n) => notifier.send_confirmation(n).await,
            Notification::Cancellation(n) => notifier.send_cancellation(n).await,
        };
        match result {
            Ok(()) => {
                metrics::counter!(observability::NOTIFICATIONS_SENT_TOTAL, "kind" => notification.label())
                    .increment(1);
                return true;
            }
            Err(e) => {
                tracing::warn!(
                    booking_id = %notification.booking_id(),
                    kind = notification.label(),
                    attempt,
                    error = %e,
                    "notification attempt failed"
                );
                if attempt < policy.max_attempts {
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }
    tracing::error!(
        booking_id = %notification.booking_id(),
        kind = notification.label(),
        "giving up on notification"
    );
    metrics::counter!(observability::NOTIFICATIONS_FAILED_TOTAL, "kind" => notification.label())
        .increment(1);
    false
}

/// Background task draining the outbox. Each notice is delivered on its own
/// task so one slow recipient doesn't hold up the queue.
pub async fn run_dispatcher(mut rx: OutboxReceiver, notifier: Arc<dyn Notifier>, policy: RetryPolicy) {
    while let Some(notification) = rx.recv().await {
        let notifier = notifier.clone();
        tokio::spawn(async move {
            deliver(notifier.as_ref(), &notification, policy).await;
        });
    }
    tracing::debug!("outbox closed, dispatcher stopping");
}
