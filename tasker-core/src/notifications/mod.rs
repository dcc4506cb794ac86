//! Notification formatting and delivery.
//!
//! - [`formatter`]: pure mapping from a `DomainEvent` to a `NotificationRequest`
//! - [`gateway`]: hands requests to the platform (or a logging shim)
//! - [`taps`]: surfaces the routing payload of a tapped notification

pub mod formatter;
pub mod gateway;
pub mod taps;

pub use formatter::format;
pub use gateway::{DeliveryUnavailable, HttpPushGateway, LogGateway, NotificationGateway};
pub use taps::{Navigator, TapRegistry};

use tasker_sdk::objects::{NotificationChannel, NotificationPayload, RoutingData, Urgency};
use time::OffsetDateTime;
use uuid::Uuid;

/// A notification ready to be presented.
///
/// Created by the formatter for one domain event and consumed once by the
/// gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub channel: NotificationChannel,
    pub data: RoutingData,
    pub urgency: Urgency,
    pub sound: bool,
    pub vibrate: bool,
}

impl NotificationRequest {
    /// The `{title, body, data}` shape the platform layer understands.
    pub fn to_payload(&self) -> NotificationPayload {
        NotificationPayload {
            title: self.title.clone(),
            body: self.body.clone(),
            data: self.data.clone(),
        }
    }
}

/// How a notification ended up being delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Shown by a native presentation mechanism.
    Presented,
    /// No native mechanism was usable; the notification was logged instead.
    Logged { reason: DeliveryUnavailable },
}

/// Proof of a `deliver` call. Always returned, whatever the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub notification_id: Uuid,
    pub channel: NotificationChannel,
    pub outcome: DeliveryOutcome,
    pub delivered_at: OffsetDateTime,
}

impl DeliveryReceipt {
    pub fn new(channel: NotificationChannel, outcome: DeliveryOutcome) -> Self {
        Self {
            notification_id: Uuid::now_v7(),
            channel,
            outcome,
            delivered_at: OffsetDateTime::now_utc(),
        }
    }
}
