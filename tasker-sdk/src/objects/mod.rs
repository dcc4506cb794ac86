//! Wire objects exchanged with the dispatch server and handed to the
//! platform notification layer.

pub mod commands;
pub mod frames;
pub mod notification;

pub use commands::OutboundCommand;
pub use frames::{
    ChatMessagePayload, FrameKind, JobOfferPayload, OfferRefPayload, OrderStatusPayload,
    PlaceDescriptor, RawFrame, RequesterDescriptor,
};
pub use notification::{NotificationPayload, RoutingData};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Kind of work a job offer proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Delivery,
    Errand,
    Marketplace,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Delivery => write!(f, "delivery"),
            JobKind::Errand => write!(f, "errand"),
            JobKind::Marketplace => write!(f, "marketplace"),
        }
    }
}

/// Order status as reported by `order_status_changed`.
///
/// The server may add statuses at any time, so unrecognized values are kept
/// verbatim in [`OrderStatus::Other`] instead of failing the frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "CompactString", into = "CompactString")]
pub enum OrderStatus {
    Pending,
    Accepted,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
    Other(CompactString),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Other(raw) => raw.as_str(),
        }
    }
}

impl From<CompactString> for OrderStatus {
    fn from(value: CompactString) -> Self {
        match value.as_str() {
            "pending" => OrderStatus::Pending,
            "accepted" => OrderStatus::Accepted,
            "picked_up" => OrderStatus::PickedUp,
            "in_transit" => OrderStatus::InTransit,
            "delivered" => OrderStatus::Delivered,
            "cancelled" => OrderStatus::Cancelled,
            _ => OrderStatus::Other(value),
        }
    }
}

impl From<OrderStatus> for CompactString {
    fn from(value: OrderStatus) -> Self {
        match value {
            OrderStatus::Other(raw) => raw,
            known => CompactString::from(known.as_str()),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side channels a worker subscribes to after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionChannel {
    JobOffers,
    ChatMessages,
    OrderUpdates,
}

impl SubscriptionChannel {
    /// Every channel a tasker client listens on.
    pub const ALL: [SubscriptionChannel; 3] = [
        SubscriptionChannel::JobOffers,
        SubscriptionChannel::ChatMessages,
        SubscriptionChannel::OrderUpdates,
    ];
}

/// Platform delivery channel a notification is presented on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationChannel {
    JobAlerts,
    Chat,
    OrderUpdates,
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationChannel::JobAlerts => write!(f, "job-alerts"),
            NotificationChannel::Chat => write!(f, "chat"),
            NotificationChannel::OrderUpdates => write!(f, "order-updates"),
        }
    }
}

/// Presentation priority of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Normal,
    High,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_keeps_unknown_values() {
        let status: OrderStatus = serde_json::from_str("\"awaiting_handoff\"").unwrap();
        assert_eq!(status, OrderStatus::Other("awaiting_handoff".into()));
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"awaiting_handoff\"");

        let status: OrderStatus = serde_json::from_str("\"picked_up\"").unwrap();
        assert_eq!(status, OrderStatus::PickedUp);
    }

    #[test]
    fn test_channel_names() {
        let json = serde_json::to_string(&SubscriptionChannel::ALL).unwrap();
        assert_eq!(json, r#"["job_offers","chat_messages","order_updates"]"#);
        assert_eq!(
            serde_json::to_string(&NotificationChannel::JobAlerts).unwrap(),
            "\"job-alerts\""
        );
    }
}
