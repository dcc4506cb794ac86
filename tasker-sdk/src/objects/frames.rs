//! Server-to-client frames on the dispatch stream.
//!
//! Every frame is a JSON object of the shape `{"type": "...", "payload": {...}}`.
//! Decoding is done in two steps: the envelope is read into a [`RawFrame`]
//! first so that unknown `type` values can be skipped without treating the
//! frame as malformed, then the payload is decoded for the matching
//! [`FrameKind`].
//!
//! ```json
//! {"type":"new_job_offer","payload":{"id":"of_81","jobType":"delivery", ...}}
//! {"type":"job_accepted_by_other","payload":{"offerId":"of_81"}}
//! ```

use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{JobKind, OrderStatus};

/// Undecoded frame envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    #[serde(rename = "type")]
    pub kind: CompactString,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Frame types understood by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    NewJobOffer,
    NewChatMessage,
    OrderStatusChanged,
    JobOfferExpired,
    JobAcceptedByOther,
}

impl FrameKind {
    /// Look up the frame kind for a wire `type` value.
    ///
    /// Returns `None` for types added server-side after this client was built.
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "new_job_offer" => Some(FrameKind::NewJobOffer),
            "new_chat_message" => Some(FrameKind::NewChatMessage),
            "order_status_changed" => Some(FrameKind::OrderStatusChanged),
            "job_offer_expired" => Some(FrameKind::JobOfferExpired),
            "job_accepted_by_other" => Some(FrameKind::JobAcceptedByOther),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            FrameKind::NewJobOffer => "new_job_offer",
            FrameKind::NewChatMessage => "new_chat_message",
            FrameKind::OrderStatusChanged => "order_status_changed",
            FrameKind::JobOfferExpired => "job_offer_expired",
            FrameKind::JobAcceptedByOther => "job_accepted_by_other",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// A pickup or dropoff location as displayed to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceDescriptor {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// The customer who requested the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterDescriptor {
    pub id: CompactString,
    pub name: String,
}

/// Payload of `new_job_offer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOfferPayload {
    pub id: CompactString,
    #[serde(alias = "kind")]
    pub job_type: JobKind,
    pub pickup: PlaceDescriptor,
    #[serde(default)]
    pub dropoff: Option<PlaceDescriptor>,
    pub reward: Decimal,
    #[serde(default)]
    pub currency: Option<CompactString>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    pub requester: RequesterDescriptor,
    #[serde(default)]
    pub urgent: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Absent when the server relies on the client's fixed offer window.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

/// Payload of `new_chat_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub message_id: CompactString,
    pub conversation_id: CompactString,
    pub sender_id: CompactString,
    pub sender_name: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    #[serde(default)]
    pub order_id: Option<CompactString>,
}

/// Payload of `order_status_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusPayload {
    pub order_id: CompactString,
    pub status: OrderStatus,
    #[serde(default)]
    pub order_label: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Payload of `job_offer_expired` and `job_accepted_by_other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRefPayload {
    #[serde(alias = "jobId")]
    pub offer_id: CompactString,
}
