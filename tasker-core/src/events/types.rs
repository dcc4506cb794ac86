//! Event type definitions for the worker session.
//!
//! Domain events are immutable values decoded from inbound frames. They
//! live only for the duration of one routing pass; anything that needs to
//! outlive routing (the active offer) is copied into the lifecycle
//! controller.

use std::time::Duration;

use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tasker_sdk::objects::{
    ChatMessagePayload, JobKind, JobOfferPayload, OrderStatusPayload, PlaceDescriptor,
    RequesterDescriptor,
};
use thiserror::Error;
use time::OffsetDateTime;

/// Identifier of a job offer as assigned by the dispatch server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(pub CompactString);

impl OfferId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for OfferId {
    fn from(value: &str) -> Self {
        Self(CompactString::from(value))
    }
}

impl From<CompactString> for OfferId {
    fn from(value: CompactString) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The response deadline of an offer cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("deadline of offer {offer_id} is out of range")]
pub struct DeadlineOutOfRange {
    pub offer_id: CompactString,
}

/// One dispatch proposal made to this worker.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOffer {
    pub id: OfferId,
    pub kind: JobKind,
    pub pickup: PlaceDescriptor,
    pub dropoff: Option<PlaceDescriptor>,
    pub reward: Decimal,
    pub currency: Option<CompactString>,
    pub distance_km: Option<f64>,
    pub duration_minutes: Option<u32>,
    pub requester: RequesterDescriptor,
    pub urgent: bool,
    pub created_at: OffsetDateTime,
    /// Point after which the offer can no longer be accepted.
    pub expires_at: OffsetDateTime,
}

impl JobOffer {
    /// Build an offer from its wire payload.
    ///
    /// When the server did not send an explicit deadline, the offer expires
    /// `window` after its creation time.
    pub fn from_payload(
        payload: JobOfferPayload,
        window: Duration,
    ) -> Result<Self, DeadlineOutOfRange> {
        let expires_at = match payload.expires_at {
            Some(expires_at) => expires_at,
            None => time::Duration::try_from(window)
                .ok()
                .and_then(|window| payload.created_at.checked_add(window))
                .ok_or_else(|| DeadlineOutOfRange {
                    offer_id: payload.id.clone(),
                })?,
        };
        Ok(Self {
            id: OfferId(payload.id),
            kind: payload.job_type,
            pickup: payload.pickup,
            dropoff: payload.dropoff,
            reward: payload.reward,
            currency: payload.currency,
            distance_km: payload.distance_km,
            duration_minutes: payload.duration_minutes,
            requester: payload.requester,
            urgent: payload.urgent,
            created_at: payload.created_at,
            expires_at,
        })
    }

    /// Time left to respond, measured against `now` and clamped at zero.
    pub fn remaining(&self, now: OffsetDateTime) -> Duration {
        let left = self.expires_at - now;
        if left.is_negative() {
            Duration::ZERO
        } else {
            left.unsigned_abs()
        }
    }
}

/// Closed set of events the dispatch server can push.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    JobOfferCreated(JobOffer),
    JobOfferExpired { offer_id: OfferId },
    JobOfferTakenByOther { offer_id: OfferId },
    ChatMessageReceived(ChatMessagePayload),
    OrderStatusChanged(OrderStatusPayload),
}

impl DomainEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::JobOfferCreated(_) => "JobOfferCreated",
            DomainEvent::JobOfferExpired { .. } => "JobOfferExpired",
            DomainEvent::JobOfferTakenByOther { .. } => "JobOfferTakenByOther",
            DomainEvent::ChatMessageReceived(_) => "ChatMessageReceived",
            DomainEvent::OrderStatusChanged(_) => "OrderStatusChanged",
        }
    }
}

/// Worker decision on the active offer.
///
/// `Accept` and `Decline` come from the UI; `Expire` is produced by the
/// offer countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionInput {
    Accept(OfferId),
    Decline(OfferId),
    Expire(OfferId),
}

impl DecisionInput {
    pub fn offer_id(&self) -> &OfferId {
        match self {
            DecisionInput::Accept(id) | DecisionInput::Decline(id) | DecisionInput::Expire(id) => id,
        }
    }
}

/// State of the offer lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfferState {
    Idle,
    Offered,
    Accepted,
    Declined,
    Expired,
    Superseded,
}

impl OfferState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OfferState::Accepted | OfferState::Declined | OfferState::Expired | OfferState::Superseded
        )
    }
}

impl std::fmt::Display for OfferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OfferState::Idle => "idle",
            OfferState::Offered => "offered",
            OfferState::Accepted => "accepted",
            OfferState::Declined => "declined",
            OfferState::Expired => "expired",
            OfferState::Superseded => "superseded",
        };
        f.write_str(name)
    }
}

/// Transition emitted by the lifecycle controller.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferEvent {
    /// A new offer became active and its countdown started.
    Presented { offer: JobOffer, remaining: Duration },
    Accepted(OfferId),
    Declined(OfferId),
    Expired(OfferId),
    Superseded(OfferId),
}

impl OfferEvent {
    pub fn offer_id(&self) -> &OfferId {
        match self {
            OfferEvent::Presented { offer, .. } => &offer.id,
            OfferEvent::Accepted(id)
            | OfferEvent::Declined(id)
            | OfferEvent::Expired(id)
            | OfferEvent::Superseded(id) => id,
        }
    }

    /// The controller state this event leaves behind.
    pub fn state(&self) -> OfferState {
        match self {
            OfferEvent::Presented { .. } => OfferState::Offered,
            OfferEvent::Accepted(_) => OfferState::Accepted,
            OfferEvent::Declined(_) => OfferState::Declined,
            OfferEvent::Expired(_) => OfferState::Expired,
            OfferEvent::Superseded(_) => OfferState::Superseded,
        }
    }
}

/// Connection lifecycle as surfaced to the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    Connected,
    /// The link dropped (or failed to open); a reconnect is scheduled.
    ConnectionLost { attempt: u32, retry_in: Duration },
    /// Reconnect attempts are used up. No further automatic attempts are made.
    Exhausted { attempts: u32 },
}

/// Inbound traffic of one transport, in the order the driver produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Frame(String),
    Signal(TransportSignal),
}

/// What local subscribers observe, in routing order.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedEvent {
    Domain(DomainEvent),
    Offer(OfferEvent),
    Transport(TransportSignal),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(created_at: OffsetDateTime, expires_at: Option<OffsetDateTime>) -> JobOfferPayload {
        JobOfferPayload {
            id: "of_1".into(),
            job_type: JobKind::Errand,
            pickup: PlaceDescriptor {
                address: "1 Main St".into(),
                label: None,
            },
            dropoff: None,
            reward: Decimal::new(800, 2),
            currency: None,
            distance_km: None,
            duration_minutes: None,
            requester: RequesterDescriptor {
                id: "u_1".into(),
                name: "Sam".into(),
            },
            urgent: false,
            created_at,
            expires_at,
        }
    }

    #[test]
    fn test_offer_window_applies_without_explicit_deadline() {
        let created = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let offer = JobOffer::from_payload(payload(created, None), Duration::from_secs(30)).unwrap();
        assert_eq!(offer.expires_at, created + Duration::from_secs(30));

        let explicit = created + Duration::from_secs(45);
        let offer = JobOffer::from_payload(payload(created, Some(explicit)), Duration::from_secs(30))
                .unwrap();
        assert_eq!(offer.expires_at, explicit);
    }

    #[test]
    fn test_window_past_max_date_is_rejected() {
        let created = time::Date::from_calendar_date(9999, time::Month::December, 31)
            .unwrap()
            .with_hms(23, 59, 59)
            .unwrap()
            .assume_utc();
        let err = JobOffer::from_payload(payload(created, None), Duration::from_secs(30))
            .unwrap_err();
        assert_eq!(err.offer_id, "of_1");

        // An explicit deadline needs no arithmetic.
        let offer = JobOffer::from_payload(payload(created, Some(created)), Duration::from_secs(30))
            .unwrap();
        assert_eq!(offer.expires_at, created);
    }

    #[test]
    fn test_remaining_is_clamped() {
        let created = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let offer = JobOffer::from_payload(payload(created, None), Duration::from_secs(30)).unwrap();
        assert_eq!(offer.remaining(created + Duration::from_secs(10)), Duration::from_secs(20));
        assert_eq!(offer.remaining(created + Duration::from_secs(90)), Duration::ZERO);
    }
}
