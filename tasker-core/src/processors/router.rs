//! Event router.
//!
//! Decodes one inbound frame into a [`DomainEvent`] and dispatches it
//! synchronously:
//!
//! 1. job-offer events go to the [`OfferLifecycleController`] first
//! 2. local subscribers see the domain event, then the resulting offer
//!    transition, in registration order
//! 3. the notification formatter runs last and the request is queued for
//!    delivery
//!
//! Unknown frame types are logged and ignored. Malformed frames are logged
//! and dropped; neither closes the connection.

use std::time::Duration;

use compact_str::CompactString;
use tasker_sdk::objects::{
    ChatMessagePayload, FrameKind, JobOfferPayload, OfferRefPayload, OrderStatusPayload, RawFrame,
};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::offer_lifecycle::{Admission, OfferLifecycleController, StaleDecision};
use crate::config::{OfferConfig, SettingsWatcher};
use crate::events::{
    DeadlineOutOfRange, DecisionInput, DomainEvent, JobOffer, NotificationSender, OfferEvent, OfferId, RoutedEvent,
    TransportSignal,
};
use crate::notifications::{self, NotificationRequest};

/// A frame that could not be decoded.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("frame is not a {{type, payload}} envelope: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: FrameKind,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    OfferDeadline(#[from] DeadlineOutOfRange),
}

/// Outcome of routing one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Event(DomainEvent),
    /// Well-formed frame of a type this client does not know.
    Ignored { kind: CompactString },
}

/// Receives routed events synchronously on the session loop.
pub trait LocalSubscriber: Send {
    fn on_event(&mut self, event: &RoutedEvent);
}

impl<F> LocalSubscriber for F
where
    F: FnMut(&RoutedEvent) + Send,
{
    fn on_event(&mut self, event: &RoutedEvent) {
        self(event)
    }
}

/// Decode a raw frame.
///
/// `offer_window` is the response window applied to offers without an
/// explicit deadline.
pub fn decode(frame: &str, offer_window: Duration) -> Result<Routed, ParseError> {
    let raw: RawFrame = serde_json::from_str(frame).map_err(ParseError::InvalidEnvelope)?;
    let Some(kind) = FrameKind::from_wire(&raw.kind) else {
        return Ok(Routed::Ignored { kind: raw.kind });
    };

    let invalid = |source| ParseError::InvalidPayload { kind, source };
    let event = match kind {
        FrameKind::NewJobOffer => {
            let payload: JobOfferPayload = serde_json::from_value(raw.payload).map_err(invalid)?;
            DomainEvent::JobOfferCreated(JobOffer::from_payload(payload, offer_window)?)
        }
        FrameKind::NewChatMessage => {
            let payload: ChatMessagePayload =
                serde_json::from_value(raw.payload).map_err(invalid)?;
            DomainEvent::ChatMessageReceived(payload)
        }
        FrameKind::OrderStatusChanged => {
            let payload: OrderStatusPayload =
                serde_json::from_value(raw.payload).map_err(invalid)?;
            DomainEvent::OrderStatusChanged(payload)
        }
        FrameKind::JobOfferExpired => {
            let payload: OfferRefPayload = serde_json::from_value(raw.payload).map_err(invalid)?;
            DomainEvent::JobOfferExpired {
                offer_id: OfferId(payload.offer_id),
            }
        }
        FrameKind::JobAcceptedByOther => {
            let payload: OfferRefPayload = serde_json::from_value(raw.payload).map_err(invalid)?;
            DomainEvent::JobOfferTakenByOther {
                offer_id: OfferId(payload.offer_id),
            }
        }
    };
    Ok(Routed::Event(event))
}

pub struct EventRouter {
    controller: OfferLifecycleController,
    subscribers: Vec<Box<dyn LocalSubscriber>>,
    settings: SettingsWatcher,
    notifications: NotificationSender,
    offers: OfferConfig,
}

impl EventRouter {
    pub fn new(
        controller: OfferLifecycleController,
        settings: SettingsWatcher,
        notifications: NotificationSender,
        offers: OfferConfig,
    ) -> Self {
        Self {
            controller,
            subscribers: Vec::new(),
            settings,
            notifications,
            offers,
        }
    }

    /// Register a local subscriber. Subscribers run after the lifecycle
    /// controller, in registration order.
    pub fn subscribe(&mut self, subscriber: impl LocalSubscriber + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn controller(&self) -> &OfferLifecycleController {
        &self.controller
    }

    /// Decode and dispatch one inbound frame.
    pub fn route(&mut self, frame: &str) -> Result<Routed, ParseError> {
        let routed = match decode(frame, self.offers.window) {
            Ok(routed) => routed,
            Err(e) => {
                warn!(error = %e, frame_len = frame.len(), "Dropping malformed frame");
                return Err(e);
            }
        };

        match &routed {
            Routed::Event(event) => self.dispatch(event),
            Routed::Ignored { kind } => info!(%kind, "Ignoring unknown frame type"),
        }
        Ok(routed)
    }

    /// Apply a worker decision or countdown expiry to the active offer.
    pub fn apply_decision(&mut self, input: DecisionInput) -> Result<OfferEvent, StaleDecision> {
        let offer_id = input.offer_id().clone();
        match self.controller.decide(input) {
            Ok(event) => {
                self.publish(&RoutedEvent::Offer(event.clone()));
                Ok(event)
            }
            Err(e) => {
                debug!(%offer_id, error = %e, "Stale decision ignored");
                Err(e)
            }
        }
    }

    /// Surface a transport lifecycle change to local subscribers.
    pub fn transport_signal(&mut self, signal: TransportSignal) {
        self.publish(&RoutedEvent::Transport(signal));
    }

    fn dispatch(&mut self, event: &DomainEvent) {
        debug!(event = event.name(), "Routing event");

        let transition = match event {
            DomainEvent::JobOfferCreated(offer) => match self.controller.offer(offer.clone()) {
                Admission::Admitted(presented) => Some(presented),
                Admission::Busy { .. } | Admission::Duplicate => return,
            },
            DomainEvent::JobOfferExpired { offer_id } => {
                Self::settled(self.controller.server_expired(offer_id))
            }
            DomainEvent::JobOfferTakenByOther { offer_id } => {
                Self::settled(self.controller.supersede(offer_id))
            }
            DomainEvent::ChatMessageReceived(_) | DomainEvent::OrderStatusChanged(_) => None,
        };

        self.publish(&RoutedEvent::Domain(event.clone()));
        if let Some(transition) = transition {
            debug!(
                offer_id = %transition.offer_id(),
                state = %transition.state(),
                "Publishing offer transition"
            );
            self.publish(&RoutedEvent::Offer(transition));
        }

        let settings = self.settings.current();
        if let Some(request) = notifications::format(event, &settings) {
            self.enqueue(request);
        }
    }

    fn settled(result: Result<OfferEvent, StaleDecision>) -> Option<OfferEvent> {
        result
            .map_err(|e| debug!(error = %e, "Offer invalidation does not apply"))
            .ok()
    }

    fn publish(&mut self, event: &RoutedEvent) {
        for subscriber in &mut self.subscribers {
            subscriber.on_event(event);
        }
    }

    fn enqueue(&self, request: NotificationRequest) {
        match self.notifications.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                warn!(channel = %request.channel, "Notification queue full, dropping notification");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Notification dispatcher stopped, dropping notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemorySettingsStorage, SettingsStore};
    use crate::events::{
        DecisionReceiver, NotificationReceiver, OfferState, decision_channel, notification_channel,
    };
    use std::sync::{Arc, Mutex};
    use tasker_sdk::config::NotificationSettings;
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    struct Harness {
        router: EventRouter,
        seen: Arc<Mutex<Vec<RoutedEvent>>>,
        settings: SettingsStore,
        notifications: NotificationReceiver,
        _expiry_rx: DecisionReceiver,
    }

    fn harness() -> Harness {
        let (expiry_tx, expiry_rx) = decision_channel();
        let (notify_tx, notify_rx) = notification_channel();
        let settings = SettingsStore::load(MemorySettingsStorage::new(None)).unwrap();
        let mut router = EventRouter::new(
            OfferLifecycleController::new(expiry_tx),
            settings.subscribe(),
            notify_tx,
            OfferConfig::default(),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        router.subscribe(move |event: &RoutedEvent| sink.lock().unwrap().push(event.clone()));
        Harness {
            router,
            seen,
            settings,
            notifications: notify_rx,
            _expiry_rx: expiry_rx,
        }
    }

    fn offer_frame(id: &str) -> String {
        let created = OffsetDateTime::now_utc().format(&Rfc3339).unwrap();
        serde_json::json!({
            "type": "new_job_offer",
            "payload": {
                "id": id,
                "jobType": "delivery",
                "pickup": {"address": "12 Market St"},
                "dropoff": {"address": "9 Pine Ave"},
                "reward": "12.50",
                "requester": {"id": "u_7", "name": "Dana"},
                "createdAt": created,
            }
        })
        .to_string()
    }

    fn taken_frame(id: &str) -> String {
        serde_json::json!({"type": "job_accepted_by_other", "payload": {"offerId": id}}).to_string()
    }

    const CHAT_FRAME: &str = r#"{"type":"new_chat_message","payload":{"messageId":"m_1","conversationId":"c_1","senderId":"u_7","senderName":"Dana","text":"On my way","sentAt":"2026-03-01T12:00:00Z"}}"#;

    #[tokio::test(start_paused = true)]
    async fn test_controller_transition_precedes_subscribers() {
        let mut h = harness();
        h.router.route(&offer_frame("of_1")).unwrap();
        h.router.route(&taken_frame("of_1")).unwrap();

        assert_eq!(h.router.controller().state(), OfferState::Superseded);
        let seen = h.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(matches!(seen[0], RoutedEvent::Domain(DomainEvent::JobOfferCreated(_))));
        assert!(matches!(seen[1], RoutedEvent::Offer(OfferEvent::Presented { .. })));
        assert!(matches!(
            seen[2],
            RoutedEvent::Domain(DomainEvent::JobOfferTakenByOther { .. })
        ));
        assert_eq!(seen[3], RoutedEvent::Offer(OfferEvent::Superseded("of_1".into())));
        drop(seen);

        assert!(h.router.apply_decision(DecisionInput::Accept("of_1".into())).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offer_notifies_once() {
        let mut h = harness();
        h.router.route(&offer_frame("of_1")).unwrap();
        h.router.route(&offer_frame("of_1")).unwrap();
        h.router.route(&offer_frame("of_2")).unwrap();

        let request = h.notifications.try_recv().unwrap();
        assert_eq!(request.data.get("offerId"), Some("of_1"));
        assert!(h.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_type_is_ignored() {
        let mut h = harness();
        let routed = h
            .router
            .route(r#"{"type":"surge_pricing","payload":{"factor":1.5}}"#)
            .unwrap();
        assert_eq!(
            routed,
            Routed::Ignored {
                kind: "surge_pricing".into()
            }
        );
        assert!(h.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_rejected() {
        let mut h = harness();
        assert!(matches!(
            h.router.route("not json"),
            Err(ParseError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            h.router
                .route(r#"{"type":"new_chat_message","payload":{"text":42}}"#),
            Err(ParseError::InvalidPayload {
                kind: FrameKind::NewChatMessage,
                ..
            })
        ));
        assert!(h.seen.lock().unwrap().is_empty());
        assert!(h.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_offer_deadline_out_of_range_is_dropped() {
        let mut h = harness();
        let frame = serde_json::json!({
            "type": "new_job_offer",
            "payload": {
                "id": "of_9",
                "jobType": "delivery",
                "pickup": {"address": "12 Market St"},
                "reward": "12.50",
                "requester": {"id": "u_7", "name": "Dana"},
                "createdAt": "9999-12-31T23:59:59Z",
            }
        })
        .to_string();

        assert!(matches!(
            h.router.route(&frame),
            Err(ParseError::OfferDeadline(DeadlineOutOfRange { ref offer_id })) if offer_id.as_str() == "of_9"
        ));
        assert_eq!(h.router.controller().state(), OfferState::Idle);
        assert!(h.seen.lock().unwrap().is_empty());
        assert!(h.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disabled_channel_suppresses_notification() {
        let mut h = harness();
        h.settings
            .update(|settings: &mut NotificationSettings| settings.chat_messages = false)
            .unwrap();

        h.router.route(CHAT_FRAME).unwrap();
        assert!(h.notifications.try_recv().is_err());
        assert_eq!(h.seen.lock().unwrap().len(), 1);

        h.settings
            .update(|settings: &mut NotificationSettings| settings.chat_messages = true)
            .unwrap();
        h.router.route(CHAT_FRAME).unwrap();
        let request = h.notifications.try_recv().unwrap();
        assert_eq!(request.title, "New message from Dana");
    }

    #[tokio::test(start_paused = true)]
    async fn test_decisions_reach_subscribers() {
        let mut h = harness();
        h.router.route(&offer_frame("of_1")).unwrap();

        assert_eq!(
            h.router.apply_decision(DecisionInput::Decline("of_1".into())),
            Ok(OfferEvent::Declined("of_1".into()))
        );
        h.router.transport_signal(TransportSignal::Connected);

        let seen = h.seen.lock().unwrap();
        assert_eq!(seen[2], RoutedEvent::Offer(OfferEvent::Declined("of_1".into())));
        assert_eq!(seen[3], RoutedEvent::Transport(TransportSignal::Connected));
    }
}
