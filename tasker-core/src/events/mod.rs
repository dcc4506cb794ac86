//! Event system for a worker session.
//!
//! # Event Flow
//!
//! 1. `TransportChannel` receives raw frames and lifecycle signals ->
//!    `TransportEventSender`, one queue in arrival order
//! 2. `WorkerSession` feeds frames to `EventRouter::route` and signals to
//!    `EventRouter::transport_signal`
//! 3. `EventRouter` hands job-offer events to the `OfferLifecycleController`
//!    first, then to local subscribers, then formats a notification
//! 4. Formatted `NotificationRequest`s -> `NotificationDispatcher` -> gateway
//!
//! Countdown expiry and UI decisions re-enter the router as `DecisionInput`
//! so every state transition happens on the session's single event loop.

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, DecisionReceiver, DecisionSender, NotificationReceiver,
    NotificationSender, TransportEventReceiver, TransportEventSender, decision_channel,
    notification_channel, transport_event_channel,
};

pub use types::{
    DeadlineOutOfRange, DecisionInput, DomainEvent, JobOffer, OfferEvent, OfferId, OfferState,
    RoutedEvent, TransportEvent, TransportSignal,
};
