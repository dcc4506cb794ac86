//! Event processors of a worker session.
//!
//! - `EventRouter`: decodes inbound frames, drives the lifecycle controller,
//!   notifies local subscribers and emits `NotificationRequest`s
//! - `OfferLifecycleController`: owns the active job offer and its countdown
//! - `NotificationDispatcher`: receives `NotificationRequest`s, delivers them
//!   through the gateway

pub mod notification_dispatcher;
pub mod offer_lifecycle;
pub mod router;

pub use notification_dispatcher::NotificationDispatcher;
pub use offer_lifecycle::{Admission, OfferLifecycleController, StaleDecision};
pub use router::{EventRouter, LocalSubscriber, ParseError, Routed, decode};
