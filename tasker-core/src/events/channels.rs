//! Event channel factories and handles.
//!
//! Every stage of the session is connected by a bounded mpsc channel. The
//! transport's frame handlers and the router run synchronously and use
//! `try_send`: when a buffer is full the newest item is dropped, because a
//! stale job offer is worse than a missed one.

use super::types::{DecisionInput, TransportEvent};
use crate::notifications::NotificationRequest;
use tokio::sync::mpsc;

/// Default buffer size for event channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for inbound frames and transport lifecycle signals.
pub type TransportEventSender = mpsc::Sender<TransportEvent>;
/// Receiver handle for inbound frames and transport lifecycle signals.
pub type TransportEventReceiver = mpsc::Receiver<TransportEvent>;

/// Sender handle for worker decisions (UI input and countdown expiry).
pub type DecisionSender = mpsc::Sender<DecisionInput>;
/// Receiver handle for worker decisions.
pub type DecisionReceiver = mpsc::Receiver<DecisionInput>;

/// Sender handle for formatted notifications awaiting delivery.
pub type NotificationSender = mpsc::Sender<NotificationRequest>;
/// Receiver handle for formatted notifications awaiting delivery.
pub type NotificationReceiver = mpsc::Receiver<NotificationRequest>;

/// Create a new transport event channel.
///
/// Frames and signals share one queue so a subscriber never sees a frame
/// of a new connection before the signal announcing it.
pub fn transport_event_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new decision channel.
///
/// Used twice per session: once for UI decisions and once for countdown
/// expiry, so the event loop can give expiry priority over a same-tick tap.
pub fn decision_channel() -> (DecisionSender, DecisionReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new notification channel.
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
