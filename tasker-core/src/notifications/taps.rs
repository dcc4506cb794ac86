//! Tap-to-navigate routing.
//!
//! The gateway does not navigate. Delivered notifications are recorded here
//! by id; when the platform reports a tap, the routing payload is handed to
//! the injected [`Navigator`] exactly once.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tasker_sdk::objects::RoutingData;
use tracing::debug;
use uuid::Uuid;

/// External navigation collaborator.
pub trait Navigator: Send + Sync {
    fn navigate(&self, data: &RoutingData);
}

/// Routing payloads of recently delivered notifications.
#[derive(Clone)]
pub struct TapRegistry {
    inner: Arc<TapRegistryInner>,
}

struct TapRegistryInner {
    navigator: Arc<dyn Navigator>,
    capacity: usize,
    delivered: Mutex<VecDeque<(Uuid, RoutingData)>>,
}

impl TapRegistry {
    /// Number of delivered notifications kept tappable by default.
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self::with_capacity(navigator, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(navigator: Arc<dyn Navigator>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(TapRegistryInner {
                navigator,
                capacity: capacity.max(1),
                delivered: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Remember the routing payload of a delivered notification, evicting
    /// the oldest entry once the registry is full.
    pub fn record(&self, notification_id: Uuid, data: RoutingData) {
        let mut delivered = self
            .inner
            .delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if delivered.len() == self.inner.capacity {
            delivered.pop_front();
        }
        delivered.push_back((notification_id, data));
    }

    /// Handle a tap on `notification_id`.
    ///
    /// Returns `false` when the notification is unknown, already tapped, or
    /// was evicted.
    pub fn tap(&self, notification_id: Uuid) -> bool {
        let data = {
            let mut delivered = self
                .inner
                .delivered
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(index) = delivered.iter().position(|(id, _)| *id == notification_id) else {
                debug!(%notification_id, "Tap on unknown notification ignored");
                return false;
            };
            delivered.remove(index).map(|(_, data)| data)
        };

        match data {
            Some(data) => {
                self.inner.navigator.navigate(&data);
                true
            }
            None => false,
        }
    }
}
