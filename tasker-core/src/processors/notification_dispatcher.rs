//! NotificationDispatcher processor.
//!
//! Receives formatted `NotificationRequest`s from the router, hands each one
//! to the configured gateway, and records the routing payload of every
//! receipt so a later tap can be routed.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::events::NotificationReceiver;
use crate::notifications::{DeliveryOutcome, NotificationGateway, NotificationRequest, TapRegistry};

pub struct NotificationDispatcher {
    gateway: Arc<dyn NotificationGateway>,
    notification_rx: NotificationReceiver,
    shutdown_rx: watch::Receiver<bool>,
    taps: TapRegistry,
}

impl NotificationDispatcher {
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        notification_rx: NotificationReceiver,
        shutdown_rx: watch::Receiver<bool>,
        taps: TapRegistry,
    ) -> Self {
        Self {
            gateway,
            notification_rx,
            shutdown_rx,
            taps,
        }
    }

    /// Run the NotificationDispatcher.
    pub async fn run(mut self) {
        info!("NotificationDispatcher started");

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("NotificationDispatcher received shutdown signal");
                        break;
                    }
                }

                request = self.notification_rx.recv() => match request {
                    Some(request) => self.deliver(request).await,
                    None => {
                        info!("Notification channel closed");
                        break;
                    }
                },
            }
        }

        info!("NotificationDispatcher shutdown complete");
    }

    async fn deliver(&self, request: NotificationRequest) {
        let data = request.data.clone();
        let receipt = self.gateway.deliver(request).await;
        match &receipt.outcome {
            DeliveryOutcome::Presented => {
                debug!(
                    notification_id = %receipt.notification_id,
                    channel = %receipt.channel,
                    "Notification presented"
                );
            }
            DeliveryOutcome::Logged { reason } => {
                debug!(
                    notification_id = %receipt.notification_id,
                    channel = %receipt.channel,
                    %reason,
                    "Notification logged"
                );
            }
        }
        self.taps.record(receipt.notification_id, data);
    }
}
