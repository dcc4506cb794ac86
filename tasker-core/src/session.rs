//! Worker session: composition root and event loop.
//!
//! One session per worker. It owns the transport channel, the router (and
//! through it the lifecycle controller) and the notification dispatcher,
//! and runs every state transition on a single loop. When several inputs
//! are ready in the same tick they are taken in this order:
//!
//! 1. shutdown
//! 2. offer countdown expiry
//! 3. transport events (inbound frames and connection signals, one queue in
//!    arrival order)
//! 4. worker decisions
//!
//! Expiry ahead of decisions is what makes the countdown win a tie with a
//! tap.

use std::sync::Arc;

use tasker_sdk::config::NotificationSettings;
use tokio::sync::{mpsc::error::TrySendError, watch};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{OfferConfig, SettingsError, SettingsStore, TransportConfig};
use crate::events::{
    DecisionInput, DecisionReceiver, DecisionSender, OfferId, OfferState, TransportEvent,
    TransportEventReceiver, decision_channel, notification_channel, transport_event_channel,
};
use crate::notifications::{Navigator, NotificationGateway, TapRegistry};
use crate::processors::{
    EventRouter, LocalSubscriber, NotificationDispatcher, OfferLifecycleController,
};
use crate::transport::{ConnectionStatus, Connector, Credential, TransportChannel, WorkerIdentity};

/// Static configuration of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Dispatch server endpoint.
    pub endpoint: Url,
    pub transport: TransportConfig,
    pub offers: OfferConfig,
}

/// Offer state as observed from outside the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferStatus {
    pub state: OfferState,
    /// The offer awaiting a decision, if any.
    pub active: Option<OfferId>,
}

impl OfferStatus {
    fn of(controller: &OfferLifecycleController) -> Self {
        Self {
            state: controller.state(),
            active: controller.active_offer().map(|offer| offer.id.clone()),
        }
    }
}

pub struct WorkerSession {
    transport: TransportChannel,
    router: EventRouter,
    dispatcher: NotificationDispatcher,
    transport_rx: TransportEventReceiver,
    expiry_rx: DecisionReceiver,
    decision_rx: DecisionReceiver,
    offer_tx: watch::Sender<OfferStatus>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Cloneable handle for the collaborators around a running session: the
/// decision UI, settings screen, and notification tap handler.
#[derive(Clone)]
pub struct SessionHandle {
    decisions: DecisionSender,
    settings: SettingsStore,
    taps: TapRegistry,
    connection_rx: watch::Receiver<ConnectionStatus>,
    offer_rx: watch::Receiver<OfferStatus>,
}

impl WorkerSession {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: SessionConfig,
        settings: SettingsStore,
        gateway: Arc<dyn NotificationGateway>,
        navigator: Arc<dyn Navigator>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, SessionHandle) {
        let (transport_tx, transport_rx) = transport_event_channel();
        let (expiry_tx, expiry_rx) = decision_channel();
        let (decision_tx, decision_rx) = decision_channel();
        let (notify_tx, notify_rx) = notification_channel();

        let frame_tx = transport_tx.clone();
        let transport =
            TransportChannel::new(connector, config.endpoint, config.transport, transport_tx);
        transport.on_event(move |frame| {
            match frame_tx.try_send(TransportEvent::Frame(frame.to_owned())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => warn!("Frame queue full, dropping inbound frame"),
                Err(TrySendError::Closed(_)) => debug!("Session stopped, dropping inbound frame"),
            }
        });

        let controller = OfferLifecycleController::new(expiry_tx);
        let (offer_tx, offer_rx) = watch::channel(OfferStatus::of(&controller));
        let router = EventRouter::new(controller, settings.subscribe(), notify_tx, config.offers);

        let taps = TapRegistry::new(navigator);
        let dispatcher =
            NotificationDispatcher::new(gateway, notify_rx, shutdown_rx.clone(), taps.clone());

        let handle = SessionHandle {
            decisions: decision_tx,
            settings,
            taps,
            connection_rx: transport.watch_status(),
            offer_rx,
        };

        let session = Self {
            transport,
            router,
            dispatcher,
            transport_rx,
            expiry_rx,
            decision_rx,
            offer_tx,
            shutdown_rx,
        };
        (session, handle)
    }

    /// Register a local subscriber on the router.
    pub fn subscribe(&mut self, subscriber: impl LocalSubscriber + 'static) {
        self.router.subscribe(subscriber);
    }

    /// Connect and run until shutdown.
    pub async fn run(self, identity: WorkerIdentity, credential: Credential) {
        let Self {
            transport,
            mut router,
            dispatcher,
            mut transport_rx,
            mut expiry_rx,
            mut decision_rx,
            offer_tx,
            mut shutdown_rx,
        } = self;

        info!(worker_id = %identity.worker_id, "WorkerSession started");
        let dispatcher = tokio::spawn(dispatcher.run());
        transport.connect(identity, credential);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("WorkerSession received shutdown signal");
                        break;
                    }
                }

                Some(expiry) = expiry_rx.recv() => {
                    let _ = router.apply_decision(expiry);
                }

                Some(event) = transport_rx.recv() => match event {
                    TransportEvent::Frame(frame) => {
                        let _ = router.route(&frame);
                    }
                    TransportEvent::Signal(signal) => router.transport_signal(signal),
                },

                Some(decision) = decision_rx.recv() => {
                    let _ = router.apply_decision(decision);
                }

                else => {
                    info!("All session inputs closed");
                    break;
                }
            }

            offer_tx.send_if_modified(|status| {
                let next = OfferStatus::of(router.controller());
                let modified = *status != next;
                *status = next;
                modified
            });
        }

        transport.disconnect().await;
        if let Err(e) = dispatcher.await {
            warn!(error = %e, "NotificationDispatcher task failed");
        }
        info!("WorkerSession shutdown complete");
    }
}

impl SessionHandle {
    /// Submit a worker decision. Returns `false` once the session has
    /// stopped.
    pub async fn decide(&self, input: DecisionInput) -> bool {
        self.decisions.send(input).await.is_ok()
    }

    pub fn settings(&self) -> NotificationSettings {
        self.settings.current()
    }

    /// Apply and persist a settings change.
    pub fn update_settings(
        &self,
        mutate: impl FnOnce(&mut NotificationSettings),
    ) -> Result<NotificationSettings, SettingsError> {
        self.settings.update(mutate)
    }

    /// Route a tap on a delivered notification.
    pub fn tap(&self, notification_id: Uuid) -> bool {
        self.taps.tap(notification_id)
    }

    pub fn connection(&self) -> ConnectionStatus {
        *self.connection_rx.borrow()
    }

    pub fn offer(&self) -> OfferStatus {
        self.offer_rx.borrow().clone()
    }

    /// Watch offer state changes.
    pub fn watch_offer(&self) -> watch::Receiver<OfferStatus> {
        self.offer_rx.clone()
    }
}
