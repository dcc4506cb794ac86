//! Reconnecting transport channel to the dispatch server.
//!
//! One driver task per connection owns the [`Link`]. It (re)subscribes to
//! the configured channel set on every successful open, forwards inbound
//! text frames to the registered handlers, and reconnects with linear
//! backoff after a drop. Once `max_attempts` consecutive reconnects have
//! failed it emits a single [`TransportSignal::Exhausted`] and stops.

mod link;
mod websocket;

pub use link::{ConnectTarget, Connector, Credential, Link, TransportError, WorkerIdentity};
pub use websocket::WebSocketConnector;

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tasker_sdk::objects::OutboundCommand;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::TransportConfig;
use crate::events::{TransportEvent, TransportEventSender, TransportSignal};
use crate::utils::ScheduledTask;
use crate::utils::backoff::reconnect_delay;

/// How long `disconnect` waits for the driver to close the link.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    /// Opening a link, or waiting out the backoff before the next attempt.
    Connecting,
    Connected,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful open.
    pub attempt: u32,
}

impl ConnectionStatus {
    const DISCONNECTED: Self = Self {
        state: ConnectionState::Disconnected,
        attempt: 0,
    };
}

type FrameHandler = Arc<dyn Fn(&str) + Send + Sync>;

struct Shared {
    status_tx: watch::Sender<ConnectionStatus>,
    handlers: RwLock<Vec<FrameHandler>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    events: TransportEventSender,
}

impl Shared {
    fn set_status(&self, state: ConnectionState, attempt: u32) {
        self.status_tx.send_replace(ConnectionStatus { state, attempt });
    }

    fn signal(&self, signal: TransportSignal) {
        if let Err(e) = self.events.try_send(TransportEvent::Signal(signal)) {
            warn!(?signal, error = %e, "Dropping transport signal");
        }
    }

    fn dispatch(&self, frame: &str) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler(frame);
        }
    }

    fn set_outbound(&self, sender: Option<mpsc::UnboundedSender<String>>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = sender;
    }
}

struct Driver {
    task: ScheduledTask,
    stop_tx: watch::Sender<bool>,
}

/// Persistent bidirectional connection with automatic reconnect.
pub struct TransportChannel {
    connector: Arc<dyn Connector>,
    endpoint: Url,
    config: TransportConfig,
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
}

impl TransportChannel {
    /// Lifecycle signals are queued on `events` from the driver task, the
    /// same task that runs frame handlers. A handler that forwards frames
    /// into `events` therefore keeps both in arrival order.
    pub fn new(
        connector: Arc<dyn Connector>,
        endpoint: Url,
        config: TransportConfig,
        events: TransportEventSender,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::DISCONNECTED);
        Self {
            connector,
            endpoint,
            config,
            shared: Arc::new(Shared {
                status_tx,
                handlers: RwLock::new(Vec::new()),
                outbound: Mutex::new(None),
                events,
            }),
            driver: Mutex::new(None),
        }
    }

    /// Start connecting. No-op while a connection is open or being
    /// established.
    pub fn connect(&self, identity: WorkerIdentity, credential: Credential) {
        let mut driver = self.driver.lock().unwrap_or_else(PoisonError::into_inner);
        if driver.as_ref().is_some_and(|d| !d.task.is_finished()) {
            debug!(state = ?self.status().state, "connect ignored, transport already active");
            return;
        }

        let target = ConnectTarget {
            url: self.endpoint.clone(),
            identity,
            credential,
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        self.shared.set_status(ConnectionState::Connecting, 0);
        let task = ScheduledTask::spawn(drive(
            self.connector.clone(),
            target,
            self.config.clone(),
            self.shared.clone(),
            stop_rx,
        ));
        *driver = Some(Driver { task, stop_tx });
    }

    /// Send `message` as a JSON text frame.
    ///
    /// Returns `false` when the transport is not connected; nothing is
    /// queued for later.
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        if self.status().state != ConnectionState::Connected {
            return false;
        }
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound message");
                return false;
            }
        };
        self.shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| tx.send(text).is_ok())
    }

    /// Register a handler for inbound frames. Handlers run on the driver
    /// task in registration order and must not block.
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Close the connection and cancel any pending reconnect.
    pub async fn disconnect(&self) {
        let driver = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut driver) = driver {
            self.shared
                .set_status(ConnectionState::Closing, self.status().attempt);
            let _ = driver.stop_tx.send(true);
            if tokio::time::timeout(CLOSE_GRACE, driver.task.join())
                .await
                .is_err()
            {
                warn!("Transport driver did not stop in time, aborting");
                driver.task.cancel();
            }
        }

        self.shared.set_outbound(None);
        self.shared.set_status(ConnectionState::Disconnected, 0);
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status_tx.borrow()
    }

    /// Watch connection status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }
}

async fn drive(
    connector: Arc<dyn Connector>,
    target: ConnectTarget,
    config: TransportConfig,
    shared: Arc<Shared>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let subscribe = match serde_json::to_string(&OutboundCommand::subscribe(&config.channels)) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Failed to serialize subscribe command");
            shared.set_status(ConnectionState::Disconnected, 0);
            return;
        }
    };

    let mut attempt: u32 = 0;
    loop {
        shared.set_status(ConnectionState::Connecting, attempt);
        let opened = tokio::select! {
            biased;
            _ = stop_rx.changed() => return,
            result = connector.open(&target) => result,
        };

        match opened {
            Ok(mut link) => match link.send(subscribe.clone()).await {
                Ok(()) if stop_rx.has_changed().unwrap_or(true) => {
                    debug!("Stop requested while subscribing, closing link");
                    link.close().await;
                    return;
                }
                Ok(()) => {
                    attempt = 0;
                    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
                    shared.set_outbound(Some(out_tx));
                    shared.set_status(ConnectionState::Connected, 0);
                    info!(
                        worker_id = %target.identity.worker_id,
                        channels = ?config.channels,
                        "Transport connected"
                    );
                    shared.signal(TransportSignal::Connected);

                    let stopped = pump(link.as_mut(), &mut out_rx, &shared, &mut stop_rx).await;
                    shared.set_outbound(None);
                    if stopped {
                        link.close().await;
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to subscribe, dropping connection");
                    link.close().await;
                }
            },
            Err(e) => {
                warn!(attempt, error = %e, "Failed to open connection");
            }
        }

        attempt += 1;
        if attempt > config.max_attempts {
            shared.set_status(ConnectionState::Disconnected, config.max_attempts);
            error!(
                attempts = config.max_attempts,
                "Reconnect attempts exhausted, giving up"
            );
            shared.signal(TransportSignal::Exhausted {
                attempts: config.max_attempts,
            });
            return;
        }

        let retry_in = reconnect_delay(config.base_delay, attempt);
        shared.set_status(ConnectionState::Connecting, attempt);
        info!(attempt, retry_in_ms = retry_in.as_millis() as u64, "Reconnecting");
        shared.signal(TransportSignal::ConnectionLost { attempt, retry_in });

        tokio::select! {
            biased;
            _ = stop_rx.changed() => return,
            _ = tokio::time::sleep(retry_in) => {}
        }
    }
}

/// Move frames until the link drops (`false`) or a stop is requested
/// (`true`).
async fn pump(
    link: &mut dyn Link,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    shared: &Shared,
    stop_rx: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => return true,
            Some(text) = outbound.recv() => {
                if let Err(e) = link.send(text).await {
                    warn!(error = %e, "Failed to send frame, dropping connection");
                    return false;
                }
            }
            frame = link.recv() => match frame {
                Some(Ok(text)) => shared.dispatch(&text),
                Some(Err(e)) => {
                    warn!(error = %e, "Connection error");
                    return false;
                }
                None => {
                    info!("Connection closed by server");
                    return false;
                }
            },
        }
    }
}
