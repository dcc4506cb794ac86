//! Notification delivery gateways.
//!
//! The gateway implementation is picked once when the session is composed.
//! Callers never branch on which one is in use: every `deliver` call returns
//! a [`DeliveryReceipt`], and a gateway that cannot present natively falls
//! back to logging.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tasker_sdk::objects::NotificationChannel;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::{DeliveryOutcome, DeliveryReceipt, NotificationRequest};

/// Why a notification could not be presented natively.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryUnavailable {
    /// The environment has no native presentation mechanism.
    #[error("no native notification mechanism available")]
    NoNativeMechanism,

    /// The push relay answered with a non-2xx status.
    #[error("push relay rejected notification with status {status}")]
    Rejected { status: u16 },

    /// The push relay could not be reached.
    #[error("push relay request failed: {0}")]
    Request(String),
}

/// Hands formatted notifications to the presentation layer.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Deliver `request`. Must accept channels that were never registered.
    async fn deliver(&self, request: NotificationRequest) -> DeliveryReceipt;
}

/// Gateway for environments without native notifications: logs each request.
#[derive(Debug, Default)]
pub struct LogGateway {
    registered: Mutex<HashSet<NotificationChannel>>,
}

impl LogGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels seen so far, registered lazily on first delivery.
    pub fn registered_channels(&self) -> Vec<NotificationChannel> {
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    fn register(&self, channel: NotificationChannel) {
        let newly_added = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel);
        if newly_added {
            debug!(%channel, "Registered notification channel");
        }
    }

    fn log(request: &NotificationRequest, receipt: &DeliveryReceipt) {
        info!(
            notification_id = %receipt.notification_id,
            channel = %request.channel,
            urgency = ?request.urgency,
            title = %request.title,
            body = %request.body,
            data = ?request.data,
            "Notification"
        );
    }
}

#[async_trait]
impl NotificationGateway for LogGateway {
    async fn deliver(&self, request: NotificationRequest) -> DeliveryReceipt {
        self.register(request.channel);
        let receipt = DeliveryReceipt::new(
            request.channel,
            DeliveryOutcome::Logged {
                reason: DeliveryUnavailable::NoNativeMechanism,
            },
        );
        Self::log(&request, &receipt);
        receipt
    }
}

/// Gateway that forwards notifications to a push relay over HTTP.
///
/// The relay receives `POST {url}` with the `{title, body, data}` payload
/// plus presentation hints. Any failure degrades to logging.
#[derive(Debug, Clone)]
pub struct HttpPushGateway {
    http_client: reqwest::Client,
    url: Url,
}

#[derive(serde::Serialize)]
struct PushBody<'a> {
    #[serde(flatten)]
    payload: tasker_sdk::objects::NotificationPayload,
    channel: NotificationChannel,
    urgency: tasker_sdk::objects::Urgency,
    sound: bool,
    vibrate: bool,
    #[serde(rename = "notificationId")]
    notification_id: &'a uuid::Uuid,
}

impl HttpPushGateway {
    pub fn new(url: Url) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url,
        }
    }

    async fn push(
        &self,
        request: &NotificationRequest,
        notification_id: &uuid::Uuid,
    ) -> Result<(), DeliveryUnavailable> {
        let body = PushBody {
            payload: request.to_payload(),
            channel: request.channel,
            urgency: request.urgency,
            sound: request.sound,
            vibrate: request.vibrate,
            notification_id,
        };

        let response = self
            .http_client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryUnavailable::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryUnavailable::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl NotificationGateway for HttpPushGateway {
    async fn deliver(&self, request: NotificationRequest) -> DeliveryReceipt {
        let mut receipt = DeliveryReceipt::new(request.channel, DeliveryOutcome::Presented);

        if let Err(reason) = self.push(&request, &receipt.notification_id).await {
            warn!(
                notification_id = %receipt.notification_id,
                error = %reason,
                "Push delivery failed, falling back to log"
            );
            LogGateway::log(&request, &receipt);
            receipt.outcome = DeliveryOutcome::Logged { reason };
        } else {
            debug!(notification_id = %receipt.notification_id, "Notification pushed");
        }

        receipt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasker_sdk::objects::{RoutingData, Urgency};

    fn request(channel: NotificationChannel) -> NotificationRequest {
        NotificationRequest {
            title: "Order update".into(),
            body: "Order #o_9 has been delivered.".into(),
            channel,
            data: RoutingData::new("order_update").with("orderId", "o_9"),
            urgency: Urgency::Normal,
            sound: true,
            vibrate: true,
        }
    }

    #[tokio::test]
    async fn test_log_gateway_registers_channels_lazily() {
        let gateway = LogGateway::new();
        assert!(gateway.registered_channels().is_empty());

        let receipt = gateway.deliver(request(NotificationChannel::OrderUpdates)).await;
        assert_eq!(receipt.channel, NotificationChannel::OrderUpdates);
        assert_eq!(
            receipt.outcome,
            DeliveryOutcome::Logged {
                reason: DeliveryUnavailable::NoNativeMechanism
            }
        );

        gateway.deliver(request(NotificationChannel::OrderUpdates)).await;
        assert_eq!(
            gateway.registered_channels(),
            vec![NotificationChannel::OrderUpdates]
        );
    }

    #[tokio::test]
    async fn test_push_gateway_degrades_when_relay_unreachable() {
        // Bind then release an ephemeral port so nothing listens on it.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/push")).unwrap();
        let gateway = HttpPushGateway::new(url);
        let receipt = gateway.deliver(request(NotificationChannel::Chat)).await;
        assert!(matches!(
            receipt.outcome,
            DeliveryOutcome::Logged {
                reason: DeliveryUnavailable::Request(_)
            }
        ));
    }
}
