//! TOML file configuration structures.
//!
//! These structs directly map to the `tasker-agent.toml` file format.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tasker_sdk::objects::SubscriptionChannel;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub offers: OffersConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// Dispatch server section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: Url,
}

/// Worker identity section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub id: String,
}

/// Reconnect policy and subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Reconnect attempt `n` waits `n * base_delay_ms`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_channels")]
    pub channels: Vec<SubscriptionChannel>,
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_channels() -> Vec<SubscriptionChannel> {
    SubscriptionChannel::ALL.to_vec()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            channels: default_channels(),
        }
    }
}

/// Job offer section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffersConfig {
    /// Response window for offers that carry no `expiresAt`.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_window_secs() -> u64 {
    30
}

impl Default for OffersConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
        }
    }
}

/// Which delivery gateway to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// Log every notification.
    #[default]
    Log,
    /// POST notifications to `push_url`.
    Http,
}

/// Notification delivery and settings persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub gateway: GatewayKind,
    /// Push relay endpoint, required when `gateway = "http"`.
    #[serde(default)]
    pub push_url: Option<Url>,
    /// Where the worker's notification settings are kept.
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("./notification-settings.toml")
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayKind::default(),
            push_url: None,
            settings_path: default_settings_path(),
        }
    }
}
