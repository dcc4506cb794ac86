//! Runtime configuration types for a worker session.
//!
//! These are the validated values; parsing the agent's TOML file is handled
//! by the binary crate.

mod settings_store;

pub use settings_store::{
    MemorySettingsStorage, SettingsError, SettingsStorage, SettingsStore, SettingsWatcher,
    TomlSettingsFile,
};

use std::time::Duration;

use tasker_sdk::objects::SubscriptionChannel;

/// Reconnect policy and subscription set of the transport channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Reconnect attempt `n` waits `base_delay * n`.
    pub base_delay: Duration,
    /// Automatic reconnect attempts before the transport gives up.
    pub max_attempts: u32,
    /// Channels (re)subscribed after every successful connection.
    pub channels: Vec<SubscriptionChannel>,
}

impl TransportConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_delay: Self::DEFAULT_BASE_DELAY,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            channels: SubscriptionChannel::ALL.to_vec(),
        }
    }
}

/// Job offer handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferConfig {
    /// Response window applied when an offer carries no explicit deadline.
    pub window: Duration,
}

impl OfferConfig {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);
}

impl Default for OfferConfig {
    fn default() -> Self {
        Self {
            window: Self::DEFAULT_WINDOW,
        }
    }
}
