//! Notification preferences.

use serde::{Deserialize, Serialize};

use crate::objects::NotificationChannel;

/// Per-channel notification switches plus presentation flags.
///
/// Every field defaults to enabled so a missing or partial settings file
/// never silences job alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationSettings {
    pub job_alerts: bool,
    pub chat_messages: bool,
    pub order_updates: bool,
    pub sound: bool,
    pub vibration: bool,
}

impl NotificationSettings {
    /// Whether notifications on `channel` should be produced at all.
    pub fn is_enabled(&self, channel: NotificationChannel) -> bool {
        match channel {
            NotificationChannel::JobAlerts => self.job_alerts,
            NotificationChannel::Chat => self.chat_messages,
            NotificationChannel::OrderUpdates => self.order_updates,
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            job_alerts: true,
            chat_messages: true,
            order_updates: true,
            sound: true,
            vibration: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_default_to_enabled() {
        let settings: NotificationSettings =
            serde_json::from_str(r#"{"chatMessages": false}"#).unwrap();
        assert!(!settings.is_enabled(NotificationChannel::Chat));
        assert!(settings.is_enabled(NotificationChannel::JobAlerts));
        assert!(settings.sound);
    }
}
