//! Payload handed to the platform notification layer.

use std::collections::BTreeMap;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Opaque routing payload attached to a notification.
///
/// Serialized flat as `{"type": "...", ...fields}` so that a tap handler can
/// dispatch on `type` and read the remaining fields as navigation arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingData {
    #[serde(rename = "type")]
    pub kind: CompactString,
    #[serde(flatten)]
    pub fields: BTreeMap<CompactString, CompactString>,
}

impl RoutingData {
    pub fn new(kind: impl Into<CompactString>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a routing field, replacing any previous value under `key`.
    pub fn with(mut self, key: impl Into<CompactString>, value: impl Into<CompactString>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(CompactString::as_str)
    }
}

/// `{title, body, data}` as presented by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: RoutingData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_data_is_flattened() {
        let payload = NotificationPayload {
            title: "New message from Dana".into(),
            body: "On my way".into(),
            data: RoutingData::new("chat_message").with("conversationId", "c_1"),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["data"]["type"], "chat_message");
        assert_eq!(json["data"]["conversationId"], "c_1");
    }
}
