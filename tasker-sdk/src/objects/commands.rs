//! Client-to-server commands.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::SubscriptionChannel;

/// Channel set carried by a subscribe command.
pub type ChannelSet = SmallVec<[SubscriptionChannel; 4]>;

/// Client-to-server message, internally tagged on `"type"`:
///
/// ```json
/// {"type":"subscribe","channels":["job_offers","chat_messages","order_updates"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    /// Sent after every successful (re)connection. Subscriptions do not
    /// survive a reconnect server-side.
    Subscribe { channels: ChannelSet },
}

impl OutboundCommand {
    pub fn subscribe(channels: &[SubscriptionChannel]) -> Self {
        OutboundCommand::Subscribe {
            channels: channels.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_wire_format() {
        let command = OutboundCommand::subscribe(&SubscriptionChannel::ALL);
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"type":"subscribe","channels":["job_offers","chat_messages","order_updates"]}"#
        );
    }
}
