//! Domain event to notification mapping.
//!
//! [`format`] is a pure function of the event and the current settings: no
//! clock, no I/O, no randomness. Identifiers and timestamps are attached by
//! the gateway at delivery time, not here.

use tasker_sdk::config::NotificationSettings;
use tasker_sdk::objects::{
    ChatMessagePayload, NotificationChannel, OrderStatus, OrderStatusPayload, RoutingData,
    Urgency,
};

use super::NotificationRequest;
use crate::events::{DomainEvent, JobOffer};

/// Chat previews longer than this many characters are cut with an ellipsis.
const CHAT_PREVIEW_CHARS: usize = 120;

/// Map `event` to a notification, or `None` when the event does not produce
/// one or its channel is switched off in `settings`.
///
/// `JobOfferExpired` and `JobOfferTakenByOther` never notify; their effect is
/// the offer screen closing.
pub fn format(event: &DomainEvent, settings: &NotificationSettings) -> Option<NotificationRequest> {
    let (channel, title, body, data, urgency) = match event {
        DomainEvent::JobOfferCreated(offer) => job_offer(offer),
        DomainEvent::ChatMessageReceived(message) => chat_message(message),
        DomainEvent::OrderStatusChanged(update) => order_status(update),
        DomainEvent::JobOfferExpired { .. } | DomainEvent::JobOfferTakenByOther { .. } => {
            return None;
        }
    };

    if !settings.is_enabled(channel) {
        return None;
    }

    Some(NotificationRequest {
        title,
        body,
        channel,
        data,
        urgency,
        sound: settings.sound,
        vibrate: settings.vibration,
    })
}

type Parts = (NotificationChannel, String, String, RoutingData, Urgency);

fn job_offer(offer: &JobOffer) -> Parts {
    let reward = match &offer.currency {
        Some(currency) => format!("{:.2} {}", offer.reward, currency),
        None => format!("${:.2}", offer.reward),
    };
    let title = if offer.urgent {
        format!("Urgent {} job · {}", offer.kind, reward)
    } else {
        format!("New {} job · {}", offer.kind, reward)
    };

    let mut body = match &offer.dropoff {
        Some(dropoff) => format!("{} → {}", offer.pickup.address, dropoff.address),
        None => format!("Pickup at {}", offer.pickup.address),
    };
    if let Some(km) = offer.distance_km {
        body.push_str(&format!(" · {km:.1} km"));
    }
    if let Some(minutes) = offer.duration_minutes {
        body.push_str(&format!(" · ~{minutes} min"));
    }

    let data = RoutingData::new("job_offer")
        .with("offerId", offer.id.as_str())
        .with("jobType", offer.kind.to_string());

    (NotificationChannel::JobAlerts, title, body, data, Urgency::High)
}

fn chat_message(message: &ChatMessagePayload) -> Parts {
    let title = format!("New message from {}", message.sender_name);
    let body = preview(&message.text);

    let mut data = RoutingData::new("chat_message")
        .with("conversationId", message.conversation_id.clone())
        .with("messageId", message.message_id.clone())
        .with("senderId", message.sender_id.clone());
    if let Some(order_id) = &message.order_id {
        data = data.with("orderId", order_id.clone());
    }

    (NotificationChannel::Chat, title, body, data, Urgency::Normal)
}

fn order_status(update: &OrderStatusPayload) -> Parts {
    let label = match &update.order_label {
        Some(label) => label.clone(),
        None => format!("Order #{}", update.order_id),
    };
    let body = match &update.status {
        OrderStatus::Pending => format!("{label} is pending."),
        OrderStatus::Accepted => format!("{label} has been accepted."),
        OrderStatus::PickedUp => format!("{label} has been picked up."),
        OrderStatus::InTransit => format!("{label} is on its way."),
        OrderStatus::Delivered => format!("{label} has been delivered."),
        OrderStatus::Cancelled => format!("{label} was cancelled."),
        OrderStatus::Other(raw) => format!("{label} status updated to {raw}."),
    };
    let urgency = match update.status {
        OrderStatus::Cancelled => Urgency::High,
        _ => Urgency::Normal,
    };

    let data = RoutingData::new("order_update")
        .with("orderId", update.order_id.clone())
        .with("status", update.status.as_str());

    (
        NotificationChannel::OrderUpdates,
        "Order update".to_string(),
        body,
        data,
        urgency,
    )
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= CHAT_PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(CHAT_PREVIEW_CHARS - 1).collect();
    cut.push('…');
    cut
}
