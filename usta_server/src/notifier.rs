//! Notification hook wiring.
//!
//! The chat transport that turns notifications into messages runs as a separate process. The server's job is to make
//! sure every notification leaves the engine: it is written to the `usta::notifications` log target as one JSON object
//! per line, which the transport tails. Order status changes go to `usta::order_status` the same way.
use log::*;
use usta_engine::events::{EventHooks, NotificationEvent, OrderStatusChangedEvent};

pub const NOTIFICATION_TARGET: &str = "usta::notifications";
pub const STATUS_TARGET: &str = "usta::order_status";

pub fn notification_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_notification(|ev| Box::pin(async move { publish_notification(&ev) }))
        .on_order_status_changed(|ev| Box::pin(async move { publish_status_change(&ev) }));
    hooks
}

fn publish_notification(ev: &NotificationEvent) {
    match serde_json::to_string(ev) {
        Ok(json) => info!(target: NOTIFICATION_TARGET, "{json}"),
        Err(e) => error!("📬️ Could not serialize a notification for {}: {e}", ev.recipient),
    }
}

fn publish_status_change(ev: &OrderStatusChangedEvent) {
    debug!("📬️ Order {} went from {} to {} ({})", ev.order_id, ev.old_status, ev.new_status, ev.actor);
    match serde_json::to_string(ev) {
        Ok(json) => info!(target: STATUS_TARGET, "{json}"),
        Err(e) => error!("📬️ Could not serialize the status change for order {}: {e}", ev.order_id),
    }
}
