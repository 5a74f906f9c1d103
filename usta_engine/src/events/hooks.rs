use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{
    EventListener,
    EventPublisher,
    Handler,
    NotificationEvent,
    NotificationKind,
    OrderStatusChangedEvent,
    Recipient,
};

/// The publishing side handed to every API. An empty set is valid and simply discards events, which is what most
/// tests want.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub notification_producers: Vec<EventPublisher<NotificationEvent>>,
    pub status_changed_producers: Vec<EventPublisher<OrderStatusChangedEvent>>,
}

impl EventProducers {
    /// Fans a notification out to every subscriber. Delivery is best-effort.
    pub async fn notify(&self, recipient: Recipient, kind: NotificationKind) {
        let event = NotificationEvent::new(recipient, kind);
        for producer in &self.notification_producers {
            producer.publish(event.clone()).await;
        }
    }

    pub async fn status_changed(&self, event: OrderStatusChangedEvent) {
        for producer in &self.status_changed_producers {
            producer.publish(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    notifications: Option<EventListener<NotificationEvent>>,
    status_changes: Option<EventListener<OrderStatusChangedEvent>>,
}

impl EventHandlers {
    pub fn new(capacity: usize, hooks: EventHooks) -> Self {
        let EventHooks { on_notification, on_order_status_changed } = hooks;
        Self {
            notifications: on_notification.map(|f| EventListener::new(capacity, f)),
            status_changes: on_order_status_changed.map(|f| EventListener::new(capacity, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        EventProducers {
            notification_producers: self.notifications.iter().map(EventListener::publisher).collect(),
            status_changed_producers: self.status_changes.iter().map(EventListener::publisher).collect(),
        }
    }

    /// Spawns a task per configured hook. Each task ends once every [`EventProducers`] clone is dropped.
    pub fn start_handlers(self) {
        if let Some(listener) = self.notifications {
            info!("📬️ Notification hook is live");
            tokio::spawn(listener.run());
        }
        if let Some(listener) = self.status_changes {
            info!("📬️ Order status hook is live");
            tokio::spawn(listener.run());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_notification: Option<Handler<NotificationEvent>>,
    pub on_order_status_changed: Option<Handler<OrderStatusChangedEvent>>,
}

impl EventHooks {
    pub fn on_notification<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(NotificationEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_notification = Some(Arc::new(f));
        self
    }

    pub fn on_order_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_status_changed = Some(Arc::new(f));
        self
    }
}
