//! Stateless pub-sub over a bounded tokio channel.
//!
//! An [`EventListener`] owns the receiving end and runs one callback per event. Any number of [`EventPublisher`]s
//! feed it. Publishing never waits for the callback, so a slow or failing notification transport cannot hold up an
//! order transition.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{
    sync::{mpsc, mpsc::error::TrySendError},
    task::{JoinError, JoinSet},
};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventListener<E: Send + Sync + 'static> {
    inbox: mpsc::Receiver<E>,
    outbox: mpsc::Sender<E>,
    callback: Handler<E>,
}

impl<E: Send + Sync + 'static> EventListener<E> {
    pub fn new(capacity: usize, callback: Handler<E>) -> Self {
        let (outbox, inbox) = mpsc::channel(capacity);
        Self { inbox, outbox, callback }
    }

    pub fn publisher(&self) -> EventPublisher<E> {
        EventPublisher::new(self.outbox.clone())
    }

    /// Delivers events until the last publisher is dropped, then waits for the callbacks still running.
    pub async fn run(self) {
        let Self { mut inbox, outbox, callback } = self;
        // Our own sender would otherwise keep the channel open forever
        drop(outbox);
        debug!("📬️ Event listener started");
        let mut in_flight = JoinSet::new();
        while let Some(event) = inbox.recv().await {
            let callback = Arc::clone(&callback);
            in_flight.spawn(async move { callback(event).await });
            while let Some(done) = in_flight.try_join_next() {
                report(done);
            }
        }
        if !in_flight.is_empty() {
            debug!("📬️ Channel closed with {} deliveries still running", in_flight.len());
        }
        while let Some(done) = in_flight.join_next().await {
            report(done);
        }
        debug!("📬️ Event listener stopped");
    }
}

fn report(result: Result<(), JoinError>) {
    if let Err(e) = result {
        warn!("📬️ A delivery task died: {e}. The event is dropped; the state change it describes stands.");
    }
}

#[derive(Clone)]
pub struct EventPublisher<E: Send + Sync> {
    outbox: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventPublisher<E> {
    pub fn new(outbox: mpsc::Sender<E>) -> Self {
        Self { outbox }
    }

    /// Queues `event` without waiting. When the channel is full the event is dropped so the caller's transition is
    /// never held up by a backed-up notification transport.
    pub async fn publish(&self, event: E) {
        match self.outbox.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                warn!("📬️ Event channel is full ({} slots). Event dropped.", self.outbox.max_capacity());
            },
            Err(TrySendError::Closed(_)) => error!("📬️ Event listener has gone away. Event dropped."),
        }
    }
}
