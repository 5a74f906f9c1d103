use std::{fmt::Debug, sync::Arc};

use chrono::Duration;
use log::*;

use crate::{
    clock::{Clock, SystemClock},
    db::traits::ConversationManagement,
    db_types::{PendingAction, Subject},
    market_api::errors::MarketplaceError,
};

/// Tracks which multistep conversation each customer or artisan is in, so the chat layer knows how to read their
/// next message. A subject is in at most one conversation; starting a new one replaces the old.
pub struct ConversationApi<B> {
    db: B,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<B> Debug for ConversationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConversationApi (ttl {})", self.ttl)
    }
}

impl<B> ConversationApi<B> {
    pub fn new(db: B, ttl: Duration) -> Self {
        Self { db, clock: Arc::new(SystemClock), ttl }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl<B> ConversationApi<B>
where B: ConversationManagement
{
    pub async fn begin(&self, subject: Subject, action: PendingAction) -> Result<(), MarketplaceError> {
        let now = self.clock.now();
        trace!("📬️ {subject} is now in conversation {action:?}");
        self.db.set_pending_action(subject, &action, now + self.ttl, now).await
    }

    /// The conversation the subject is in, if it has not expired.
    pub async fn current(&self, subject: Subject) -> Result<Option<PendingAction>, MarketplaceError> {
        self.db.peek_pending_action(subject, self.clock.now()).await
    }

    /// Consumes the conversation. A second call returns `None`.
    pub async fn take(&self, subject: Subject) -> Result<Option<PendingAction>, MarketplaceError> {
        self.db.take_pending_action(subject, self.clock.now()).await
    }

    /// The user backed out. Returns whether there was anything to cancel.
    pub async fn cancel(&self, subject: Subject) -> Result<bool, MarketplaceError> {
        Ok(self.take(subject).await?.is_some())
    }
}
