use chrono::{DateTime, Utc};

use crate::{
    db_types::{PendingAction, Subject},
    market_api::errors::MarketplaceError,
};

#[allow(async_fn_in_trait)]
pub trait ConversationManagement {
    /// Puts the subject into the given conversation, replacing any previous one.
    async fn set_pending_action(
        &self,
        subject: Subject,
        action: &PendingAction,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), MarketplaceError>;

    /// Returns the subject's pending action without consuming it. Expired actions read as `None`.
    async fn peek_pending_action(&self, subject: Subject, now: DateTime<Utc>) -> Result<Option<PendingAction>, MarketplaceError>;

    /// Consumes the subject's pending action. Expired actions are discarded and read as `None`.
    async fn take_pending_action(&self, subject: Subject, now: DateTime<Utc>) -> Result<Option<PendingAction>, MarketplaceError>;

    /// Clears the subject's pending action only if it is `action`.
    async fn clear_pending_action(&self, subject: Subject, action: &PendingAction) -> Result<bool, MarketplaceError>;
}
