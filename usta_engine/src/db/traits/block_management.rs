use chrono::{DateTime, Utc};

use crate::{
    db_types::{Actor, BlockRecord, NewBlock, Subject},
    market_api::errors::MarketplaceError,
};

#[allow(async_fn_in_trait)]
pub trait BlockManagement {
    /// The most recent ledger row for the subject.
    async fn fetch_latest_block(&self, subject: Subject) -> Result<Option<BlockRecord>, MarketplaceError>;

    async fn fetch_block_history(&self, subject: Subject) -> Result<Vec<BlockRecord>, MarketplaceError>;

    /// Blocks the subject and deactivates their account in one transaction. If the subject is already blocked, the new
    /// debt is added to the open record instead of opening a second one.
    async fn block_subject(&self, block: NewBlock, now: DateTime<Utc>) -> Result<BlockRecord, MarketplaceError>;

    /// Closes the open block and reactivates the account. Returns `None` if the subject was not blocked.
    async fn unblock_subject(
        &self,
        subject: Subject,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockRecord>, MarketplaceError>;

    /// Open timed blocks whose `block_until` is at or before `now`.
    async fn fetch_expired_blocks(&self, now: DateTime<Utc>) -> Result<Vec<BlockRecord>, MarketplaceError>;
}
