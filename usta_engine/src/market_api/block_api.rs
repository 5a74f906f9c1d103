use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    clock::{Clock, SystemClock},
    db::traits::BlockManagement,
    db_types::{Actor, Azn, BlockRecord, BlockStatus, NewBlock, Subject},
    events::{EventProducers, NotificationKind},
    market_api::errors::{MarketplaceError, ValidationError},
};

/// Rejects the action if `subject` is currently blocked. Every gated entry point calls this first, so a blocked user
/// learns what they owe instead of seeing a generic failure.
pub(crate) async fn ensure_not_blocked<B: BlockManagement>(
    db: &B,
    subject: Subject,
    now: DateTime<Utc>,
) -> Result<(), MarketplaceError> {
    let latest = db.fetch_latest_block(subject).await?;
    let status = BlockStatus::from_record(latest.as_ref(), now);
    if status.blocked {
        debug!("⛔️ {subject} tried a gated action while {status}");
        return Err(MarketplaceError::Blocked(status));
    }
    Ok(())
}

/// `BlockApi` manages the block ledger: manual blocks and unblocks by admins, status checks, and the expiry of timed
/// blocks. Blocks raised by the payment escalations go through the same storage primitive.
pub struct BlockApi<B> {
    db: B,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
}

impl<B> Debug for BlockApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockApi")
    }
}

impl<B> BlockApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl<B> BlockApi<B>
where B: BlockManagement
{
    pub async fn is_blocked(&self, subject: Subject) -> Result<BlockStatus, MarketplaceError> {
        let latest = self.db.fetch_latest_block(subject).await?;
        Ok(BlockStatus::from_record(latest.as_ref(), self.clock.now()))
    }

    pub async fn ensure_not_blocked(&self, subject: Subject) -> Result<(), MarketplaceError> {
        ensure_not_blocked(&self.db, subject, self.clock.now()).await
    }

    /// Blocks `subject` until `required_payment` is settled, or until `until` if given. Blocking an already blocked
    /// subject adds to what they owe.
    pub async fn block(
        &self,
        subject: Subject,
        reason: &str,
        required_payment: Azn,
        admin_id: i64,
        until: Option<DateTime<Utc>>,
    ) -> Result<BlockRecord, MarketplaceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::MissingField("reason").into());
        }
        if required_payment.value() < 0 {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        let now = self.clock.now();
        let mut block = NewBlock::new(subject, reason, required_payment, Actor::Admin(admin_id));
        if let Some(until) = until {
            if until <= now {
                return Err(ValidationError::Other("a timed block must end in the future".into()).into());
            }
            block = block.until(until);
        }
        let record = self.db.block_subject(block, now).await?;
        info!("⛔️ Admin #{admin_id} blocked {subject}: {reason}");
        let status = BlockStatus::from_record(Some(&record), now);
        self.producers.notify(subject.into(), NotificationKind::AccountBlocked { status }).await;
        Ok(record)
    }

    pub async fn unblock(&self, subject: Subject, admin_id: i64) -> Result<BlockRecord, MarketplaceError> {
        let record = self
            .db
            .unblock_subject(subject, Actor::Admin(admin_id), self.clock.now())
            .await?
            .ok_or(MarketplaceError::BlockNotFound(subject))?;
        info!("⛔️ Admin #{admin_id} unblocked {subject}");
        self.producers.notify(subject.into(), NotificationKind::AccountUnblocked).await;
        Ok(record)
    }

    pub async fn history(&self, subject: Subject) -> Result<Vec<BlockRecord>, MarketplaceError> {
        self.db.fetch_block_history(subject).await
    }

    /// Closes every timed block whose `block_until` has passed and reactivates the accounts.
    pub async fn lift_expired_blocks(&self) -> Result<Vec<BlockRecord>, MarketplaceError> {
        let now = self.clock.now();
        let expired = self.db.fetch_expired_blocks(now).await?;
        let mut lifted = Vec::with_capacity(expired.len());
        for record in expired {
            let subject = record.subject();
            match self.db.unblock_subject(subject, Actor::System, now).await {
                Ok(Some(record)) => {
                    info!("⛔️ Timed block on {subject} expired and was lifted");
                    self.producers.notify(subject.into(), NotificationKind::AccountUnblocked).await;
                    lifted.push(record);
                },
                Ok(None) => debug!("⛔️ Block on {subject} was already lifted"),
                Err(e) => error!("⛔️ Could not lift expired block on {subject}: {e}"),
            }
        }
        Ok(lifted)
    }
}
