use chrono::{DateTime, Utc};

use crate::{
    db::traits::{ReceiptDecision, ReceiptResolved, ReceiptSaved},
    db_types::{Actor, BlockRecord, EscalationKind, EscalationTask, NewBlock, OrderId, OrderPayment, PaymentMethod, ReceiptKind},
    market_api::errors::MarketplaceError,
};

#[allow(async_fn_in_trait)]
pub trait PaymentManagement {
    async fn fetch_payment(&self, order_id: OrderId) -> Result<Option<OrderPayment>, MarketplaceError>;

    async fn set_payment_method(
        &self,
        order_id: OrderId,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<OrderPayment, MarketplaceError>;

    /// Stores a receipt handle for the order, resets verification to pending, bumps the receipt version and
    /// (re)schedules the escalation for the receipt's kind to fire at `due_at`. All in one transaction.
    async fn save_receipt(
        &self,
        order_id: OrderId,
        file_id: &str,
        actor: Actor,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ReceiptSaved, MarketplaceError>;

    /// Approves or rejects the receipt awaiting review. Approval cancels the pending escalation; rejection reschedules
    /// it.
    async fn resolve_receipt(
        &self,
        order_id: OrderId,
        decision: ReceiptDecision,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<ReceiptResolved, MarketplaceError>;

    /// Receipts waiting for an admin decision, optionally restricted to one kind. Rejected receipts that have not been
    /// replaced are included only when asked for.
    async fn fetch_receipt_queue(
        &self,
        kind: Option<ReceiptKind>,
        include_rejected: bool,
    ) -> Result<Vec<OrderPayment>, MarketplaceError>;

    /// The artisan confirms the customer paid in cash. If a commission is owed, an escalation against the artisan is
    /// scheduled for `due_at`.
    async fn confirm_cash_received(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(OrderPayment, Option<EscalationTask>), MarketplaceError>;

    async fn fetch_escalation(
        &self,
        order_id: OrderId,
        kind: EscalationKind,
    ) -> Result<Option<EscalationTask>, MarketplaceError>;

    /// Scheduled escalations whose deadline is at or before `now`.
    async fn fetch_due_escalations(&self, now: DateTime<Utc>) -> Result<Vec<EscalationTask>, MarketplaceError>;

    /// Re-checks the task against the current payment state and, if it still applies, marks it executed and applies
    /// the block in the same transaction. Returns `None` when the task turned out to be stale.
    async fn execute_escalation(
        &self,
        task: &EscalationTask,
        block: NewBlock,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockRecord>, MarketplaceError>;

    async fn record_escalation_failure(
        &self,
        task_id: i64,
        error: &str,
        max_attempts: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<EscalationTask>, MarketplaceError>;
}
