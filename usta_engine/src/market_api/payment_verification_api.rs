use std::{fmt::Debug, sync::Arc};

use chrono::Duration;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    clock::{Clock, SystemClock},
    db::traits::{MarketplaceDatabase, ReceiptDecision, ReceiptResolved, ReceiptSaved},
    db_types::{
        Actor,
        Azn,
        BlockRecord,
        BlockStatus,
        EscalationKind,
        EscalationTask,
        NewBlock,
        Order,
        OrderId,
        OrderPayment,
        PendingAction,
        ReceiptKind,
        Subject,
    },
    events::{EventProducers, NotificationKind, Recipient},
    helpers::{artisan_penalty, customer_penalty},
    market_api::{
        errors::{MarketplaceError, ValidationError},
        policy::MarketplacePolicy,
    },
};

/// What one pass of the escalation worker did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationReport {
    /// Blocks that were applied
    pub executed: Vec<BlockRecord>,
    /// Tasks that no longer applied because the subject resubmitted or the receipt was approved in the meantime
    pub stale: usize,
    pub failed: usize,
}

impl EscalationReport {
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty() && self.stale == 0 && self.failed == 0
    }
}

/// `PaymentVerificationApi` handles receipts and the escalations that hang off them.
///
/// There are two kinds of receipt. A customer paying by card uploads proof of the transfer to the artisan; an artisan
/// paid in cash uploads proof that they forwarded the platform commission. Both land in the same admin review queue.
/// Every upload (re)starts a deadline. If the receipt has not been approved by then, the escalation worker blocks the
/// party responsible with a penalty, unless they uploaded a newer receipt in the meantime.
pub struct PaymentVerificationApi<B> {
    db: B,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
    policy: MarketplacePolicy,
}

impl<B> Debug for PaymentVerificationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentVerificationApi")
    }
}

impl<B> PaymentVerificationApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, clock: Arc::new(SystemClock), policy: MarketplacePolicy::default() }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: MarketplacePolicy) -> Self {
        self.policy = policy;
        self
    }

    fn window(&self, kind: ReceiptKind) -> Duration {
        match kind {
            ReceiptKind::CardPayment => self.policy.card_receipt_window,
            ReceiptKind::CashCommission => self.policy.commission_window,
        }
    }
}

/// Who has to produce a receipt of the given kind for the order.
fn responsible_party(order: &Order, kind: ReceiptKind) -> Option<Subject> {
    match kind {
        ReceiptKind::CardPayment => Some(Subject::customer(order.customer_id)),
        ReceiptKind::CashCommission => order.artisan_id.map(Subject::artisan),
    }
}

fn upload_action(order_id: OrderId, kind: ReceiptKind) -> PendingAction {
    match kind {
        ReceiptKind::CardPayment => PendingAction::UploadReceipt { order_id },
        ReceiptKind::CashCommission => PendingAction::UploadCommissionReceipt { order_id },
    }
}

impl<B> PaymentVerificationApi<B>
where B: MarketplaceDatabase
{
    /// Stores a receipt for the order and puts it in the admin review queue. A new upload replaces the previous
    /// receipt and resets its verification to pending; it never adds a second entry to the queue.
    ///
    /// Customers upload card receipts and artisans upload commission receipts for cash orders. Anyone else gets an
    /// ownership error.
    pub async fn upload_receipt(
        &self,
        order_id: OrderId,
        uploader: Actor,
        file_id: &str,
    ) -> Result<ReceiptSaved, MarketplaceError> {
        let file_id = file_id.trim();
        if file_id.is_empty() {
            return Err(ValidationError::MissingField("receipt").into());
        }
        let order = self.order(order_id).await?;
        let payment = self.db.fetch_payment(order_id).await?.ok_or(MarketplaceError::PaymentNotFound(order_id))?;
        let kind = payment.receipt_kind();
        let subject = match (uploader, kind) {
            (Actor::Customer(id), ReceiptKind::CardPayment) if id == order.customer_id => Subject::customer(id),
            (Actor::Customer(id), ReceiptKind::CardPayment) => {
                return Err(MarketplaceError::NotOwner { order_id, customer_id: id });
            },
            (Actor::Artisan(id), ReceiptKind::CashCommission) if order.is_bound_to(id) => Subject::artisan(id),
            (Actor::Artisan(id), ReceiptKind::CashCommission) => {
                return Err(MarketplaceError::NotAssigned { order_id, artisan_id: id });
            },
            (actor, kind) => {
                let msg = format!("{actor} cannot upload a {kind} receipt for order {order_id}");
                return Err(ValidationError::Other(msg).into());
            },
        };
        let now = self.clock.now();
        let due_at = now + self.window(kind);
        let saved = self.db.save_receipt(order_id, file_id, uploader, due_at, now).await?;
        info!("🧾️ {subject} uploaded {kind} receipt v{} for order {order_id}", saved.payment.receipt_version);
        if let Err(e) = self.db.clear_pending_action(subject, &upload_action(order_id, kind)).await {
            warn!("🧾️ Could not close the upload conversation for {subject}: {e}");
        }
        self.producers.notify(Recipient::admins(), NotificationKind::ReceiptSubmitted { order_id, kind }).await;
        Ok(saved)
    }

    /// Approves the receipt awaiting review. Any pending escalation for it is cancelled. For a card receipt the
    /// payment is complete; for a commission receipt the artisan's debt to the platform is settled.
    pub async fn approve_receipt(&self, order_id: OrderId, admin_id: i64) -> Result<OrderPayment, MarketplaceError> {
        let order = self.order(order_id).await?;
        let resolved =
            self.db.resolve_receipt(order_id, ReceiptDecision::Approve, Actor::Admin(admin_id), self.clock.now()).await?;
        let kind = resolved.payment.receipt_kind();
        info!("🧾️ Admin #{admin_id} approved the {kind} receipt for order {order_id}");
        if let Some(subject) = responsible_party(&order, kind) {
            self.producers.notify(subject.into(), NotificationKind::ReceiptApproved { order_id, kind }).await;
        }
        Ok(resolved.payment)
    }

    /// Rejects the receipt awaiting review. The responsible party is asked to upload a new one and the escalation
    /// clock restarts from now.
    pub async fn reject_receipt(&self, order_id: OrderId, admin_id: i64) -> Result<ReceiptResolved, MarketplaceError> {
        let order = self.order(order_id).await?;
        let payment = self.db.fetch_payment(order_id).await?.ok_or(MarketplaceError::PaymentNotFound(order_id))?;
        let kind = payment.receipt_kind();
        let window = self.window(kind);
        let now = self.clock.now();
        let decision = ReceiptDecision::Reject { due_at: now + window };
        let resolved = self.db.resolve_receipt(order_id, decision, Actor::Admin(admin_id), now).await?;
        info!("🧾️ Admin #{admin_id} rejected the {kind} receipt for order {order_id}");
        if let Some(subject) = responsible_party(&order, kind) {
            let action = upload_action(order_id, kind);
            if let Err(e) = self.db.set_pending_action(subject, &action, now + window, now).await {
                warn!("🧾️ Could not reopen the upload conversation for {subject}: {e}");
            }
            let kind = NotificationKind::ReceiptRejected { order_id, kind, deadline_hours: window.num_hours() };
            self.producers.notify(subject.into(), kind).await;
        }
        Ok(resolved)
    }

    /// Receipts waiting for an admin, oldest first.
    pub async fn receipt_queue(
        &self,
        kind: Option<ReceiptKind>,
        include_rejected: bool,
    ) -> Result<Vec<OrderPayment>, MarketplaceError> {
        self.db.fetch_receipt_queue(kind, include_rejected).await
    }

    /// The artisan confirms the customer paid them in cash. If a commission is owed, the artisan is asked to forward
    /// it and upload proof before the commission window closes.
    pub async fn confirm_cash_received(&self, order_id: OrderId, artisan_id: i64) -> Result<OrderPayment, MarketplaceError> {
        let now = self.clock.now();
        let window = self.policy.commission_window;
        let (payment, escalation) = self.db.confirm_cash_received(order_id, artisan_id, now + window, now).await?;
        info!("🧾️ Artisan #{artisan_id} received cash for order {order_id}");
        if let Some(task) = escalation {
            let subject = Subject::artisan(artisan_id);
            let action = PendingAction::UploadCommissionReceipt { order_id };
            if let Err(e) = self.db.set_pending_action(subject, &action, task.due_at, now).await {
                warn!("🧾️ Could not open the commission upload conversation for {subject}: {e}");
            }
            let kind =
                NotificationKind::CommissionDue { order_id, amount: payment.admin_fee, deadline_hours: window.num_hours() };
            self.producers.notify(subject.into(), kind).await;
        }
        Ok(payment)
    }

    pub async fn escalation(
        &self,
        order_id: OrderId,
        kind: EscalationKind,
    ) -> Result<Option<EscalationTask>, MarketplaceError> {
        self.db.fetch_escalation(order_id, kind).await
    }

    /// Runs every escalation whose deadline has passed.
    ///
    /// Each task re-checks the payment inside the same transaction that applies the block, so an approval or a fresh
    /// upload that lands while the task is waiting turns it into a no-op. A task that errors is retried on the next
    /// pass until it runs out of attempts.
    pub async fn run_due_escalations(&self) -> Result<EscalationReport, MarketplaceError> {
        let now = self.clock.now();
        let due = self.db.fetch_due_escalations(now).await?;
        let mut report = EscalationReport::default();
        if due.is_empty() {
            trace!("🕰️ No escalations are due");
            return Ok(report);
        }
        debug!("🕰️ {} escalations are due", due.len());
        for task in due {
            match self.execute(&task).await {
                Ok(Some(record)) => {
                    let status = BlockStatus::from_record(Some(&record), now);
                    self.producers.notify(task.subject().into(), NotificationKind::AccountBlocked { status }).await;
                    report.executed.push(record);
                },
                Ok(None) => report.stale += 1,
                Err(e) => {
                    error!("🕰️ Escalation #{} for order {} failed: {e}", task.id, task.order_id);
                    report.failed += 1;
                    let max = self.policy.max_escalation_attempts;
                    match self.db.record_escalation_failure(task.id, &e.to_string(), max, now).await {
                        Ok(Some(t)) if t.status != task.status => {
                            warn!("🕰️ Escalation #{} gave up after {} attempts", t.id, t.attempts)
                        },
                        Ok(_) => {},
                        Err(e) => error!("🕰️ Could not record the failure of escalation #{}: {e}", task.id),
                    }
                },
            }
        }
        info!(
            "🕰️ Escalation pass: {} blocked, {} stale, {} failed",
            report.executed.len(),
            report.stale,
            report.failed
        );
        Ok(report)
    }

    async fn execute(&self, task: &EscalationTask) -> Result<Option<BlockRecord>, MarketplaceError> {
        let payment = self.db.fetch_payment(task.order_id).await?.ok_or(MarketplaceError::PaymentNotFound(task.order_id))?;
        let (penalty, reason) = self.penalty_for(task, &payment);
        let block = NewBlock::new(task.subject(), reason, penalty, Actor::System);
        self.db.execute_escalation(task, block, self.clock.now()).await
    }

    fn penalty_for(&self, task: &EscalationTask, payment: &OrderPayment) -> (Azn, String) {
        match task.kind {
            EscalationKind::CardReceipt => {
                let penalty = customer_penalty(payment.amount, self.policy.customer_penalty_factor);
                let reason = format!(
                    "The card payment receipt for order {} was not confirmed within {} hours",
                    task.order_id,
                    self.policy.card_receipt_window.num_hours()
                );
                (penalty, reason)
            },
            EscalationKind::CashCommission => {
                let penalty = artisan_penalty(
                    payment.admin_fee,
                    self.policy.artisan_late_factor,
                    self.policy.artisan_penalty_factor,
                );
                let reason = format!(
                    "The {} commission for order {} was not paid within {} hours",
                    payment.admin_fee,
                    task.order_id,
                    self.policy.commission_window.num_hours()
                );
                (penalty, reason)
            },
        }
    }

    async fn order(&self, order_id: OrderId) -> Result<Order, MarketplaceError> {
        self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))
    }
}
