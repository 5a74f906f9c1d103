use std::{fmt::Debug, sync::Arc};

use log::*;
use usta_common::Secret;

use crate::{
    clock::{Clock, SystemClock},
    db::traits::MarketplaceDatabase,
    db_types::{Actor, Azn, NewRefund, OrderId, PendingAction, RefundRequest, RefundStatus, Subject},
    events::{EventProducers, NotificationKind, Recipient},
    market_api::{
        collaborators::PiiCipher,
        errors::{MarketplaceError, ValidationError},
        policy::MarketplacePolicy,
    },
};

const MIN_CARD_DIGITS: usize = 12;
const MAX_CARD_DIGITS: usize = 19;

/// Strips the separators people type into card numbers and checks what is left looks like a card number.
fn normalize_card_number(card: &Secret<String>) -> Result<Secret<String>, ValidationError> {
    let digits = card.reveal().chars().filter(|c| !matches!(c, ' ' | '-')).collect::<String>();
    let valid = digits.chars().all(|c| c.is_ascii_digit()) && (MIN_CARD_DIGITS..=MAX_CARD_DIGITS).contains(&digits.len());
    if valid {
        Ok(Secret::new(digits))
    } else {
        Err(ValidationError::Other(format!("a card number has {MIN_CARD_DIGITS} to {MAX_CARD_DIGITS} digits")))
    }
}

/// `RefundApi` walks a refund from the admin's decision to the money leaving the platform:
///
/// ```text
/// pending ──card details──▶ pending_admin ──transfer made──▶ completed
///    │                           │
///    └──────────declined─────────┘
/// ```
///
/// Payout card numbers are encrypted with the configured [`PiiCipher`] before they are stored and only ever appear in
/// logs masked.
pub struct RefundApi<B> {
    db: B,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
    policy: MarketplacePolicy,
    cipher: Arc<dyn PiiCipher>,
}

impl<B> Debug for RefundApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B> RefundApi<B> {
    pub fn new(db: B, producers: EventProducers, cipher: Arc<dyn PiiCipher>) -> Self {
        Self { db, producers, clock: Arc::new(SystemClock), policy: MarketplacePolicy::default(), cipher }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: MarketplacePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl<B> RefundApi<B>
where B: MarketplaceDatabase
{
    /// An admin starts a refund for an order. The refund, together with every earlier refund on the order that was not
    /// declined, cannot exceed what was paid for it. The customer is asked for the card to pay the money back to.
    pub async fn initiate_refund(
        &self,
        order_id: OrderId,
        amount: Azn,
        reason: &str,
        admin_id: i64,
    ) -> Result<RefundRequest, MarketplaceError> {
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::MissingField("reason").into());
        }
        let order = self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        let paid = match self.db.fetch_payment(order_id).await? {
            Some(payment) => payment.amount,
            None => order.price.ok_or(MarketplaceError::PriceNotSet(order_id))?,
        };
        if amount > paid {
            return Err(ValidationError::RefundExceedsPayment { requested: amount, paid }.into());
        }
        let now = self.clock.now();
        let refund = NewRefund {
            order_id,
            customer_id: order.customer_id,
            amount,
            reason: reason.to_string(),
            requested_by: Actor::Admin(admin_id),
        };
        let refund = self.db.insert_refund(refund, paid, now).await?;
        info!("💸️ Admin #{admin_id} opened refund #{} of {amount} for order {order_id}", refund.id);
        let subject = Subject::customer(order.customer_id);
        let action = PendingAction::ProvideCardDetails { refund_id: refund.id };
        if let Err(e) = self.db.set_pending_action(subject, &action, now + self.policy.pending_action_ttl, now).await {
            warn!("💸️ Could not ask {subject} for card details for refund #{}: {e}", refund.id);
        }
        let kind = NotificationKind::RefundCardRequested { refund_id: refund.id, order_id, amount };
        self.producers.notify(subject.into(), kind).await;
        Ok(refund)
    }

    /// Handles a card number typed into the chat by a customer who was asked for one.
    pub async fn provide_card(&self, customer_id: i64, card: Secret<String>) -> Result<RefundRequest, MarketplaceError> {
        let subject = Subject::customer(customer_id);
        match self.db.peek_pending_action(subject, self.clock.now()).await? {
            Some(PendingAction::ProvideCardDetails { refund_id }) => {
                self.submit_payout_card(refund_id, customer_id, card).await
            },
            _ => Err(ValidationError::Other("no refund is waiting for card details".into()).into()),
        }
    }

    pub async fn submit_payout_card(
        &self,
        refund_id: i64,
        customer_id: i64,
        card: Secret<String>,
    ) -> Result<RefundRequest, MarketplaceError> {
        let card = normalize_card_number(&card)?;
        let ciphertext = self
            .cipher
            .encrypt(&card)
            .map_err(|e| MarketplaceError::DatabaseError(format!("Could not encrypt the payout card: {e}")))?;
        let refund = self.db.store_payout_card(refund_id, customer_id, &ciphertext, self.clock.now()).await?;
        info!("💸️ Customer #{customer_id} gave card {} for refund #{refund_id}", card.masked());
        let subject = Subject::customer(customer_id);
        let action = PendingAction::ProvideCardDetails { refund_id };
        if let Err(e) = self.db.clear_pending_action(subject, &action).await {
            warn!("💸️ Could not close the card conversation for {subject}: {e}");
        }
        let kind = NotificationKind::RefundAwaitingTransfer { refund_id, order_id: refund.order_id };
        self.producers.notify(Recipient::admins(), kind).await;
        Ok(refund)
    }

    /// The admin has transferred the money.
    pub async fn complete_refund(&self, refund_id: i64, admin_id: i64) -> Result<RefundRequest, MarketplaceError> {
        let refund = self.db.complete_refund(refund_id, Actor::Admin(admin_id), self.clock.now()).await?;
        info!("💸️ Admin #{admin_id} paid out refund #{refund_id} ({})", refund.amount);
        let kind = NotificationKind::RefundCompleted { refund_id, amount: refund.amount };
        self.producers.notify(Recipient::customer(refund.customer_id), kind).await;
        Ok(refund)
    }

    /// The customer does not want the refund. This is final; a new refund needs a new request from an admin.
    pub async fn decline_refund(&self, refund_id: i64, customer_id: i64) -> Result<RefundRequest, MarketplaceError> {
        let refund = self.db.decline_refund(refund_id, customer_id, self.clock.now()).await?;
        info!("💸️ Customer #{customer_id} declined refund #{refund_id}");
        let subject = Subject::customer(customer_id);
        if let Err(e) = self.db.clear_pending_action(subject, &PendingAction::ProvideCardDetails { refund_id }).await {
            warn!("💸️ Could not close the card conversation for {subject}: {e}");
        }
        self.producers.notify(Recipient::admins(), NotificationKind::RefundDeclined { refund_id }).await;
        Ok(refund)
    }

    pub async fn refund(&self, refund_id: i64) -> Result<RefundRequest, MarketplaceError> {
        self.db.fetch_refund(refund_id).await?.ok_or(MarketplaceError::RefundNotFound(refund_id))
    }

    pub async fn refunds(&self, status: Option<RefundStatus>) -> Result<Vec<RefundRequest>, MarketplaceError> {
        self.db.fetch_refunds(status).await
    }

    /// Decrypts the payout card so an admin can make the transfer.
    pub async fn reveal_payout_card(&self, refund_id: i64) -> Result<Secret<String>, MarketplaceError> {
        let refund = self.refund(refund_id).await?;
        let ciphertext = refund
            .payout_card
            .ok_or_else(|| ValidationError::Other(format!("refund #{refund_id} has no payout card yet")))?;
        let card = self
            .cipher
            .decrypt(&ciphertext)
            .map_err(|e| MarketplaceError::DatabaseError(format!("Could not decrypt the payout card: {e}")))?;
        debug!("💸️ Payout card for refund #{refund_id} revealed");
        Ok(card)
    }
}
