use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::{
    blocks,
    db_url,
    dispatches,
    escalations,
    new_pool,
    order_events,
    orders,
    participants,
    payments,
    pending_actions,
    refunds,
    reviews,
};
use crate::{
    db::traits::{
        AcceptedOrder,
        BlockManagement,
        CancelGuard,
        ConversationManagement,
        MarketplaceDatabase,
        OrderManagement,
        OrderTransition,
        ParticipantManagement,
        PaymentManagement,
        PricedOrder,
        ReceiptDecision,
        ReceiptResolved,
        ReceiptSaved,
        RefundManagement,
    },
    db_types::{
        Actor,
        Artisan,
        Azn,
        BlockRecord,
        Customer,
        Dispatch,
        DispatchStatus,
        EscalationKind,
        EscalationTask,
        GeoPoint,
        NewArtisan,
        NewBlock,
        NewCustomer,
        NewEscalation,
        NewOrder,
        NewPriceRange,
        NewRefund,
        Order,
        OrderEvent,
        OrderId,
        OrderPayment,
        OrderStatusType,
        PaymentMethod,
        PaymentStatus,
        PendingAction,
        PriceRange,
        ReceiptKind,
        RefundRequest,
        RefundStatus,
        Review,
        Subject,
        SubjectType,
    },
    helpers::{BoundingBox, Commission},
    market_api::{
        errors::{MarketplaceError, ValidationError},
        order_objects::OrderQueryFilter,
    },
};

const DEFAULT_MAX_CONNECTIONS: u32 = 25;

const ALL_STATUSES: [OrderStatusType; 5] = [
    OrderStatusType::Searching,
    OrderStatusType::Pending,
    OrderStatusType::Accepted,
    OrderStatusType::Completed,
    OrderStatusType::Cancelled,
];

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `USTA_DATABASE_URL`.
    pub async fn new() -> Result<Self, MarketplaceError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, MarketplaceError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

}

//--------------------------------------  Guard explanations  ---------------------------------------------------------
// A conditional update that matches no rows does not say why. These re-read the row and turn the reason into a
// meaningful error.

async fn explain_order_guard(
    order_id: OrderId,
    artisan_id: Option<i64>,
    action: &'static str,
    conn: &mut SqliteConnection,
) -> MarketplaceError {
    match orders::fetch_order(order_id, conn).await {
        Err(e) => e,
        Ok(None) => MarketplaceError::OrderNotFound(order_id),
        Ok(Some(order)) => match artisan_id {
            Some(id) if !order.is_bound_to(id) => MarketplaceError::NotAssigned { order_id, artisan_id: id },
            _ => MarketplaceError::InvalidTransition { order_id, status: order.status, action },
        },
    }
}

async fn explain_accept(order_id: OrderId, artisan_id: i64, conn: &mut SqliteConnection) -> MarketplaceError {
    use OrderStatusType::*;
    let order = match orders::fetch_order(order_id, conn).await {
        Err(e) => return e,
        Ok(None) => return MarketplaceError::OrderNotFound(order_id),
        Ok(Some(o)) => o,
    };
    match (order.status, order.artisan_id) {
        (status, Some(id)) if id == artisan_id => {
            MarketplaceError::InvalidTransition { order_id, status, action: "accepted" }
        },
        (Accepted | Completed, Some(_)) => MarketplaceError::OrderNoLongerAvailable(order_id),
        (Searching, None) | (Pending, Some(_)) => MarketplaceError::NotAssigned { order_id, artisan_id },
        (status, _) => MarketplaceError::InvalidTransition { order_id, status, action: "accepted" },
    }
}

async fn explain_payment_guard(order_id: OrderId, conn: &mut SqliteConnection) -> MarketplaceError {
    match payments::fetch_payment(order_id, conn).await {
        Err(e) => e,
        Ok(None) => MarketplaceError::PaymentNotFound(order_id),
        Ok(Some(p)) if p.is_finalized() => MarketplaceError::PaymentFinalized(order_id),
        Ok(Some(_)) => MarketplaceError::NoReceiptPending(order_id),
    }
}

async fn explain_price_guard(order_id: OrderId, conn: &mut SqliteConnection) -> MarketplaceError {
    match payments::fetch_payment(order_id, conn).await {
        Err(e) => e,
        Ok(Some(p)) if p.receipt_file_id.is_some() && p.receipt_verified.is_none() => {
            MarketplaceError::ReceiptUnderReview(order_id)
        },
        Ok(_) => MarketplaceError::PaymentFinalized(order_id),
    }
}

async fn explain_refund_guard(id: i64, customer_id: Option<i64>, conn: &mut SqliteConnection) -> MarketplaceError {
    match refunds::fetch(id, conn).await {
        Err(e) => e,
        Ok(None) => MarketplaceError::RefundNotFound(id),
        // Someone else's refund is reported as missing
        Ok(Some(r)) if customer_id.map(|c| c != r.customer_id).unwrap_or(false) => MarketplaceError::RefundNotFound(id),
        Ok(Some(r)) => MarketplaceError::RefundStatusMismatch { id, status: r.status },
    }
}

fn subject_not_found(subject: Subject) -> MarketplaceError {
    match subject.kind {
        SubjectType::Customer => MarketplaceError::CustomerNotFound(subject.id),
        SubjectType::Artisan => MarketplaceError::ArtisanNotFound(subject.id),
    }
}

/// Deactivates the subject and records the block, folding it into the open record if there is one.
async fn apply_block(block: &NewBlock, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<BlockRecord, MarketplaceError> {
    if !participants::set_active(block.subject, false, now, &mut *conn).await? {
        return Err(subject_not_found(block.subject));
    }
    let record = match blocks::extend_active(block, &mut *conn).await? {
        Some(record) => {
            debug!("⛔️ {} was already blocked. The open block now requires {}", block.subject, record.required_payment);
            record
        },
        None => blocks::insert(block, now, &mut *conn).await?,
    };
    Ok(record)
}

/// The party who is on the hook for a receipt of the given kind.
fn receipt_subject(order: &Order, kind: ReceiptKind) -> Result<i64, MarketplaceError> {
    match kind {
        ReceiptKind::CardPayment => Ok(order.customer_id),
        ReceiptKind::CashCommission => order.artisan_id.ok_or(MarketplaceError::InvalidTransition {
            order_id: order.id,
            status: order.status,
            action: "settled by an artisan",
        }),
    }
}

//--------------------------------------      Participants      ---------------------------------------------------------
impl ParticipantManagement for SqliteDatabase {
    async fn insert_customer(&self, customer: NewCustomer, now: DateTime<Utc>) -> Result<Customer, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let customer = participants::insert_customer(customer, now, &mut conn).await?;
        debug!("🗃️ Customer #{} registered", customer.id);
        Ok(customer)
    }

    async fn fetch_customer(&self, id: i64) -> Result<Option<Customer>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        participants::fetch_customer(id, &mut conn).await
    }

    async fn fetch_customer_by_chat_id(&self, chat_id: &str) -> Result<Option<Customer>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        participants::fetch_customer_by_chat_id(chat_id, &mut conn).await
    }

    async fn insert_artisan(&self, artisan: NewArtisan, now: DateTime<Utc>) -> Result<Artisan, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let artisan = participants::insert_artisan(artisan, now, &mut conn).await?;
        debug!("🗃️ Artisan #{} registered for {}", artisan.id, artisan.service);
        Ok(artisan)
    }

    async fn fetch_artisan(&self, id: i64) -> Result<Option<Artisan>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        participants::fetch_artisan(id, &mut conn).await
    }

    async fn fetch_artisan_by_chat_id(&self, chat_id: &str) -> Result<Option<Artisan>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        participants::fetch_artisan_by_chat_id(chat_id, &mut conn).await
    }

    async fn update_artisan_location(
        &self,
        id: i64,
        location: GeoPoint,
        now: DateTime<Utc>,
    ) -> Result<Artisan, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        participants::update_artisan_location(id, location, now, &mut conn)
            .await?
            .ok_or(MarketplaceError::ArtisanNotFound(id))
    }

    async fn upsert_price_range(&self, range: NewPriceRange, now: DateTime<Utc>) -> Result<PriceRange, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        participants::upsert_price_range(range, now, &mut conn).await
    }

    async fn remove_price_range(
        &self,
        artisan_id: i64,
        subservice: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        participants::deactivate_price_range(artisan_id, subservice, now, &mut conn).await
    }

    async fn fetch_price_range(
        &self,
        artisan_id: i64,
        subservice: &str,
    ) -> Result<Option<PriceRange>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        participants::fetch_price_range(artisan_id, subservice, &mut conn).await
    }

    async fn fetch_price_ranges(&self, artisan_id: i64) -> Result<Vec<PriceRange>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        participants::fetch_price_ranges(artisan_id, &mut conn).await
    }

    async fn fetch_artisans_in_box(
        &self,
        service: &str,
        subservice: Option<&str>,
        bbox: &BoundingBox,
    ) -> Result<Vec<Artisan>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        participants::fetch_artisans_in_box(service, subservice, bbox, &mut conn).await
    }
}

//--------------------------------------         Orders         ---------------------------------------------------------
impl OrderManagement for SqliteDatabase {
    async fn insert_order(
        &self,
        order: NewOrder,
        place_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let bound_to = order.artisan_id;
        let actor = Actor::Customer(order.customer_id);
        let order = orders::insert_order(order, place_name, now, &mut tx).await?;
        order_events::record(order.id, actor, "created", None, Some(order.status), None, now, &mut tx).await?;
        if let Some(artisan_id) = bound_to {
            dispatches::upsert_dispatch(order.id, artisan_id, None, now, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order {} inserted with status {}", order.id, order.status);
        Ok(order)
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(id, &mut conn).await
    }

    async fn fetch_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders(query, &mut conn).await
    }

    async fn record_dispatch(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        distance_km: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Dispatch, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        dispatches::upsert_dispatch(order_id, artisan_id, distance_km, now, &mut conn).await
    }

    async fn fetch_dispatches(&self, order_id: OrderId) -> Result<Vec<Dispatch>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        dispatches::fetch_for_order(order_id, &mut conn).await
    }

    async fn accept_order(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AcceptedOrder, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let (order, old_status) = match orders::accept_bound_order(order_id, artisan_id, now, &mut tx).await? {
            Some(order) => (order, OrderStatusType::Pending),
            None => match orders::accept_open_order(order_id, artisan_id, now, &mut tx).await? {
                Some(order) => (order, OrderStatusType::Searching),
                None => return Err(explain_accept(order_id, artisan_id, &mut tx).await),
            },
        };
        dispatches::update_status(order_id, artisan_id, &[DispatchStatus::Sent], DispatchStatus::Accepted, now, &mut tx)
            .await?;
        let withdrawn = dispatches::supersede_open(order_id, Some(artisan_id), now, &mut tx).await?;
        order_events::record(
            order_id,
            Actor::Artisan(artisan_id),
            "accepted",
            Some(old_status),
            Some(order.status),
            None,
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} accepted by artisan #{artisan_id}. {} other offers withdrawn", withdrawn.len());
        Ok(AcceptedOrder { order, old_status, withdrawn })
    }

    async fn decline_offer(&self, order_id: OrderId, artisan_id: i64, now: DateTime<Utc>) -> Result<(), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let declined =
            dispatches::update_status(order_id, artisan_id, &[DispatchStatus::Sent], DispatchStatus::Declined, now, &mut tx)
                .await?;
        if !declined {
            return match dispatches::fetch_dispatch(order_id, artisan_id, &mut tx).await? {
                Some(d) if d.status == DispatchStatus::Declined => Ok(()),
                Some(d) if d.status == DispatchStatus::Superseded => Err(MarketplaceError::OrderNoLongerAvailable(order_id)),
                Some(_) => Err(explain_order_guard(order_id, Some(artisan_id), "declined", &mut tx).await),
                None => match orders::fetch_order(order_id, &mut tx).await? {
                    Some(_) => Err(MarketplaceError::NotAssigned { order_id, artisan_id }),
                    None => Err(MarketplaceError::OrderNotFound(order_id)),
                },
            };
        }
        order_events::record(order_id, Actor::Artisan(artisan_id), "offer_declined", None, None, None, now, &mut tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reject_order(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        reassign: bool,
        now: DateTime<Utc>,
    ) -> Result<OrderTransition, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::reject_order(order_id, artisan_id, reassign, now, &mut tx).await? {
            Some(order) => order,
            None => return Err(explain_order_guard(order_id, Some(artisan_id), "rejected", &mut tx).await),
        };
        let from = [DispatchStatus::Sent, DispatchStatus::Accepted];
        dispatches::update_status(order_id, artisan_id, &from, DispatchStatus::Declined, now, &mut tx).await?;
        let withdrawn = if reassign {
            Vec::new()
        } else {
            escalations::cancel(order_id, None, now, &mut tx).await?;
            dispatches::supersede_open(order_id, None, now, &mut tx).await?
        };
        order_events::record(
            order_id,
            Actor::Artisan(artisan_id),
            "rejected",
            Some(OrderStatusType::Pending),
            Some(order.status),
            None,
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} rejected by artisan #{artisan_id}. It is now {}", order.status);
        Ok(OrderTransition { order, old_status: OrderStatusType::Pending, withdrawn })
    }

    async fn release_order(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        now: DateTime<Utc>,
    ) -> Result<OrderTransition, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::release_order(order_id, artisan_id, now, &mut tx).await? {
            Some(order) => order,
            None => return Err(explain_order_guard(order_id, Some(artisan_id), "released", &mut tx).await),
        };
        let from = [DispatchStatus::Accepted];
        dispatches::update_status(order_id, artisan_id, &from, DispatchStatus::Failed, now, &mut tx).await?;
        let dropped = payments::delete_open(order_id, &mut tx).await?;
        let cancelled = escalations::cancel(order_id, None, now, &mut tx).await?;
        order_events::record(
            order_id,
            Actor::Artisan(artisan_id),
            "released",
            Some(OrderStatusType::Accepted),
            Some(order.status),
            Some("artisan cannot arrive".into()),
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        debug!(
            "🗃️ Order {order_id} released by artisan #{artisan_id}. Payment dropped: {dropped}. Escalations cancelled: \
             {cancelled}"
        );
        Ok(OrderTransition { order, old_status: OrderStatusType::Accepted, withdrawn: Vec::new() })
    }

    async fn set_order_price(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        commission: &Commission,
        now: DateTime<Utc>,
    ) -> Result<PricedOrder, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::set_price(order_id, artisan_id, commission.amount, now, &mut tx).await? {
            Some(order) => order,
            None => return Err(explain_order_guard(order_id, Some(artisan_id), "priced", &mut tx).await),
        };
        let payment = match payments::upsert_priced(order_id, commission, now, &mut tx).await? {
            Some(payment) => payment,
            None => return Err(explain_price_guard(order_id, &mut tx).await),
        };
        let detail = format!("{} ({} commission, fee {})", commission.amount, commission.rate, commission.admin_fee);
        order_events::record(order_id, Actor::Artisan(artisan_id), "price_set", None, None, Some(detail), now, &mut tx)
            .await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} priced at {}", commission.amount);
        Ok(PricedOrder { order, payment })
    }

    async fn complete_order(
        &self,
        order_id: OrderId,
        artisan_id: Option<i64>,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<OrderTransition, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::complete_order(order_id, artisan_id, now, &mut tx).await? {
            Some(order) => order,
            None => {
                return match orders::fetch_order(order_id, &mut tx).await? {
                    Some(o) if o.status == OrderStatusType::Accepted && o.price.is_none() => {
                        Err(MarketplaceError::PriceNotSet(order_id))
                    },
                    _ => Err(explain_order_guard(order_id, artisan_id, "completed", &mut tx).await),
                };
            },
        };
        order_events::record(
            order_id,
            actor,
            "completed",
            Some(OrderStatusType::Accepted),
            Some(OrderStatusType::Completed),
            None,
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} completed by {actor}");
        Ok(OrderTransition { order, old_status: OrderStatusType::Accepted, withdrawn: Vec::new() })
    }

    async fn cancel_order(
        &self,
        order_id: OrderId,
        guard: CancelGuard,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<OrderTransition, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let mut cancelled = None;
        for from in &guard.allowed_from {
            let to = OrderStatusType::Cancelled;
            if let Some(order) =
                orders::transition(order_id, *from, to, guard.customer_id, guard.artisan_id, now, &mut tx).await?
            {
                cancelled = Some((order, *from));
                break;
            }
        }
        let Some((order, old_status)) = cancelled else {
            let err = match orders::fetch_order(order_id, &mut tx).await? {
                None => MarketplaceError::OrderNotFound(order_id),
                Some(o) if guard.customer_id.map(|c| c != o.customer_id).unwrap_or(false) => {
                    MarketplaceError::NotOwner { order_id, customer_id: o.customer_id }
                },
                Some(o) => match guard.artisan_id {
                    Some(a) if !o.is_bound_to(a) => MarketplaceError::NotAssigned { order_id, artisan_id: a },
                    _ => MarketplaceError::InvalidTransition { order_id, status: o.status, action: "cancelled" },
                },
            };
            return Err(err);
        };
        let withdrawn = dispatches::supersede_open(order_id, None, now, &mut tx).await?;
        escalations::cancel(order_id, None, now, &mut tx).await?;
        order_events::record(order_id, actor, "cancelled", Some(old_status), Some(order.status), None, now, &mut tx)
            .await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} cancelled by {actor} (was {old_status})");
        Ok(OrderTransition { order, old_status, withdrawn })
    }

    async fn force_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatusType,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<OrderTransition, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let mut changed = None;
        for from in ALL_STATUSES.iter().filter(|s| **s != status) {
            if let Some(order) = orders::transition(order_id, *from, status, None, None, now, &mut tx).await? {
                changed = Some((order, *from));
                break;
            }
        }
        let Some((order, old_status)) = changed else {
            let err = match orders::fetch_order(order_id, &mut tx).await? {
                None => MarketplaceError::OrderNotFound(order_id),
                Some(o) if status == OrderStatusType::Completed && o.price.is_none() => {
                    MarketplaceError::PriceNotSet(order_id)
                },
                Some(o) => MarketplaceError::InvalidTransition { order_id, status: o.status, action: "overridden" },
            };
            return Err(err);
        };
        let withdrawn = match status {
            OrderStatusType::Cancelled => {
                escalations::cancel(order_id, None, now, &mut tx).await?;
                dispatches::supersede_open(order_id, None, now, &mut tx).await?
            },
            OrderStatusType::Accepted | OrderStatusType::Completed => {
                dispatches::supersede_open(order_id, order.artisan_id, now, &mut tx).await?
            },
            _ => Vec::new(),
        };
        order_events::record(order_id, actor, "status_override", Some(old_status), Some(status), None, now, &mut tx)
            .await?;
        tx.commit().await?;
        info!("🗃️ Order {order_id} moved from {old_status} to {status} by {actor}");
        Ok(OrderTransition { order, old_status, withdrawn })
    }

    async fn mark_review_requested(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<bool, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        orders::mark_review_requested(order_id, now, &mut conn).await
    }

    async fn insert_review(
        &self,
        order_id: OrderId,
        customer_id: i64,
        rating: i64,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Review, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        match reviews::insert_review(order_id, customer_id, rating, comment, now, &mut conn).await? {
            Some(review) => Ok(review),
            None => match orders::fetch_order(order_id, &mut conn).await? {
                None => Err(MarketplaceError::OrderNotFound(order_id)),
                Some(o) if o.customer_id != customer_id => Err(MarketplaceError::NotOwner { order_id, customer_id }),
                Some(_) if reviews::fetch_review(order_id, &mut conn).await?.is_some() => {
                    Err(MarketplaceError::AlreadyReviewed(order_id))
                },
                Some(o) => Err(MarketplaceError::InvalidTransition { order_id, status: o.status, action: "reviewed" }),
            },
        }
    }

    async fn fetch_review(&self, order_id: OrderId) -> Result<Option<Review>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        reviews::fetch_review(order_id, &mut conn).await
    }

    async fn fetch_order_events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        order_events::fetch_for_order(order_id, &mut conn).await
    }
}

//--------------------------------------        Payments        ---------------------------------------------------------
impl PaymentManagement for SqliteDatabase {
    async fn fetch_payment(&self, order_id: OrderId) -> Result<Option<OrderPayment>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(order_id, &mut conn).await
    }

    async fn set_payment_method(
        &self,
        order_id: OrderId,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<OrderPayment, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let payment = match payments::set_method(order_id, method, now, &mut tx).await? {
            Some(p) => p,
            None => return Err(explain_payment_guard(order_id, &mut tx).await),
        };
        let detail = Some(method.to_string());
        order_events::record(order_id, Actor::System, "payment_method", None, None, detail, now, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn save_receipt(
        &self,
        order_id: OrderId,
        file_id: &str,
        actor: Actor,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ReceiptSaved, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let payment = match payments::save_receipt(order_id, file_id, now, &mut tx).await? {
            Some(p) => p,
            None => return Err(explain_payment_guard(order_id, &mut tx).await),
        };
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        let kind = payment.receipt_kind();
        let subject_id = receipt_subject(&order, kind)?;
        let task = NewEscalation { order_id, kind: kind.escalation_kind(), subject_id, due_at };
        let escalation = escalations::upsert(task, payment.receipt_version, now, &mut tx).await?;
        let detail = Some(format!("{kind} receipt v{}", payment.receipt_version));
        order_events::record(order_id, actor, "receipt_uploaded", None, None, detail, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🧾️ Receipt v{} saved for order {order_id}. Escalation due at {due_at}", payment.receipt_version);
        Ok(ReceiptSaved { payment, escalation })
    }

    async fn resolve_receipt(
        &self,
        order_id: OrderId,
        decision: ReceiptDecision,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<ReceiptResolved, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let result = match decision {
            ReceiptDecision::Approve => {
                let payment = match payments::approve_receipt(order_id, now, &mut tx).await? {
                    Some(p) => p,
                    None => return Err(explain_payment_guard(order_id, &mut tx).await),
                };
                let kind = payment.receipt_kind();
                escalations::cancel(order_id, Some(kind.escalation_kind()), now, &mut tx).await?;
                let detail = Some(format!("{kind} receipt v{}", payment.receipt_version));
                order_events::record(order_id, actor, "receipt_approved", None, None, detail, now, &mut tx).await?;
                ReceiptResolved { payment, escalation: None }
            },
            ReceiptDecision::Reject { due_at } => {
                let payment = match payments::reject_receipt(order_id, now, &mut tx).await? {
                    Some(p) => p,
                    None => return Err(explain_payment_guard(order_id, &mut tx).await),
                };
                let order =
                    orders::fetch_order(order_id, &mut tx).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
                let kind = payment.receipt_kind();
                let subject_id = receipt_subject(&order, kind)?;
                let task = NewEscalation { order_id, kind: kind.escalation_kind(), subject_id, due_at };
                let escalation = escalations::upsert(task, payment.receipt_version, now, &mut tx).await?;
                let detail = Some(format!("{kind} receipt v{}", payment.receipt_version));
                order_events::record(order_id, actor, "receipt_rejected", None, None, detail, now, &mut tx).await?;
                ReceiptResolved { payment, escalation: Some(escalation) }
            },
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_receipt_queue(
        &self,
        kind: Option<ReceiptKind>,
        include_rejected: bool,
    ) -> Result<Vec<OrderPayment>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        payments::receipt_queue(kind, include_rejected, &mut conn).await
    }

    async fn confirm_cash_received(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(OrderPayment, Option<EscalationTask>), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let payment = match payments::confirm_cash(order_id, artisan_id, now, &mut tx).await? {
            Some(p) => p,
            None => {
                let err = match payments::fetch_payment(order_id, &mut tx).await? {
                    None => MarketplaceError::PaymentNotFound(order_id),
                    Some(p) if p.payment_method != Some(PaymentMethod::Cash) => MarketplaceError::Validation(
                        ValidationError::Other(format!("Order {order_id} is not being paid in cash")),
                    ),
                    Some(p) if p.payment_status != PaymentStatus::Pending => MarketplaceError::PaymentFinalized(order_id),
                    Some(_) => explain_order_guard(order_id, Some(artisan_id), "settled in cash", &mut tx).await,
                };
                return Err(err);
            },
        };
        let escalation = if payment.admin_fee.is_positive() {
            let task = NewEscalation { order_id, kind: EscalationKind::CashCommission, subject_id: artisan_id, due_at };
            Some(escalations::upsert(task, payment.receipt_version, now, &mut tx).await?)
        } else {
            None
        };
        let detail = Some(format!("commission due {}", payment.admin_fee));
        order_events::record(order_id, Actor::Artisan(artisan_id), "cash_received", None, None, detail, now, &mut tx)
            .await?;
        tx.commit().await?;
        Ok((payment, escalation))
    }

    async fn fetch_escalation(
        &self,
        order_id: OrderId,
        kind: EscalationKind,
    ) -> Result<Option<EscalationTask>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        escalations::fetch(order_id, kind, &mut conn).await
    }

    async fn fetch_due_escalations(&self, now: DateTime<Utc>) -> Result<Vec<EscalationTask>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        escalations::fetch_due(now, &mut conn).await
    }

    async fn execute_escalation(
        &self,
        task: &EscalationTask,
        block: NewBlock,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockRecord>, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        if escalations::claim(task, now, &mut tx).await?.is_none() {
            let retired = escalations::retire_stale(task, now, &mut tx).await?;
            tx.commit().await?;
            debug!("🕰️ Escalation #{} for order {} is stale (retired: {retired})", task.id, task.order_id);
            return Ok(None);
        }
        let record = apply_block(&block, now, &mut tx).await?;
        let detail = Some(format!("{} blocked: {}", block.subject, block.reason));
        order_events::record(task.order_id, Actor::System, "escalated", None, None, detail, now, &mut tx).await?;
        tx.commit().await?;
        info!("⛔️ Escalation #{} fired. {} is blocked until {} is paid", task.id, block.subject, record.required_payment);
        Ok(Some(record))
    }

    async fn record_escalation_failure(
        &self,
        task_id: i64,
        error: &str,
        max_attempts: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<EscalationTask>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        escalations::record_failure(task_id, error, max_attempts, now, &mut conn).await
    }
}

//--------------------------------------         Blocks         ---------------------------------------------------------
impl BlockManagement for SqliteDatabase {
    async fn fetch_latest_block(&self, subject: Subject) -> Result<Option<BlockRecord>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        blocks::fetch_latest(subject, &mut conn).await
    }

    async fn fetch_block_history(&self, subject: Subject) -> Result<Vec<BlockRecord>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        blocks::fetch_history(subject, &mut conn).await
    }

    async fn block_subject(&self, block: NewBlock, now: DateTime<Utc>) -> Result<BlockRecord, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let record = apply_block(&block, now, &mut tx).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn unblock_subject(
        &self,
        subject: Subject,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockRecord>, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let Some(record) = blocks::lift(subject, actor, now, &mut tx).await? else {
            return Ok(None);
        };
        participants::set_active(subject, true, now, &mut tx).await?;
        tx.commit().await?;
        Ok(Some(record))
    }

    async fn fetch_expired_blocks(&self, now: DateTime<Utc>) -> Result<Vec<BlockRecord>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let records = blocks::fetch_open_timed(&mut conn).await?;
        Ok(records.into_iter().filter(|r| r.block_until.map(|t| t <= now).unwrap_or(false)).collect())
    }
}

//--------------------------------------        Refunds         ---------------------------------------------------------
impl RefundManagement for SqliteDatabase {
    async fn insert_refund(
        &self,
        refund: NewRefund,
        paid: Azn,
        now: DateTime<Utc>,
    ) -> Result<RefundRequest, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let already_refunded = refunds::committed_total(refund.order_id, &mut tx).await?;
        if already_refunded + refund.amount > paid {
            let requested = refund.amount;
            return Err(ValidationError::RefundsExceedPayment { requested, already_refunded, paid }.into());
        }
        let actor = refund.requested_by;
        let refund = refunds::insert(refund, now, &mut tx).await?;
        let detail = Some(format!("refund #{} of {}", refund.id, refund.amount));
        order_events::record(refund.order_id, actor, "refund_requested", None, None, detail, now, &mut tx).await?;
        tx.commit().await?;
        Ok(refund)
    }

    async fn fetch_refund(&self, id: i64) -> Result<Option<RefundRequest>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        refunds::fetch(id, &mut conn).await
    }

    async fn fetch_refunds(&self, status: Option<RefundStatus>) -> Result<Vec<RefundRequest>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        refunds::fetch_by_status(status, &mut conn).await
    }

    async fn store_payout_card(
        &self,
        id: i64,
        customer_id: i64,
        ciphertext: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundRequest, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        match refunds::store_payout_card(id, customer_id, ciphertext, now, &mut conn).await? {
            Some(refund) => Ok(refund),
            None => Err(explain_refund_guard(id, Some(customer_id), &mut conn).await),
        }
    }

    async fn complete_refund(&self, id: i64, admin: Actor, now: DateTime<Utc>) -> Result<RefundRequest, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let refund = match refunds::complete(id, admin, now, &mut tx).await? {
            Some(refund) => refund,
            None => return Err(explain_refund_guard(id, None, &mut tx).await),
        };
        let detail = Some(format!("refund #{id} of {}", refund.amount));
        order_events::record(refund.order_id, admin, "refund_completed", None, None, detail, now, &mut tx).await?;
        tx.commit().await?;
        Ok(refund)
    }

    async fn decline_refund(&self, id: i64, customer_id: i64, now: DateTime<Utc>) -> Result<RefundRequest, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        match refunds::decline(id, customer_id, now, &mut conn).await? {
            Some(refund) => Ok(refund),
            None => Err(explain_refund_guard(id, Some(customer_id), &mut conn).await),
        }
    }
}

//--------------------------------------     Conversations      ---------------------------------------------------------
impl ConversationManagement for SqliteDatabase {
    async fn set_pending_action(
        &self,
        subject: Subject,
        action: &PendingAction,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        pending_actions::upsert(subject, action, expires_at, now, &mut conn).await
    }

    async fn peek_pending_action(&self, subject: Subject, now: DateTime<Utc>) -> Result<Option<PendingAction>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        match pending_actions::fetch(subject, &mut conn).await? {
            Some(row) if row.expires_at > now => Ok(Some(row.decode()?)),
            _ => Ok(None),
        }
    }

    async fn take_pending_action(&self, subject: Subject, now: DateTime<Utc>) -> Result<Option<PendingAction>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        match pending_actions::take(subject, &mut conn).await? {
            Some(row) if row.expires_at > now => Ok(Some(row.decode()?)),
            Some(row) => {
                debug!("📬️ Discarding expired pending action for {subject}: {}", row.action);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn clear_pending_action(&self, subject: Subject, action: &PendingAction) -> Result<bool, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        pending_actions::clear_if(subject, action, &mut conn).await
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), MarketplaceError> {
        self.pool.close().await;
        Ok(())
    }
}
