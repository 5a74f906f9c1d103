use chrono::{DateTime, Utc};

use crate::{
    db::traits::{AcceptedOrder, CancelGuard, OrderTransition, PricedOrder},
    db_types::{Actor, Dispatch, NewOrder, Order, OrderEvent, OrderId, OrderStatusType, Review},
    helpers::Commission,
    market_api::{errors::MarketplaceError, order_objects::OrderQueryFilter},
};

#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Stores a new order. An order created for a specific artisan starts as `pending` and the artisan gets a dispatch
    /// row; otherwise it starts as `searching`.
    async fn insert_order(
        &self,
        order: NewOrder,
        place_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, MarketplaceError>;

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, MarketplaceError>;

    async fn fetch_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, MarketplaceError>;

    /// Records that an artisan has been offered the order.
    async fn record_dispatch(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        distance_km: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Dispatch, MarketplaceError>;

    async fn fetch_dispatches(&self, order_id: OrderId) -> Result<Vec<Dispatch>, MarketplaceError>;

    /// Atomically binds the artisan and accepts the order, superseding every other open offer.
    ///
    /// Fails with `OrderNoLongerAvailable` if someone else got there first, or `OrderNotFound`.
    async fn accept_order(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AcceptedOrder, MarketplaceError>;

    /// Turns down an open offer on a `searching` order. The order itself is untouched.
    async fn decline_offer(&self, order_id: OrderId, artisan_id: i64, now: DateTime<Utc>) -> Result<(), MarketplaceError>;

    /// The bound artisan rejects a `pending` order. With `reassign`, the order goes back to `searching`, otherwise it
    /// is cancelled.
    async fn reject_order(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        reassign: bool,
        now: DateTime<Utc>,
    ) -> Result<OrderTransition, MarketplaceError>;

    /// The bound artisan cannot make it to an accepted order. The order is unbound, loses its open payment and returns
    /// to `searching`. The artisan will not be offered this order again.
    async fn release_order(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        now: DateTime<Utc>,
    ) -> Result<OrderTransition, MarketplaceError>;

    /// Writes the price on the order and the commission split on its payment row in one transaction.
    async fn set_order_price(
        &self,
        order_id: OrderId,
        artisan_id: i64,
        commission: &Commission,
        now: DateTime<Utc>,
    ) -> Result<PricedOrder, MarketplaceError>;

    /// Completes an accepted order that has a price. When `artisan_id` is given, the order must be bound to them.
    async fn complete_order(
        &self,
        order_id: OrderId,
        artisan_id: Option<i64>,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<OrderTransition, MarketplaceError>;

    async fn cancel_order(
        &self,
        order_id: OrderId,
        guard: CancelGuard,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<OrderTransition, MarketplaceError>;

    /// Moves the order to `status` without the artisan-side guards. The caller validates the target status.
    async fn force_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatusType,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<OrderTransition, MarketplaceError>;

    /// Marks the review request as sent. Returns false if it already was, or if a review exists.
    async fn mark_review_requested(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<bool, MarketplaceError>;

    async fn insert_review(
        &self,
        order_id: OrderId,
        customer_id: i64,
        rating: i64,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Review, MarketplaceError>;

    async fn fetch_review(&self, order_id: OrderId) -> Result<Option<Review>, MarketplaceError>;

    async fn fetch_order_events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>, MarketplaceError>;
}
