//! Low-level queries on the `orders` table.
//!
//! Every state-changing function here is a single conditional `UPDATE ... WHERE <guard> RETURNING *`. A `None` result
//! means the guard did not hold (or the order does not exist); the caller decides which error that maps to.
use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{Azn, NewOrder, Order, OrderId, OrderStatusType},
    market_api::{errors::MarketplaceError, order_objects::OrderQueryFilter},
};

pub async fn insert_order(
    order: NewOrder,
    place_name: Option<String>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, MarketplaceError> {
    let status = match order.artisan_id {
        Some(_) => OrderStatusType::Pending,
        None => OrderStatusType::Searching,
    };
    let (lat, lon) = order.location.map(|p| (Some(p.latitude), Some(p.longitude))).unwrap_or((None, None));
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                customer_id, artisan_id, service, subservice, requested_for, note, latitude, longitude, place_name,
                status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *;
        "#,
    )
    .bind(order.customer_id)
    .bind(order.artisan_id)
    .bind(order.service)
    .bind(order.subservice)
    .bind(order.requested_for)
    .bind(order.note)
    .bind(lat)
    .bind(lon)
    .bind(place_name)
    .bind(status)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order(id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, MarketplaceError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `id` in ascending order
pub async fn fetch_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, MarketplaceError> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(id) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(id);
    }
    if let Some(id) = query.artisan_id {
        where_clause.push("artisan_id = ");
        where_clause.push_bind_unseparated(id);
    }
    if let Some(service) = query.service {
        where_clause.push("service = ");
        where_clause.push_bind_unseparated(service);
    }
    if !query.statuses.is_empty() {
        where_clause.push("status IN (");
        for (i, status) in query.statuses.iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(*status);
        }
        where_clause.push_unseparated(")");
    }
    builder.push(" ORDER BY id ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of fetch_orders: {}", orders.len());
    Ok(orders)
}

/// Accepts a `pending` order that is already bound to this artisan.
pub async fn accept_bound_order(
    id: OrderId,
    artisan_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, MarketplaceError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET status = 'accepted', updated_at = $1
            WHERE id = $2 AND status = 'pending' AND artisan_id = $3
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(id)
    .bind(artisan_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Binds the artisan to a `searching` order they were offered and moves it to `accepted`, but only if nobody is bound
/// yet. This is the accept-race guard: two concurrent callers cannot both see a row come back.
pub async fn accept_open_order(
    id: OrderId,
    artisan_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, MarketplaceError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET artisan_id = $1, status = 'accepted', updated_at = $2
            WHERE id = $3 AND status = 'searching' AND artisan_id IS NULL
              AND EXISTS (
                SELECT 1 FROM dispatches d WHERE d.order_id = $3 AND d.artisan_id = $1 AND d.status = 'sent'
              )
            RETURNING *;
        "#,
    )
    .bind(artisan_id)
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// The bound artisan turns down a `pending` order. With `unbind` the order returns to `searching`, otherwise it is
/// cancelled.
pub async fn reject_order(
    id: OrderId,
    artisan_id: i64,
    unbind: bool,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, MarketplaceError> {
    let sql = if unbind {
        r#"UPDATE orders SET artisan_id = NULL, status = 'searching', updated_at = $1
           WHERE id = $2 AND artisan_id = $3 AND status = 'pending' RETURNING *"#
    } else {
        r#"UPDATE orders SET status = 'cancelled', updated_at = $1
           WHERE id = $2 AND artisan_id = $3 AND status = 'pending' RETURNING *"#
    };
    let order = sqlx::query_as(sql).bind(now).bind(id).bind(artisan_id).fetch_optional(conn).await?;
    Ok(order)
}

/// Unbinds an artisan from an accepted order and puts it back to `searching`. Any negotiated price is dropped, since
/// the next artisan will quote their own.
pub async fn release_order(
    id: OrderId,
    artisan_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, MarketplaceError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET artisan_id = NULL, price = NULL, status = 'searching', updated_at = $1
            WHERE id = $2 AND artisan_id = $3 AND status = 'accepted'
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(id)
    .bind(artisan_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn set_price(
    id: OrderId,
    artisan_id: i64,
    price: Azn,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, MarketplaceError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET price = $1, updated_at = $2
            WHERE id = $3 AND artisan_id = $4 AND status = 'accepted'
            RETURNING *;
        "#,
    )
    .bind(price)
    .bind(now)
    .bind(id)
    .bind(artisan_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Completes an accepted, priced order. When `artisan_id` is given, the order must be bound to that artisan.
pub async fn complete_order(
    id: OrderId,
    artisan_id: Option<i64>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, MarketplaceError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET status = 'completed', completed_at = $1, updated_at = $1
            WHERE id = $2 AND status = 'accepted' AND price IS NOT NULL AND ($3 IS NULL OR artisan_id = $3)
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(id)
    .bind(artisan_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Moves an order from exactly `from` to `to`, optionally only if it belongs to the given customer or artisan. Used
/// for cancellations and admin overrides, where the caller has already decided the transition is allowed and only
/// needs protection against a concurrent change.
///
/// The order invariants still hold here: nothing reaches `completed` without a price, and nothing is `accepted` or
/// `completed` without an artisan.
#[allow(clippy::too_many_arguments)]
pub async fn transition(
    id: OrderId,
    from: OrderStatusType,
    to: OrderStatusType,
    customer_id: Option<i64>,
    artisan_id: Option<i64>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, MarketplaceError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                updated_at = $2,
                completed_at = CASE WHEN $1 = 'completed' THEN COALESCE(completed_at, $2) ELSE completed_at END
            WHERE id = $3 AND status = $4
              AND ($5 IS NULL OR customer_id = $5)
              AND ($6 IS NULL OR artisan_id = $6)
              AND ($1 <> 'completed' OR price IS NOT NULL)
              AND ($1 NOT IN ('accepted', 'completed') OR artisan_id IS NOT NULL)
            RETURNING *;
        "#,
    )
    .bind(to)
    .bind(now)
    .bind(id)
    .bind(from)
    .bind(customer_id)
    .bind(artisan_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Stamps `review_requested_at` once. Returns false if a request was already sent, the order is not completed, or the
/// customer has already left a review.
pub async fn mark_review_requested(
    id: OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, MarketplaceError> {
    let result = sqlx::query(
        r#"
            UPDATE orders SET review_requested_at = $1
            WHERE id = $2 AND status = 'completed' AND review_requested_at IS NULL
              AND NOT EXISTS (SELECT 1 FROM reviews r WHERE r.order_id = $2)
        "#,
    )
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
