use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Actor, OrderEvent, OrderId, OrderStatusType},
    market_api::errors::MarketplaceError,
};

/// Appends an entry to the order's audit trail. Callers run this inside the same transaction as the change it
/// describes.
#[allow(clippy::too_many_arguments)]
pub async fn record(
    order_id: OrderId,
    actor: Actor,
    action: &str,
    from_status: Option<OrderStatusType>,
    to_status: Option<OrderStatusType>,
    detail: Option<String>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), MarketplaceError> {
    sqlx::query(
        r#"
            INSERT INTO order_events (order_id, actor, action, from_status, to_status, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(order_id)
    .bind(actor.to_string())
    .bind(action)
    .bind(from_status)
    .bind(to_status)
    .bind(detail)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_for_order(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderEvent>, MarketplaceError> {
    let events = sqlx::query_as("SELECT * FROM order_events WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(events)
}
