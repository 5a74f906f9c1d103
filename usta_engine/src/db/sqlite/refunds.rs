use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Actor, Azn, NewRefund, OrderId, RefundRequest, RefundStatus},
    market_api::errors::MarketplaceError,
};

pub async fn insert(refund: NewRefund, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<RefundRequest, MarketplaceError> {
    let refund = sqlx::query_as(
        r#"
            INSERT INTO refund_requests (order_id, customer_id, amount, reason, status, requested_by, created_at,
                                         updated_at)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $6)
            RETURNING *;
        "#,
    )
    .bind(refund.order_id)
    .bind(refund.customer_id)
    .bind(refund.amount)
    .bind(refund.reason)
    .bind(refund.requested_by.to_string())
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(refund)
}

/// Sum of the order's refunds that have not been declined.
pub async fn committed_total(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Azn, MarketplaceError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM refund_requests WHERE order_id = $1 AND status != 'declined'",
    )
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(Azn::from_qepik(total))
}

pub async fn fetch(id: i64, conn: &mut SqliteConnection) -> Result<Option<RefundRequest>, MarketplaceError> {
    let refund = sqlx::query_as("SELECT * FROM refund_requests WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(refund)
}

pub async fn fetch_by_status(
    status: Option<RefundStatus>,
    conn: &mut SqliteConnection,
) -> Result<Vec<RefundRequest>, MarketplaceError> {
    let refunds = sqlx::query_as("SELECT * FROM refund_requests WHERE ($1 IS NULL OR status = $1) ORDER BY id")
        .bind(status)
        .fetch_all(conn)
        .await?;
    Ok(refunds)
}

/// `pending` -> `pending_admin`, storing the (already encrypted) payout card.
pub async fn store_payout_card(
    id: i64,
    customer_id: i64,
    ciphertext: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRequest>, MarketplaceError> {
    let refund = sqlx::query_as(
        r#"
            UPDATE refund_requests SET payout_card = $1, status = 'pending_admin', updated_at = $2
            WHERE id = $3 AND customer_id = $4 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(ciphertext)
    .bind(now)
    .bind(id)
    .bind(customer_id)
    .fetch_optional(conn)
    .await?;
    Ok(refund)
}

/// `pending_admin` -> `completed`, once the admin has made the transfer.
pub async fn complete(
    id: i64,
    admin: Actor,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRequest>, MarketplaceError> {
    let refund = sqlx::query_as(
        r#"
            UPDATE refund_requests SET status = 'completed', completed_by = $1, completed_at = $2, updated_at = $2
            WHERE id = $3 AND status = 'pending_admin'
            RETURNING *;
        "#,
    )
    .bind(admin.to_string())
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(refund)
}

/// Customer declines a refund that has not been paid out yet.
pub async fn decline(
    id: i64,
    customer_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRequest>, MarketplaceError> {
    let refund = sqlx::query_as(
        r#"
            UPDATE refund_requests SET status = 'declined', updated_at = $1
            WHERE id = $2 AND customer_id = $3 AND status IN ('pending', 'pending_admin')
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(id)
    .bind(customer_id)
    .fetch_optional(conn)
    .await?;
    Ok(refund)
}
