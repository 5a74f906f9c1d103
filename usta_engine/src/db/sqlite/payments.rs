//! Low-level queries on `order_payments`.
//!
//! A payment is "open" while its status is `pending` and no receipt has been approved. Price and method changes are
//! only allowed on open payments.
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{OrderId, OrderPayment, PaymentMethod, ReceiptKind},
    helpers::Commission,
    market_api::errors::MarketplaceError,
};

/// Creates the payment row for a freshly priced order, or re-prices an open one. Returns `None` when the existing
/// payment is already settled or has a receipt awaiting review.
pub async fn upsert_priced(
    order_id: OrderId,
    commission: &Commission,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderPayment>, MarketplaceError> {
    let payment = sqlx::query_as(
        r#"
            INSERT INTO order_payments (order_id, amount, admin_fee, artisan_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (order_id) DO UPDATE SET
                amount = excluded.amount,
                admin_fee = excluded.admin_fee,
                artisan_amount = excluded.artisan_amount,
                updated_at = excluded.updated_at
            WHERE order_payments.payment_status = 'pending'
                AND COALESCE(order_payments.receipt_verified, 0) = 0
                AND (order_payments.receipt_file_id IS NULL OR order_payments.receipt_verified IS NOT NULL)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(commission.amount)
    .bind(commission.admin_fee)
    .bind(commission.artisan_amount)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

pub async fn fetch_payment(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Option<OrderPayment>, MarketplaceError> {
    let payment = sqlx::query_as("SELECT * FROM order_payments WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn set_method(
    order_id: OrderId,
    method: PaymentMethod,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderPayment>, MarketplaceError> {
    let payment = sqlx::query_as(
        r#"
            UPDATE order_payments SET payment_method = $1, updated_at = $2
            WHERE order_id = $3 AND payment_status = 'pending' AND COALESCE(receipt_verified, 0) = 0
            RETURNING *;
        "#,
    )
    .bind(method)
    .bind(now)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Stores a new receipt handle, overwriting any previous one. Verification goes back to pending and the receipt
/// version is bumped, which invalidates escalations scheduled against the old receipt.
pub async fn save_receipt(
    order_id: OrderId,
    file_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderPayment>, MarketplaceError> {
    let payment = sqlx::query_as(
        r#"
            UPDATE order_payments SET
                receipt_file_id = $1,
                receipt_verified = NULL,
                receipt_version = receipt_version + 1,
                receipt_uploaded_at = $2,
                updated_at = $2
            WHERE order_id = $3 AND COALESCE(receipt_verified, 0) = 0 AND payment_status IN ('pending', 'paid')
            RETURNING *;
        "#,
    )
    .bind(file_id)
    .bind(now)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Approves the current receipt. Cash orders also record that the platform commission has been settled.
pub async fn approve_receipt(
    order_id: OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderPayment>, MarketplaceError> {
    let payment = sqlx::query_as(
        r#"
            UPDATE order_payments SET
                receipt_verified = 1,
                payment_status = 'completed',
                admin_payment_completed = CASE WHEN payment_method = 'cash' THEN 1 ELSE admin_payment_completed END,
                updated_at = $1
            WHERE order_id = $2 AND receipt_file_id IS NOT NULL AND COALESCE(receipt_verified, 0) = 0
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Rejects a receipt that is awaiting review.
pub async fn reject_receipt(
    order_id: OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderPayment>, MarketplaceError> {
    let payment = sqlx::query_as(
        r#"
            UPDATE order_payments SET receipt_verified = 0, updated_at = $1
            WHERE order_id = $2 AND receipt_file_id IS NOT NULL AND receipt_verified IS NULL
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Records that the artisan has the customer's cash. When no commission is owed the payment is settled outright. The
/// order must be bound to `artisan_id` and be accepted or completed.
pub async fn confirm_cash(
    order_id: OrderId,
    artisan_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderPayment>, MarketplaceError> {
    let payment = sqlx::query_as(
        r#"
            UPDATE order_payments SET
                payment_status = CASE WHEN admin_fee = 0 THEN 'completed' ELSE 'paid' END,
                admin_payment_completed = CASE WHEN admin_fee = 0 THEN 1 ELSE admin_payment_completed END,
                cash_received_at = $1,
                updated_at = $1
            WHERE order_id = $2 AND payment_method = 'cash' AND payment_status = 'pending'
              AND EXISTS (
                SELECT 1 FROM orders o
                WHERE o.id = $2 AND o.artisan_id = $3 AND o.status IN ('accepted', 'completed')
              )
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(order_id)
    .bind(artisan_id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Drops an open payment row. Settled payments are never deleted.
pub async fn delete_open(order_id: OrderId, conn: &mut SqliteConnection) -> Result<bool, MarketplaceError> {
    let result = sqlx::query(
        "DELETE FROM order_payments WHERE order_id = $1 AND payment_status = 'pending' AND COALESCE(receipt_verified, \
         0) = 0",
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Payments with an uploaded receipt that still needs an admin decision, oldest upload first.
pub async fn receipt_queue(
    kind: Option<ReceiptKind>,
    include_rejected: bool,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderPayment>, MarketplaceError> {
    let mut builder = QueryBuilder::new("SELECT * FROM order_payments WHERE receipt_file_id IS NOT NULL AND ");
    if include_rejected {
        builder.push("COALESCE(receipt_verified, 0) = 0");
    } else {
        builder.push("receipt_verified IS NULL");
    }
    match kind {
        Some(ReceiptKind::CashCommission) => {
            builder.push(" AND payment_method = 'cash'");
        },
        Some(ReceiptKind::CardPayment) => {
            builder.push(" AND (payment_method IS NULL OR payment_method <> 'cash')");
        },
        None => {},
    }
    builder.push(" ORDER BY receipt_uploaded_at, order_id");
    let payments = builder.build_query_as::<OrderPayment>().fetch_all(conn).await?;
    Ok(payments)
}
