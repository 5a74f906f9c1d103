use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderId, Review},
    market_api::errors::MarketplaceError,
};

/// Stores the customer's review of a completed order. Returns `None` if the order is not completed, has no artisan,
/// or belongs to someone else.
pub async fn insert_review(
    order_id: OrderId,
    customer_id: i64,
    rating: i64,
    comment: Option<String>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Review>, MarketplaceError> {
    let review = sqlx::query_as(
        r#"
            INSERT INTO reviews (order_id, customer_id, artisan_id, rating, comment, created_at)
            SELECT id, customer_id, artisan_id, $1, $2, $3 FROM orders
            WHERE id = $4 AND customer_id = $5 AND status = 'completed' AND artisan_id IS NOT NULL
            RETURNING *;
        "#,
    )
    .bind(rating)
    .bind(comment)
    .bind(now)
    .bind(order_id)
    .bind(customer_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => MarketplaceError::AlreadyReviewed(order_id),
        _ => MarketplaceError::from(e),
    })?;
    Ok(review)
}

pub async fn fetch_review(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Review>, MarketplaceError> {
    let review = sqlx::query_as("SELECT * FROM reviews WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(review)
}
