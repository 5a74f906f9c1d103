use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Dispatch, DispatchStatus, OrderId},
    market_api::errors::MarketplaceError,
};

/// Records that `artisan_id` has been offered the order. Offering the same order to the same artisan again reopens
/// the existing row.
pub async fn upsert_dispatch(
    order_id: OrderId,
    artisan_id: i64,
    distance_km: Option<f64>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Dispatch, MarketplaceError> {
    let dispatch = sqlx::query_as(
        r#"
            INSERT INTO dispatches (order_id, artisan_id, distance_km, status, created_at, updated_at)
            VALUES ($1, $2, $3, 'sent', $4, $4)
            ON CONFLICT (order_id, artisan_id) DO UPDATE SET
                status = 'sent',
                distance_km = excluded.distance_km,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(artisan_id)
    .bind(distance_km)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(dispatch)
}

/// Changes the status of one artisan's dispatch, if it is currently in one of `from`.
pub async fn update_status(
    order_id: OrderId,
    artisan_id: i64,
    from: &[DispatchStatus],
    to: DispatchStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, MarketplaceError> {
    let mut changed = false;
    for status in from {
        let result = sqlx::query(
            "UPDATE dispatches SET status = $1, updated_at = $2 WHERE order_id = $3 AND artisan_id = $4 AND status = $5",
        )
        .bind(to)
        .bind(now)
        .bind(order_id)
        .bind(artisan_id)
        .bind(status)
        .execute(&mut *conn)
        .await?;
        changed |= result.rows_affected() > 0;
    }
    Ok(changed)
}

/// Marks every open (`sent`) offer for the order, other than `except`'s, as superseded. Returns the artisans whose
/// offers were withdrawn.
pub async fn supersede_open(
    order_id: OrderId,
    except: Option<i64>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<i64>, MarketplaceError> {
    let ids: Vec<(i64,)> = sqlx::query_as(
        r#"
            UPDATE dispatches SET status = 'superseded', updated_at = $1
            WHERE order_id = $2 AND status = 'sent' AND ($3 IS NULL OR artisan_id <> $3)
            RETURNING artisan_id;
        "#,
    )
    .bind(now)
    .bind(order_id)
    .bind(except)
    .fetch_all(conn)
    .await?;
    let mut ids = ids.into_iter().map(|(id,)| id).collect::<Vec<_>>();
    ids.sort_unstable();
    Ok(ids)
}

pub async fn fetch_for_order(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Vec<Dispatch>, MarketplaceError> {
    let dispatches = sqlx::query_as("SELECT * FROM dispatches WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(dispatches)
}

pub async fn fetch_dispatch(
    order_id: OrderId,
    artisan_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispatch>, MarketplaceError> {
    let dispatch = sqlx::query_as("SELECT * FROM dispatches WHERE order_id = $1 AND artisan_id = $2")
        .bind(order_id)
        .bind(artisan_id)
        .fetch_optional(conn)
        .await?;
    Ok(dispatch)
}
