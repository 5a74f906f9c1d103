//! Durable timeout escalations.
//!
//! There is one row per `(order_id, kind)`. Rescheduling overwrites the row in place, so an old deadline can never
//! fire once a new one has been set.
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{EscalationKind, EscalationTask, NewEscalation, OrderId},
    market_api::errors::MarketplaceError,
};

/// Schedules (or reschedules) the escalation against `receipt_version`. Attempts and errors are reset.
pub async fn upsert(
    task: NewEscalation,
    receipt_version: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<EscalationTask, MarketplaceError> {
    let task = sqlx::query_as(
        r#"
            INSERT INTO escalations (order_id, kind, subject_id, receipt_version, due_at, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'scheduled', $6, $6)
            ON CONFLICT (order_id, kind) DO UPDATE SET
                subject_id = excluded.subject_id,
                receipt_version = excluded.receipt_version,
                due_at = excluded.due_at,
                status = 'scheduled',
                attempts = 0,
                last_error = NULL,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(task.order_id)
    .bind(task.kind)
    .bind(task.subject_id)
    .bind(receipt_version)
    .bind(task.due_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(task)
}

/// Cancels scheduled escalations for the order. With `kind` set, only that one.
pub async fn cancel(
    order_id: OrderId,
    kind: Option<EscalationKind>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, MarketplaceError> {
    let result = sqlx::query(
        r#"
            UPDATE escalations SET status = 'cancelled', updated_at = $1
            WHERE order_id = $2 AND status = 'scheduled' AND ($3 IS NULL OR kind = $3)
        "#,
    )
    .bind(now)
    .bind(order_id)
    .bind(kind)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn fetch(
    order_id: OrderId,
    kind: EscalationKind,
    conn: &mut SqliteConnection,
) -> Result<Option<EscalationTask>, MarketplaceError> {
    let task = sqlx::query_as("SELECT * FROM escalations WHERE order_id = $1 AND kind = $2")
        .bind(order_id)
        .bind(kind)
        .fetch_optional(conn)
        .await?;
    Ok(task)
}

/// Scheduled tasks whose deadline is at or before `now`, oldest first.
pub async fn fetch_due(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<EscalationTask>, MarketplaceError> {
    let tasks = sqlx::query_as("SELECT * FROM escalations WHERE status = 'scheduled' AND due_at <= $1 ORDER BY id")
        .bind(now)
        .fetch_all(conn)
        .await?;
    Ok(tasks)
}

/// Claims a task for execution. The task must still be due and scheduled against the same receipt version, and that
/// version must still be the payment's current one with no approval on it. Returns `None` if anything has moved on.
///
/// Timestamps are always bound from `DateTime<Utc>`, which sqlx writes as fixed-offset RFC 3339 text, so comparing
/// them as strings orders them correctly.
pub async fn claim(
    task: &EscalationTask,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<EscalationTask>, MarketplaceError> {
    let claimed = sqlx::query_as(
        r#"
            UPDATE escalations SET status = 'executed', attempts = attempts + 1, updated_at = $1
            WHERE id = $2 AND status = 'scheduled' AND receipt_version = $3 AND due_at <= $1
              AND EXISTS (
                SELECT 1 FROM order_payments p
                WHERE p.order_id = escalations.order_id
                  AND p.receipt_version = $3
                  AND COALESCE(p.receipt_verified, 0) = 0
                  AND p.admin_payment_completed = 0
              )
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(task.id)
    .bind(task.receipt_version)
    .fetch_optional(conn)
    .await?;
    Ok(claimed)
}

/// Retires a task that can no longer fire, provided nobody has rescheduled it in the meantime.
pub async fn retire_stale(
    task: &EscalationTask,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, MarketplaceError> {
    let result = sqlx::query(
        r#"
            UPDATE escalations SET status = 'cancelled', updated_at = $1
            WHERE id = $2 AND status = 'scheduled' AND receipt_version = $3 AND due_at <= $1
        "#,
    )
    .bind(now)
    .bind(task.id)
    .bind(task.receipt_version)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Counts a failed run. Once `max_attempts` is reached the task is parked as `failed`.
pub async fn record_failure(
    task_id: i64,
    error: &str,
    max_attempts: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<EscalationTask>, MarketplaceError> {
    let task = sqlx::query_as(
        r#"
            UPDATE escalations SET
                attempts = attempts + 1,
                last_error = $1,
                status = CASE WHEN attempts + 1 >= $2 THEN 'failed' ELSE status END,
                updated_at = $3
            WHERE id = $4 AND status = 'scheduled'
            RETURNING *;
        "#,
    )
    .bind(error)
    .bind(max_attempts)
    .bind(now)
    .bind(task_id)
    .fetch_optional(conn)
    .await?;
    Ok(task)
}
