//! The block ledger. Rows are never deleted; lifting a block closes the open row.
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Actor, BlockRecord, NewBlock, Subject},
    market_api::errors::MarketplaceError,
};

/// The most recent ledger row for the subject, open or closed.
pub async fn fetch_latest(subject: Subject, conn: &mut SqliteConnection) -> Result<Option<BlockRecord>, MarketplaceError> {
    let record = sqlx::query_as(
        "SELECT * FROM blocks WHERE subject_type = $1 AND subject_id = $2 ORDER BY id DESC LIMIT 1",
    )
    .bind(subject.kind)
    .bind(subject.id)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

pub async fn fetch_history(subject: Subject, conn: &mut SqliteConnection) -> Result<Vec<BlockRecord>, MarketplaceError> {
    let records = sqlx::query_as("SELECT * FROM blocks WHERE subject_type = $1 AND subject_id = $2 ORDER BY id")
        .bind(subject.kind)
        .bind(subject.id)
        .fetch_all(conn)
        .await?;
    Ok(records)
}

pub async fn insert(block: &NewBlock, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<BlockRecord, MarketplaceError> {
    let record = sqlx::query_as(
        r#"
            INSERT INTO blocks (subject_type, subject_id, is_blocked, reason, required_payment, blocked_by, created_at,
                                block_until)
            VALUES ($1, $2, 1, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(block.subject.kind)
    .bind(block.subject.id)
    .bind(&block.reason)
    .bind(block.required_payment)
    .bind(block.actor.to_string())
    .bind(now)
    .bind(block.block_until)
    .fetch_one(conn)
    .await?;
    Ok(record)
}

/// Adds another debt to the subject's open block, if there is one: the amounts are summed and the reasons joined. A
/// timed block becomes open-ended unless the new block is also timed, in which case the later expiry wins.
pub async fn extend_active(
    block: &NewBlock,
    conn: &mut SqliteConnection,
) -> Result<Option<BlockRecord>, MarketplaceError> {
    let record = sqlx::query_as(
        r#"
            UPDATE blocks SET
                required_payment = required_payment + $1,
                reason = reason || '; ' || $2,
                block_until = CASE
                    WHEN block_until IS NOT NULL AND $3 IS NOT NULL THEN MAX(block_until, $3)
                    ELSE NULL
                END
            WHERE subject_type = $4 AND subject_id = $5 AND is_blocked = 1
            RETURNING *;
        "#,
    )
    .bind(block.required_payment)
    .bind(&block.reason)
    .bind(block.block_until)
    .bind(block.subject.kind)
    .bind(block.subject.id)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

/// Closes the subject's open block, if there is one.
pub async fn lift(
    subject: Subject,
    actor: Actor,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<BlockRecord>, MarketplaceError> {
    let record = sqlx::query_as(
        r#"
            UPDATE blocks SET is_blocked = 0, unblocked_at = $1, unblocked_by = $2
            WHERE subject_type = $3 AND subject_id = $4 AND is_blocked = 1
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(actor.to_string())
    .bind(subject.kind)
    .bind(subject.id)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

/// Open blocks that carry an expiry, whether or not it has passed.
pub async fn fetch_open_timed(conn: &mut SqliteConnection) -> Result<Vec<BlockRecord>, MarketplaceError> {
    let records = sqlx::query_as("SELECT * FROM blocks WHERE is_blocked = 1 AND block_until IS NOT NULL ORDER BY id")
        .fetch_all(conn)
        .await?;
    Ok(records)
}
