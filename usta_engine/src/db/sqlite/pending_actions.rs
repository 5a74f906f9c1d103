use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{PendingAction, PendingActionRow, Subject},
    market_api::errors::MarketplaceError,
};

/// Replaces whatever conversation the subject was in with `action`.
pub async fn upsert(
    subject: Subject,
    action: &PendingAction,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), MarketplaceError> {
    let json = serde_json::to_string(action)?;
    sqlx::query(
        r#"
            INSERT INTO pending_actions (subject_type, subject_id, action, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (subject_type, subject_id) DO UPDATE SET
                action = excluded.action,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
        "#,
    )
    .bind(subject.kind)
    .bind(subject.id)
    .bind(json)
    .bind(expires_at)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch(subject: Subject, conn: &mut SqliteConnection) -> Result<Option<PendingActionRow>, MarketplaceError> {
    let row = sqlx::query_as("SELECT * FROM pending_actions WHERE subject_type = $1 AND subject_id = $2")
        .bind(subject.kind)
        .bind(subject.id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Removes and returns the subject's pending action in one statement, so it can be consumed at most once.
pub async fn take(subject: Subject, conn: &mut SqliteConnection) -> Result<Option<PendingActionRow>, MarketplaceError> {
    let row = sqlx::query_as("DELETE FROM pending_actions WHERE subject_type = $1 AND subject_id = $2 RETURNING *")
        .bind(subject.kind)
        .bind(subject.id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Clears the pending action only if it is still the one given. Used to drop upload prompts once they are satisfied
/// without clobbering an unrelated conversation.
pub async fn clear_if(subject: Subject, action: &PendingAction, conn: &mut SqliteConnection) -> Result<bool, MarketplaceError> {
    let json = serde_json::to_string(action)?;
    let result = sqlx::query("DELETE FROM pending_actions WHERE subject_type = $1 AND subject_id = $2 AND action = $3")
        .bind(subject.kind)
        .bind(subject.id)
        .bind(json)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

impl PendingActionRow {
    pub fn decode(&self) -> Result<PendingAction, MarketplaceError> {
        Ok(serde_json::from_str(&self.action)?)
    }
}
