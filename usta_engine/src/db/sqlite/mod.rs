//! SQLite storage backend.
//!
//! Each submodule holds the raw queries for one table. They take a bare `&mut SqliteConnection` so that
//! [`SqliteDatabase`] can compose them inside a single transaction.
mod db;

pub mod blocks;
pub mod dispatches;
pub mod escalations;
pub mod order_events;
pub mod orders;
pub mod participants;
pub mod payments;
pub mod pending_actions;
pub mod refunds;
pub mod reviews;

use std::{env, str::FromStr};

pub use db::SqliteDatabase;
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    ConnectOptions,
    Connection,
    SqlitePool,
};

use crate::market_api::errors::MarketplaceError;

const SQLITE_DB_URL: &str = "sqlite://data/usta.db";

pub fn db_url() -> String {
    let result = env::var("USTA_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ USTA_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

fn connect_options(url: &str) -> Result<SqliteConnectOptions, MarketplaceError> {
    Ok(SqliteConnectOptions::from_str(url)?.create_if_missing(true).journal_mode(SqliteJournalMode::Wal))
}

/// Opens a connection pool, creating the database file if it does not exist yet.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, MarketplaceError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(connect_options(url)?).await?;
    Ok(pool)
}

/// Brings the schema at `url` up to date over a dedicated connection that is closed before returning.
///
/// Call this before opening the serving pool. A pooled connection that ran the migrations can keep a stale WAL read
/// snapshot and miss rows committed through its siblings.
pub async fn run_migrations(url: &str) -> Result<(), MarketplaceError> {
    let mut conn = connect_options(url)?.connect().await?;
    sqlx::migrate!("./src/db/sqlite/migrations")
        .run(&mut conn)
        .await
        .map_err(|e| MarketplaceError::DatabaseError(format!("Migration failed: {e}")))?;
    conn.close().await?;
    info!("🗃️ Database migrations are up to date");
    Ok(())
}
