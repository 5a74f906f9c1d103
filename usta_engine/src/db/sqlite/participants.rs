use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{Artisan, Customer, GeoPoint, NewArtisan, NewCustomer, NewPriceRange, PriceRange, Subject, SubjectType},
    helpers::BoundingBox,
    market_api::errors::{MarketplaceError, ValidationError},
};

fn unique_chat_id(e: sqlx::Error, chat_id: &str) -> MarketplaceError {
    match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            ValidationError::Other(format!("chat id {chat_id} is already registered")).into()
        },
        _ => MarketplaceError::from(e),
    }
}

pub async fn insert_customer(
    customer: NewCustomer,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Customer, MarketplaceError> {
    let customer = sqlx::query_as(
        r#"
            INSERT INTO customers (chat_id, name, phone, created_at, updated_at) VALUES ($1, $2, $3, $4, $4)
            RETURNING *;
        "#,
    )
    .bind(&customer.chat_id)
    .bind(customer.name)
    .bind(customer.phone)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(|e| unique_chat_id(e, &customer.chat_id))?;
    Ok(customer)
}

pub async fn fetch_customer(id: i64, conn: &mut SqliteConnection) -> Result<Option<Customer>, MarketplaceError> {
    let customer = sqlx::query_as("SELECT * FROM customers WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(customer)
}

pub async fn fetch_customer_by_chat_id(
    chat_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Customer>, MarketplaceError> {
    let customer =
        sqlx::query_as("SELECT * FROM customers WHERE chat_id = $1").bind(chat_id).fetch_optional(conn).await?;
    Ok(customer)
}

pub async fn insert_artisan(
    artisan: NewArtisan,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Artisan, MarketplaceError> {
    let (lat, lon) = artisan.location.map(|p| (Some(p.latitude), Some(p.longitude))).unwrap_or((None, None));
    let artisan = sqlx::query_as(
        r#"
            INSERT INTO artisans (chat_id, name, phone, service, latitude, longitude, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(&artisan.chat_id)
    .bind(artisan.name)
    .bind(artisan.phone)
    .bind(artisan.service)
    .bind(lat)
    .bind(lon)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(|e| unique_chat_id(e, &artisan.chat_id))?;
    Ok(artisan)
}

pub async fn fetch_artisan(id: i64, conn: &mut SqliteConnection) -> Result<Option<Artisan>, MarketplaceError> {
    let artisan = sqlx::query_as("SELECT * FROM artisans WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(artisan)
}

pub async fn fetch_artisan_by_chat_id(
    chat_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Artisan>, MarketplaceError> {
    let artisan =
        sqlx::query_as("SELECT * FROM artisans WHERE chat_id = $1").bind(chat_id).fetch_optional(conn).await?;
    Ok(artisan)
}

pub async fn update_artisan_location(
    id: i64,
    location: GeoPoint,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Artisan>, MarketplaceError> {
    let artisan = sqlx::query_as(
        "UPDATE artisans SET latitude = $1, longitude = $2, updated_at = $3 WHERE id = $4 RETURNING *",
    )
    .bind(location.latitude)
    .bind(location.longitude)
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(artisan)
}

/// Sets the `active` flag for a customer or artisan. Returns false if the subject does not exist.
pub async fn set_active(
    subject: Subject,
    active: bool,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, MarketplaceError> {
    let sql = match subject.kind {
        SubjectType::Customer => "UPDATE customers SET active = $1, updated_at = $2 WHERE id = $3",
        SubjectType::Artisan => "UPDATE artisans SET active = $1, updated_at = $2 WHERE id = $3",
    };
    let result = sqlx::query(sql).bind(active).bind(now).bind(subject.id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Inserts or replaces the price range for an (artisan, subservice) pair. There is only ever one row per pair.
pub async fn upsert_price_range(
    range: NewPriceRange,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PriceRange, MarketplaceError> {
    let range = sqlx::query_as(
        r#"
            INSERT INTO price_ranges (artisan_id, subservice, min_price, max_price, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 1, $5, $5)
            ON CONFLICT (artisan_id, subservice) DO UPDATE SET
                min_price = excluded.min_price,
                max_price = excluded.max_price,
                active = 1,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(range.artisan_id)
    .bind(range.subservice)
    .bind(range.min_price)
    .bind(range.max_price)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(range)
}

pub async fn deactivate_price_range(
    artisan_id: i64,
    subservice: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, MarketplaceError> {
    let result = sqlx::query(
        "UPDATE price_ranges SET active = 0, updated_at = $1 WHERE artisan_id = $2 AND subservice = $3 AND active = 1",
    )
    .bind(now)
    .bind(artisan_id)
    .bind(subservice)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// The active price range for the pair, if the artisan has declared one.
pub async fn fetch_price_range(
    artisan_id: i64,
    subservice: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PriceRange>, MarketplaceError> {
    let range =
        sqlx::query_as("SELECT * FROM price_ranges WHERE artisan_id = $1 AND subservice = $2 AND active = 1")
            .bind(artisan_id)
            .bind(subservice)
            .fetch_optional(conn)
            .await?;
    Ok(range)
}

pub async fn fetch_price_ranges(
    artisan_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PriceRange>, MarketplaceError> {
    let ranges =
        sqlx::query_as("SELECT * FROM price_ranges WHERE artisan_id = $1 AND active = 1 ORDER BY subservice")
            .bind(artisan_id)
            .fetch_all(conn)
            .await?;
    Ok(ranges)
}

/// Active artisans offering `service` whose location falls inside `bbox`. When `subservice` is given, only artisans
/// with an active price range for it are returned. Exact distances are left to the caller.
pub async fn fetch_artisans_in_box(
    service: &str,
    subservice: Option<&str>,
    bbox: &BoundingBox,
    conn: &mut SqliteConnection,
) -> Result<Vec<Artisan>, MarketplaceError> {
    let mut builder = QueryBuilder::new(
        "SELECT * FROM artisans WHERE active = 1 AND latitude IS NOT NULL AND longitude IS NOT NULL AND service = ",
    );
    builder.push_bind(service);
    builder.push(" AND latitude BETWEEN ");
    builder.push_bind(bbox.min_lat);
    builder.push(" AND ");
    builder.push_bind(bbox.max_lat);
    builder.push(" AND longitude BETWEEN ");
    builder.push_bind(bbox.min_lon);
    builder.push(" AND ");
    builder.push_bind(bbox.max_lon);
    if let Some(sub) = subservice {
        builder.push(
            " AND EXISTS (SELECT 1 FROM price_ranges pr WHERE pr.artisan_id = artisans.id AND pr.active = 1 AND \
             pr.subservice = ",
        );
        builder.push_bind(sub);
        builder.push(")");
    }
    builder.push(" ORDER BY id");
    trace!("🗃️ Executing query: {}", builder.sql());
    let artisans = builder.build_query_as::<Artisan>().fetch_all(conn).await?;
    Ok(artisans)
}
