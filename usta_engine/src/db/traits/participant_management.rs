use chrono::{DateTime, Utc};

use crate::{
    db_types::{Artisan, Customer, GeoPoint, NewArtisan, NewCustomer, NewPriceRange, PriceRange},
    helpers::BoundingBox,
    market_api::errors::MarketplaceError,
};

#[allow(async_fn_in_trait)]
pub trait ParticipantManagement {
    async fn insert_customer(&self, customer: NewCustomer, now: DateTime<Utc>) -> Result<Customer, MarketplaceError>;

    async fn fetch_customer(&self, id: i64) -> Result<Option<Customer>, MarketplaceError>;

    async fn fetch_customer_by_chat_id(&self, chat_id: &str) -> Result<Option<Customer>, MarketplaceError>;

    async fn insert_artisan(&self, artisan: NewArtisan, now: DateTime<Utc>) -> Result<Artisan, MarketplaceError>;

    async fn fetch_artisan(&self, id: i64) -> Result<Option<Artisan>, MarketplaceError>;

    async fn fetch_artisan_by_chat_id(&self, chat_id: &str) -> Result<Option<Artisan>, MarketplaceError>;

    async fn update_artisan_location(
        &self,
        id: i64,
        location: GeoPoint,
        now: DateTime<Utc>,
    ) -> Result<Artisan, MarketplaceError>;

    /// Inserts or replaces the artisan's price range for the subservice.
    async fn upsert_price_range(&self, range: NewPriceRange, now: DateTime<Utc>) -> Result<PriceRange, MarketplaceError>;

    async fn remove_price_range(
        &self,
        artisan_id: i64,
        subservice: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, MarketplaceError>;

    async fn fetch_price_range(&self, artisan_id: i64, subservice: &str)
        -> Result<Option<PriceRange>, MarketplaceError>;

    async fn fetch_price_ranges(&self, artisan_id: i64) -> Result<Vec<PriceRange>, MarketplaceError>;

    /// Active artisans for the service (and subservice, if given) located inside the box.
    async fn fetch_artisans_in_box(
        &self,
        service: &str,
        subservice: Option<&str>,
        bbox: &BoundingBox,
    ) -> Result<Vec<Artisan>, MarketplaceError>;
}
