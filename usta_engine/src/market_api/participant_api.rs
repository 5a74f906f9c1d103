use std::{fmt::Debug, sync::Arc};

use log::*;

use crate::{
    clock::{Clock, SystemClock},
    db::traits::{BlockManagement, ParticipantManagement},
    db_types::{Artisan, Customer, GeoPoint, NewArtisan, NewCustomer, NewPriceRange, PriceRange, Subject},
    market_api::{
        block_api::ensure_not_blocked,
        errors::{MarketplaceError, ValidationError},
    },
};

/// Registration of customers and artisans, artisan locations and the per-subservice price ranges that bound what an
/// artisan may charge.
pub struct ParticipantApi<B> {
    db: B,
    clock: Arc<dyn Clock>,
}

impl<B> Debug for ParticipantApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ParticipantApi")
    }
}

impl<B> ParticipantApi<B> {
    pub fn new(db: B) -> Self {
        Self { db, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn require_valid_location(location: &GeoPoint) -> Result<(), ValidationError> {
    if location.is_valid() {
        Ok(())
    } else {
        Err(ValidationError::Other(format!("{location} is not a valid location")))
    }
}

impl<B> ParticipantApi<B>
where B: ParticipantManagement + BlockManagement
{
    pub async fn register_customer(&self, customer: NewCustomer) -> Result<Customer, MarketplaceError> {
        require(&customer.chat_id, "chat id")?;
        require(&customer.name, "name")?;
        let customer = self.db.insert_customer(customer, self.clock.now()).await?;
        info!("🔄️ New customer #{} ({})", customer.id, customer.name);
        Ok(customer)
    }

    pub async fn register_artisan(&self, artisan: NewArtisan) -> Result<Artisan, MarketplaceError> {
        require(&artisan.chat_id, "chat id")?;
        require(&artisan.name, "name")?;
        require(&artisan.service, "service")?;
        if let Some(location) = &artisan.location {
            require_valid_location(location)?;
        }
        let artisan = self.db.insert_artisan(artisan, self.clock.now()).await?;
        info!("🔄️ New artisan #{} ({}) offering {}", artisan.id, artisan.name, artisan.service);
        Ok(artisan)
    }

    pub async fn customer(&self, id: i64) -> Result<Customer, MarketplaceError> {
        self.db.fetch_customer(id).await?.ok_or(MarketplaceError::CustomerNotFound(id))
    }

    pub async fn artisan(&self, id: i64) -> Result<Artisan, MarketplaceError> {
        self.db.fetch_artisan(id).await?.ok_or(MarketplaceError::ArtisanNotFound(id))
    }

    pub async fn customer_by_chat_id(&self, chat_id: &str) -> Result<Option<Customer>, MarketplaceError> {
        self.db.fetch_customer_by_chat_id(chat_id).await
    }

    pub async fn artisan_by_chat_id(&self, chat_id: &str) -> Result<Option<Artisan>, MarketplaceError> {
        self.db.fetch_artisan_by_chat_id(chat_id).await
    }

    pub async fn update_artisan_location(&self, artisan_id: i64, location: GeoPoint) -> Result<Artisan, MarketplaceError> {
        require_valid_location(&location)?;
        let artisan = self.db.update_artisan_location(artisan_id, location, self.clock.now()).await?;
        debug!("🔄️ Artisan #{artisan_id} moved to {location}");
        Ok(artisan)
    }

    /// Declares (or replaces) the artisan's price bounds for a subservice. Bounds are inclusive.
    pub async fn declare_price_range(&self, range: NewPriceRange) -> Result<PriceRange, MarketplaceError> {
        let now = self.clock.now();
        ensure_not_blocked(&self.db, Subject::artisan(range.artisan_id), now).await?;
        require(&range.subservice, "subservice")?;
        if !range.min_price.is_positive() {
            return Err(ValidationError::NonPositivePrice.into());
        }
        if range.min_price > range.max_price {
            return Err(ValidationError::InvertedRange { min: range.min_price, max: range.max_price }.into());
        }
        self.artisan(range.artisan_id).await?;
        let range = NewPriceRange { subservice: range.subservice.trim().to_string(), ..range };
        let range = self.db.upsert_price_range(range, now).await?;
        debug!(
            "🔄️ Artisan #{} charges {}–{} for {}",
            range.artisan_id, range.min_price, range.max_price, range.subservice
        );
        Ok(range)
    }

    pub async fn remove_price_range(&self, artisan_id: i64, subservice: &str) -> Result<bool, MarketplaceError> {
        ensure_not_blocked(&self.db, Subject::artisan(artisan_id), self.clock.now()).await?;
        self.db.remove_price_range(artisan_id, subservice.trim(), self.clock.now()).await
    }

    pub async fn price_ranges(&self, artisan_id: i64) -> Result<Vec<PriceRange>, MarketplaceError> {
        self.db.fetch_price_ranges(artisan_id).await
    }
}
