use std::{cmp::Ordering, collections::HashSet, fmt::Debug};

use log::*;

use crate::{
    db::traits::ParticipantManagement,
    db_types::{Candidate, GeoPoint},
    helpers::{haversine_km, BoundingBox},
    market_api::errors::{MarketplaceError, ValidationError},
};

/// Finds the artisans nearest to a request.
///
/// The storage backend narrows the field down with a bounding box that is never smaller than the radius; the exact
/// haversine distance then decides who is in range.
pub struct ArtisanMatcher<B> {
    db: B,
}

impl<B> Debug for ArtisanMatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ArtisanMatcher")
    }
}

impl<B> ArtisanMatcher<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ArtisanMatcher<B>
where B: ParticipantManagement
{
    /// Active artisans offering `service` (and `subservice`, if given) within `radius_km` of `location`, nearest first.
    /// Equal distances are ordered by artisan id.
    ///
    /// A request without a valid location is an error rather than an empty result. An empty result just means nobody
    /// is in range.
    pub async fn find_nearby(
        &self,
        location: Option<GeoPoint>,
        radius_km: f64,
        service: &str,
        subservice: Option<&str>,
    ) -> Result<Vec<Candidate>, MarketplaceError> {
        self.find_nearby_excluding(location, radius_km, service, subservice, &HashSet::new()).await
    }

    pub async fn find_nearby_excluding(
        &self,
        location: Option<GeoPoint>,
        radius_km: f64,
        service: &str,
        subservice: Option<&str>,
        exclude: &HashSet<i64>,
    ) -> Result<Vec<Candidate>, MarketplaceError> {
        let center = match location {
            Some(p) if p.is_valid() => p,
            _ => return Err(ValidationError::MissingCoordinates.into()),
        };
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(ValidationError::Other(format!("search radius must be a positive distance, not {radius_km}")).into());
        }
        let bbox = BoundingBox::around(&center, radius_km);
        let artisans = self.db.fetch_artisans_in_box(service, subservice, &bbox).await?;
        let in_box = artisans.len();
        let mut candidates = artisans
            .into_iter()
            .filter(|a| !exclude.contains(&a.id))
            .filter_map(|a| {
                let distance_km = haversine_km(&center, &a.location()?);
                (distance_km <= radius_km).then_some(Candidate { artisan_id: a.id, name: a.name, distance_km })
            })
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| {
            a.distance_km.partial_cmp(&b.distance_km).unwrap_or(Ordering::Equal).then(a.artisan_id.cmp(&b.artisan_id))
        });
        trace!(
            "🔄️ {} of {in_box} {service} artisans in the box around {center} are within {radius_km}km",
            candidates.len()
        );
        Ok(candidates)
    }
}
