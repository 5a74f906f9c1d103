//! Great-circle distance and the bounding box used to pre-filter artisans before the exact distance check.
use crate::db_types::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
/// Kilometres per degree of latitude. Roughly constant everywhere.
pub const KM_PER_DEGREE_LAT: f64 = 110.574;
/// Kilometres per degree of longitude at the equator. Shrinks with cos(latitude).
pub const KM_PER_DEGREE_LON_EQUATOR: f64 = 111.320;

/// Haversine distance between two points in kilometres.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// A latitude/longitude rectangle that fully contains a circle of a given radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Builds a box around `center` that is never smaller than `radius_km` in any direction.
    ///
    /// The longitude span is computed at the latitude edge closest to the pole, where degrees of longitude are
    /// shortest. Near the poles, or when the box would cross the antimeridian, the full longitude range is used so that
    /// no candidate is dropped.
    pub fn around(center: &GeoPoint, radius_km: f64) -> Self {
        let radius_km = radius_km.max(0.0);
        let d_lat = radius_km / KM_PER_DEGREE_LAT;
        let min_lat = (center.latitude - d_lat).max(-90.0);
        let max_lat = (center.latitude + d_lat).min(90.0);
        let widest = center.latitude.abs() + d_lat;
        let (min_lon, max_lon) = if widest >= 89.0 {
            (-180.0, 180.0)
        } else {
            let km_per_lon = KM_PER_DEGREE_LON_EQUATOR * widest.to_radians().cos();
            let d_lon = radius_km / km_per_lon;
            let (lo, hi) = (center.longitude - d_lon, center.longitude + d_lon);
            if lo < -180.0 || hi > 180.0 {
                (-180.0, 180.0)
            } else {
                (lo, hi)
            }
        };
        Self { min_lat, max_lat, min_lon, max_lon }
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.latitude) && (self.min_lon..=self.max_lon).contains(&p.longitude)
    }
}
