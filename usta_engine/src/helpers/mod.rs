mod commission;
mod geo;
mod penalty;

pub use commission::{
    Commission,
    CommissionRate,
    CommissionSchedule,
    CommissionScheduleError,
    CommissionTier,
    DEFAULT_FALLBACK_RATE,
};
pub use geo::{haversine_km, BoundingBox, EARTH_RADIUS_KM};
pub use penalty::{
    artisan_penalty,
    customer_penalty,
    PenaltyFactor,
    ARTISAN_LATE_FACTOR,
    ARTISAN_PENALTY_FACTOR,
    CUSTOMER_PENALTY_FACTOR,
};
