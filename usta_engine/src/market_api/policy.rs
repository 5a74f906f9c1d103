//! Business constants for the marketplace, in one place so they can be tuned from configuration.
use std::{fmt::Display, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::helpers::{
    CommissionSchedule,
    PenaltyFactor,
    ARTISAN_LATE_FACTOR,
    ARTISAN_PENALTY_FACTOR,
    CUSTOMER_PENALTY_FACTOR,
};

/// What happens when the artisan an order is bound to turns it down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// The order is cancelled and the customer told so.
    #[default]
    Cancel,
    /// The order goes back to `searching` and is offered to the next nearest artisan.
    Reassign,
}

impl Display for RejectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionPolicy::Cancel => write!(f, "cancel"),
            RejectionPolicy::Reassign => write!(f, "reassign"),
        }
    }
}

impl FromStr for RejectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cancel" => Ok(Self::Cancel),
            "reassign" => Ok(Self::Reassign),
            other => Err(format!("Unknown rejection policy '{other}'. Use 'cancel' or 'reassign'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketplacePolicy {
    pub commission: CommissionSchedule,
    pub search_radius_km: f64,
    /// Used for a second pass when nobody is found within `search_radius_km`
    pub expanded_radius_km: f64,
    /// How many of the nearest candidates are offered a new order at once
    pub dispatch_fanout: usize,
    pub card_receipt_window: Duration,
    pub commission_window: Duration,
    pub customer_penalty_factor: PenaltyFactor,
    pub artisan_late_factor: PenaltyFactor,
    pub artisan_penalty_factor: PenaltyFactor,
    pub rejection_policy: RejectionPolicy,
    pub pending_action_ttl: Duration,
    /// An escalation that keeps failing is marked failed after this many attempts
    pub max_escalation_attempts: i64,
}

impl Default for MarketplacePolicy {
    fn default() -> Self {
        Self {
            commission: CommissionSchedule::default(),
            search_radius_km: 5.0,
            expanded_radius_km: 15.0,
            dispatch_fanout: 1,
            card_receipt_window: Duration::hours(24),
            commission_window: Duration::hours(18),
            customer_penalty_factor: CUSTOMER_PENALTY_FACTOR,
            artisan_late_factor: ARTISAN_LATE_FACTOR,
            artisan_penalty_factor: ARTISAN_PENALTY_FACTOR,
            rejection_policy: RejectionPolicy::default(),
            pending_action_ttl: Duration::minutes(30),
            max_escalation_attempts: 3,
        }
    }
}
