//! Time source used by the marketplace APIs.
//!
//! Every deadline in the system (receipt windows, block expiry, pending conversation actions) is computed from
//! [`Clock::now`] rather than from the wall clock directly, so tests can move time forward without sleeping.
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use log::*;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(RwLock::new(start)) }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        match self.now.write() {
            Ok(mut now) => *now = instant,
            Err(e) => error!("🕰️ Manual clock lock is poisoned: {e}"),
        }
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        trace!("🕰️ Manual clock advancing by {by} to {next}");
        self.set(next);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
