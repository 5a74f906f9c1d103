use std::collections::HashMap;

use cucumber::World;
use usta_engine::{db_types::OrderId, MarketplaceError};

use crate::support::Marketplace;

#[derive(Default, Debug, World)]
pub struct MarketWorld {
    pub system: Option<Marketplace>,
    pub customers: HashMap<String, i64>,
    pub artisans: HashMap<String, i64>,
    pub orders: HashMap<String, OrderId>,
    pub last_error: Option<MarketplaceError>,
}

impl MarketWorld {
    pub fn market(&self) -> &Marketplace {
        self.system.as_ref().expect("Marketplace not initialised")
    }

    pub fn customer(&self, name: &str) -> i64 {
        *self.customers.get(name).unwrap_or_else(|| panic!("Unknown customer '{name}'"))
    }

    pub fn artisan(&self, name: &str) -> i64 {
        *self.artisans.get(name).unwrap_or_else(|| panic!("Unknown artisan '{name}'"))
    }

    pub fn order(&self, label: &str) -> OrderId {
        *self.orders.get(label).unwrap_or_else(|| panic!("Unknown order '{label}'"))
    }

    /// Keeps the outcome of an action so a later step can check it.
    pub fn record<T>(&mut self, result: Result<T, MarketplaceError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                self.last_error = Some(e);
                None
            },
        }
    }
}
