use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::db_types::{Candidate, Order, OrderStatusType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub customer_id: Option<i64>,
    pub artisan_id: Option<i64>,
    pub service: Option<String>,
    #[serde(default)]
    pub statuses: Vec<OrderStatusType>,
}

impl OrderQueryFilter {
    pub fn with_customer_id(mut self, customer_id: i64) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_artisan_id(mut self, artisan_id: i64) -> Self {
        self.artisan_id = Some(artisan_id);
        self
    }

    pub fn with_service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        if !self.statuses.contains(&status) {
            self.statuses.push(status);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() && self.artisan_id.is_none() && self.service.is_none() && self.statuses.is_empty()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(id) = self.customer_id {
            write!(f, "customer: #{id}. ")?;
        }
        if let Some(id) = self.artisan_id {
            write!(f, "artisan: #{id}. ")?;
        }
        if let Some(service) = &self.service {
            write!(f, "service: {service}. ")?;
        }
        if !self.statuses.is_empty() {
            let statuses = self.statuses.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(",");
            write!(f, "statuses: {statuses}. ")?;
        }
        Ok(())
    }
}

/// The result of placing or re-dispatching an order. `dispatched` lists the artisans who were offered it, nearest
/// first. An empty list means nobody was found and the customer has been told.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub order: Order,
    pub dispatched: Vec<Candidate>,
}

impl DispatchOutcome {
    pub fn found_artisan(&self) -> bool {
        !self.dispatched.is_empty() || self.order.artisan_id.is_some()
    }
}
