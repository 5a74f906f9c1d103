use chrono::{DateTime, Utc};

use crate::db_types::{EscalationTask, Order, OrderPayment, OrderStatusType};

/// A successful accept. `withdrawn` lists the other artisans whose open offers were superseded.
#[derive(Debug, Clone)]
pub struct AcceptedOrder {
    pub order: Order,
    /// `searching` for an open order, `pending` for one that was bound to this artisan from the start
    pub old_status: OrderStatusType,
    pub withdrawn: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct OrderTransition {
    pub order: Order,
    pub old_status: OrderStatusType,
    /// Artisans whose open offers for this order were withdrawn as part of the transition
    pub withdrawn: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct PricedOrder {
    pub order: Order,
    pub payment: OrderPayment,
}

#[derive(Debug, Clone)]
pub struct ReceiptSaved {
    pub payment: OrderPayment,
    /// The escalation that will fire if this receipt is not approved in time
    pub escalation: EscalationTask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptDecision {
    Approve,
    /// Reject and restart the escalation clock so that it expires at `due_at`
    Reject { due_at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct ReceiptResolved {
    pub payment: OrderPayment,
    /// The escalation now pending against the order, if any. Always `None` after an approval.
    pub escalation: Option<EscalationTask>,
}

/// Who may cancel an order and from which statuses.
#[derive(Debug, Clone, Default)]
pub struct CancelGuard {
    pub customer_id: Option<i64>,
    pub artisan_id: Option<i64>,
    pub allowed_from: Vec<OrderStatusType>,
}

impl CancelGuard {
    /// Customers can withdraw their request until an artisan has accepted it.
    pub fn customer(customer_id: i64) -> Self {
        Self {
            customer_id: Some(customer_id),
            artisan_id: None,
            allowed_from: vec![OrderStatusType::Searching, OrderStatusType::Pending],
        }
    }

    /// The bound artisan can cancel any order that is not finished.
    pub fn artisan(artisan_id: i64) -> Self {
        Self {
            customer_id: None,
            artisan_id: Some(artisan_id),
            allowed_from: vec![OrderStatusType::Pending, OrderStatusType::Accepted],
        }
    }

    pub fn admin() -> Self {
        Self {
            customer_id: None,
            artisan_id: None,
            allowed_from: vec![OrderStatusType::Searching, OrderStatusType::Pending, OrderStatusType::Accepted],
        }
    }
}
