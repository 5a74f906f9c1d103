use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::db_types::{Actor, Azn, BlockStatus, OrderId, OrderStatusType, PaymentMethod, ReceiptKind, Subject, SubjectType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Artisan,
    Admin,
}

/// Who a notification is for. Admin notifications use id 0 to mean "the admin channel".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub role: Role,
    pub id: i64,
}

impl Recipient {
    pub fn customer(id: i64) -> Self {
        Self { role: Role::Customer, id }
    }

    pub fn artisan(id: i64) -> Self {
        Self { role: Role::Artisan, id }
    }

    pub fn admins() -> Self {
        Self { role: Role::Admin, id: 0 }
    }
}

impl From<Subject> for Recipient {
    fn from(subject: Subject) -> Self {
        match subject.kind {
            SubjectType::Customer => Self::customer(subject.id),
            SubjectType::Artisan => Self::artisan(subject.id),
        }
    }
}

impl Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.role {
            Role::Customer => write!(f, "customer:{}", self.id),
            Role::Artisan => write!(f, "artisan:{}", self.id),
            Role::Admin => write!(f, "admins"),
        }
    }
}

/// Everything the marketplace tells its participants. The chat layer renders these into text and keyboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    NewOrderOffer { order_id: OrderId, service: String, distance_km: Option<f64> },
    /// A previously offered order was taken by someone else or cancelled
    OrderWithdrawn { order_id: OrderId },
    OrderNoLongerAvailable { order_id: OrderId },
    OrderAccepted { order_id: OrderId, artisan_id: i64 },
    OrderRejected { order_id: OrderId },
    SearchingForAnotherArtisan { order_id: OrderId },
    NoArtisanAvailable { order_id: OrderId },
    PriceProposed { order_id: OrderId, price: Azn },
    ChoosePaymentMethod { order_id: OrderId },
    PaymentMethodSelected { order_id: OrderId, method: PaymentMethod },
    CashConfirmationRequested { order_id: OrderId, admin_fee: Azn },
    OrderCompleted { order_id: OrderId },
    ReviewRequested { order_id: OrderId },
    OrderCancelled { order_id: OrderId, by: Actor },
    ReceiptSubmitted { order_id: OrderId, kind: ReceiptKind },
    ReceiptApproved { order_id: OrderId, kind: ReceiptKind },
    ReceiptRejected { order_id: OrderId, kind: ReceiptKind, deadline_hours: i64 },
    CommissionDue { order_id: OrderId, amount: Azn, deadline_hours: i64 },
    AccountBlocked { status: BlockStatus },
    AccountUnblocked,
    RefundCardRequested { refund_id: i64, order_id: OrderId, amount: Azn },
    RefundAwaitingTransfer { refund_id: i64, order_id: OrderId },
    RefundCompleted { refund_id: i64, amount: Azn },
    RefundDeclined { refund_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub recipient: Recipient,
    pub kind: NotificationKind,
}

impl NotificationEvent {
    pub fn new(recipient: Recipient, kind: NotificationKind) -> Self {
        Self { recipient, kind }
    }
}

/// Published after every committed order status change, including admin overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub order_id: OrderId,
    pub old_status: OrderStatusType,
    pub new_status: OrderStatusType,
    pub actor: Actor,
}

impl OrderStatusChangedEvent {
    pub fn new(order_id: OrderId, old_status: OrderStatusType, new_status: OrderStatusType, actor: Actor) -> Self {
        Self { order_id, old_status, new_status, actor }
    }
}
