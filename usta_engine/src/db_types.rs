use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
pub use usta_common::Azn;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(&'static str, String);

/// Implements `Display` and `FromStr` for a fieldless enum using the same snake_case strings that the database
/// stores, so that the two representations cannot drift apart.
macro_rules! db_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $text),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ConversionError(stringify!($name), other.to_string())),
                }
            }
        }
    };
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub i64);

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

//--------------------------------------       GeoPoint        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Builds a point from nullable columns. Both coordinates must be present and finite.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some(Self::new(lat, lon)),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite() &&
            self.longitude.is_finite() &&
            (-90.0..=90.0).contains(&self.latitude) &&
            (-180.0..=180.0).contains(&self.longitude)
    }
}

impl Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.latitude, self.longitude)
    }
}

//--------------------------------------     Participants      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    /// The chat-platform identifier for this customer
    pub chat_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub chat_id: String,
    pub name: String,
    pub phone: Option<String>,
}

impl NewCustomer {
    pub fn new<S: Into<String>>(chat_id: S, name: S) -> Self {
        Self { chat_id: chat_id.into(), name: name.into(), phone: None }
    }

    pub fn with_phone<S: Into<String>>(mut self, phone: S) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Artisan {
    pub id: i64,
    pub chat_id: String,
    pub name: String,
    pub phone: Option<String>,
    /// The service category this artisan offers, e.g. "plumber"
    pub service: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artisan {
    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::from_parts(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone)]
pub struct NewArtisan {
    pub chat_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub service: String,
    pub location: Option<GeoPoint>,
}

impl NewArtisan {
    pub fn new<S: Into<String>>(chat_id: S, name: S, service: S) -> Self {
        Self { chat_id: chat_id.into(), name: name.into(), phone: None, service: service.into(), location: None }
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_phone<S: Into<String>>(mut self, phone: S) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

//--------------------------------------      PriceRange       ---------------------------------------------------------
/// The artisan-declared price bounds for one subservice. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PriceRange {
    pub id: i64,
    pub artisan_id: i64,
    pub subservice: String,
    pub min_price: Azn,
    pub max_price: Azn,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PriceRange {
    pub fn contains(&self, price: Azn) -> bool {
        self.min_price <= price && price <= self.max_price
    }
}

#[derive(Debug, Clone)]
pub struct NewPriceRange {
    pub artisan_id: i64,
    pub subservice: String,
    pub min_price: Azn,
    pub max_price: Azn,
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// No artisan is bound to the order yet. Candidates may have been notified.
    Searching,
    /// An artisan is bound but has not accepted yet.
    Pending,
    /// The bound artisan has confirmed the order.
    Accepted,
    Completed,
    Cancelled,
}

db_enum!(OrderStatusType {
    Searching => "searching",
    Pending => "pending",
    Accepted => "accepted",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Searching");
            OrderStatusType::Searching
        })
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: i64,
    pub artisan_id: Option<i64>,
    pub service: String,
    pub subservice: Option<String>,
    /// When the customer wants the work done
    pub requested_for: Option<DateTime<Utc>>,
    pub note: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub place_name: Option<String>,
    pub price: Option<Azn>,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub review_requested_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::from_parts(self.latitude, self.longitude)
    }

    pub fn is_bound_to(&self, artisan_id: i64) -> bool {
        self.artisan_id == Some(artisan_id)
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: i64,
    pub service: String,
    pub subservice: Option<String>,
    pub requested_for: Option<DateTime<Utc>>,
    pub note: String,
    pub location: Option<GeoPoint>,
    /// When set, the order is bound to this artisan immediately (status `pending`) instead of being dispatched to the
    /// nearest candidates.
    pub artisan_id: Option<i64>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(customer_id: i64, service: S) -> Self {
        Self {
            customer_id,
            service: service.into(),
            subservice: None,
            requested_for: None,
            note: String::default(),
            location: None,
            artisan_id: None,
        }
    }

    pub fn with_subservice<S: Into<String>>(mut self, subservice: S) -> Self {
        self.subservice = Some(subservice.into());
        self
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = note.into();
        self
    }

    pub fn requested_for(mut self, when: DateTime<Utc>) -> Self {
        self.requested_for = Some(when);
        self
    }

    pub fn for_artisan(mut self, artisan_id: i64) -> Self {
        self.artisan_id = Some(artisan_id);
        self
    }
}

//--------------------------------------    Payment types      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Cash,
}

db_enum!(PaymentMethod { Card => "card", Cash => "cash" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    /// Cash has physically changed hands; the platform commission may still be owed.
    Paid,
    Completed,
    Failed,
}

db_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Completed => "completed",
    Failed => "failed",
});

/// Which of the two review sub-flows a receipt belongs to. It is derived from the payment method: cash orders carry
/// the artisan's commission receipt, everything else carries the customer's card receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    CardPayment,
    CashCommission,
}

db_enum!(ReceiptKind { CardPayment => "card_payment", CashCommission => "cash_commission" });

impl ReceiptKind {
    pub fn for_method(method: Option<PaymentMethod>) -> Self {
        match method {
            Some(PaymentMethod::Cash) => Self::CashCommission,
            _ => Self::CardPayment,
        }
    }

    pub fn escalation_kind(&self) -> EscalationKind {
        match self {
            Self::CardPayment => EscalationKind::CardReceipt,
            Self::CashCommission => EscalationKind::CashCommission,
        }
    }
}

//--------------------------------------     OrderPayment      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct OrderPayment {
    pub order_id: OrderId,
    pub amount: Azn,
    pub admin_fee: Azn,
    pub artisan_amount: Azn,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: PaymentStatus,
    /// Opaque handle of the most recently uploaded receipt
    pub receipt_file_id: Option<String>,
    /// `None` while awaiting review, `Some(true)` once approved and `Some(false)` once rejected
    pub receipt_verified: Option<bool>,
    /// Incremented on every upload. Escalation tasks remember the version they were scheduled for.
    pub receipt_version: i64,
    pub receipt_uploaded_at: Option<DateTime<Utc>>,
    pub admin_payment_completed: bool,
    pub cash_received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderPayment {
    pub fn receipt_kind(&self) -> ReceiptKind {
        ReceiptKind::for_method(self.payment_method)
    }

    pub fn is_verified(&self) -> bool {
        self.receipt_verified == Some(true)
    }

    /// True once the price can no longer be renegotiated: an approved receipt exists or money has changed hands.
    pub fn is_finalized(&self) -> bool {
        self.is_verified() || self.payment_status != PaymentStatus::Pending
    }
}

//--------------------------------------       Dispatch        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// The artisan was notified and has not responded
    Sent,
    Accepted,
    /// Another artisan accepted first, or the order was cancelled
    Superseded,
    /// The artisan turned the order down
    Declined,
    /// The artisan accepted but later reported that they cannot arrive
    Failed,
}

db_enum!(DispatchStatus {
    Sent => "sent",
    Accepted => "accepted",
    Superseded => "superseded",
    Declined => "declined",
    Failed => "failed",
});

impl DispatchStatus {
    /// Artisans with these outcomes are never offered the same order again.
    pub fn skips_order(&self) -> bool {
        matches!(self, Self::Declined | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Dispatch {
    pub id: i64,
    pub order_id: OrderId,
    pub artisan_id: i64,
    pub distance_km: Option<f64>,
    pub status: DispatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An artisan that matched a geo search, with the great-circle distance to the request location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub artisan_id: i64,
    pub name: String,
    pub distance_km: f64,
}

//--------------------------------------        Actors         ---------------------------------------------------------
/// Who triggered a state change. Stored in the audit log as `role:id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Customer(i64),
    Artisan(i64),
    Admin(i64),
    System,
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Customer(id) => write!(f, "customer:{id}"),
            Actor::Artisan(id) => write!(f, "artisan:{id}"),
            Actor::Admin(id) => write!(f, "admin:{id}"),
            Actor::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: i64,
    pub order_id: OrderId,
    pub actor: String,
    pub action: String,
    pub from_status: Option<OrderStatusType>,
    pub to_status: Option<OrderStatusType>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        Review       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: i64,
    pub artisan_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     Block ledger      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Customer,
    Artisan,
}

db_enum!(SubjectType { Customer => "customer", Artisan => "artisan" });

/// A customer or artisan: anything that can be blocked or hold conversation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectType,
    pub id: i64,
}

impl Subject {
    pub fn customer(id: i64) -> Self {
        Self { kind: SubjectType::Customer, id }
    }

    pub fn artisan(id: i64) -> Self {
        Self { kind: SubjectType::Artisan, id }
    }
}

impl Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: i64,
    pub subject_type: SubjectType,
    pub subject_id: i64,
    pub is_blocked: bool,
    pub reason: String,
    /// The amount the subject must pay to have the block lifted
    pub required_payment: Azn,
    pub blocked_by: String,
    pub created_at: DateTime<Utc>,
    pub block_until: Option<DateTime<Utc>>,
    pub unblocked_at: Option<DateTime<Utc>>,
    pub unblocked_by: Option<String>,
}

impl BlockRecord {
    pub fn subject(&self) -> Subject {
        Subject { kind: self.subject_type, id: self.subject_id }
    }
}

#[derive(Debug, Clone)]
pub struct NewBlock {
    pub subject: Subject,
    pub reason: String,
    pub required_payment: Azn,
    pub block_until: Option<DateTime<Utc>>,
    pub actor: Actor,
}

impl NewBlock {
    pub fn new<S: Into<String>>(subject: Subject, reason: S, required_payment: Azn, actor: Actor) -> Self {
        Self { subject, reason: reason.into(), required_payment, block_until: None, actor }
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.block_until = Some(until);
        self
    }
}

/// The answer to "is this subject blocked right now, and what do they owe?"
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockStatus {
    pub blocked: bool,
    pub reason: Option<String>,
    pub required_payment: Azn,
    pub block_until: Option<DateTime<Utc>>,
}

impl BlockStatus {
    pub fn unblocked() -> Self {
        Self::default()
    }

    /// Derives the current status from the most recent ledger row. A timed block whose `block_until` has passed is
    /// reported as lifted even if the worker has not closed it yet.
    pub fn from_record(record: Option<&BlockRecord>, now: DateTime<Utc>) -> Self {
        match record {
            Some(r) if r.is_blocked && r.block_until.map(|t| t > now).unwrap_or(true) => Self {
                blocked: true,
                reason: Some(r.reason.clone()),
                required_payment: r.required_payment,
                block_until: r.block_until,
            },
            _ => Self::unblocked(),
        }
    }
}

impl Display for BlockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.blocked {
            return write!(f, "not blocked");
        }
        let reason = self.reason.as_deref().unwrap_or("no reason given");
        write!(f, "blocked: {reason}. Pay {} to be unblocked", self.required_payment)?;
        if let Some(until) = self.block_until {
            write!(f, " (or wait until {})", until.format("%Y-%m-%d %H:%M UTC"))?;
        }
        Ok(())
    }
}

//--------------------------------------      Escalations      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    /// The customer's card receipt was not accepted in time
    CardReceipt,
    /// The artisan's commission for a cash order was not settled in time
    CashCommission,
}

db_enum!(EscalationKind { CardReceipt => "card_receipt", CashCommission => "cash_commission" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Scheduled,
    Executed,
    Cancelled,
    Failed,
}

db_enum!(EscalationStatus {
    Scheduled => "scheduled",
    Executed => "executed",
    Cancelled => "cancelled",
    Failed => "failed",
});

/// A durable deferred task. There is at most one per `(order_id, kind)`; rescheduling overwrites it.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct EscalationTask {
    pub id: i64,
    pub order_id: OrderId,
    pub kind: EscalationKind,
    /// The customer or artisan who gets blocked if the task fires
    pub subject_id: i64,
    /// The receipt version observed when the task was (re)scheduled. A different current version means the subject
    /// has resubmitted and the task must not fire.
    pub receipt_version: i64,
    pub due_at: DateTime<Utc>,
    pub status: EscalationStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscalationTask {
    pub fn subject(&self) -> Subject {
        match self.kind {
            EscalationKind::CardReceipt => Subject::customer(self.subject_id),
            EscalationKind::CashCommission => Subject::artisan(self.subject_id),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EscalationStatus::Scheduled && self.due_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct NewEscalation {
    pub order_id: OrderId,
    pub kind: EscalationKind,
    pub subject_id: i64,
    pub due_at: DateTime<Utc>,
}

//--------------------------------------        Refunds        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Waiting for the customer to supply payout card details
    Pending,
    /// Card details received; waiting for an admin to make the transfer
    PendingAdmin,
    Completed,
    Declined,
}

db_enum!(RefundStatus {
    Pending => "pending",
    PendingAdmin => "pending_admin",
    Completed => "completed",
    Declined => "declined",
});

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: i64,
    pub amount: Azn,
    pub reason: String,
    pub status: RefundStatus,
    /// Ciphertext of the payout card number. Never the plaintext.
    #[serde(skip_serializing)]
    pub payout_card: Option<String>,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewRefund {
    pub order_id: OrderId,
    pub customer_id: i64,
    pub amount: Azn,
    pub reason: String,
    pub requested_by: Actor,
}

//--------------------------------------    PendingAction      ---------------------------------------------------------
/// The multistep conversation a subject is currently in. The chat layer uses this to interpret the next free-form
/// message or uploaded file from that subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingAction {
    ProvideCardDetails { refund_id: i64 },
    UploadReceipt { order_id: OrderId },
    UploadCommissionReceipt { order_id: OrderId },
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PendingActionRow {
    pub subject_type: SubjectType,
    pub subject_id: i64,
    pub action: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn enum_strings_round_trip_through_display() {
        assert_eq!(RefundStatus::PendingAdmin.to_string(), "pending_admin");
        assert_eq!("pending_admin".parse::<RefundStatus>().unwrap(), RefundStatus::PendingAdmin);
        assert_eq!(OrderStatusType::from("accepted".to_string()), OrderStatusType::Accepted);
        assert_eq!(OrderStatusType::from("garbage".to_string()), OrderStatusType::Searching);
        assert!("bogus".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn receipt_kind_follows_payment_method() {
        assert_eq!(ReceiptKind::for_method(Some(PaymentMethod::Cash)), ReceiptKind::CashCommission);
        assert_eq!(ReceiptKind::for_method(Some(PaymentMethod::Card)), ReceiptKind::CardPayment);
        assert_eq!(ReceiptKind::for_method(None), ReceiptKind::CardPayment);
    }

    #[test]
    fn pending_action_json_is_tagged() {
        let action = PendingAction::ProvideCardDetails { refund_id: 7 };
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(json, r#"{"type":"provide_card_details","refund_id":7}"#);
        let back: PendingAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn expired_timed_block_reads_as_lifted() {
        let now = Utc::now();
        let record = BlockRecord {
            id: 1,
            subject_type: SubjectType::Customer,
            subject_id: 3,
            is_blocked: true,
            reason: "late".into(),
            required_payment: Azn::from_manat(10),
            blocked_by: "system".into(),
            created_at: now - chrono::Duration::hours(3),
            block_until: Some(now - chrono::Duration::hours(1)),
            unblocked_at: None,
            unblocked_by: None,
        };
        assert!(!BlockStatus::from_record(Some(&record), now).blocked);
        let open = BlockRecord { block_until: None, ..record };
        let status = BlockStatus::from_record(Some(&open), now);
        assert!(status.blocked);
        assert_eq!(status.required_payment, Azn::from_manat(10));
        assert_eq!(status.to_string(), "blocked: late. Pay 10.00 AZN to be unblocked");
    }
}
