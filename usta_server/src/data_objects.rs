use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use usta_engine::db_types::{
    Azn,
    BlockRecord,
    BlockStatus,
    Dispatch,
    Order,
    OrderEvent,
    OrderPayment,
    OrderStatusType,
    ReceiptKind,
    RefundStatus,
    Subject,
    SubjectType,
};

use crate::errors::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

/// Amounts travel as decimal strings ("10.35") so that nobody has to think in qəpik.
pub fn parse_amount(field: &str, value: &str) -> Result<Azn, ServerError> {
    value.parse::<Azn>().map_err(|e| ServerError::InvalidRequestBody(format!("Invalid {field} '{value}'. {e}")))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptQueueParams {
    pub kind: Option<ReceiptKind>,
    #[serde(default)]
    pub include_rejected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideParams {
    pub status: OrderStatusType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectPath {
    pub kind: SubjectType,
    pub id: i64,
}

impl From<SubjectPath> for Subject {
    fn from(path: SubjectPath) -> Self {
        Subject { kind: path.kind, id: path.id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockParams {
    pub reason: String,
    pub required_payment: String,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundParams {
    pub order_id: i64,
    pub amount: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundQueryParams {
    pub status: Option<RefundStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutCard {
    pub refund_id: i64,
    pub card_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSummary {
    pub status: BlockStatus,
    pub history: Vec<BlockRecord>,
}

/// Everything an admin needs to settle a dispute about one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub payment: Option<OrderPayment>,
    pub dispatches: Vec<Dispatch>,
    pub history: Vec<OrderEvent>,
}
