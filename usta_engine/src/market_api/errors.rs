use thiserror::Error;
use usta_common::Azn;

use crate::db_types::{BlockStatus, OrderId, OrderStatusType, RefundStatus, Subject};

/// Problems with the input of an action. Nothing is written when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("price must be within {min}–{max}")]
    PriceOutOfRange { min: Azn, max: Azn },
    #[error("price must be greater than zero")]
    NonPositivePrice,
    #[error("amount must be greater than zero")]
    NonPositiveAmount,
    #[error("the minimum price {min} is above the maximum {max}")]
    InvertedRange { min: Azn, max: Azn },
    #[error("invalid amount: {0}")]
    MalformedAmount(String),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("a valid location is required to find artisans nearby")]
    MissingCoordinates,
    #[error("rating must be between 1 and 5, not {0}")]
    RatingOutOfRange(i64),
    #[error("a refund of {requested} exceeds the {paid} paid for the order")]
    RefundExceedsPayment { requested: Azn, paid: Azn },
    #[error("a refund of {requested} on top of the {already_refunded} already refunded exceeds the {paid} paid")]
    RefundsExceedPayment { requested: Azn, already_refunded: Azn, paid: Azn },
    #[error("artisan #{artisan_id} does not offer {service}")]
    ServiceNotOffered { artisan_id: i64, service: String },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Error)]
pub enum MarketplaceError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Customer #{0} does not exist")]
    CustomerNotFound(i64),
    #[error("Artisan #{0} does not exist")]
    ArtisanNotFound(i64),
    #[error("Refund request #{0} does not exist")]
    RefundNotFound(i64),
    #[error("Order {0} has no payment record yet")]
    PaymentNotFound(OrderId),
    #[error("There is no active block for {0}")]
    BlockNotFound(Subject),
    #[error("Order {0} was taken by another artisan")]
    OrderNoLongerAvailable(OrderId),
    #[error("Order {order_id} cannot be {action} while it is {status}")]
    InvalidTransition { order_id: OrderId, status: OrderStatusType, action: &'static str },
    #[error("Order {order_id} is not assigned to artisan #{artisan_id}")]
    NotAssigned { order_id: OrderId, artisan_id: i64 },
    #[error("Order {order_id} does not belong to customer #{customer_id}")]
    NotOwner { order_id: OrderId, customer_id: i64 },
    #[error("Order {0} has no price yet")]
    PriceNotSet(OrderId),
    #[error("The payment for order {0} is already finalised")]
    PaymentFinalized(OrderId),
    #[error("Order {0} has no receipt awaiting review")]
    NoReceiptPending(OrderId),
    #[error("Order {0} has a receipt awaiting review and cannot be re-priced")]
    ReceiptUnderReview(OrderId),
    #[error("Order {0} has already been reviewed")]
    AlreadyReviewed(OrderId),
    #[error("Refund request #{id} is {status}")]
    RefundStatusMismatch { id: i64, status: RefundStatus },
    #[error("Account is {0}")]
    Blocked(BlockStatus),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for MarketplaceError {
    fn from(e: sqlx::Error) -> Self {
        MarketplaceError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for MarketplaceError {
    fn from(e: serde_json::Error) -> Self {
        MarketplaceError::DatabaseError(format!("Could not (de)serialize a stored value: {e}"))
    }
}

impl MarketplaceError {
    /// Expected business outcomes, as opposed to infrastructure faults.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, MarketplaceError::DatabaseError(_))
    }
}
