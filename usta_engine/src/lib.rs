//! Usta marketplace engine
//!
//! Usta matches customers who need a job done with nearby artisans through a chat interface. This library contains
//! the core logic of the marketplace and knows nothing about the chat platform it is driven from.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@db`]). SQLite is the supported backend. You should never need to access
//!    the database directly. Instead, use the public API. The exception is the data types used in the database. These
//!    are defined in the `db_types` module and are public.
//! 2. The marketplace public API ([`mod@market_api`]). This covers the order lifecycle, payment verification, the
//!    block ledger, refunds and conversation state. Storage backends implement the `*Management` traits to serve it.
//!
//! The engine emits events whenever something happens that a participant should hear about, and whenever an order
//! changes status. Hook into them with [`events::EventHooks`] to deliver messages or keep external systems in sync.
mod db;

pub mod clock;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod market_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{db_url, run_migrations, SqliteDatabase};
pub use db::traits::{
    AcceptedOrder,
    BlockManagement,
    CancelGuard,
    ConversationManagement,
    MarketplaceDatabase,
    OrderManagement,
    OrderTransition,
    ParticipantManagement,
    PaymentManagement,
    PricedOrder,
    ReceiptDecision,
    ReceiptResolved,
    ReceiptSaved,
    RefundManagement,
};
pub use market_api::{
    block_api::BlockApi,
    collaborators::{Geocoder, PiiCipher, PiiCipherError},
    conversation_api::ConversationApi,
    errors::{MarketplaceError, ValidationError},
    matching_api::ArtisanMatcher,
    order_flow_api::OrderFlowApi,
    order_objects,
    participant_api::ParticipantApi,
    payment_verification_api::{EscalationReport, PaymentVerificationApi},
    policy::{MarketplacePolicy, RejectionPolicy},
    refund_api::RefundApi,
};
