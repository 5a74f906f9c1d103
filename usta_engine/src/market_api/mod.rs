//! # Usta marketplace public API
//!
//! The `market_api` module exposes the programmatic API of the marketplace. It is split by concern, so a client can
//! use only the parts it needs.
//!
//! * [`order_flow_api`] drives an order from request to completion: dispatch to nearby artisans, accept races,
//!   rejection and reassignment, pricing, payment method, completion, cancellation and reviews.
//! * [`payment_verification_api`] handles card and commission receipts, the admin review queue and the timeout
//!   escalations that block a party who never produces an acceptable receipt.
//! * [`block_api`] is the block ledger: manual blocks, status checks and expiry of timed blocks.
//! * [`refund_api`] walks a refund from the admin's decision to the payout.
//! * [`participant_api`] registers customers and artisans and manages price ranges.
//! * [`conversation_api`] tracks which multistep chat conversation a subject is in.
//! * [`matching_api`] finds the artisans nearest to a location.
//!
//! # API usage
//!
//! Every API is created from a storage backend that implements the traits it needs, plus the event producers that
//! notifications go out on. The clock and business policy can be overridden with the `with_*` builders.
//!
//! ```rust,ignore
//! use usta_engine::{OrderFlowApi, SqliteDatabase, events::EventProducers};
//! let db = SqliteDatabase::new_with_url("sqlite://data/usta.db", 25).await?;
//! let api = OrderFlowApi::new(db, EventProducers::default());
//! let outcome = api.create_order(NewOrder::new(customer_id, "plumber").with_location(here)).await?;
//! ```

pub mod block_api;
pub mod collaborators;
pub mod conversation_api;
pub mod errors;
pub mod matching_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod participant_api;
pub mod payment_verification_api;
pub mod policy;
pub mod refund_api;
