//! #  Storage backends
//!
//! This module defines the contracts a storage backend must satisfy to run the marketplace.
//!
//! Every method that changes state is atomic. Methods that guard a transition (accepting an order, approving a
//! receipt, executing an escalation) express the guard and the write as a single conditional update, so two callers
//! racing on the same order or subject cannot both succeed. When a guard fails, the backend reports the reason as the
//! matching [`MarketplaceError`](crate::MarketplaceError) variant.
//!
//! * [`ParticipantManagement`] registers customers and artisans, their price ranges, and runs the geo pre-filter.
//! * [`OrderManagement`] drives the order state machine, dispatch log, audit log and reviews.
//! * [`PaymentManagement`] owns payment rows, receipts and the timeout escalations attached to them.
//! * [`BlockManagement`] is the append-only block ledger.
//! * [`RefundManagement`] tracks refund requests.
//! * [`ConversationManagement`] stores the multistep conversation each subject is in.
//! * [`MarketplaceDatabase`] ties them together.
mod block_management;
mod conversation_management;
mod data_objects;
mod marketplace_database;
mod order_management;
mod participant_management;
mod payment_management;
mod refund_management;

pub use block_management::BlockManagement;
pub use conversation_management::ConversationManagement;
pub use data_objects::{AcceptedOrder, CancelGuard, OrderTransition, PricedOrder, ReceiptDecision, ReceiptResolved, ReceiptSaved};
pub use marketplace_database::MarketplaceDatabase;
pub use order_management::OrderManagement;
pub use participant_management::ParticipantManagement;
pub use payment_management::PaymentManagement;
pub use refund_management::RefundManagement;
