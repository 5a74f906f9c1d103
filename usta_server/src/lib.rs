//! # Usta server
//! This crate hosts the long-running side of the Usta marketplace. It is responsible for:
//! Running the escalation worker, which blocks customers and artisans whose receipts were not approved in time and
//! lifts timed blocks when they run out.
//! Publishing every notification the engine emits, so the chat transport can deliver it.
//! Serving a small admin API for the review queue, disputes, blocks and refunds.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/admin/receipts`: The receipt review queue, plus `/{order_id}/approve` and `/{order_id}/reject`.
//! * `/admin/escalations/run`: Runs the escalation pass immediately.
//! * `/admin/orders/{order_id}`: Order details, and `/override` to force a status.
//! * `/admin/blocks/{customer|artisan}/{id}`: Block status (GET), block (POST) and unblock (DELETE).
//! * `/admin/refunds`: List and open refunds, fetch the payout card, and mark refunds as paid.
//!
//! Every `/admin` route requires an `X-Admin-Token` header.

pub mod cipher;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod escalation_worker;
pub mod helpers;
pub mod middleware;
pub mod notifier;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
