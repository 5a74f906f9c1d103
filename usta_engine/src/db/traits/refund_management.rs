use chrono::{DateTime, Utc};

use crate::{
    db_types::{Actor, Azn, NewRefund, RefundRequest, RefundStatus},
    market_api::errors::MarketplaceError,
};

#[allow(async_fn_in_trait)]
pub trait RefundManagement {
    /// Opens a refund unless it would take the total of the order's non-declined refunds past `paid`.
    async fn insert_refund(
        &self,
        refund: NewRefund,
        paid: Azn,
        now: DateTime<Utc>,
    ) -> Result<RefundRequest, MarketplaceError>;

    async fn fetch_refund(&self, id: i64) -> Result<Option<RefundRequest>, MarketplaceError>;

    async fn fetch_refunds(&self, status: Option<RefundStatus>) -> Result<Vec<RefundRequest>, MarketplaceError>;

    /// `pending` -> `pending_admin`. `ciphertext` is the encrypted payout card number.
    async fn store_payout_card(
        &self,
        id: i64,
        customer_id: i64,
        ciphertext: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundRequest, MarketplaceError>;

    /// `pending_admin` -> `completed`
    async fn complete_refund(&self, id: i64, admin: Actor, now: DateTime<Utc>) -> Result<RefundRequest, MarketplaceError>;

    /// `pending` or `pending_admin` -> `declined`
    async fn decline_refund(&self, id: i64, customer_id: i64, now: DateTime<Utc>) -> Result<RefundRequest, MarketplaceError>;
}
