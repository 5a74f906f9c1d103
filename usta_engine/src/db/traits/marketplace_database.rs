use crate::{
    db::traits::{
        BlockManagement,
        ConversationManagement,
        OrderManagement,
        ParticipantManagement,
        PaymentManagement,
        RefundManagement,
    },
    market_api::errors::MarketplaceError,
};

/// The highest level of behaviour for backends supporting the marketplace.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase:
    Clone
    + ParticipantManagement
    + OrderManagement
    + PaymentManagement
    + BlockManagement
    + RefundManagement
    + ConversationManagement
{
    /// The URL of the database
    fn url(&self) -> &str;

    async fn close(&mut self) -> Result<(), MarketplaceError>;
}
