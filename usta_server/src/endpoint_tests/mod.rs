mod auth;
mod blocks;
mod helpers;
mod orders;
mod receipts;
mod refunds;
