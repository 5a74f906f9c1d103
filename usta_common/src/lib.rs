mod azn;

pub mod helpers;
pub mod op;
mod secret;

pub use azn::{mul_div_round, Azn, AznConversionError, AZN_CURRENCY_CODE, QEPIK_PER_MANAT};
pub use secret::Secret;
