//! Interfaces to the services the marketplace leans on but does not own: reverse geocoding and encryption of
//! personal data at rest.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use thiserror::Error;
use usta_common::Secret;

use crate::db_types::GeoPoint;

pub type GeocodeResult = Pin<Box<dyn Future<Output = Result<Option<String>, String>> + Send>>;

/// Turns coordinates into a human-readable place name.
///
/// Lookups are best-effort: a failure is logged and reads as "no name", so order creation never waits on, or fails
/// because of, the geocoding service.
#[derive(Clone)]
pub struct Geocoder {
    lookup: Arc<dyn Fn(GeoPoint) -> GeocodeResult + Send + Sync>,
}

impl Geocoder {
    pub fn new<F>(f: F) -> Self
    where F: Fn(GeoPoint) -> GeocodeResult + Send + Sync + 'static {
        Self { lookup: Arc::new(f) }
    }

    pub async fn resolve_place_name(&self, location: GeoPoint) -> Option<String> {
        match (self.lookup)(location).await {
            Ok(name) => name,
            Err(e) => {
                warn!("🔄️ Could not resolve a place name for {location}: {e}");
                None
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PiiCipherError {
    #[error("The PII key is not usable. {0}")]
    InvalidKey(String),
    #[error("Could not encrypt the data. {0}")]
    EncryptionFailed(String),
    #[error("Ciphertext is malformed. {0}")]
    MalformedCiphertext(String),
    #[error("Ciphertext failed authentication")]
    AuthenticationFailed,
}

/// Encrypts personal data (payout card numbers) before it is stored.
pub trait PiiCipher: Send + Sync {
    fn encrypt(&self, plaintext: &Secret<String>) -> Result<String, PiiCipherError>;

    fn decrypt(&self, ciphertext: &str) -> Result<Secret<String>, PiiCipherError>;
}
