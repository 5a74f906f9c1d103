//! Encryption of personal data at rest.
//!
//! Payout card numbers are the only personal data the marketplace stores that needs protecting. They are sealed with
//! XChaCha20-Poly1305 under a key stretched from the `USTA_PII_KEY` secret with Argon2id. The stored form is
//! `base64(nonce || ciphertext+tag)` with a fresh random 24-byte nonce per card.
//!
//! Rotating `USTA_PII_KEY` makes every stored card unreadable.
use argon2::Argon2;
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Key,
    XChaCha20Poly1305,
    XNonce,
};
use usta_common::Secret;
use usta_engine::{PiiCipher, PiiCipherError};

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
// Fixed so the same secret always yields the same key. Argon2 wants at least 8 bytes.
const KEY_SALT: &[u8] = b"usta-pii-key-v1";

#[derive(Clone)]
pub struct AeadPiiCipher {
    aead: XChaCha20Poly1305,
}

impl AeadPiiCipher {
    pub fn new(master_key: &Secret<String>) -> Result<Self, PiiCipherError> {
        if master_key.is_empty() {
            return Err(PiiCipherError::InvalidKey("The PII key cannot be empty".into()));
        }
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(master_key.reveal().as_bytes(), KEY_SALT, &mut key)
            .map_err(|e| PiiCipherError::InvalidKey(e.to_string()))?;
        let aead = XChaCha20Poly1305::new(Key::from_slice(&key));
        key.fill(0);
        Ok(Self { aead })
    }
}

impl PiiCipher for AeadPiiCipher {
    fn encrypt(&self, plaintext: &Secret<String>) -> Result<String, PiiCipherError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self
            .aead
            .encrypt(&nonce, plaintext.reveal().as_bytes())
            .map_err(|e| PiiCipherError::EncryptionFailed(e.to_string()))?;
        let mut stored = Vec::with_capacity(NONCE_LEN + sealed.len());
        stored.extend_from_slice(&nonce);
        stored.extend_from_slice(&sealed);
        Ok(base64::encode(stored))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<Secret<String>, PiiCipherError> {
        let stored = base64::decode(ciphertext)
            .map_err(|e| PiiCipherError::MalformedCiphertext(format!("Not valid base64. {e}")))?;
        if stored.len() < NONCE_LEN + TAG_LEN {
            return Err(PiiCipherError::MalformedCiphertext("Too short".into()));
        }
        let (nonce, sealed) = stored.split_at(NONCE_LEN);
        let data =
            self.aead.decrypt(XNonce::from_slice(nonce), sealed).map_err(|_| PiiCipherError::AuthenticationFailed)?;
        let plaintext = String::from_utf8(data)
            .map_err(|e| PiiCipherError::MalformedCiphertext(format!("Decrypted data is not UTF-8. {e}")))?;
        Ok(Secret::new(plaintext))
    }
}
