use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compares two secrets without leaking how long their common prefix is. Both values are reduced to an HMAC digest
/// first, and the digests are compared in constant time.
pub fn secrets_match(expected: &str, presented: &str) -> bool {
    let digest = |value: &str| {
        HmacSha256::new_from_slice(b"usta-secret-comparison").map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };
    match (digest(expected), digest(presented)) {
        (Ok(expected), Ok(presented)) => presented.verify_slice(&expected.finalize().into_bytes()).is_ok(),
        _ => false,
    }
}
