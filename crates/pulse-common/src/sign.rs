use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Name of the header carrying the request/response body signature.
pub const HASH_HEADER: &str = "HashSHA256";

/// Computes the hex-encoded HMAC-SHA256 of `body` under `key`.
///
/// The signature is always taken over the plain (uncompressed, unencrypted)
/// JSON body, on both sides of the wire.
pub fn sign(body: &[u8], key: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-position byte comparison of a received signature against the
/// expected one. Hex strings compare byte-for-byte.
pub fn verify(body: &[u8], key: &str, received: &str) -> bool {
    sign(body, key) == received
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic_and_hex() {
        let sig = sign(b"payload", "secret");
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, sign(b"payload", "secret"));
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let sig = sign(b"payload", "secret");
        assert!(verify(b"payload", "secret", &sig));
        assert!(!verify(b"payloae", "secret", &sig));
        assert!(!verify(b"payload", "other", &sig));
    }
}
