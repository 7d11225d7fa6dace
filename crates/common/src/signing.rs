//! HMAC-SHA256 signing, used for push-endpoint tokens and outbound webhook
//! payload signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn sign_hmac(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any size");

    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison against a freshly computed signature.
pub fn verify_hmac(payload: &str, signature_hex: &str, secret: &str) -> bool {
    let computed = sign_hmac(payload, secret);

    computed.as_bytes().len() == signature_hex.as_bytes().len()
        && computed
            .as_bytes()
            .iter()
            .zip(signature_hex.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_roundtrip() {
        let payload = r#"{"monitor_id":"abc","status":"up"}"#;
        let secret = "top-secret";

        let signature = sign_hmac(payload, secret);
        assert!(verify_hmac(payload, &signature, secret));
        assert!(!verify_hmac(payload, "deadbeef", secret));
        assert!(!verify_hmac("tampered", &signature, secret));
    }

    #[test]
    fn test_hmac_deterministic() {
        let payload = "same payload";
        let secret = "same secret";

        assert_eq!(sign_hmac(payload, secret), sign_hmac(payload, secret));
    }
}
