//! Bearer-token check for the HTTP surface (§6 "Auth"). A configured token
//! disables anonymous access; its absence disables auth entirely with a
//! startup warning logged by the caller.

use sha2::{Digest, Sha256};

/// Constant-time comparison of a presented bearer token against the
/// configured one. Hashing both sides to a fixed-width digest first means
/// the comparison cost doesn't leak the token's length, then XORs every byte
/// rather than short-circuiting on the first mismatch.
pub fn verify_bearer_token(presented: &str, configured: &str) -> bool {
    let presented_digest = Sha256::digest(presented.as_bytes());
    let configured_digest = Sha256::digest(configured.as_bytes());

    let mut diff: u8 = 0;
    for (a, b) in presented_digest.iter().zip(configured_digest.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_tokens_verify() {
        assert!(verify_bearer_token("secret-token", "secret-token"));
    }

    #[test]
    fn mismatched_tokens_fail() {
        assert!(!verify_bearer_token("wrong-token", "secret-token"));
    }

    #[test]
    fn empty_presented_token_fails_against_configured() {
        assert!(!verify_bearer_token("", "secret-token"));
    }

    #[test]
    fn extracts_bearer_prefix() {
        assert_eq!(extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("Basic abc123"), None);
    }
}
