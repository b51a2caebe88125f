use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Generates a cryptographically random code verifier for PKCE.
///
/// Returns a 64-character URL-safe string (RFC 7636 compliant, 43-128 chars).
#[must_use]
pub fn generate_code_verifier() -> String {
    let random_bytes: [u8; 48] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Computes the S256 code challenge from a code verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generates a cryptographically random nonce for anti-forgery state.
///
/// Returns a 22-character URL-safe string (16 random bytes → base64url).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Encodes a state payload as URL-safe base64 of its JSON serialization.
///
/// The result is opaque to the provider and round-trips exactly through
/// [`decode_state`].
///
/// # Errors
///
/// Returns [`Error::InvalidState`] if the payload cannot be serialized.
pub fn encode_state<T: Serialize>(payload: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(payload).map_err(|e| Error::InvalidState(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decodes a state string produced by [`encode_state`].
///
/// # Errors
///
/// Returns [`Error::InvalidState`] if the string is not valid base64url or
/// the JSON does not match `T`.
pub fn decode_state<T: DeserializeOwned>(state: &str) -> Result<T, Error> {
    let json = URL_SAFE_NO_PAD
        .decode(state)
        .map_err(|e| Error::InvalidState(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| Error::InvalidState(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_code_verifier_length() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), 64);
    }

    #[test]
    fn test_code_verifier_url_safe() {
        let verifier = generate_code_verifier();
        assert!(
            verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "verifier should be URL-safe: {}",
            verifier
        );
    }

    #[test]
    fn test_code_verifier_uniqueness() {
        let v1 = generate_code_verifier();
        let v2 = generate_code_verifier();
        assert_ne!(v1, v2, "verifiers should be unique");
    }

    #[test]
    fn test_code_challenge_deterministic() {
        let verifier = "test_verifier_string";
        let c1 = generate_code_challenge(verifier);
        let c2 = generate_code_challenge(verifier);
        assert_eq!(c1, c2, "challenge should be deterministic");
    }

    #[test]
    fn test_code_challenge_different_for_different_verifiers() {
        let c1 = generate_code_challenge("verifier_1");
        let c2 = generate_code_challenge("verifier_2");
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_state_length() {
        let state = generate_state();
        assert_eq!(state.len(), 22);
    }

    #[test]
    fn test_state_uniqueness() {
        let s1 = generate_state();
        let s2 = generate_state();
        assert_ne!(s1, s2, "states should be unique");
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        success_redirect: String,
        nonce: String,
    }

    #[test]
    fn test_state_payload_roundtrip() {
        let payload = Payload {
            success_redirect: "/admin?tab=profile&x=1".into(),
            nonce: generate_state(),
        };
        let encoded = encode_state(&payload).unwrap();
        let decoded: Payload = decode_state(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_state_payload_roundtrip_arbitrary_json() {
        let value = serde_json::json!({
            "successRedirect": "/",
            "nested": { "list": [1, 2, 3], "flag": true },
            "unicode": "héllo wörld",
        });
        let encoded = encode_state(&value).unwrap();
        let decoded: serde_json::Value = decode_state(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_state_encoding_is_url_safe() {
        let value = serde_json::json!({ "successRedirect": "/admin" });
        let encoded = encode_state(&value).unwrap();
        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_decode_state_rejects_garbage() {
        assert!(decode_state::<Payload>("not base64url!!!").is_err());
        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        assert!(decode_state::<Payload>(&not_json).is_err());
    }
}
