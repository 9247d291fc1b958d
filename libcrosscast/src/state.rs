//! Signed OAuth state round-tripped through the provider redirect
//!
//! The state parameter carries everything the callback needs to finish a
//! connection: who asked, for which workspace and provider, and where to send
//! the browser afterwards. The payload is base64url-encoded JSON followed by
//! an HMAC-SHA256 tag over the encoded bytes, so a state that was tampered
//! with in transit fails verification instead of decoding to attacker-chosen
//! values.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ring::hmac;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OAuthError;
use crate::registry::ProviderKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub provider: ProviderKind,
    pub return_path: String,
    /// Random per-flow value; makes every encoded state unique.
    pub nonce: String,
}

impl OAuthState {
    pub fn new(
        user_id: Uuid,
        workspace_id: Uuid,
        provider: ProviderKind,
        return_path: String,
    ) -> Self {
        Self {
            user_id,
            workspace_id,
            provider,
            return_path,
            nonce: format!("{:032x}", rand::random::<u128>()),
        }
    }

    /// Encode and sign with the server-held key.
    ///
    /// Output is `<payload>.<tag>`, both segments base64url without padding,
    /// safe to embed in a query string.
    pub fn encode(&self, key: &[u8]) -> String {
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(self).expect("OAuthState serialization cannot fail"),
        );
        let key = hmac::Key::new(hmac::HMAC_SHA256, key);
        let tag = hmac::sign(&key, payload.as_bytes());
        format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(tag.as_ref()))
    }

    /// Verify the tag and decode the payload.
    ///
    /// Any failure (missing tag, bad signature, undecodable payload) is
    /// reported uniformly as `InvalidState`.
    pub fn decode(encoded: &str, key: &[u8]) -> Result<Self, OAuthError> {
        let (payload, tag) = encoded.split_once('.').ok_or(OAuthError::InvalidState)?;

        let tag_bytes = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| OAuthError::InvalidState)?;

        let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, key);
        hmac::verify(&hmac_key, payload.as_bytes(), &tag_bytes)
            .map_err(|_| OAuthError::InvalidState)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| OAuthError::InvalidState)?;

        serde_json::from_slice(&json).map_err(|_| OAuthError::InvalidState)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test-signing-key-0123456789abcdef";

    fn sample_state() -> OAuthState {
        OAuthState::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ProviderKind::X,
            "/settings/connections".to_string(),
        )
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let state = sample_state();
        let encoded = state.encode(KEY);
        let decoded = OAuthState::decode(&encoded, KEY).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_round_trip_preserves_all_fields() {
        let state = OAuthState::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ProviderKind::Instagram,
            "/dash?tab=social".to_string(),
        );
        let decoded = OAuthState::decode(&state.encode(KEY), KEY).unwrap();

        assert_eq!(decoded.user_id, state.user_id);
        assert_eq!(decoded.workspace_id, state.workspace_id);
        assert_eq!(decoded.provider, ProviderKind::Instagram);
        assert_eq!(decoded.return_path, "/dash?tab=social");
        assert_eq!(decoded.nonce, state.nonce);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let encoded = sample_state().encode(KEY);
        let (payload, tag) = encoded.split_once('.').unwrap();

        // Forge a different payload under the original tag.
        let mut bytes = URL_SAFE_NO_PAD.decode(payload).unwrap();
        let pos = bytes.iter().position(|b| *b == b'/').unwrap();
        bytes[pos] = b'!';
        let forged = format!("{}.{}", URL_SAFE_NO_PAD.encode(&bytes), tag);

        assert!(matches!(
            OAuthState::decode(&forged, KEY),
            Err(OAuthError::InvalidState)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let encoded = sample_state().encode(KEY);
        assert!(matches!(
            OAuthState::decode(&encoded, b"another-key-entirely"),
            Err(OAuthError::InvalidState)
        ));
    }

    #[test]
    fn test_missing_tag_rejected() {
        let encoded = sample_state().encode(KEY);
        let payload = encoded.split_once('.').unwrap().0;
        assert!(matches!(
            OAuthState::decode(payload, KEY),
            Err(OAuthError::InvalidState)
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        for garbage in ["", ".", "not-base64.not-base64", "a.b.c"] {
            assert!(OAuthState::decode(garbage, KEY).is_err(), "{:?}", garbage);
        }
    }

    #[test]
    fn test_states_are_unique_per_flow() {
        let a = sample_state();
        let b = sample_state();
        assert_ne!(a.nonce, b.nonce);
    }
}
