//! PKCE (Proof Key for Code Exchange) material per RFC 7636
//!
//! One `PkceSession` is generated per authorization attempt. The verifier
//! stays in memory until the final token exchange; the challenge and state
//! travel in the authorization URL.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};
use url::Url;

use crate::constants::{SCOPES, STATE_BYTES, VERIFIER_BYTES};
use crate::error::{Error, Result};

/// Ephemeral secrets for a single authorization attempt. Never persisted.
pub struct PkceSession {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceSession {
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: generate_state(),
        }
    }
}

impl std::fmt::Debug for PkceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceSession")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .field("state", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random PKCE code verifier.
///
/// 48 random bytes encoded as URL-safe base64 without padding (64 chars,
/// inside RFC 7636's 43-128 range).
pub fn generate_verifier() -> String {
    random_urlsafe::<VERIFIER_BYTES>()
}

/// Generate the anti-CSRF `state` value echoed back by the provider.
pub fn generate_state() -> String {
    random_urlsafe::<STATE_BYTES>()
}

fn random_urlsafe<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the browser authorization URL.
///
/// `access_type=offline` asks for a refresh token and `prompt=consent`
/// forces the provider to issue a new one even when the user has already
/// granted the scope.
pub fn build_authorization_url(
    auth_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    challenge: &str,
    state: &str,
) -> Result<String> {
    let mut url = Url::parse(auth_endpoint)
        .map_err(|e| Error::Configuration(format!("invalid authorization endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", SCOPES)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("access_type", "offline")
        .append_pair("include_granted_scopes", "true")
        .append_pair("prompt", "consent")
        .append_pair("state", state);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn is_urlsafe(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn verifier_is_64_urlsafe_chars() {
        let verifier = generate_verifier();
        assert_eq!(verifier.len(), 64);
        assert!(is_urlsafe(&verifier), "not base64url: {verifier}");
    }

    #[test]
    fn state_is_22_urlsafe_chars() {
        let state = generate_state();
        assert_eq!(state.len(), 22);
        assert!(is_urlsafe(&state), "not base64url: {state}");
    }

    #[test]
    fn sessions_do_not_collide() {
        let a = PkceSession::generate();
        let b = PkceSession::generate();
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.state, b.state);
    }

    #[test]
    fn session_challenge_matches_verifier() {
        let session = PkceSession::generate();
        assert_eq!(session.challenge, compute_challenge(&session.verifier));
    }

    #[test]
    fn challenge_matches_known_value() {
        // SHA256("hello") base64url-encoded without padding
        assert_eq!(
            compute_challenge("hello"),
            "LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ"
        );
    }

    #[test]
    fn debug_redacts_verifier_and_state() {
        let session = PkceSession::generate();
        let debug = format!("{session:?}");
        assert!(!debug.contains(&session.verifier));
        assert!(!debug.contains(&session.state));
    }

    #[test]
    fn authorization_url_carries_all_parameters() {
        let url = build_authorization_url(
            crate::constants::AUTHORIZE_ENDPOINT,
            "123.apps.googleusercontent.com",
            "http://127.0.0.1:5555/oauth2/callback",
            "challenge-value",
            "state-value",
        )
        .unwrap();

        assert!(url.starts_with(crate::constants::AUTHORIZE_ENDPOINT));
        let parsed = Url::parse(&url).unwrap();
        let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "123.apps.googleusercontent.com");
        assert_eq!(params["redirect_uri"], "http://127.0.0.1:5555/oauth2/callback");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], SCOPES);
        assert_eq!(params["code_challenge"], "challenge-value");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["include_granted_scopes"], "true");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["state"], "state-value");
    }

    #[test]
    fn authorization_url_rejects_bad_endpoint() {
        let err = build_authorization_url("not a url", "id", "http://x", "c", "s").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
