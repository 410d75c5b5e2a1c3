//! Capability token issuance and verification.
//!
//! Tokens are self-contained signed claims: a base64url-encoded JSON claims
//! document followed by a base64url-encoded HMAC-SHA256 tag over the claims
//! bytes, joined with `.`. Nothing is stored server-side; validity is
//! signature + expiry, re-checked against registry state only at bind time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::protocol::NodeId;

type HmacSha256 = Hmac<Sha256>;

/// Size of the HMAC signing key in bytes.
const KEY_SIZE: usize = 32;

/// Role granted by a capability token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May bind as the node's publisher.
    Owner,
    /// May bind as one of the node's viewers.
    Viewer,
}

/// Claims embedded in a capability token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub role: Role,
    pub node_id: NodeId,
    pub project_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenClaims {
    /// Whether the token's lifetime has elapsed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Errors produced during token verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not in <claims>.<signature> form or is not valid base64url")]
    Malformed,
    #[error("token signature does not verify")]
    InvalidSignature,
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("failed to encode token claims")]
    Encoding,
    #[error("failed to obtain secure random bytes for the signing key")]
    EntropyUnavailable,
}

/// Issues and verifies signed, time-limited, role-scoped capability tokens.
///
/// The signing key lives for the process lifetime, matching the volatile
/// node registry: a restart invalidates outstanding tokens together with
/// the nodes they referenced.
pub struct TokenAuthority {
    key: [u8; KEY_SIZE],
    ttl: Duration,
}

impl TokenAuthority {
    /// Construct an authority with an explicit key and token lifetime.
    pub fn new(key: [u8; KEY_SIZE], ttl: Duration) -> Self {
        Self { key, ttl }
    }

    /// Construct an authority with a fresh random key.
    pub fn with_random_key(ttl: Duration) -> Result<Self, TokenError> {
        let mut key = [0u8; KEY_SIZE];
        getrandom::fill(&mut key).map_err(|_| TokenError::EntropyUnavailable)?;
        Ok(Self::new(key, ttl))
    }

    /// Mint an owner token for a node. Always succeeds for well-formed input.
    pub fn issue_owner_token(
        &self,
        node_id: NodeId,
        project_id: &str,
    ) -> Result<String, TokenError> {
        self.issue(Role::Owner, node_id, project_id)
    }

    /// Mint a viewer token. Capacity is not encoded here; the authoritative
    /// capacity check happens when the token is presented at bind time.
    pub fn issue_viewer_token(
        &self,
        node_id: NodeId,
        project_id: &str,
    ) -> Result<String, TokenError> {
        self.issue(Role::Viewer, node_id, project_id)
    }

    fn issue(&self, role: Role, node_id: NodeId, project_id: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = TokenClaims {
            role,
            node_id,
            project_id: project_id.to_string(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        let claims_bytes = serde_json::to_vec(&claims).map_err(|_| TokenError::Encoding)?;
        let tag = self.sign(&claims_bytes);
        Ok(format!(
            "{}.{}",
            BASE64_URL.encode(&claims_bytes),
            BASE64_URL.encode(tag)
        ))
    }

    /// Verify a token and return its claims. Side-effect-free: fails on
    /// malformed encoding, a bad signature, or an elapsed lifetime. Node
    /// existence and status are the caller's concern.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let (claims_b64, tag_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let claims_bytes = BASE64_URL
            .decode(claims_b64)
            .map_err(|_| TokenError::Malformed)?;
        let tag = BASE64_URL
            .decode(tag_b64)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac();
        mac.update(&claims_bytes);
        mac.verify_slice(&tag)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: TokenClaims =
            serde_json::from_slice(&claims_bytes).map_err(|_| TokenError::Malformed)?;
        if claims.is_expired() {
            return Err(TokenError::Expired(claims.expires_at));
        }
        Ok(claims)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length")
    }
}
