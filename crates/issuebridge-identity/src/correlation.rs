//! Correlation token bridging the GitHub install redirect and the Discord
//! OAuth redirect.
//!
//! The token travels as the `installation_id` cookie. Its value carries the
//! installation id and the absolute expiry, tagged with an HMAC so the
//! callback server only trusts values it minted itself:
//!
//! ```text
//! <installation_id>.<expires_unix>.<base64url(hmac_sha256)>
//! ```

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use issuebridge_core::is_expired_unix;
use sha2::{Digest, Sha256};

pub const CORRELATION_COOKIE_NAME: &str = "installation_id";
pub const CORRELATION_TTL_SECONDS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationToken {
    pub installation_id: String,
    pub issued_at: u64,
    pub ttl_seconds: u64,
}

impl CorrelationToken {
    pub fn expires_at(&self) -> u64 {
        self.issued_at.saturating_add(self.ttl_seconds)
    }
}

/// True while `now_unix` is strictly before the token's expiry.
pub fn is_valid(token: &CorrelationToken, now_unix: u64) -> bool {
    !is_expired_unix(Some(token.expires_at()), now_unix)
}

/// Accepts only non-empty ASCII-digit installation ids, trimmed.
pub fn normalize_installation_id(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Mints, seals and opens correlation tokens with one process-wide key.
#[derive(Clone)]
pub struct CorrelationSigner {
    mac: Hmac<Sha256>,
    ttl_seconds: u64,
}

impl fmt::Debug for CorrelationSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationSigner")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl CorrelationSigner {
    pub fn new(secret: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: Hmac::<Sha256>::new_from_slice(secret)?,
            ttl_seconds: CORRELATION_TTL_SECONDS,
        })
    }

    /// Derives the signing key from other secret material (e.g. the OAuth client secret).
    pub fn derived_from(material: &str) -> Result<Self, InvalidLength> {
        let mut digest = Sha256::new();
        digest.update(b"issuebridge-correlation-cookie:");
        digest.update(material.as_bytes());
        Self::new(digest.finalize().as_slice())
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds.max(1);
        self
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn mint(&self, installation_id: &str, now_unix: u64) -> CorrelationToken {
        CorrelationToken {
            installation_id: installation_id.to_string(),
            issued_at: now_unix,
            ttl_seconds: self.ttl_seconds,
        }
    }

    fn tag(&self, payload: &str) -> Hmac<Sha256> {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac
    }

    pub fn seal(&self, token: &CorrelationToken) -> String {
        let payload = format!("{}.{}", token.installation_id, token.expires_at());
        let tag = self.tag(&payload).finalize().into_bytes();
        format!("{payload}.{}", URL_SAFE_NO_PAD.encode(tag))
    }

    /// Returns the token sealed in `value`, or `None` when the value was not
    /// produced by this signer. Expiry is not checked here; see [`is_valid`].
    pub fn open(&self, value: &str) -> Option<CorrelationToken> {
        let mut parts = value.trim().split('.');
        let (Some(installation_id), Some(expires_raw), Some(tag_raw), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        // Only the exact bytes `seal` produces are accepted, so one token has
        // exactly one cookie value.
        if normalize_installation_id(Some(installation_id)).as_deref() != Some(installation_id) {
            return None;
        }
        let expires_at = expires_raw.parse::<u64>().ok()?;
        if expires_at.to_string() != expires_raw {
            return None;
        }
        let tag = URL_SAFE_NO_PAD.decode(tag_raw).ok()?;
        if URL_SAFE_NO_PAD.encode(&tag) != tag_raw {
            return None;
        }
        self.tag(&format!("{installation_id}.{expires_raw}"))
            .verify_slice(&tag)
            .ok()?;
        Some(CorrelationToken {
            installation_id: installation_id.to_string(),
            issued_at: expires_at.saturating_sub(self.ttl_seconds),
            ttl_seconds: self.ttl_seconds,
        })
    }
}
