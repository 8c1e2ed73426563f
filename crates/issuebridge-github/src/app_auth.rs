//! GitHub App JWT minting.

use std::fmt;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

use crate::GithubApiError;

/// GitHub rejects App JWTs that live longer than ten minutes.
pub const APP_JWT_LIFETIME_SECONDS: u64 = 540;
const APP_JWT_BACKDATE_SECONDS: u64 = 60;

#[derive(Debug, Serialize)]
struct AppJwtClaims<'a> {
    iat: u64,
    exp: u64,
    iss: &'a str,
}

#[derive(Clone)]
/// App identity (App id or client id) plus its RSA private key.
pub struct GithubAppCredentials {
    app_id: String,
    key: EncodingKey,
}

impl fmt::Debug for GithubAppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubAppCredentials")
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl GithubAppCredentials {
    pub fn from_pem(app_id: impl Into<String>, private_key_pem: &[u8]) -> Result<Self, GithubApiError> {
        let app_id = app_id.into().trim().to_string();
        if app_id.is_empty() {
            return Err(GithubApiError::Config(
                "github app id cannot be empty".to_string(),
            ));
        }
        let key = EncodingKey::from_rsa_pem(private_key_pem)?;
        Ok(Self { app_id, key })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Signs a short-lived RS256 JWT identifying the App, backdated for clock drift.
    pub(crate) fn app_jwt(&self, now_unix: u64) -> Result<String, GithubApiError> {
        let claims = AppJwtClaims {
            iat: now_unix.saturating_sub(APP_JWT_BACKDATE_SECONDS),
            exp: now_unix.saturating_add(APP_JWT_LIFETIME_SECONDS),
            iss: &self.app_id,
        };
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.key)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use serde_json::Value;

    use super::*;

    pub(crate) const TEST_APP_PRIVATE_KEY: &str = include_str!("../testdata/app-private-key.pem");

    fn decode_segment(segment: &str) -> Value {
        let bytes = URL_SAFE_NO_PAD.decode(segment).expect("base64url segment");
        serde_json::from_slice(&bytes).expect("json segment")
    }

    #[test]
    fn functional_app_jwt_carries_issuer_and_bounded_lifetime() {
        let credentials =
            GithubAppCredentials::from_pem("Iv1.test-client", TEST_APP_PRIVATE_KEY.as_bytes())
                .expect("credentials");
        let jwt = credentials.app_jwt(1_700_000_000).expect("jwt");
        let segments = jwt.split('.').collect::<Vec<_>>();
        assert_eq!(segments.len(), 3);

        let header = decode_segment(segments[0]);
        assert_eq!(header["alg"], "RS256");
        let claims = decode_segment(segments[1]);
        assert_eq!(claims["iss"], "Iv1.test-client");
        assert_eq!(claims["iat"], 1_699_999_940_u64);
        assert_eq!(claims["exp"], 1_700_000_540_u64);
    }

    #[test]
    fn regression_empty_app_id_is_rejected() {
        let error = GithubAppCredentials::from_pem("  ", TEST_APP_PRIVATE_KEY.as_bytes())
            .expect_err("empty app id");
        assert!(matches!(error, GithubApiError::Config(_)));
    }

    #[test]
    fn regression_invalid_pem_is_rejected() {
        let error = GithubAppCredentials::from_pem("12345", b"not a key")
            .expect_err("invalid pem");
        assert!(matches!(error, GithubApiError::Jwt(_)));
    }

    #[test]
    fn unit_debug_output_omits_private_key() {
        let credentials =
            GithubAppCredentials::from_pem("12345", TEST_APP_PRIVATE_KEY.as_bytes())
                .expect("credentials");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("12345"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }
}
