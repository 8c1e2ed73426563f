//! Discord OAuth2 code exchange and identity lookup.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use issuebridge_core::BridgeError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_DISCORD_AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";
const DEFAULT_DISCORD_SCOPE: &str = "identify";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const ERROR_BODY_MAX_CHARS: usize = 800;

#[derive(Clone)]
/// Public struct `DiscordOAuthConfig` used across issuebridge components.
pub struct DiscordOAuthConfig {
    pub api_base: String,
    pub authorize_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub request_timeout_ms: u64,
}

impl fmt::Debug for DiscordOAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordOAuthConfig")
            .field("api_base", &self.api_base)
            .field("authorize_url", &self.authorize_url)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl DiscordOAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            authorize_url: DEFAULT_DISCORD_AUTHORIZE_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scope: DEFAULT_DISCORD_SCOPE.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

/// Builds the Discord consent URL the GitHub callback redirects to.
pub fn authorize_redirect_url(config: &DiscordOAuthConfig) -> Result<String, DiscordOAuthError> {
    let url = Url::parse_with_params(
        config.authorize_url.trim(),
        &[
            ("client_id", config.client_id.trim()),
            ("response_type", "code"),
            ("redirect_uri", config.redirect_uri.trim()),
            ("scope", config.scope.trim()),
        ],
    )
    .map_err(|error| {
        DiscordOAuthError::Config(format!(
            "invalid discord authorize url '{}': {error}",
            config.authorize_url
        ))
    })?;
    Ok(url.into())
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordAccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for DiscordAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordAccessToken")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordIdentity {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Error)]
/// Enumerates supported `DiscordOAuthError` values.
pub enum DiscordOAuthError {
    #[error("invalid discord oauth configuration: {0}")]
    Config(String),
    #[error("discord {operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        source: reqwest::Error,
    },
    #[error("discord {operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("failed to decode discord {operation} response: {source}")]
    Decode {
        operation: &'static str,
        source: reqwest::Error,
    },
    #[error("discord {operation} response was unusable: {detail}")]
    InvalidResponse {
        operation: &'static str,
        detail: String,
    },
}

impl DiscordOAuthError {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Config(_) => "oauth configuration",
            Self::Transport { operation, .. }
            | Self::Status { operation, .. }
            | Self::Decode { operation, .. }
            | Self::InvalidResponse { operation, .. } => operation,
        }
    }
}

impl From<DiscordOAuthError> for BridgeError {
    fn from(error: DiscordOAuthError) -> Self {
        BridgeError::remote(error.operation(), error.to_string())
    }
}

/// The two Discord calls the linker needs. One shot each, never retried.
#[async_trait]
pub trait DiscordIdentityProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<DiscordAccessToken, DiscordOAuthError>;

    async fn fetch_identity(
        &self,
        access_token: &DiscordAccessToken,
    ) -> Result<DiscordIdentity, DiscordOAuthError>;
}

#[derive(Clone)]
pub struct DiscordOAuthClient {
    http: reqwest::Client,
    config: DiscordOAuthConfig,
}

impl DiscordOAuthClient {
    pub fn new(mut config: DiscordOAuthConfig) -> Result<Self, DiscordOAuthError> {
        config.client_id = config.client_id.trim().to_string();
        if config.client_id.is_empty() {
            return Err(DiscordOAuthError::Config(
                "discord client id cannot be empty".to_string(),
            ));
        }
        if config.client_secret.trim().is_empty() {
            return Err(DiscordOAuthError::Config(
                "discord client secret cannot be empty".to_string(),
            ));
        }
        config.api_base = config.api_base.trim().trim_end_matches('/').to_string();

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("issuebridge-discord-oauth"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|error| {
                DiscordOAuthError::Config(format!("failed to create discord oauth client: {error}"))
            })?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &DiscordOAuthConfig {
        &self.config
    }

    async fn send_json<T>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, DiscordOAuthError>
    where
        T: DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(|source| DiscordOAuthError::Transport { operation, source })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscordOAuthError::Status {
                operation,
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_MAX_CHARS).collect(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| DiscordOAuthError::Decode { operation, source })
    }
}

#[async_trait]
impl DiscordIdentityProvider for DiscordOAuthClient {
    async fn exchange_code(&self, code: &str) -> Result<DiscordAccessToken, DiscordOAuthError> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        self.send_json(
            "token exchange",
            self.http
                .post(format!("{}/oauth2/token", self.config.api_base))
                .form(&form),
        )
        .await
    }

    async fn fetch_identity(
        &self,
        access_token: &DiscordAccessToken,
    ) -> Result<DiscordIdentity, DiscordOAuthError> {
        let identity: DiscordIdentity = self
            .send_json(
                "identity lookup",
                self.http
                    .get(format!("{}/users/@me", self.config.api_base))
                    .bearer_auth(&access_token.access_token),
            )
            .await?;
        if identity.id.trim().is_empty() {
            return Err(DiscordOAuthError::InvalidResponse {
                operation: "identity lookup",
                detail: "empty user id".to_string(),
            });
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn test_config(api_base: &str) -> DiscordOAuthConfig {
        let mut config = DiscordOAuthConfig::new(
            "815097353228910643",
            "client-secret",
            "https://bridge.example/callback_discord",
        );
        config.api_base = api_base.to_string();
        config.request_timeout_ms = 2_000;
        config
    }

    #[test]
    fn unit_authorize_redirect_url_encodes_fixed_parameters() {
        let url = authorize_redirect_url(&test_config("https://discord.com/api/v10"))
            .expect("authorize url");
        assert_eq!(
            url,
            "https://discord.com/oauth2/authorize?client_id=815097353228910643&response_type=code&redirect_uri=https%3A%2F%2Fbridge.example%2Fcallback_discord&scope=identify"
        );
    }

    #[test]
    fn regression_authorize_redirect_url_rejects_relative_base() {
        let mut config = test_config("https://discord.com/api/v10");
        config.authorize_url = "oauth2/authorize".to_string();
        assert!(matches!(
            authorize_redirect_url(&config),
            Err(DiscordOAuthError::Config(_))
        ));
    }

    #[test]
    fn regression_client_requires_credentials() {
        let mut config = test_config("https://discord.com/api/v10");
        config.client_secret = " ".to_string();
        assert!(matches!(
            DiscordOAuthClient::new(config),
            Err(DiscordOAuthError::Config(_))
        ));
    }

    #[test]
    fn unit_debug_output_hides_secrets() {
        let config = test_config("https://discord.com/api/v10");
        assert!(!format!("{config:?}").contains("client-secret"));
        let token = DiscordAccessToken {
            access_token: "access-secret".to_string(),
            token_type: Some("Bearer".to_string()),
            scope: Some("identify".to_string()),
        };
        assert!(!format!("{token:?}").contains("access-secret"));
    }

    #[tokio::test]
    async fn integration_exchange_code_posts_authorization_code_form() {
        let server = MockServer::start();
        let token = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth2/token")
                .header("content-type", "application/x-www-form-urlencoded")
                .body_includes("grant_type=authorization_code")
                .body_includes("code=abc")
                .body_includes("client_id=815097353228910643")
                .body_includes("redirect_uri=https%3A%2F%2Fbridge.example%2Fcallback_discord");
            then.status(200).json_body(json!({
                "access_token": "discord-access",
                "token_type": "Bearer",
                "expires_in": 604800,
                "refresh_token": "discord-refresh",
                "scope": "identify"
            }));
        });

        let client = DiscordOAuthClient::new(test_config(&server.base_url())).expect("client");
        let access = client.exchange_code("abc").await.expect("token");
        assert_eq!(access.access_token, "discord-access");
        assert_eq!(access.scope.as_deref(), Some("identify"));
        assert_eq!(token.calls(), 1);
    }

    #[tokio::test]
    async fn integration_fetch_identity_uses_bearer_token() {
        let server = MockServer::start();
        let me = server.mock(|when, then| {
            when.method(GET)
                .path("/users/@me")
                .header("authorization", "Bearer discord-access");
            then.status(200).json_body(json!({
                "id": "1044621674882007070",
                "username": "raa0121"
            }));
        });

        let client = DiscordOAuthClient::new(test_config(&server.base_url())).expect("client");
        let identity = client
            .fetch_identity(&DiscordAccessToken {
                access_token: "discord-access".to_string(),
                token_type: Some("Bearer".to_string()),
                scope: None,
            })
            .await
            .expect("identity");
        assert_eq!(identity.id, "1044621674882007070");
        assert_eq!(me.calls(), 1);
    }

    #[tokio::test]
    async fn regression_exchange_code_sends_trimmed_client_id() {
        let server = MockServer::start();
        let token = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth2/token")
                .body_includes("client_id=815097353228910643&");
            then.status(200).json_body(json!({
                "access_token": "discord-access",
                "token_type": "Bearer"
            }));
        });

        let mut config = test_config(&server.base_url());
        config.client_id = " 815097353228910643 ".to_string();
        let client = DiscordOAuthClient::new(config).expect("client");
        assert_eq!(client.config().client_id, "815097353228910643");
        client.exchange_code("abc").await.expect("token");
        assert_eq!(token.calls(), 1);
    }

    #[tokio::test]
    async fn regression_empty_identity_id_is_reported_as_identity_lookup_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users/@me");
            then.status(200).json_body(json!({ "id": " ", "username": "ghost" }));
        });

        let client = DiscordOAuthClient::new(test_config(&server.base_url())).expect("client");
        let error = client
            .fetch_identity(&DiscordAccessToken {
                access_token: "discord-access".to_string(),
                token_type: None,
                scope: None,
            })
            .await
            .expect_err("empty id");
        assert!(matches!(
            error,
            DiscordOAuthError::InvalidResponse {
                operation: "identity lookup",
                ..
            }
        ));
        assert_eq!(error.operation(), "identity lookup");
        assert_eq!(BridgeError::from(error).reason_code(), "remote_api_error");
    }

    #[tokio::test]
    async fn regression_rejected_code_is_a_single_status_failure() {
        let server = MockServer::start();
        let token = server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(400)
                .json_body(json!({ "error": "invalid_grant" }));
        });

        let client = DiscordOAuthClient::new(test_config(&server.base_url())).expect("client");
        let error = client.exchange_code("stale").await.expect_err("invalid grant");
        assert!(matches!(
            error,
            DiscordOAuthError::Status {
                operation: "token exchange",
                status: 400,
                ..
            }
        ));
        assert_eq!(token.calls(), 1);
        assert_eq!(BridgeError::from(error).reason_code(), "remote_api_error");
    }
}
