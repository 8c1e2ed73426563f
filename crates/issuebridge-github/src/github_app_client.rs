//! reqwest-backed GitHub App client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use futures_util::{stream, StreamExt, TryStreamExt};
use issuebridge_core::{Clock, SystemClock};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::{
    GithubApiError, GithubAppCredentials, InstallationRepositories, IssueUrl, Repository,
    RepositoryStream,
};

const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const REPOSITORY_PAGE_SIZE: usize = 100;
const INSTALLATION_TOKEN_REFRESH_MARGIN_SECONDS: u64 = 60;
const ERROR_BODY_MAX_CHARS: usize = 800;

#[derive(Debug, Clone)]
/// Public struct `GithubAppClientConfig` used across issuebridge components.
pub struct GithubAppClientConfig {
    pub api_base: String,
    pub request_timeout_ms: u64,
}

impl Default for GithubAppClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstallationAccessTokenResponse {
    token: String,
    expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstallationRepositoriesPage {
    #[serde(default)]
    repositories: Vec<GithubRepositoryPayload>,
}

#[derive(Debug, Deserialize)]
struct GithubRepositoryPayload {
    full_name: String,
    name: String,
    owner: GithubOwnerPayload,
    clone_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubOwnerPayload {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CreatedIssuePayload {
    html_url: String,
}

#[derive(Debug, Clone)]
struct CachedInstallationToken {
    token: String,
    expires_at_unix: u64,
}

#[derive(Clone)]
/// GitHub App client; cheap to clone, clones share the installation-token cache.
pub struct GithubAppClient {
    http: reqwest::Client,
    api_base: String,
    credentials: GithubAppCredentials,
    clock: Arc<dyn Clock>,
    token_cache: Arc<Mutex<HashMap<String, CachedInstallationToken>>>,
}

impl GithubAppClient {
    pub fn new(
        config: GithubAppClientConfig,
        credentials: GithubAppCredentials,
    ) -> Result<Self, GithubApiError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("issuebridge-github-app"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|error| {
                GithubApiError::Config(format!("failed to create github api client: {error}"))
            })?;
        Ok(Self {
            http,
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            credentials,
            clock: Arc::new(SystemClock),
            token_cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn cached_token(&self, installation_id: &str, now_unix: u64) -> Option<String> {
        let cache = self.token_cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(installation_id)
            .filter(|cached| {
                now_unix.saturating_add(INSTALLATION_TOKEN_REFRESH_MARGIN_SECONDS)
                    < cached.expires_at_unix
            })
            .map(|cached| cached.token.clone())
    }

    /// Resolves an installation access token, reusing a cached one until shortly before expiry.
    #[tracing::instrument(level = "debug", skip(self))]
    async fn installation_token(&self, installation_id: &str) -> Result<String, GithubApiError> {
        let now_unix = self.clock.now_unix();
        if let Some(token) = self.cached_token(installation_id, now_unix) {
            return Ok(token);
        }

        let app_jwt = self.credentials.app_jwt(now_unix)?;
        let response: InstallationAccessTokenResponse = self
            .send_json(
                "resolve installation token",
                self.http
                    .post(format!(
                        "{}/app/installations/{installation_id}/access_tokens",
                        self.api_base
                    ))
                    .bearer_auth(app_jwt),
            )
            .await?;

        let expires_at_unix = response
            .expires_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .and_then(|parsed| u64::try_from(parsed.timestamp()).ok());
        match expires_at_unix {
            Some(expires_at_unix) => {
                self.token_cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(
                        installation_id.to_string(),
                        CachedInstallationToken {
                            token: response.token.clone(),
                            expires_at_unix,
                        },
                    );
            }
            None => tracing::warn!(
                installation_id,
                "installation token response has no usable expires_at; token not cached"
            ),
        }
        Ok(response.token)
    }

    async fn fetch_repository_page(
        &self,
        installation_id: &str,
        token: &str,
        page: u32,
    ) -> Result<Vec<Repository>, GithubApiError> {
        let page_value = page.to_string();
        let per_page_value = REPOSITORY_PAGE_SIZE.to_string();
        let payload: InstallationRepositoriesPage = self
            .send_json(
                "list installation repositories",
                self.http
                    .get(format!("{}/installation/repositories", self.api_base))
                    .bearer_auth(token)
                    .query(&[
                        ("per_page", per_page_value.as_str()),
                        ("page", page_value.as_str()),
                    ]),
            )
            .await?;
        tracing::debug!(
            installation_id,
            page,
            repositories = payload.repositories.len(),
            "fetched installation repository page"
        );
        Ok(payload
            .repositories
            .into_iter()
            .map(|repository| Repository {
                installation_id: installation_id.to_string(),
                full_name: repository.full_name,
                owner: repository.owner.login,
                name: repository.name,
                clone_url: repository.clone_url,
            })
            .collect())
    }

    async fn send_json<T>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GithubApiError>
    where
        T: DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(|source| GithubApiError::Transport { operation, source })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GithubApiError::Status {
                operation,
                status: status.as_u16(),
                body: truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| GithubApiError::Decode { operation, source })
    }
}

#[async_trait]
impl InstallationRepositories for GithubAppClient {
    async fn list_repositories(
        &self,
        installation_id: &str,
    ) -> Result<RepositoryStream, GithubApiError> {
        let token = self.installation_token(installation_id).await?;
        let client = self.clone();
        let installation_id = installation_id.to_string();
        let pages = stream::try_unfold(Some(1_u32), move |next_page| {
            let client = client.clone();
            let token = token.clone();
            let installation_id = installation_id.clone();
            async move {
                let Some(page) = next_page else {
                    return Ok::<_, GithubApiError>(None);
                };
                let repositories = client
                    .fetch_repository_page(&installation_id, &token, page)
                    .await?;
                let following = if repositories.len() < REPOSITORY_PAGE_SIZE {
                    None
                } else {
                    Some(page.saturating_add(1))
                };
                Ok::<_, GithubApiError>(Some((repositories, following)))
            }
        });
        Ok(pages
            .map_ok(|repositories| {
                stream::iter(repositories.into_iter().map(Ok::<_, GithubApiError>))
            })
            .try_flatten()
            .boxed())
    }

    #[tracing::instrument(level = "debug", skip(self, repository, title, body), fields(repository = %repository.full_name))]
    async fn create_issue(
        &self,
        repository: &Repository,
        title: &str,
        body: &str,
    ) -> Result<IssueUrl, GithubApiError> {
        let token = self.installation_token(&repository.installation_id).await?;
        let payload = json!({ "title": title, "body": body });
        let created: CreatedIssuePayload = self
            .send_json(
                "create issue",
                self.http
                    .post(format!(
                        "{}/repos/{}/{}/issues",
                        self.api_base, repository.owner, repository.name
                    ))
                    .bearer_auth(token)
                    .json(&payload),
            )
            .await?;
        tracing::info!(
            repository = %repository.full_name,
            issue_url = %created.html_url,
            "github issue created"
        );
        Ok(created.html_url)
    }
}

fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
