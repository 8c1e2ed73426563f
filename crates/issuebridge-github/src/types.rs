use async_trait::async_trait;
use futures_util::stream::BoxStream;
use issuebridge_core::BridgeError;
use thiserror::Error;

pub type IssueUrl = String;

/// Lazy, single-pass sequence of repositories granted to an installation.
pub type RepositoryStream = BoxStream<'static, Result<Repository, GithubApiError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Repository handle as seen through one installation.
pub struct Repository {
    pub installation_id: String,
    pub full_name: String,
    pub owner: String,
    pub name: String,
    pub clone_url: String,
}

impl Repository {
    /// Select-menu label, `"{owner}/{name}"`.
    pub fn display_label(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Error)]
/// Enumerates supported `GithubApiError` values.
pub enum GithubApiError {
    #[error("invalid github app configuration: {0}")]
    Config(String),
    #[error("failed to sign github app jwt: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("github api {operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        source: reqwest::Error,
    },
    #[error("github api {operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("failed to decode github {operation} response: {source}")]
    Decode {
        operation: &'static str,
        source: reqwest::Error,
    },
}

impl GithubApiError {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Jwt(_) => "app authentication",
            Self::Transport { operation, .. }
            | Self::Status { operation, .. }
            | Self::Decode { operation, .. } => operation,
        }
    }
}

impl From<GithubApiError> for BridgeError {
    fn from(error: GithubApiError) -> Self {
        BridgeError::remote(error.operation(), error.to_string())
    }
}

/// Installation-scoped repository operations the Discord flow depends on.
#[async_trait]
pub trait InstallationRepositories: Send + Sync {
    /// Authenticates as the App, resolves `installation_id`, and returns the
    /// repositories it can currently reach. Pages are fetched as the stream is polled.
    async fn list_repositories(
        &self,
        installation_id: &str,
    ) -> Result<RepositoryStream, GithubApiError>;

    /// Files one issue. Single attempt; any non-success reply is an error.
    async fn create_issue(
        &self,
        repository: &Repository,
        title: &str,
        body: &str,
    ) -> Result<IssueUrl, GithubApiError>;
}
