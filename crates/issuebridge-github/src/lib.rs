//! GitHub App client used by the Discord issue flow.
//! Authenticates as the App, resolves installation tokens, streams the
//! repositories granted to an installation, and files issues.

mod app_auth;
mod github_app_client;
mod types;

pub use app_auth::{GithubAppCredentials, APP_JWT_LIFETIME_SECONDS};
pub use github_app_client::{GithubAppClient, GithubAppClientConfig};
pub use types::{
    GithubApiError, InstallationRepositories, IssueUrl, Repository, RepositoryStream,
};
