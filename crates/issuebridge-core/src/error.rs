use thiserror::Error;

use crate::messages::Messages;

/// Failures surfaced to a user at the point they are detected.
///
/// None of these are retried and none end the process; the HTTP and chat
/// surfaces turn each one into a localized reply through [`BridgeError::user_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("installation_id query parameter is missing or malformed")]
    MissingInstallationId,
    #[error("installation correlation cookie is missing, expired, or invalid")]
    MissingInstallationCookie,
    #[error("authorization code query parameter is missing")]
    MissingAuthorizationCode,
    #[error("correlation token was already consumed by another discord user")]
    CorrelationReplay,
    #[error("discord user is not linked to a github installation")]
    NotLinked,
    #[error("no repository selection is pending for this user")]
    NoSelection,
    #[error("repository '{full_name}' is not visible to the linked installation")]
    RepositoryLookupMiss { full_name: String },
    #[error("issue submission field '{field}' is missing or blank")]
    InvalidSubmission { field: String },
    #[error("{operation} failed: {detail}")]
    RemoteApi { operation: String, detail: String },
}

impl BridgeError {
    pub fn remote(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::RemoteApi {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    /// Stable identifier used in logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingInstallationId => "missing_installation_id",
            Self::MissingInstallationCookie => "missing_installation_cookie",
            Self::MissingAuthorizationCode => "missing_authorization_code",
            Self::CorrelationReplay => "correlation_replay",
            Self::NotLinked => "not_linked",
            Self::NoSelection => "no_selection",
            Self::RepositoryLookupMiss { .. } => "repository_lookup_miss",
            Self::InvalidSubmission { .. } => "invalid_submission",
            Self::RemoteApi { .. } => "remote_api_error",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteApi { .. })
    }

    /// Chat-facing text for this failure. Remote details stay in the logs.
    pub fn user_message(&self, messages: &Messages) -> String {
        match self {
            Self::MissingInstallationId => messages.missing_installation_id_page().to_string(),
            Self::MissingInstallationCookie => {
                messages.missing_installation_cookie_page().to_string()
            }
            Self::MissingAuthorizationCode => messages.missing_authorization_code_page().to_string(),
            Self::CorrelationReplay => messages.correlation_replay_page().to_string(),
            Self::NotLinked => messages.not_authenticated().to_string(),
            Self::NoSelection => messages.no_selection().to_string(),
            Self::RepositoryLookupMiss { full_name } => messages.repository_lookup_miss(full_name),
            Self::InvalidSubmission { field } => messages.invalid_submission(field),
            Self::RemoteApi { .. } => messages.remote_failure().to_string(),
        }
    }

    /// HTML body for the OAuth callback pages.
    pub fn callback_page(&self, messages: &Messages) -> &'static str {
        match self {
            Self::MissingInstallationId => messages.missing_installation_id_page(),
            Self::MissingInstallationCookie => messages.missing_installation_cookie_page(),
            Self::MissingAuthorizationCode => messages.missing_authorization_code_page(),
            Self::CorrelationReplay => messages.correlation_replay_page(),
            _ => messages.remote_failure_page(),
        }
    }
}
