//! Per-user issue-creation state machine, independent of the gateway.
//!
//! `Idle -> RepoListPresented -> RepoSelected -> IssueCreated`, with every
//! failure landing back in `Idle`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::TryStreamExt;
use issuebridge_core::{BridgeError, Messages};
use issuebridge_github::{InstallationRepositories, Repository};
use issuebridge_identity::IdentityStore;
use sha2::{Digest, Sha256};

pub const REPO_SELECT_CUSTOM_ID: &str = "issuebridge:repo-select";
pub const ISSUE_FORM_CUSTOM_ID: &str = "issuebridge:issue-form";
pub const ISSUE_TITLE_INPUT_ID: &str = "issue_title";
pub const ISSUE_BODY_INPUT_ID: &str = "issue_body";
/// Discord caps string select menus at 25 options.
pub const MAX_SELECT_OPTIONS: usize = 25;
/// Discord caps select option labels and values at 100 characters.
pub const MAX_SELECT_OPTION_CHARS: usize = 100;
const DIGEST_VALUE_PREFIX: &str = "sha256:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FlowState {
    #[default]
    Idle,
    RepoListPresented,
    RepoSelected {
        repository: String,
    },
    IssueCreated {
        issue_url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryOption {
    pub label: String,
    pub value: String,
}

impl RepositoryOption {
    pub fn for_repository(repository: &Repository) -> Self {
        Self {
            label: truncate_chars(&repository.display_label(), MAX_SELECT_OPTION_CHARS),
            value: select_option_value(&repository.full_name),
        }
    }
}

/// The full name when it fits a select option, otherwise a digest of it.
/// Full names always contain `/`, so the two forms never collide.
pub fn select_option_value(full_name: &str) -> String {
    if full_name.chars().count() <= MAX_SELECT_OPTION_CHARS {
        return full_name.to_string();
    }
    let digest = Sha256::digest(full_name.as_bytes());
    let hex: String = digest[..16]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    format!("{DIGEST_VALUE_PREFIX}{hex}")
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Transport-neutral reply; the gateway layer turns it into Discord builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowReply {
    Text(String),
    RepositoryPicker {
        prompt: String,
        placeholder: String,
        options: Vec<RepositoryOption>,
    },
    IssueForm {
        title: String,
        title_label: String,
        body_label: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueSubmission {
    pub title: String,
    pub body: String,
}

impl IssueSubmission {
    /// Builds a submission from modal `(custom_id, value)` pairs. The title
    /// must be non-blank; a missing body is taken as empty.
    pub fn from_fields<I, K, V>(fields: I) -> Result<Self, BridgeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut title = None;
        let mut body = None;
        for (custom_id, value) in fields {
            match custom_id.as_ref() {
                ISSUE_TITLE_INPUT_ID => title = Some(value.into()),
                ISSUE_BODY_INPUT_ID => body = Some(value.into()),
                _ => {}
            }
        }
        let title = title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .ok_or_else(|| BridgeError::InvalidSubmission {
                field: ISSUE_TITLE_INPUT_ID.to_string(),
            })?;
        Ok(Self {
            title,
            body: body.unwrap_or_default(),
        })
    }
}

pub struct InteractionFlow {
    store: Arc<IdentityStore>,
    github: Arc<dyn InstallationRepositories>,
    messages: Messages,
    install_url: String,
    sessions: Mutex<HashMap<String, FlowState>>,
}

impl InteractionFlow {
    pub fn new(
        store: Arc<IdentityStore>,
        github: Arc<dyn InstallationRepositories>,
        messages: Messages,
        install_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            github,
            messages,
            install_url: install_url.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn state_of(&self, discord_user_id: &str) -> FlowState {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(discord_user_id)
            .cloned()
            .unwrap_or_default()
    }

    fn transition(&self, discord_user_id: &str, state: FlowState) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if state == FlowState::Idle {
            sessions.remove(discord_user_id);
        } else {
            sessions.insert(discord_user_id.to_string(), state);
        }
    }

    /// `/github_oauth`: the App install link that starts the linking flow.
    pub fn github_oauth(&self) -> FlowReply {
        FlowReply::Text(self.install_url.clone())
    }

    /// `/check_auth`: clone URLs visible to the caller's installation.
    pub async fn check_auth(&self, discord_user_id: &str) -> Result<FlowReply, BridgeError> {
        let installation_id = self.store.installation_of(discord_user_id)?;
        let clone_urls = self
            .github
            .list_repositories(&installation_id)
            .await?
            .map_ok(|repository| repository.clone_url)
            .try_collect::<Vec<_>>()
            .await?;
        Ok(FlowReply::Text(self.messages.repository_list(&clone_urls)))
    }

    /// `/create_issue`: presents the repository picker.
    pub async fn begin_issue(&self, discord_user_id: &str) -> Result<FlowReply, BridgeError> {
        self.transition(discord_user_id, FlowState::Idle);
        let installation_id = self.store.installation_of(discord_user_id)?;
        let repositories = self
            .github
            .list_repositories(&installation_id)
            .await?
            .try_collect::<Vec<_>>()
            .await?;
        if repositories.is_empty() {
            return Ok(FlowReply::Text(self.messages.no_repositories().to_string()));
        }
        if repositories.len() > MAX_SELECT_OPTIONS {
            tracing::warn!(
                installation_id = %installation_id,
                repositories = repositories.len(),
                shown = MAX_SELECT_OPTIONS,
                "truncated repository picker"
            );
        }
        let options = repositories
            .iter()
            .take(MAX_SELECT_OPTIONS)
            .map(RepositoryOption::for_repository)
            .collect();
        self.transition(discord_user_id, FlowState::RepoListPresented);
        Ok(FlowReply::RepositoryPicker {
            prompt: self.messages.choose_repository_prompt().to_string(),
            placeholder: self.messages.choose_repository_placeholder().to_string(),
            options,
        })
    }

    /// Select-menu callback: remembers the choice and asks for the issue form.
    pub fn select_repository(
        &self,
        discord_user_id: &str,
        values: &[String],
    ) -> Result<FlowReply, BridgeError> {
        let repository = values
            .first()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .ok_or(BridgeError::NoSelection)?;
        self.store.set_selected_repo(discord_user_id, repository);
        self.transition(
            discord_user_id,
            FlowState::RepoSelected {
                repository: repository.to_string(),
            },
        );
        Ok(FlowReply::IssueForm {
            title: self.messages.issue_form_title().to_string(),
            title_label: self.messages.issue_title_label().to_string(),
            body_label: self.messages.issue_body_label().to_string(),
        })
    }

    /// Modal submission: files the issue in the previously selected repository.
    pub async fn submit_issue(
        &self,
        discord_user_id: &str,
        submission: IssueSubmission,
    ) -> Result<FlowReply, BridgeError> {
        let selected = self.store.take_selected_repo(discord_user_id)?;
        let installation_id = self.store.installation_of(discord_user_id)?;
        let repository = self.find_repository(&installation_id, &selected).await?;
        let issue_url = self
            .github
            .create_issue(&repository, &submission.title, &submission.body)
            .await?;
        tracing::info!(
            discord_user_id,
            repository = %repository.full_name,
            issue_url = %issue_url,
            "created issue"
        );
        self.transition(
            discord_user_id,
            FlowState::IssueCreated {
                issue_url: issue_url.clone(),
            },
        );
        Ok(FlowReply::Text(self.messages.issue_created(&issue_url)))
    }

    /// `selected` is the option value: a full name or its digest form.
    async fn find_repository(
        &self,
        installation_id: &str,
        selected: &str,
    ) -> Result<Repository, BridgeError> {
        let mut repositories = self.github.list_repositories(installation_id).await?;
        while let Some(repository) = repositories.try_next().await? {
            if select_option_value(&repository.full_name) == selected {
                return Ok(repository);
            }
        }
        Err(BridgeError::RepositoryLookupMiss {
            full_name: selected.to_string(),
        })
    }

    /// Collapses an operation result into the reply shown to the user.
    /// Failures are logged and reset the caller to `Idle`.
    pub fn render_outcome(
        &self,
        discord_user_id: &str,
        outcome: Result<FlowReply, BridgeError>,
    ) -> FlowReply {
        match outcome {
            Ok(reply) => reply,
            Err(error) => {
                if error.is_remote() {
                    tracing::error!(
                        discord_user_id,
                        reason = error.reason_code(),
                        error = %error,
                        "interaction failed"
                    );
                } else {
                    tracing::info!(
                        discord_user_id,
                        reason = error.reason_code(),
                        "interaction rejected"
                    );
                }
                self.transition(discord_user_id, FlowState::Idle);
                FlowReply::Text(error.user_message(&self.messages))
            }
        }
    }
}
