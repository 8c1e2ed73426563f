//! In-memory installation links and pending repository selections.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use issuebridge_core::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Committed association between a Discord identity and a GitHub installation.
pub struct InstallationLink {
    pub discord_user_id: String,
    pub installation_id: String,
}

#[derive(Debug, Default)]
struct IdentityState {
    links: HashMap<String, String>,
    selections: HashMap<String, String>,
}

/// Process-wide identity mapping.
///
/// Every operation takes the single internal lock for exactly its own
/// duration; callers never hold it across an await point.
#[derive(Debug, Default)]
pub struct IdentityStore {
    state: Mutex<IdentityState>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store preloaded with `links`; later entries win on duplicate users.
    pub fn seeded<I>(links: I) -> Self
    where
        I: IntoIterator<Item = InstallationLink>,
    {
        let store = Self::new();
        for link in links {
            store.link_user(&link.discord_user_id, &link.installation_id);
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, IdentityState> {
        // The maps hold plain strings, so a panic elsewhere cannot leave them torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Links (or re-links) a user. Returns the installation it replaced, if any.
    pub fn link_user(&self, discord_user_id: &str, installation_id: &str) -> Option<String> {
        let previous = self
            .lock()
            .links
            .insert(discord_user_id.to_string(), installation_id.to_string());
        tracing::info!(
            discord_user_id,
            installation_id,
            relinked = previous.is_some(),
            "installation link committed"
        );
        previous
    }

    pub fn is_linked(&self, discord_user_id: &str) -> bool {
        self.lock().links.contains_key(discord_user_id)
    }

    pub fn installation_of(&self, discord_user_id: &str) -> Result<String, BridgeError> {
        self.lock()
            .links
            .get(discord_user_id)
            .cloned()
            .ok_or(BridgeError::NotLinked)
    }

    pub fn link_count(&self) -> usize {
        self.lock().links.len()
    }

    pub fn set_selected_repo(&self, discord_user_id: &str, repo_full_name: &str) {
        self.lock()
            .selections
            .insert(discord_user_id.to_string(), repo_full_name.to_string());
    }

    /// Removes and returns the pending selection for `discord_user_id`.
    pub fn take_selected_repo(&self, discord_user_id: &str) -> Result<String, BridgeError> {
        self.lock()
            .selections
            .remove(discord_user_id)
            .ok_or(BridgeError::NoSelection)
    }
}
