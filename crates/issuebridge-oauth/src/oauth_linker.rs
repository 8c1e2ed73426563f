//! Two-leg identity linking: GitHub installation redirect, then Discord OAuth.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use issuebridge_core::{BridgeError, Clock, SystemClock};
use issuebridge_identity::{
    is_valid, normalize_installation_id, CorrelationSigner, CorrelationToken, IdentityStore,
    InstallationLink,
};

use crate::DiscordIdentityProvider;

/// Cookie handed to the browser at the end of the GitHub leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCorrelation {
    pub installation_id: String,
    pub cookie_value: String,
    pub expires_at: u64,
    pub max_age_seconds: u64,
}

#[derive(Debug, Clone)]
struct ConsumedCorrelation {
    discord_user_id: String,
    expires_at: u64,
}

pub struct OAuthLinker {
    store: Arc<IdentityStore>,
    provider: Arc<dyn DiscordIdentityProvider>,
    signer: CorrelationSigner,
    clock: Arc<dyn Clock>,
    consumed: Mutex<HashMap<String, ConsumedCorrelation>>,
}

impl OAuthLinker {
    pub fn new(
        store: Arc<IdentityStore>,
        provider: Arc<dyn DiscordIdentityProvider>,
        signer: CorrelationSigner,
    ) -> Self {
        Self {
            store,
            provider,
            signer,
            clock: Arc::new(SystemClock),
            consumed: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<IdentityStore> {
        &self.store
    }

    /// Leg 1. Validates the installation id from the GitHub redirect and
    /// seals it into a short-lived correlation cookie value.
    pub fn begin_installation(
        &self,
        installation_id: Option<&str>,
    ) -> Result<IssuedCorrelation, BridgeError> {
        let installation_id =
            normalize_installation_id(installation_id).ok_or(BridgeError::MissingInstallationId)?;
        let token = self.signer.mint(&installation_id, self.clock.now_unix());
        tracing::info!(
            installation_id = %installation_id,
            expires_at = token.expires_at(),
            "issued installation correlation cookie"
        );
        Ok(IssuedCorrelation {
            installation_id,
            cookie_value: self.signer.seal(&token),
            expires_at: token.expires_at(),
            max_age_seconds: token.ttl_seconds,
        })
    }

    /// Leg 2. Resolves the Discord user behind `code` and binds it to the
    /// installation carried by the correlation cookie.
    #[tracing::instrument(name = "issuebridge.oauth.complete_discord_authorization", skip_all)]
    pub async fn complete_discord_authorization(
        &self,
        cookie_value: Option<&str>,
        code: Option<&str>,
    ) -> Result<InstallationLink, BridgeError> {
        let now_unix = self.clock.now_unix();
        let cookie_value = cookie_value
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(BridgeError::MissingInstallationCookie)?;
        let token = self
            .signer
            .open(cookie_value)
            .filter(|token| is_valid(token, now_unix))
            .ok_or(BridgeError::MissingInstallationCookie)?;
        let code = code
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(BridgeError::MissingAuthorizationCode)?;

        let access_token = self.provider.exchange_code(code).await?;
        let identity = self.provider.fetch_identity(&access_token).await?;

        self.record_consumption(&token, &identity.id)?;
        let previous = self.store.link_user(&identity.id, &token.installation_id);
        if let Some(previous) = previous.filter(|previous| previous != &token.installation_id) {
            tracing::info!(
                discord_user_id = %identity.id,
                previous_installation_id = %previous,
                "replaced existing installation link"
            );
        }
        Ok(InstallationLink {
            discord_user_id: identity.id,
            installation_id: token.installation_id,
        })
    }

    /// A sealed cookie may complete Leg 2 repeatedly for the Discord user that
    /// first consumed it, never for anyone else.
    /// Entries are keyed by the re-sealed token, not the header text.
    fn record_consumption(
        &self,
        token: &CorrelationToken,
        discord_user_id: &str,
    ) -> Result<(), BridgeError> {
        let key = self.signer.seal(token);
        let expires_at = token.expires_at();
        let now_unix = self.clock.now_unix();
        let mut consumed = self.consumed.lock().unwrap_or_else(PoisonError::into_inner);
        consumed.retain(|_, entry| entry.expires_at > now_unix);
        match consumed.get(&key) {
            Some(entry) if entry.discord_user_id != discord_user_id => {
                tracing::warn!(
                    discord_user_id = %discord_user_id,
                    "rejected correlation cookie already consumed by another user"
                );
                Err(BridgeError::CorrelationReplay)
            }
            Some(_) => Ok(()),
            None => {
                consumed.insert(
                    key,
                    ConsumedCorrelation {
                        discord_user_id: discord_user_id.to_string(),
                        expires_at,
                    },
                );
                Ok(())
            }
        }
    }

    #[cfg(test)]
    fn consumed_len(&self) -> usize {
        self.consumed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
