//! Identity state shared by the OAuth callback server and the Discord bot.
//! This crate owns the Discord-user to GitHub-installation mapping, the
//! pending repository selections, and the correlation token that bridges the
//! two OAuth redirects.

pub mod correlation;
pub mod identity_store;

pub use correlation::{
    is_valid, normalize_installation_id, CorrelationSigner, CorrelationToken,
    CORRELATION_COOKIE_NAME, CORRELATION_TTL_SECONDS,
};
pub use identity_store::{IdentityStore, InstallationLink};
