//! Browser-facing half of the identity link.
//!
//! `callback_github` receives the GitHub App installation redirect and hands
//! the browser a sealed correlation cookie on its way to Discord's OAuth2
//! consent page; `callback_discord` trades the returned code for the Discord
//! identity and commits the installation link.

mod callback_server;
mod discord_oauth_client;
mod oauth_linker;

pub use callback_server::{
    build_callback_router, run_callback_server, CallbackServerState, DISCORD_CALLBACK_ENDPOINT,
    GITHUB_CALLBACK_ENDPOINT, LANDING_ENDPOINT,
};
pub use discord_oauth_client::{
    authorize_redirect_url, DiscordAccessToken, DiscordIdentity, DiscordIdentityProvider,
    DiscordOAuthClient, DiscordOAuthConfig, DiscordOAuthError,
};
pub use oauth_linker::{IssuedCorrelation, OAuthLinker};
