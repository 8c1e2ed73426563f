use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use issuebridge_core::Locale;
use issuebridge_identity::{normalize_installation_id, InstallationLink};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

/// Parses `DISCORD_USER_ID=INSTALLATION_ID`.
fn parse_seed_link(value: &str) -> Result<InstallationLink, String> {
    let (user, installation) = value
        .split_once('=')
        .ok_or_else(|| "expected DISCORD_USER_ID=INSTALLATION_ID".to_string())?;
    let discord_user_id = user.trim();
    if discord_user_id.is_empty() || !discord_user_id.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(format!("invalid discord user id '{user}'"));
    }
    let installation_id = normalize_installation_id(Some(installation))
        .ok_or_else(|| format!("invalid installation id '{installation}'"))?;
    Ok(InstallationLink {
        discord_user_id: discord_user_id.to_string(),
        installation_id,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLocale {
    Ja,
    En,
}

impl From<CliLocale> for Locale {
    fn from(value: CliLocale) -> Self {
        match value {
            CliLocale::Ja => Locale::Ja,
            CliLocale::En => Locale::En,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "issuebridge",
    about = "Links Discord users to GitHub App installations and files issues from slash commands",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "ISSUEBRIDGE_BIND",
        default_value = "0.0.0.0:5000",
        help = "Socket address for the OAuth callback server"
    )]
    pub bind: String,

    #[arg(
        long = "discord-token",
        env = "DISCORD_TOKEN",
        hide_env_values = true,
        help = "Discord bot token used for the gateway connection"
    )]
    pub discord_token: String,

    #[arg(
        long = "discord-client-id",
        env = "DISCORD_CLIENT_ID",
        help = "Discord application (OAuth2 client) id"
    )]
    pub discord_client_id: String,

    #[arg(
        long = "discord-client-secret",
        env = "DISCORD_CLIENT_SECRET",
        hide_env_values = true,
        help = "Discord OAuth2 client secret"
    )]
    pub discord_client_secret: String,

    #[arg(
        long = "discord-redirect-uri",
        env = "DISCORD_REDIRECT_URI",
        help = "Public URL of /callback_discord registered with the Discord application"
    )]
    pub discord_redirect_uri: String,

    #[arg(
        long = "discord-api-base",
        env = "DISCORD_API_BASE",
        default_value = "https://discord.com/api/v10",
        help = "Discord REST API base URL"
    )]
    pub discord_api_base: String,

    #[arg(
        long = "discord-authorize-url",
        env = "DISCORD_AUTHORIZE_URL",
        default_value = "https://discord.com/oauth2/authorize",
        help = "Discord OAuth2 consent page"
    )]
    pub discord_authorize_url: String,

    #[arg(
        long = "discord-guild-id",
        env = "DISCORD_GUILD_ID",
        help = "Register slash commands to this guild only; omit to register globally"
    )]
    pub discord_guild_id: Option<u64>,

    #[arg(
        long = "github-app-id",
        env = "GITHUB_APP_ID",
        help = "GitHub App id (or client id) used as the JWT issuer"
    )]
    pub github_app_id: String,

    #[arg(
        long = "github-private-key",
        env = "GITHUB_PRIVATE_KEY",
        hide_env_values = true,
        conflicts_with = "github_private_key_path",
        help = "GitHub App private key in PEM form"
    )]
    pub github_private_key: Option<String>,

    #[arg(
        long = "github-private-key-path",
        env = "GITHUB_PRIVATE_KEY_PATH",
        help = "File containing the GitHub App private key in PEM form"
    )]
    pub github_private_key_path: Option<PathBuf>,

    #[arg(
        long = "github-api-base",
        env = "GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub REST API base URL"
    )]
    pub github_api_base: String,

    #[arg(
        long = "github-install-url",
        env = "GITHUB_INSTALL_URL",
        default_value = "https://github.com/apps/issue-discordbot",
        help = "App install link returned by /github_oauth"
    )]
    pub github_install_url: String,

    #[arg(
        long = "cookie-secret",
        env = "ISSUEBRIDGE_COOKIE_SECRET",
        hide_env_values = true,
        help = "Key for signing the correlation cookie; derived from the Discord client secret when omitted"
    )]
    pub cookie_secret: Option<String>,

    #[arg(
        long = "insecure-cookies",
        env = "ISSUEBRIDGE_INSECURE_COOKIES",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Omit the Secure cookie attribute (plain-HTTP local development)"
    )]
    pub insecure_cookies: bool,

    #[arg(
        long,
        env = "ISSUEBRIDGE_LOCALE",
        value_enum,
        default_value_t = CliLocale::Ja,
        help = "Language of user-facing replies and callback pages"
    )]
    pub locale: CliLocale,

    #[arg(
        long = "request-timeout-ms",
        env = "ISSUEBRIDGE_REQUEST_TIMEOUT_MS",
        default_value_t = 15_000,
        value_parser = parse_positive_u64,
        help = "Timeout for outbound Discord and GitHub API requests"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "seed-link",
        env = "ISSUEBRIDGE_SEED_LINKS",
        value_delimiter = ',',
        action = ArgAction::Append,
        value_parser = parse_seed_link,
        help = "Preload DISCORD_USER_ID=INSTALLATION_ID links at startup (repeatable)"
    )]
    pub seed_link: Vec<InstallationLink>,
}
