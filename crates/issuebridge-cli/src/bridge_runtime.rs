use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use issuebridge_core::{Locale, Messages};
use issuebridge_discord::{run_discord_bot, DiscordBotConfig, InteractionFlow};
use issuebridge_github::{GithubAppClient, GithubAppClientConfig, GithubAppCredentials};
use issuebridge_identity::{CorrelationSigner, IdentityStore};
use issuebridge_oauth::{
    authorize_redirect_url, run_callback_server, CallbackServerState, DiscordOAuthClient,
    DiscordOAuthConfig, OAuthLinker,
};

use crate::cli_args::Cli;

/// Fully wired components, ready to serve.
pub(crate) struct BridgeRuntime {
    pub(crate) bind: String,
    pub(crate) callback_state: Arc<CallbackServerState>,
    pub(crate) flow: Arc<InteractionFlow>,
    pub(crate) bot_config: DiscordBotConfig,
}

fn load_private_key(cli: &Cli) -> Result<Vec<u8>> {
    match (&cli.github_private_key, &cli.github_private_key_path) {
        (Some(pem), _) if !pem.trim().is_empty() => Ok(pem.replace("\\n", "\n").into_bytes()),
        (_, Some(path)) => std::fs::read(path)
            .with_context(|| format!("failed to read github private key {}", path.display())),
        _ => bail!("one of --github-private-key or --github-private-key-path is required"),
    }
}

fn correlation_signer(cli: &Cli) -> Result<CorrelationSigner> {
    let signer = match cli.cookie_secret.as_deref().map(str::trim) {
        Some(secret) if !secret.is_empty() => CorrelationSigner::new(secret.as_bytes()),
        _ => CorrelationSigner::derived_from(&cli.discord_client_secret),
    };
    signer.map_err(|error| anyhow!("failed to initialize cookie signer: {error}"))
}

pub(crate) fn build_bridge_runtime(cli: Cli) -> Result<BridgeRuntime> {
    let messages = Messages::new(Locale::from(cli.locale));
    let store = Arc::new(IdentityStore::seeded(cli.seed_link.iter().cloned()));

    let credentials = GithubAppCredentials::from_pem(&cli.github_app_id, &load_private_key(&cli)?)
        .context("failed to load github app credentials")?;
    let github = GithubAppClient::new(
        GithubAppClientConfig {
            api_base: cli.github_api_base.clone(),
            request_timeout_ms: cli.request_timeout_ms,
        },
        credentials,
    )
    .context("failed to create github app client")?;

    let mut oauth_config = DiscordOAuthConfig::new(
        &cli.discord_client_id,
        &cli.discord_client_secret,
        &cli.discord_redirect_uri,
    );
    oauth_config.api_base = cli.discord_api_base.clone();
    oauth_config.authorize_url = cli.discord_authorize_url.clone();
    oauth_config.request_timeout_ms = cli.request_timeout_ms;
    let discord_authorize_url =
        authorize_redirect_url(&oauth_config).context("failed to build discord authorize url")?;
    let oauth_client =
        DiscordOAuthClient::new(oauth_config).context("failed to create discord oauth client")?;

    let linker = OAuthLinker::new(store.clone(), Arc::new(oauth_client), correlation_signer(&cli)?);
    let callback_state = Arc::new(CallbackServerState {
        linker: Arc::new(linker),
        discord_authorize_url,
        messages,
        secure_cookies: !cli.insecure_cookies,
    });
    let flow = Arc::new(InteractionFlow::new(
        store.clone(),
        Arc::new(github),
        messages,
        cli.github_install_url.clone(),
    ));

    tracing::info!(
        locale = %messages.locale(),
        seeded_links = store.link_count(),
        secure_cookies = !cli.insecure_cookies,
        guild_id = ?cli.discord_guild_id,
        "issuebridge configured"
    );
    Ok(BridgeRuntime {
        bind: cli.bind,
        callback_state,
        flow,
        bot_config: DiscordBotConfig {
            token: cli.discord_token,
            guild_id: cli.discord_guild_id,
        },
    })
}

/// Runs the callback server and the Discord gateway side by side until
/// ctrl-c or until either one exits.
pub(crate) async fn run_bridge(cli: Cli) -> Result<()> {
    let runtime = build_bridge_runtime(cli)?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = run_callback_server(&runtime.bind, runtime.callback_state, async move {
        let _ = shutdown_rx.await;
    });
    let bot = run_discord_bot(runtime.bot_config, runtime.flow);

    tokio::pin!(server);
    let exit = tokio::select! {
        result = &mut server => BridgeExit::CallbackServer(result),
        result = bot => BridgeExit::DiscordGateway(result),
        signal = tokio::signal::ctrl_c() => BridgeExit::Signal(signal),
    };
    let outcome = match exit {
        BridgeExit::CallbackServer(result) => result.context("oauth callback server failed"),
        BridgeExit::DiscordGateway(result) => result.context("discord gateway failed"),
        BridgeExit::Signal(signal) => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(());
            return server.await;
        }
    };
    if let Err(error) = &outcome {
        tracing::error!(error = %format!("{error:#}"), "issuebridge stopped");
    }
    outcome
}

enum BridgeExit {
    CallbackServer(Result<()>),
    DiscordGateway(Result<()>),
    Signal(std::io::Result<()>),
}
