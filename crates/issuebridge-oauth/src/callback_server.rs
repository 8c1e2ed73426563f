use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use issuebridge_core::{format_http_date, BridgeError, Messages};
use issuebridge_identity::CORRELATION_COOKIE_NAME;
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::{IssuedCorrelation, OAuthLinker};

pub const LANDING_ENDPOINT: &str = "/";
pub const GITHUB_CALLBACK_ENDPOINT: &str = "/callback_github";
pub const DISCORD_CALLBACK_ENDPOINT: &str = "/callback_discord";

const EXPIRED_COOKIE_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Shared state behind the OAuth callback routes.
pub struct CallbackServerState {
    pub linker: Arc<OAuthLinker>,
    pub discord_authorize_url: String,
    pub messages: Messages,
    pub secure_cookies: bool,
}

#[derive(Debug, Default, Deserialize)]
struct GithubCallbackQuery {
    #[serde(default)]
    installation_id: Option<String>,
    #[serde(default)]
    setup_action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordCallbackQuery {
    #[serde(default)]
    code: Option<String>,
}

pub fn build_callback_router(state: Arc<CallbackServerState>) -> Router {
    Router::new()
        .route(LANDING_ENDPOINT, get(handle_landing))
        .route(GITHUB_CALLBACK_ENDPOINT, get(handle_github_callback))
        .route(DISCORD_CALLBACK_ENDPOINT, get(handle_discord_callback))
        .with_state(state)
}

/// Serves the callback routes on `bind` until `shutdown` resolves.
pub async fn run_callback_server<F>(
    bind: &str,
    state: Arc<CallbackServerState>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_addr = bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{bind}'"))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind oauth callback server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound callback server address")?;
    tracing::info!(
        addr = %local_addr,
        github_callback = GITHUB_CALLBACK_ENDPOINT,
        discord_callback = DISCORD_CALLBACK_ENDPOINT,
        "oauth callback server listening"
    );

    axum::serve(listener, build_callback_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("oauth callback server exited unexpectedly")?;
    tracing::info!("oauth callback server stopped");
    Ok(())
}

async fn handle_landing(State(state): State<Arc<CallbackServerState>>) -> Html<&'static str> {
    Html(state.messages.landing_page())
}

async fn handle_github_callback(
    State(state): State<Arc<CallbackServerState>>,
    Query(query): Query<GithubCallbackQuery>,
) -> Response {
    if let Some(setup_action) = query.setup_action.as_deref() {
        tracing::debug!(setup_action, "github installation callback");
    }
    match state.linker.begin_installation(query.installation_id.as_deref()) {
        Ok(issued) => (
            StatusCode::FOUND,
            [
                (header::LOCATION, state.discord_authorize_url.clone()),
                (
                    header::SET_COOKIE,
                    correlation_cookie(&issued, state.secure_cookies),
                ),
            ],
        )
            .into_response(),
        Err(error) => error_page(&state, &error),
    }
}

async fn handle_discord_callback(
    State(state): State<Arc<CallbackServerState>>,
    headers: HeaderMap,
    Query(query): Query<DiscordCallbackQuery>,
) -> Response {
    let cookie = read_cookie(&headers, CORRELATION_COOKIE_NAME);
    match state
        .linker
        .complete_discord_authorization(cookie.as_deref(), query.code.as_deref())
        .await
    {
        Ok(link) => {
            tracing::info!(
                discord_user_id = %link.discord_user_id,
                installation_id = %link.installation_id,
                "linked discord user to github installation"
            );
            (
                StatusCode::OK,
                [(header::SET_COOKIE, cleared_cookie(state.secure_cookies))],
                Html(state.messages.link_completed_page()),
            )
                .into_response()
        }
        Err(error) => error_page(&state, &error),
    }
}

fn error_page(state: &CallbackServerState, error: &BridgeError) -> Response {
    let status = if error.is_remote() {
        tracing::error!(reason = error.reason_code(), error = %error, "oauth callback failed");
        StatusCode::BAD_GATEWAY
    } else {
        tracing::warn!(reason = error.reason_code(), "oauth callback rejected");
        StatusCode::OK
    };
    (status, Html(error.callback_page(&state.messages))).into_response()
}

fn cookie_attributes(secure: bool) -> &'static str {
    if secure {
        "Path=/; HttpOnly; SameSite=Lax; Secure"
    } else {
        "Path=/; HttpOnly; SameSite=Lax"
    }
}

fn correlation_cookie(issued: &IssuedCorrelation, secure: bool) -> String {
    format!(
        "{CORRELATION_COOKIE_NAME}={}; Expires={}; Max-Age={}; {}",
        issued.cookie_value,
        format_http_date(issued.expires_at),
        issued.max_age_seconds,
        cookie_attributes(secure)
    )
}

fn cleared_cookie(secure: bool) -> String {
    format!(
        "{CORRELATION_COOKIE_NAME}=; Expires={EXPIRED_COOKIE_DATE}; Max-Age=0; {}",
        cookie_attributes(secure)
    )
}

fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| key.trim() == name && !value.trim().is_empty())
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
}
