use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use httpmock::prelude::*;
use issuebridge_core::{Locale, ManualClock, Messages};
use issuebridge_discord::{FlowReply, FlowState, InteractionFlow, IssueSubmission};
use issuebridge_github::{GithubAppClient, GithubAppClientConfig, GithubAppCredentials};
use issuebridge_identity::{CorrelationSigner, IdentityStore, InstallationLink};
use issuebridge_oauth::{
    authorize_redirect_url, build_callback_router, CallbackServerState, DiscordOAuthClient,
    DiscordOAuthConfig, OAuthLinker, DISCORD_CALLBACK_ENDPOINT, GITHUB_CALLBACK_ENDPOINT,
};
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::json;
use tokio::net::TcpListener;

const INSTALLATION_ID: &str = "73506487";
const DISCORD_USER_ID: &str = "1044621674882007070";
const APP_PRIVATE_KEY: &str =
    include_str!("../../../crates/issuebridge-github/testdata/app-private-key.pem");

struct Bridge {
    store: Arc<IdentityStore>,
    clock: Arc<ManualClock>,
    flow: InteractionFlow,
    addr: SocketAddr,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn spawn_bridge(
    discord: &MockServer,
    github: &MockServer,
    seed: Vec<InstallationLink>,
) -> Result<Bridge> {
    let store = Arc::new(IdentityStore::seeded(seed));
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let messages = Messages::new(Locale::Ja);

    let mut oauth_config = DiscordOAuthConfig::new(
        "815097353228910643",
        "client-secret",
        "http://127.0.0.1/callback_discord",
    );
    oauth_config.api_base = discord.base_url();
    let discord_authorize_url = authorize_redirect_url(&oauth_config)?;
    let linker = OAuthLinker::new(
        store.clone(),
        Arc::new(DiscordOAuthClient::new(oauth_config)?),
        CorrelationSigner::derived_from("client-secret").expect("cookie signer"),
    )
    .with_clock(clock.clone());
    let state = Arc::new(CallbackServerState {
        linker: Arc::new(linker),
        discord_authorize_url,
        messages,
        secure_cookies: false,
    });

    let credentials = GithubAppCredentials::from_pem("12345", APP_PRIVATE_KEY.as_bytes())?;
    let github_client = GithubAppClient::new(
        GithubAppClientConfig {
            api_base: github.base_url(),
            request_timeout_ms: 2_000,
        },
        credentials,
    )?;
    let flow = InteractionFlow::new(
        store.clone(),
        Arc::new(github_client),
        messages,
        "https://github.com/apps/issue-discordbot",
    );

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind ephemeral listener")?;
    let addr = listener.local_addr().context("resolve listener addr")?;
    let app = build_callback_router(state);
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    Ok(Bridge {
        store,
        clock,
        flow,
        addr,
        server,
    })
}

fn browser() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .expect("browser client")
}

fn mock_discord_identity(discord: &MockServer, code: &str, user_id: &str) {
    let access_token = format!("access-{code}");
    let code_fragment = format!("code={code}");
    let token_for_exchange = access_token.clone();
    discord.mock(move |when, then| {
        when.method(POST)
            .path("/oauth2/token")
            .body_includes("grant_type=authorization_code")
            .body_includes(code_fragment.as_str());
        then.status(200).json_body(json!({
            "access_token": token_for_exchange,
            "token_type": "Bearer",
            "scope": "identify"
        }));
    });
    let user_id = user_id.to_string();
    discord.mock(move |when, then| {
        when.method(GET)
            .path("/users/@me")
            .header("authorization", format!("Bearer {access_token}"));
        then.status(200).json_body(json!({ "id": user_id, "username": "raa0121" }));
    });
}

fn mock_github_installation(github: &MockServer) {
    github.mock(|when, then| {
        when.method(POST)
            .path(format!("/app/installations/{INSTALLATION_ID}/access_tokens"));
        then.status(201).json_body(json!({
            "token": "ghs_installation",
            "expires_at": "2099-01-01T00:00:00Z"
        }));
    });
    github.mock(|when, then| {
        when.method(GET)
            .path("/installation/repositories")
            .query_param("page", "1")
            .header("authorization", "Bearer ghs_installation");
        then.status(200).json_body(json!({
            "total_count": 2,
            "repositories": [
                {
                    "full_name": "org/repo",
                    "name": "repo",
                    "owner": { "login": "org" },
                    "clone_url": "https://github.com/org/repo.git"
                },
                {
                    "full_name": "org/docs",
                    "name": "docs",
                    "owner": { "login": "org" },
                    "clone_url": "https://github.com/org/docs.git"
                }
            ]
        }));
    });
}

async fn leg_one(bridge: &Bridge, installation_id: &str) -> String {
    let response = browser()
        .get(format!(
            "http://{}{GITHUB_CALLBACK_ENDPOINT}?installation_id={installation_id}&setup_action=install",
            bridge.addr
        ))
        .send()
        .await
        .expect("github callback");
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(response.headers()[LOCATION]
        .to_str()
        .expect("location")
        .starts_with("https://discord.com/oauth2/authorize?client_id=815097353228910643"));
    response.headers()[SET_COOKIE]
        .to_str()
        .expect("set-cookie")
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string()
}

async fn leg_two(bridge: &Bridge, cookie: Option<&str>, code: Option<&str>) -> (StatusCode, String) {
    let url = match code {
        Some(code) => format!("http://{}{DISCORD_CALLBACK_ENDPOINT}?code={code}", bridge.addr),
        None => format!("http://{}{DISCORD_CALLBACK_ENDPOINT}", bridge.addr),
    };
    let mut request = browser().get(url);
    if let Some(cookie) = cookie {
        request = request.header(COOKIE, cookie);
    }
    let response = request.send().await.expect("discord callback");
    let status = response.status();
    (status, response.text().await.expect("body"))
}

#[tokio::test]
async fn integration_two_leg_link_then_check_auth_lists_clone_urls() {
    let discord = MockServer::start();
    let github = MockServer::start();
    mock_discord_identity(&discord, "abc", DISCORD_USER_ID);
    mock_github_installation(&github);
    let bridge = spawn_bridge(&discord, &github, Vec::new())
        .await
        .expect("bridge");

    assert!(!bridge.store.is_linked(DISCORD_USER_ID));
    let before = bridge.flow.check_auth(DISCORD_USER_ID).await;
    assert_eq!(
        bridge.flow.render_outcome(DISCORD_USER_ID, before),
        FlowReply::Text("認証されていません".to_string())
    );

    let cookie = leg_one(&bridge, INSTALLATION_ID).await;
    let (status, body) = leg_two(&bridge, Some(&cookie), Some("abc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<p>認証が完了しました</p>");
    assert_eq!(
        bridge.store.installation_of(DISCORD_USER_ID),
        Ok(INSTALLATION_ID.to_string())
    );

    let reply = bridge
        .flow
        .check_auth(DISCORD_USER_ID)
        .await
        .expect("check auth");
    assert_eq!(
        reply,
        FlowReply::Text(
            "有効なリポジトリは以下です\nhttps://github.com/org/repo.git\nhttps://github.com/org/docs.git"
                .to_string()
        )
    );
}

#[tokio::test]
async fn integration_repeated_leg_two_is_idempotent_until_cookie_expires() {
    let discord = MockServer::start();
    let github = MockServer::start();
    mock_discord_identity(&discord, "abc", DISCORD_USER_ID);
    let bridge = spawn_bridge(&discord, &github, Vec::new())
        .await
        .expect("bridge");

    let cookie = leg_one(&bridge, INSTALLATION_ID).await;
    for _ in 0..2 {
        let (status, _) = leg_two(&bridge, Some(&cookie), Some("abc")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            bridge.store.installation_of(DISCORD_USER_ID),
            Ok(INSTALLATION_ID.to_string())
        );
    }

    bridge.clock.advance(300);
    let (status, body) = leg_two(&bridge, Some(&cookie), Some("abc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<p>Github App の認証が行われてません</p>");
    assert_eq!(bridge.store.link_count(), 1);
}

#[tokio::test]
async fn integration_missing_code_leaves_existing_link_untouched() {
    let discord = MockServer::start();
    let github = MockServer::start();
    let bridge = spawn_bridge(
        &discord,
        &github,
        vec![InstallationLink {
            discord_user_id: DISCORD_USER_ID.to_string(),
            installation_id: "42".to_string(),
        }],
    )
    .await
    .expect("bridge");

    let cookie = leg_one(&bridge, INSTALLATION_ID).await;
    let (status, body) = leg_two(&bridge, Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<p>Discord の認証から来てください。</p>");
    assert_eq!(
        bridge.store.installation_of(DISCORD_USER_ID),
        Ok("42".to_string())
    );
    assert_eq!(bridge.store.link_count(), 1);
}

#[tokio::test]
async fn integration_linked_user_files_exactly_one_issue() {
    let discord = MockServer::start();
    let github = MockServer::start();
    mock_github_installation(&github);
    let issue = github.mock(|when, then| {
        when.method(POST)
            .path("/repos/org/repo/issues")
            .header("authorization", "Bearer ghs_installation")
            .json_body(json!({ "title": "Bug", "body": "Steps..." }));
        then.status(201).json_body(json!({
            "number": 7,
            "html_url": "https://github.com/org/repo/issues/7"
        }));
    });
    let bridge = spawn_bridge(
        &discord,
        &github,
        vec![InstallationLink {
            discord_user_id: DISCORD_USER_ID.to_string(),
            installation_id: INSTALLATION_ID.to_string(),
        }],
    )
    .await
    .expect("bridge");

    let picker = bridge
        .flow
        .begin_issue(DISCORD_USER_ID)
        .await
        .expect("picker");
    let FlowReply::RepositoryPicker { options, .. } = picker else {
        panic!("expected repository picker");
    };
    let labels = options
        .iter()
        .map(|option| option.label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(labels, vec!["org/repo", "org/docs"]);

    bridge
        .flow
        .select_repository(DISCORD_USER_ID, &["org/repo".to_string()])
        .expect("issue form");
    let submission = IssueSubmission::from_fields([
        ("issue_title", "Bug"),
        ("issue_body", "Steps..."),
    ])
    .expect("submission");
    let reply = bridge
        .flow
        .submit_issue(DISCORD_USER_ID, submission)
        .await
        .expect("issue");

    assert_eq!(issue.calls(), 1);
    let FlowReply::Text(text) = reply else {
        panic!("expected text reply");
    };
    assert!(text.contains("https://github.com/org/repo/issues/7"));
    assert_eq!(
        bridge.flow.state_of(DISCORD_USER_ID),
        FlowState::IssueCreated {
            issue_url: "https://github.com/org/repo/issues/7".to_string()
        }
    );
}

#[tokio::test]
async fn regression_upstream_issue_failure_is_reported_without_retry() {
    let discord = MockServer::start();
    let github = MockServer::start();
    mock_github_installation(&github);
    let issue = github.mock(|when, then| {
        when.method(POST).path("/repos/org/repo/issues");
        then.status(503).body("unavailable");
    });
    let bridge = spawn_bridge(
        &discord,
        &github,
        vec![InstallationLink {
            discord_user_id: DISCORD_USER_ID.to_string(),
            installation_id: INSTALLATION_ID.to_string(),
        }],
    )
    .await
    .expect("bridge");

    bridge
        .flow
        .select_repository(DISCORD_USER_ID, &["org/repo".to_string()])
        .expect("issue form");
    let outcome = bridge
        .flow
        .submit_issue(
            DISCORD_USER_ID,
            IssueSubmission {
                title: "Bug".to_string(),
                body: "Steps...".to_string(),
            },
        )
        .await;
    let reply = bridge.flow.render_outcome(DISCORD_USER_ID, outcome);

    assert_eq!(issue.calls(), 1);
    assert_eq!(
        reply,
        FlowReply::Text(Messages::new(Locale::Ja).remote_failure().to_string())
    );
    assert_eq!(bridge.flow.state_of(DISCORD_USER_ID), FlowState::Idle);
}
