//! mslogin - sign in with a Microsoft account from the terminal.
//!
//! Runs the full authorization code flow: opens the browser on Microsoft's
//! sign-in page, waits for the redirect on localhost, exchanges the code and
//! prints the signed-in user's profile.

#![deny(clippy::all)]

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::{mpsc, Arc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mslogin::auth::callback_server::{self, CallbackOptions, CallbackResult};
use mslogin::{
    generate_state, parse_callback_url, verify_state, AppConfig, ConfigProvider, EnvSource,
    HttpTransport, OAuthClient, RedirectContext,
};

#[tokio::main]
async fn main() {
    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let app_config = match AppConfig::embedded() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&app_config.logging.level);

    info!("Starting mslogin v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(app_config).await {
        error!("Sign-in failed: {:#}", e);
        eprintln!("Sign-in failed: {:#}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging.
fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

async fn run(app_config: AppConfig) -> Result<()> {
    let server = app_config.server.clone();
    let provider = ConfigProvider::new(EnvSource, app_config);

    let config = provider.load();
    if config.client_id.is_none() || config.client_secret.is_none() {
        anyhow::bail!(
            "Microsoft credentials not configured. Set MICROSOFT_CLIENT_ID and \
             MICROSOFT_CLIENT_SECRET environment variables or update config.toml"
        );
    }
    if server.host != "localhost" {
        warn!(
            "Redirect host is {}; the local callback server only receives redirects to localhost",
            server.host
        );
    }

    let transport = HttpTransport::new().context("Failed to create HTTP client")?;
    let client = OAuthClient::new(provider, Arc::new(transport));
    let context = RedirectContext::new(server.host.clone(), Some(server.port));

    let state = generate_state();
    let auth_url = client.build_authorize_url_with_state(&context, &state)?;

    let options = CallbackOptions {
        port: server.port,
        callback_path: config.callback_path.clone(),
    };
    info!("Waiting for redirect on {}", options.redirect_uri());

    let (cancel_tx, cancel_rx) = mpsc::channel();
    let mut server_task = tokio::task::spawn_blocking(move || {
        callback_server::start_callback_server(&options, cancel_rx)
    });

    if let Err(e) = open::that(&auth_url) {
        warn!("Failed to open browser: {}", e);
        println!("Open this URL to sign in:\n\n{}\n", auth_url);
    }

    let callback = tokio::select! {
        result = &mut server_task => result.context("Callback server stopped unexpectedly")?,
        _ = tokio::signal::ctrl_c() => {
            let _ = cancel_tx.send(());
            server_task.await.context("Callback server stopped unexpectedly")?
        }
    };

    let callback_url = match callback {
        CallbackResult::Success(url) => url,
        CallbackResult::Cancelled => anyhow::bail!("Sign-in cancelled"),
        CallbackResult::Error(e) => anyhow::bail!("Callback server error: {}", e),
    };

    let params = parse_callback_url(&callback_url)?;
    verify_state(&state, params.state.as_deref())?;

    let token = client
        .exchange_code(&params.code, &context)
        .await
        .context("Failed to exchange authorization code")?;

    if let Some(expires_at) = token.expires_at(Utc::now()) {
        info!("Access token expires at {}", expires_at);
    }

    let profile = client
        .fetch_profile(token.access_token.expose())
        .await
        .context("Failed to fetch user profile")?;

    info!("Sign-in successful: {}", profile.display_name_or_upn());
    println!(
        "Signed in as {} <{}>",
        profile.display_name_or_upn(),
        profile.email()
    );

    Ok(())
}
