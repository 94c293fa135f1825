use std::{sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use portier::{CookieCipher, KeySetCache, KeySetOptions, TokenVerifier, ValidationPolicy};
use portier_axum::{router, AppState, GatewayConfig};
use portier_oauth2::{AuthFlowController, TokenExchangeClient};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::parse();
    let endpoints = config
        .endpoints()
        .wrap_err("invalid identity provider settings")?;

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let keys = KeySetCache::fetch(
        endpoints.jwks_url.as_str(),
        client.clone(),
        KeySetOptions {
            min_refresh_interval: Duration::from_secs(config.jwks_min_refresh_secs),
        },
    )
    .await
    .wrap_err("unable to load the identity provider's signing keys")?;

    if let Some(secs) = config.jwks_refresh_interval_secs {
        keys.spawn_refresh(Duration::from_secs(secs));
    }

    let verifier = TokenVerifier::new(keys, ValidationPolicy::new(endpoints.issuer.clone()));
    let cipher = Arc::new(
        CookieCipher::new(config.secret_key.as_bytes()).wrap_err("invalid SECRET_KEY")?,
    );
    let exchange = TokenExchangeClient::new(
        client,
        endpoints.token_url.clone(),
        endpoints.user_info_url.clone(),
        config.credentials(),
    );

    let flow = AuthFlowController::new(exchange, verifier, cipher);
    let app = router(
        AppState::new(flow, config.cookie_settings()),
        &config.base_path,
    );

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %config.bind,
        base_path = %config.base_path,
        issuer = %endpoints.issuer,
        "gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
