use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::Arc,
};

use anyhow::Context;
use daraja_stk::{
    Config, DarajaGateway,
    server::{self, AckPolicy, AppState, LogSink},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .init();

    match dotenvy::dotenv() {
        Ok(p) => tracing::info!(path = %p.display(), "Loaded environment variables from .env file"),
        Err(e) => tracing::warn!("Failed to load environment variables from .env: {e}"),
    };

    let config = Config::from_env().context("invalid M-Pesa configuration")?;
    let gateway = DarajaGateway::new(config)?;

    let ack_policy = match std::env::var("MPESA_ACK_POLICY") {
        Ok(v) => v.parse::<AckPolicy>().map_err(anyhow::Error::msg)?,
        Err(_) => AckPolicy::default(),
    };
    let mut state = AppState::new(gateway, Arc::new(LogSink)).with_ack_policy(ack_policy);
    match std::env::var("CALLBACK_TOKEN") {
        Ok(token) if !token.is_empty() => state = state.with_callback_token(token),
        _ => tracing::warn!("CALLBACK_TOKEN is not defined, callbacks are not authenticated"),
    }

    let app = server::router()
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5000);

    let listener = tokio::net::TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("bind port {port}"))?;

    tracing::info!(?ack_policy, "Serving on port {port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
