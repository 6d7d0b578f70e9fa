use std::sync::Arc;

use onboarding_proxy::config::ProxyConfig;
use onboarding_proxy::onboarding::{OnboardingRouteState, onboarding_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local overrides first; dotenvy never replaces variables already set.
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(ProxyConfig::from_env()?);

    eprintln!("Onboarding Proxy v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Build: {}", config.build_id);
    eprintln!("   Upstream: {}", config.onboarding_url());
    eprintln!(
        "   Endpoint: http://{}/api/onboarding/start\n",
        config.bind_addr
    );

    if config.api_key.is_none() {
        tracing::warn!("MAYADESTEK_API_KEY is not set; onboarding requests will fail with 500");
    }

    let app = onboarding_routes(OnboardingRouteState::new(Arc::clone(&config)));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Onboarding proxy listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
