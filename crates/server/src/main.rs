//! promhub server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use promhub_core::config::AppConfig;
use promhub_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// promhub - Prometheus target registry and discovery server
#[derive(Parser, Debug)]
#[command(name = "promhubd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "PROMHUB_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("promhub v{}", env!("CARGO_PKG_VERSION"));

    // Config file is optional; PROMHUB_ env vars override it
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::info!(
            config_path = %args.config,
            "No config file found, using defaults and environment"
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("PROMHUB_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    if config.admin.token_hash.is_none() {
        tracing::warn!("admin.token_hash is not set, management routes are unauthenticated");
    }

    promhub_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let registry = promhub_registry::from_config(&config.registry)
        .await
        .context("failed to initialize registry")?;
    registry
        .health_check()
        .await
        .context("registry health check failed")?;
    tracing::info!("Registry initialized");

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, registry).context("failed to build application state")?;
    tracing::info!(
        proxy_host = %state.proxy.host,
        proxy_path = %state.proxy.path,
        "Credentialed targets will be scraped through the proxy"
    );

    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    // ConnectInfo feeds the proxy access log
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
