use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use etatcivil::config::Configuration;
use etatcivil::{app, initialize_state, telemetry};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "CONFIG_PATH";

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::var(CONFIG_PATH).map(PathBuf::from).unwrap_or_default();
    let config = Configuration::default().path(path).read()?;
    let telemetry_config = config.telemetry.clone().unwrap_or_default();

    // initialize tracing and logs export.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let otlp_logs = match telemetry_config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let provider = telemetry::setup_tracer(endpoint)?;
            opentelemetry::global::set_tracer_provider(provider);
            Some(telemetry::setup_logging(endpoint)?)
        },
        None => None,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otlp_logs)
        .init();

    let mut state = initialize_state(config.clone()).await?;
    if telemetry_config.prometheus {
        state.metrics = Some(telemetry::setup_metrics_recorder()?);
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port()));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, name = %config.name, "server started");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
