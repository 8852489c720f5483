#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Resolves the config file path: `$PULSEGRID_CONFIG` if set, otherwise
/// `<config dir>/pulsegrid/pulsegrid.toml`. Missing file falls back to
/// `Config::default()` inside `load_or_default`.
fn resolve_config_path() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("PULSEGRID_CONFIG") {
        return std::path::PathBuf::from(shellexpand::tilde(&path).into_owned());
    }
    directories::ProjectDirs::from("", "", "pulsegrid")
        .map(|dirs| dirs.config_dir().join("pulsegrid.toml"))
        .unwrap_or_else(|| std::path::PathBuf::from("pulsegrid.toml"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config_path = resolve_config_path();
    let config = pulsegrid::config::Config::load_or_default(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    tracing::info!(
        config_path = %config_path.display(),
        host = %config.server.host,
        port = config.server.port,
        "starting pulsegrid"
    );

    pulsegrid::server::run(config).await
}
