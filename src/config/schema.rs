//! Configuration schema, loaded from `pulsegrid.toml`. Every section is
//! `#[serde(default)]` so a missing or partial file still produces a usable
//! `Config`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub buffer_engine: BufferEngineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub hubs: HubsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            server: ServerConfig::default(),
            buffer_engine: BufferEngineConfig::default(),
            cache: CacheConfig::default(),
            hubs: HubsConfig::default(),
            observability: ObservabilityConfig::default(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the given path, falling back to defaults for
    /// a missing file. Parse errors are fatal (`ConfigInvalid` at startup).
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file at {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&raw).with_context(|| format!("parsing config file at {}", path.display()))?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8090
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_status_sweep_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_status_sweep_interval_secs")]
    pub status_sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sync_interval_secs: default_sync_interval_secs(),
            status_sweep_interval_secs: default_status_sweep_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_flush_interval_secs() -> u64 {
    10
}

fn default_shutdown_flush_timeout_secs() -> u64 {
    5
}

fn default_max_workers() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferEngineConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_shutdown_flush_timeout_secs")]
    pub shutdown_flush_timeout_secs: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_metrics_buffer")]
    pub metrics: BufferedStoreConfig,
    #[serde(default = "default_logs_buffer")]
    pub logs: BufferedStoreConfig,
    #[serde(default = "default_events_buffer")]
    pub events: BufferedStoreConfig,
    #[serde(default = "default_process_buffer")]
    pub process: BufferedStoreConfig,
    #[serde(default = "default_alerts_buffer")]
    pub alerts: BufferedStoreConfig,
}

impl Default for BufferEngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flush_interval_secs: default_flush_interval_secs(),
            shutdown_flush_timeout_secs: default_shutdown_flush_timeout_secs(),
            max_workers: default_max_workers(),
            metrics: default_metrics_buffer(),
            logs: default_logs_buffer(),
            events: default_events_buffer(),
            process: default_process_buffer(),
            alerts: default_alerts_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferedStoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub buffer_size: usize,
    #[serde(default)]
    pub flush_interval_secs: u64,
    #[serde(default)]
    pub drop_on_overflow: bool,
    #[serde(default)]
    pub retry_failed_flush: bool,
    #[serde(default)]
    pub flush_on_disconnect: bool,
}

fn default_metrics_buffer() -> BufferedStoreConfig {
    BufferedStoreConfig {
        enabled: true,
        buffer_size: 500,
        flush_interval_secs: 10,
        drop_on_overflow: false,
        retry_failed_flush: false,
        flush_on_disconnect: false,
    }
}

fn default_logs_buffer() -> BufferedStoreConfig {
    BufferedStoreConfig {
        buffer_size: 500,
        flush_interval_secs: 10,
        ..default_metrics_buffer()
    }
}

fn default_events_buffer() -> BufferedStoreConfig {
    BufferedStoreConfig {
        buffer_size: 200,
        flush_interval_secs: 5,
        flush_on_disconnect: true,
        ..default_metrics_buffer()
    }
}

fn default_process_buffer() -> BufferedStoreConfig {
    BufferedStoreConfig {
        buffer_size: 500,
        flush_interval_secs: 10,
        ..default_metrics_buffer()
    }
}

fn default_alerts_buffer() -> BufferedStoreConfig {
    BufferedStoreConfig {
        buffer_size: 100,
        flush_interval_secs: 5,
        ..default_metrics_buffer()
    }
}

fn default_cache_engine() -> String {
    "memory".into()
}

fn default_cache_expiration_secs() -> u64 {
    300
}

fn default_cache_cleanup_interval_secs() -> u64 {
    60
}

fn default_cache_size() -> usize {
    10_000
}

fn default_cache_resource_flush_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_engine")]
    pub engine: String,
    #[serde(default = "default_cache_expiration_secs")]
    pub expiration_secs: u64,
    #[serde(default = "default_cache_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_cache_size")]
    pub size: usize,
    #[serde(default = "default_cache_resource_flush_interval_secs")]
    pub resource_flush_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: default_cache_engine(),
            expiration_secs: default_cache_expiration_secs(),
            cleanup_interval_secs: default_cache_cleanup_interval_secs(),
            size: default_cache_size(),
            resource_flush_interval_secs: default_cache_resource_flush_interval_secs(),
        }
    }
}

fn default_metrics_queue() -> usize {
    100
}
fn default_logs_queue() -> usize {
    100
}
fn default_events_queue() -> usize {
    100
}
fn default_alerts_queue() -> usize {
    50
}
fn default_process_queue() -> usize {
    100
}
fn default_command_queue() -> usize {
    50
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_read_deadline_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubsConfig {
    #[serde(default = "default_metrics_queue")]
    pub metrics_queue: usize,
    #[serde(default = "default_logs_queue")]
    pub logs_queue: usize,
    #[serde(default = "default_events_queue")]
    pub events_queue: usize,
    #[serde(default = "default_alerts_queue")]
    pub alerts_queue: usize,
    #[serde(default = "default_process_queue")]
    pub process_queue: usize,
    #[serde(default = "default_command_queue")]
    pub command_queue: usize,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_read_deadline_secs")]
    pub read_deadline_secs: u64,
}

impl Default for HubsConfig {
    fn default() -> Self {
        Self {
            metrics_queue: default_metrics_queue(),
            logs_queue: default_logs_queue(),
            events_queue: default_events_queue(),
            alerts_queue: default_alerts_queue(),
            process_queue: default_process_queue(),
            command_queue: default_command_queue(),
            ping_interval_secs: default_ping_interval_secs(),
            read_deadline_secs: default_read_deadline_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// "none" | "log" | "prometheus" | "otel"
    #[serde(default = "default_observability_backend")]
    pub backend: String,
    #[serde(default)]
    pub otel_endpoint: Option<String>,
    #[serde(default)]
    pub otel_service_name: Option<String>,
}

fn default_observability_backend() -> String {
    "none".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            backend: default_observability_backend(),
            otel_endpoint: None,
            otel_service_name: None,
        }
    }
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub routes_path: String,
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            routes_path: String::new(),
            webhook_timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.buffer_engine.metrics.buffer_size, 500);
        assert_eq!(config.hubs.alerts_queue, 50);
        assert_eq!(config.observability.backend, "none");
    }

    #[test]
    fn load_or_default_falls_back_when_file_missing() {
        let config = Config::load_or_default(Path::new("/nonexistent/pulsegrid.toml")).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn load_or_default_parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulsegrid.toml");
        std::fs::write(
            &path,
            r#"
            [server]
            port = 9999

            [observability]
            backend = "log"
            "#,
        )
        .unwrap();

        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.observability.backend, "log");
        assert_eq!(config.buffer_engine.alerts.buffer_size, 100);
    }

    #[test]
    fn load_or_default_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulsegrid.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        assert!(Config::load_or_default(&path).is_err());
    }
}
