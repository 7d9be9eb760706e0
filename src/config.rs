//! Configuration loading and resolution.
//!
//! Precedence is CLI > config file > built-in default. Files are YAML, JSON
//! or TOML, selected by extension; without an explicit `--config` a handful
//! of default locations are probed.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::info;

use crate::cli::{Args, ConfigFormat};
use crate::processes::ProcessView;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9614;
const DEFAULT_METRICS_TTL_MS: u64 = 1_000;
const DEFAULT_PROCESSES_TTL_MS: u64 = 30_000;
const DEFAULT_PUSH_INTERVAL_MS: u64 = 1_000;
const DEFAULT_GRACE_PERIOD_MS: u64 = 500;
const DEFAULT_TOP_N: usize = 10;
const DEFAULT_RESOURCE_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub bind: Option<String>,
    pub port: Option<u16>,

    // Sampling and push cadence
    #[serde(alias = "metrics-ttl-ms")]
    pub metrics_ttl_ms: Option<u64>,
    #[serde(alias = "processes-ttl-ms")]
    pub processes_ttl_ms: Option<u64>,
    #[serde(alias = "push-interval-ms")]
    pub push_interval_ms: Option<u64>,

    // Termination
    #[serde(alias = "grace-period-ms")]
    pub grace_period_ms: Option<u64>,

    // Process view shaping
    #[serde(alias = "top-n")]
    pub top_n: Option<usize>,
    #[serde(alias = "cpu-floor-percent")]
    pub cpu_floor_percent: Option<f32>,
    #[serde(alias = "memory-floor-percent")]
    pub memory_floor_percent: Option<f64>,
    /// "top" (default) or "rotating".
    #[serde(alias = "process-view")]
    pub process_view: Option<String>,

    // Feature flags
    #[serde(alias = "enable-health")]
    pub enable_health: Option<bool>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    // TLS (both or neither)
    #[serde(alias = "tls-cert")]
    pub tls_cert: Option<PathBuf>,
    #[serde(alias = "tls-key")]
    pub tls_key: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            metrics_ttl_ms: Some(DEFAULT_METRICS_TTL_MS),
            processes_ttl_ms: Some(DEFAULT_PROCESSES_TTL_MS),
            push_interval_ms: Some(DEFAULT_PUSH_INTERVAL_MS),
            grace_period_ms: Some(DEFAULT_GRACE_PERIOD_MS),
            top_n: Some(DEFAULT_TOP_N),
            cpu_floor_percent: Some(DEFAULT_RESOURCE_FLOOR as f32),
            memory_floor_percent: Some(DEFAULT_RESOURCE_FLOOR),
            process_view: Some("top".into()),
            enable_health: Some(true),
            log_level: Some("info".into()),
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl Config {
    pub fn metrics_ttl(&self) -> Duration {
        Duration::from_millis(self.metrics_ttl_ms.unwrap_or(DEFAULT_METRICS_TTL_MS))
    }

    pub fn processes_ttl(&self) -> Duration {
        Duration::from_millis(self.processes_ttl_ms.unwrap_or(DEFAULT_PROCESSES_TTL_MS))
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms.unwrap_or(DEFAULT_PUSH_INTERVAL_MS))
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms.unwrap_or(DEFAULT_GRACE_PERIOD_MS))
    }

    pub fn top_n(&self) -> usize {
        self.top_n.unwrap_or(DEFAULT_TOP_N)
    }

    pub fn cpu_floor(&self) -> f32 {
        self.cpu_floor_percent.unwrap_or(DEFAULT_RESOURCE_FLOOR as f32)
    }

    pub fn memory_floor(&self) -> f64 {
        self.memory_floor_percent.unwrap_or(DEFAULT_RESOURCE_FLOOR)
    }

    pub fn view(&self) -> ProcessView {
        match self.process_view.as_deref() {
            Some("rotating") => ProcessView::Rotating,
            _ => ProcessView::Top,
        }
    }
}

/// Validate effective config (used by --check-config and at startup).
pub fn validate_effective_config(cfg: &Config) -> anyhow::Result<()> {
    if let Some(view) = cfg.process_view.as_deref() {
        if view != "top" && view != "rotating" {
            anyhow::bail!("Invalid process_view '{view}', expected 'top' or 'rotating'");
        }
    }

    if cfg.metrics_ttl_ms == Some(0) || cfg.processes_ttl_ms == Some(0) {
        anyhow::bail!("Cache TTLs must be greater than zero");
    }

    if cfg.push_interval_ms.unwrap_or(DEFAULT_PUSH_INTERVAL_MS) < 100 {
        anyhow::bail!("push_interval_ms below 100 would flood clients");
    }

    if cfg.grace_period_ms == Some(0) {
        anyhow::bail!("grace_period_ms must be greater than zero");
    }

    if cfg.top_n == Some(0) {
        anyhow::bail!("top_n must be at least 1");
    }

    if cfg.tls_cert.is_some() != cfg.tls_key.is_some() {
        anyhow::bail!("tls_cert and tls_key must be configured together");
    }

    Ok(())
}

/// Configuration loading with multiple format support.
pub fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/hostpulse/hostpulse.yaml",
            "/etc/hostpulse/hostpulse.yml",
            "/etc/hostpulse/hostpulse.json",
            "./hostpulse.yaml",
            "./hostpulse.yml",
            "./hostpulse.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if !path.exists() || path.to_string_lossy().is_empty() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// Precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref().and_then(|p| p.to_str()))?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if args.metrics_ttl_ms.is_some() {
        config.metrics_ttl_ms = args.metrics_ttl_ms;
    }
    if args.processes_ttl_ms.is_some() {
        config.processes_ttl_ms = args.processes_ttl_ms;
    }
    if args.push_interval_ms.is_some() {
        config.push_interval_ms = args.push_interval_ms;
    }
    if args.grace_period_ms.is_some() {
        config.grace_period_ms = args.grace_period_ms;
    }
    if args.top_n.is_some() {
        config.top_n = args.top_n;
    }
    if let Some(view) = &args.process_view {
        config.process_view = Some(view.clone());
    }
    if args.disable_health {
        config.enable_health = Some(false);
    }

    Ok(config)
}

/// Shows configuration in the requested format.
pub fn show_config(config: &Config, format: ConfigFormat, user_config: bool) -> anyhow::Result<()> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    if user_config {
        println!("User configuration (effective values):");
    }
    println!("{output}");
    Ok(())
}
