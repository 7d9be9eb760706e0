//! Config generation command implementation.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::Config;

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("hostpulse.yaml"));

    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
        ConfigFormat::Yaml => {
            let mut content = serde_yaml::to_string(&config)?;
            if commented {
                content = add_config_comments(content);
            }
            content
        }
    };

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# hostpulse Configuration
# =======================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"            # Bind IP (0.0.0.0 = all interfaces)
# port: 9614                 # HTTP/WebSocket port
#
# Sampling & Push Cadence
# -----------------------
# metrics_ttl_ms: 1000       # Metrics snapshot cache TTL
# processes_ttl_ms: 30000    # Process list cache TTL (table walks are expensive)
# push_interval_ms: 1000     # Per-session metrics push interval
#
# Termination
# -----------
# grace_period_ms: 500       # Wait before escalating SIGTERM to SIGKILL
#
# Process View
# ------------
# top_n: 10                  # Rows per delivered view
# cpu_floor_percent: 0.1     # Drop rows at or below this CPU share...
# memory_floor_percent: 0.1  # ...and at or below this memory share
# process_view: "top"        # "top" or "rotating"
#
# Feature Flags
# -------------
# enable_health: true        # Enable /health endpoint
#
# Logging
# -------
# log_level: "info"          # off, error, warn, info, debug, trace
#
# TLS (both or neither)
# ---------------------
# tls_cert: null             # PEM certificate path
# tls_key: null              # PEM private key path
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_yaml_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostpulse.yaml");
        command_config(Some(path.clone()), ConfigFormat::Yaml, true).unwrap();

        let loaded = crate::config::load_config(path.to_str()).unwrap();
        assert_eq!(loaded.port, Config::default().port);
    }
}
