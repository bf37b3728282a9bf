//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILDIR2ADDR_CONFIG` (environment variable)
//! 2. `~/.config/maildir2addr/config.toml` (Linux)
//!    `~/Library/Application Support/maildir2addr/config.toml` (macOS)
//! 3. Built-in defaults
//!
//! Command-line flags override whatever is loaded here.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Name used for the config, data, and cache directories.
pub const APP_NAME: &str = "maildir2addr";

/// Log file name inside the cache directory.
pub const LOG_FILE: &str = "maildir2addr.log";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "MAILDIR2ADDR_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Locations of the address store and exclusion rules.
    pub paths: PathsConfig,
    /// Message scanning options.
    pub scan: ScanConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the data directory holding the store and rule files.
    pub data_dir: Option<PathBuf>,
    /// Override the cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// File locations. Unset entries live in the data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Address store read at startup.
    pub addrs_in: Option<PathBuf>,
    /// Address store written at exit.
    pub addrs_out: Option<PathBuf>,
    /// Exclusion rule file, one regex per line.
    pub excludes: Option<PathBuf>,
}

/// Message scanning options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Also harvest messages flagged `X-Spam-Flag: YES`.
    pub include_spam: bool,
    /// Read buffer size in bytes (default: 65536 = 64 KB).
    pub read_buffer_size: usize,
    /// Largest accepted header block in bytes (default: 1 MB).
    pub max_header_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            data_dir: None,
            cache_dir: None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_spam: false,
            read_buffer_size: 64 * 1024,    // 64 KB
            max_header_size: 1024 * 1024,   // 1 MB
        }
    }
}

impl Config {
    /// Store file read at startup.
    pub fn addrs_in_path(&self) -> PathBuf {
        self.paths
            .addrs_in
            .clone()
            .unwrap_or_else(|| data_dir(self).join("addrs.tsv"))
    }

    /// Store file written at exit.
    pub fn addrs_out_path(&self) -> PathBuf {
        self.paths
            .addrs_out
            .clone()
            .unwrap_or_else(|| data_dir(self).join("addrs.tsv"))
    }

    /// Exclusion rule file.
    pub fn excludes_path(&self) -> PathBuf {
        self.paths
            .excludes
            .clone()
            .unwrap_or_else(|| data_dir(self).join("excludes.regexp"))
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME).join("config.toml"))
}

/// Return the data directory for the store and rule files.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert!(!cfg.scan.include_spam);
        assert_eq!(cfg.scan.read_buffer_size, 64 * 1024);
        assert!(cfg.paths.excludes.is_none());
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut cfg = Config::default();
        cfg.paths.addrs_in = Some(PathBuf::from("/tmp/in.tsv"));
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.paths.addrs_in, cfg.paths.addrs_in);
        assert_eq!(parsed.scan.max_header_size, cfg.scan.max_header_size);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[general]
data_dir = "/srv/addrs"

[scan]
include_spam = true
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert!(cfg.scan.include_spam);
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.scan.read_buffer_size, 64 * 1024);
        assert_eq!(cfg.addrs_in_path(), PathBuf::from("/srv/addrs/addrs.tsv"));
        assert_eq!(
            cfg.excludes_path(),
            PathBuf::from("/srv/addrs/excludes.regexp")
        );
    }

    #[test]
    fn test_explicit_paths_win() {
        let cfg: Config = toml::from_str(
            r#"
[paths]
addrs_out = "/var/out.tsv"
"#,
        )
        .expect("parse");
        assert_eq!(cfg.addrs_out_path(), PathBuf::from("/var/out.tsv"));
        assert!(cfg.addrs_in_path().ends_with("addrs.tsv"));
    }
}
