//! Configuration loading
//!
//! Every command receives an explicitly constructed [`Config`]; there is no
//! process-wide singleton. Resolution order per key: environment variable,
//! then the optional TOML file named by `ORG_DATA_CONFIG`, then the compiled
//! default.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Env var naming the optional TOML config file
pub const CONFIG_FILE_ENV: &str = "ORG_DATA_CONFIG";

/// Resolved tool configuration, dependency-injected into each command
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL (e.g. `sqlite:///var/lib/org/org.db`)
    pub database_url: String,
    /// Default base URL for the Org API backends
    pub origin: String,
    /// Optional request-id header name sent with every API call
    pub request_id_header: Option<String>,
    /// Upper bound on commands in a quality fix plan
    pub fixes_max_commands: usize,
    /// Kill switch for quality apply/rollback
    pub quality_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://org.db".to_string(),
            origin: "http://localhost:3200".to_string(),
            request_id_header: Some("X-Request-ID".to_string()),
            fixes_max_commands: 100,
            quality_enabled: true,
        }
    }
}

/// TOML file shape; every key optional
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database_url: Option<String>,
    origin: Option<String>,
    request_id_header: Option<String>,
    fixes_max_commands: Option<usize>,
    quality_enabled: Option<bool>,
}

impl Config {
    /// Load configuration from the environment plus the optional TOML file.
    pub fn load() -> Result<Self> {
        let file = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::read_file(Path::new(path.trim()))?,
            _ => FileConfig::default(),
        };
        let defaults = Config::default();

        let database_url = env_string("ORG_DATABASE_URL")
            .or_else(|| env_string("DATABASE_URL"))
            .or(file.database_url)
            .unwrap_or(defaults.database_url);
        let origin = env_string("ORG_ORIGIN")
            .or(file.origin)
            .unwrap_or(defaults.origin);
        let request_id_header = env_string("ORG_REQUEST_ID_HEADER")
            .or(file.request_id_header)
            .or(defaults.request_id_header)
            .filter(|v| !v.trim().is_empty());
        let fixes_max_commands = match env_string("ORG_DATA_FIXES_MAX_COMMANDS") {
            Some(v) => v
                .parse::<usize>()
                .map_err(|_| Error::usage(format!("invalid ORG_DATA_FIXES_MAX_COMMANDS: {v}")))?,
            None => file.fixes_max_commands.unwrap_or(defaults.fixes_max_commands),
        };
        let quality_enabled = match env_string("ORG_DATA_QUALITY_ENABLED") {
            Some(v) => parse_bool(&v)
                .ok_or_else(|| Error::usage(format!("invalid ORG_DATA_QUALITY_ENABLED: {v}")))?,
            None => file.quality_enabled.unwrap_or(defaults.quality_enabled),
        };

        Ok(Self {
            database_url,
            origin,
            request_id_header,
            fixes_max_commands,
            quality_enabled,
        })
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::usage(format!("read {}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| Error::usage(format!("parse {}: {e}", path.display())))
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.fixes_max_commands, 100);
        assert!(c.quality_enabled);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn file_config_overrides_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            origin = "https://org.example.com"
            fixes_max_commands = 25
            "#,
        )
        .unwrap();
        assert_eq!(file.origin.as_deref(), Some("https://org.example.com"));
        assert_eq!(file.fixes_max_commands, Some(25));
        assert!(file.database_url.is_none());
    }
}
