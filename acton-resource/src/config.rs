//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `ACTON_RESOURCE_`, nested keys split on `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/acton-resource/{service_name}/config.toml
//! 4. System directory: /etc/acton-resource/{service_name}/config.toml
//! 5. Default values
//!
//! ```toml
//! [service]
//! name = "inventory"
//! log_level = "debug"
//!
//! [resource]
//! page_size = 50
//! base_url = "https://api.example.com"
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const CONFIG_PREFIX: &str = "acton-resource";
const ENV_PREFIX: &str = "ACTON_RESOURCE_";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Defaults for every bound resource
    #[serde(default)]
    pub resource: ResourceConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Resource binder defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Documents per list page
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Prefix for `Link` URLs (e.g. `https://api.example.com`)
    #[serde(default)]
    pub base_url: String,

    /// Largest accepted request body
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            base_url: String::new(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

impl ResourceConfig {
    /// Reject values no binder can work with
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidConfig(
                "resource.page_size must be at least 1".to_string(),
            ));
        }
        if self.body_limit_bytes == 0 {
            return Err(Error::InvalidConfig(
                "resource.body_limit_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_service_name() -> String {
    CONFIG_PREFIX.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_page_size() -> u64 {
    100
}

fn default_body_limit_bytes() -> usize {
    1024 * 1024
}

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is taken from the binary name.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(default_service_name);

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // lowest priority first
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific file, skipping the search path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()));

        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self> {
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.resource.validate()?;
        Ok(config)
    }

    /// Candidate config files, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(CONFIG_PREFIX);
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc")
                .join(CONFIG_PREFIX)
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Where the config file for `service_name` should live
    ///
    /// Returns: ~/.config/acton-resource/{service_name}/config.toml
    pub fn recommended_path(service_name: &str) -> PathBuf {
        let xdg_dirs = xdg::BaseDirectories::with_prefix(CONFIG_PREFIX);
        let config_file_path = Path::new(service_name).join("config.toml");

        // place_config_file creates parent directories if needed
        xdg_dirs
            .place_config_file(&config_file_path)
            .unwrap_or_else(|_| {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| String::from("~")))
                    .join(".config")
                    .join(CONFIG_PREFIX)
                    .join(service_name)
                    .join("config.toml")
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: default_service_name(),
                log_level: default_log_level(),
            },
            resource: ResourceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.resource.page_size, 100);
        assert_eq!(config.resource.base_url, "");
        assert_eq!(config.resource.body_limit_bytes, 1_048_576);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[service]\nname = \"inventory\"\n\n\
             [resource]\npage_size = 25\nbase_url = \"https://api.example.com\""
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.service.name, "inventory");
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.resource.page_size, 25);
        assert_eq!(config.resource.base_url, "https://api.example.com");
        assert_eq!(config.resource.body_limit_bytes, 1_048_576);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[resource]\npage_size = 0").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[resource]\npage_size = \"many\"").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
