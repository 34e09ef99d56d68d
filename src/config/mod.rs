//! Application configuration loading and validation.
//!
//! The top-level [`Config`] groups logging, publisher, simulated device and
//! (with the `mqtt` feature) transport settings. It is read once from a TOML
//! file at startup and treated as immutable afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::{device::DeviceConfig, logger::LoggerConfig, publisher::PublisherConfig};

pub mod device;
pub mod logger;
pub mod publisher;
#[cfg(feature = "mqtt")]
pub mod transport;

/// Environment variable holding the configuration file path.
pub const CONFIG_ENV: &str = "BASE_STATUS_CONFIG";

/// Configuration path used when [`CONFIG_ENV`] is not set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/base-status/config.toml";

/// Timestamped console output for use before the tracing subscriber exists.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        $crate::config::print_line(console::style("INFO").green(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        $crate::config::print_line(console::style("WARN").yellow(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::config::print_line(console::style("ERROR").red(), format_args!($($arg)*))
    };
}

#[doc(hidden)]
pub fn print_line(level: console::StyledObject<&str>, message: std::fmt::Arguments<'_>) {
    let now = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    println!("{}  {} {}", console::style(now).dim(), level, message);
}

/// Errors raised while locating, reading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub logger: LoggerConfig,

    #[validate(nested)]
    pub publisher: PublisherConfig,

    /// Simulated base used when no hardware driver is linked.
    #[validate(nested)]
    pub device: DeviceConfig,

    #[cfg(feature = "mqtt")]
    #[validate(nested)]
    pub transport: transport::MqttConfig,
}

impl Config {
    /// Locates and loads the configuration file.
    pub fn new() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load(&path)
    }

    /// `BASE_STATUS_CONFIG` if set, otherwise `/etc/base-status/config.toml`
    /// if it exists.
    fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            print_info!("Using config from {}: {}", CONFIG_ENV, path.display());
            return Ok(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Ok(fallback.to_path_buf());
        }

        Err(ConfigError::Config(format!(
            "No configuration file found (set {} or create {})",
            CONFIG_ENV, DEFAULT_CONFIG_PATH
        )))
    }

    /// Reads, parses and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// `Config` if the file is missing, `IoError` if it cannot be read,
    /// `ParseError` for malformed TOML and `ValidationError` for values out
    /// of range.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "Configuration file does not exist: {}",
                path.display()
            )));
        }

        let text = fs::read_to_string(path)?;
        let config = Self::parse(&text)?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.publisher.period_ms, 10);
        assert_eq!(config.publisher.namespace, "mobile_base");
        assert_eq!(config.logger.level, "info");
    }

    #[test]
    fn test_parse_overrides_sections() {
        let config = Config::parse(
            r#"
            [logger]
            level = "debug"

            [publisher]
            node_name = "base/test"
            namespace = "robot"
            period_ms = 20

            [device]
            initial_battery = 42
            "#,
        )
        .unwrap();

        assert_eq!(config.logger.level, "debug");
        assert_eq!(config.publisher.node_name, "base/test");
        assert_eq!(config.publisher.period_ms, 20);
        assert_eq!(config.device.initial_battery, 42);
    }

    #[test]
    fn test_invalid_period_is_rejected() {
        let err = Config::parse("[publisher]\nperiod_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_invalid_log_level_is_rejected() {
        let err = Config::parse("[logger]\nlevel = \"loud\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let err = Config::parse("[publisher\nperiod_ms = 5").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[publisher]\nperiod_ms = 25").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.publisher.period_ms, 25);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Config(_)));
    }
}
