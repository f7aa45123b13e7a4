//! Configuration for callbridge
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `CALLBRIDGE__*` environment variables (`__` separates nested keys, e.g.
//! `CALLBRIDGE__ENGINE__CALLBACK_WINDOW_HOURS=12`).

use std::path::Path;

use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;
use crate::{Error, Result};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CALLBRIDGE";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbridgeConfig {
    pub database_url: String,
    pub bind_address: String,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Tunables for the normalization and matching pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How far back an outbound call may look for the missed call it returns
    pub callback_window_hours: u32,
    /// Offset applied to timestamps rebuilt from separate date and time fields
    pub default_utc_offset: String,
}

impl CallbridgeConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.engine.validate()?;
        Ok(config)
    }
}

impl Default for CallbridgeConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://callbridge.db?mode=rwc".to_string(),
            bind_address: "127.0.0.1:8000".to_string(),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn callback_window(&self) -> Duration {
        Duration::hours(i64::from(self.callback_window_hours))
    }

    /// Parsed `default_utc_offset`
    pub fn default_offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.default_utc_offset).ok_or_else(|| {
            Error::Config(format!("Invalid UTC offset: {}", self.default_utc_offset))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.callback_window_hours == 0 {
            return Err(Error::Config("callback_window_hours must be positive".to_string()));
        }
        self.default_offset()?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            callback_window_hours: 24,
            default_utc_offset: "+05:30".to_string(),
        }
    }
}

/// Parse `+HH:MM`, `-HH:MM` or `+HHMM` into a fixed offset
pub fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    let (sign, rest) = match value.chars().next()? {
        '+' => (1, &value[1..]),
        '-' => (-1, &value[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CallbridgeConfig::default();
        assert_eq!(config.engine.callback_window(), Duration::hours(24));
        assert_eq!(
            config.engine.default_offset().unwrap(),
            FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
        );
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+05:30"), FixedOffset::east_opt(19800));
        assert_eq!(parse_utc_offset("-0400"), FixedOffset::east_opt(-14400));
        assert_eq!(parse_utc_offset("05:30"), None);
        assert_eq!(parse_utc_offset("+5:30"), None);
        assert_eq!(parse_utc_offset("+05:75"), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "database_url = \"sqlite::memory:\"\n\n[engine]\ncallback_window_hours = 12\n"
        )
        .unwrap();

        let config = CallbridgeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.engine.callback_window(), Duration::hours(12));
        // Untouched keys keep their defaults
        assert_eq!(config.engine.default_utc_offset, "+05:30");
        assert_eq!(config.bind_address, "127.0.0.1:8000");
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let engine = EngineConfig {
            callback_window_hours: 0,
            ..Default::default()
        };
        assert!(matches!(engine.validate(), Err(Error::Config(_))));
    }
}
