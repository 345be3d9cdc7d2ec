//! Controller Configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no
//! file at all) yields a controller talking to `http://127.0.0.1:8000/`.
//!
//! ```toml
//! status_log_capacity = 200
//!
//! [primary]
//! base_url = "http://127.0.0.1:8000/"
//!
//! [secondary]
//! url = "http://127.0.0.1:5000/vpn"
//!
//! [push]
//! url = "ws://127.0.0.1:8765/"
//! retry_secs = 5
//!
//! [timing]
//! status_interval_ms = 5000
//! request_timeout_ms = 10000
//!
//! [actions]
//! route = "secondary"
//! reconnect_on_country_change = false
//! ```

use crate::dispatcher::DispatcherConfig;
use crate::monitor::MonitorConfig;
use crate::poller::PollerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },

    #[error("actions.route = \"secondary\" requires a [secondary] section")]
    MissingSecondary,
}

/// Primary backend (`/status`, `/connect`, `/disconnect`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrimaryConfig {
    pub base_url: String,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/".to_string(),
        }
    }
}

/// Secondary backend (single JSON-RPC style endpoint)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecondaryConfig {
    pub url: String,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000/vpn".to_string(),
        }
    }
}

/// Push channel (WebSocket)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PushConfig {
    pub url: String,
    /// Delay before re-opening a dropped socket
    pub retry_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765/".to_string(),
            retry_secs: 5,
        }
    }
}

/// Intervals and timeouts, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    pub status_interval_ms: u64,
    pub catalog_interval_ms: u64,
    pub sample_interval_ms: u64,
    pub clock_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 5_000,
            catalog_interval_ms: 5_000,
            sample_interval_ms: 1_000,
            clock_interval_ms: 1_000,
            request_timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl TimingConfig {
    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            status_interval: Duration::from_millis(self.status_interval_ms),
            catalog_interval: Duration::from_millis(self.catalog_interval_ms),
        }
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            clock_interval: Duration::from_millis(self.clock_interval_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Backend that receives connect/disconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    #[default]
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionsConfig {
    pub route: RouteKind,
    pub reconnect_on_country_change: bool,
}

impl ActionsConfig {
    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            reconnect_on_country_change: self.reconnect_on_country_change,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub primary: PrimaryConfig,
    pub secondary: Option<SecondaryConfig>,
    pub push: Option<PushConfig>,
    pub timing: TimingConfig,
    pub actions: ActionsConfig,
    /// Lines kept in the push status log
    pub status_log_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            primary: PrimaryConfig::default(),
            secondary: None,
            push: None,
            timing: TimingConfig::default(),
            actions: ActionsConfig::default(),
            status_log_capacity: 200,
        }
    }
}

impl ControllerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("primary.base_url", &self.primary.base_url, &["http", "https"])?;
        if let Some(ref secondary) = self.secondary {
            check_url("secondary.url", &secondary.url, &["http", "https"])?;
        }
        if let Some(ref push) = self.push {
            check_url("push.url", &push.url, &["ws", "wss"])?;
        }

        let timing = &self.timing;
        for (field, value) in [
            ("timing.status_interval_ms", timing.status_interval_ms),
            ("timing.catalog_interval_ms", timing.catalog_interval_ms),
            ("timing.sample_interval_ms", timing.sample_interval_ms),
            ("timing.clock_interval_ms", timing.clock_interval_ms),
            ("timing.request_timeout_ms", timing.request_timeout_ms),
            ("timing.connect_timeout_ms", timing.connect_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { field });
            }
        }
        if self.status_log_capacity == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "status_log_capacity",
            });
        }

        if self.actions.route == RouteKind::Secondary && self.secondary.is_none() {
            return Err(ConfigError::MissingSecondary);
        }
        Ok(())
    }
}

fn check_url(field: &'static str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidUrl {
            field,
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ControllerConfig::from_toml("").unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.timing.poller().status_interval, Duration::from_secs(5));
        assert_eq!(config.timing.request_timeout(), Duration::from_secs(10));
        assert!(!config.actions.reconnect_on_country_change);
    }

    #[test]
    fn test_full_document() {
        let config = ControllerConfig::from_toml(
            r#"
            status_log_capacity = 50

            [primary]
            base_url = "https://vpn.local/api/"

            [secondary]
            url = "http://127.0.0.1:5000/vpn"

            [push]
            url = "ws://127.0.0.1:8765/"
            retry_secs = 2

            [timing]
            status_interval_ms = 2000
            sample_interval_ms = 500

            [actions]
            route = "secondary"
            reconnect_on_country_change = true
            "#,
        )
        .unwrap();

        assert_eq!(config.status_log_capacity, 50);
        assert_eq!(config.primary.base_url, "https://vpn.local/api/");
        assert_eq!(config.push.as_ref().unwrap().retry_secs, 2);
        assert_eq!(config.timing.poller().status_interval, Duration::from_secs(2));
        assert_eq!(config.timing.catalog_interval_ms, 5_000);
        assert_eq!(config.timing.monitor().sample_interval, Duration::from_millis(500));
        assert_eq!(config.actions.route, RouteKind::Secondary);
        assert!(config.actions.dispatcher().reconnect_on_country_change);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = ControllerConfig::from_toml("[timing]\nstatus_interval_ms = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ZeroInterval {
                field: "timing.status_interval_ms"
            }
        ));

        let err = ControllerConfig::from_toml("[primary]\nbase_url = \"ftp://x/\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { field: "primary.base_url", .. }));

        let err = ControllerConfig::from_toml("[actions]\nroute = \"secondary\"").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecondary));

        let err = ControllerConfig::from_toml("[primary]\nbase = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ControllerConfig::from_file("/nonexistent/vpnctl.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
