//! Plugin Configuration
//!
//! All options are read once, up front, from variables prefixed with
//! [`ENV_PREFIX`]. Invalid values never fail startup; each option falls
//! back to its default.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `CUSTOM_METRICS_PLUGIN_ENABLED` | `false` |
//! | `CUSTOM_METRICS_PLUGIN_SLEEP_INTERVAL_SECONDS` | `1` |
//! | `CUSTOM_METRICS_PLUGIN_STATSD_HOST` | `localhost` |
//! | `CUSTOM_METRICS_PLUGIN_STATSD_PORT` | `8125` |
//! | `CUSTOM_METRICS_PLUGIN_STATSD_PREFIX` | unset |

use std::env;
use std::time::Duration;

use log::{debug, warn};

/// Prefix shared by every recognized environment variable.
pub const ENV_PREFIX: &str = "CUSTOM_METRICS_PLUGIN_";

/// Default pause between sampling cycles.
pub const DEFAULT_SLEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Default StatsD host.
pub const DEFAULT_STATSD_HOST: &str = "localhost";

/// Default StatsD port.
pub const DEFAULT_STATSD_PORT: u16 = 8125;

/// Values accepted as "on" for boolean options (compared case-insensitively).
const TRUTHY: &[&str] = &["true", "1", "t", "y", "yes"];

/// Resolved plugin configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    /// Whether tracking and sampling run at all
    pub enabled: bool,
    /// Pause between sampling cycles
    pub sleep_interval: Duration,
    /// StatsD host receiving gauges
    pub statsd_host: String,
    /// StatsD UDP port
    pub statsd_port: u16,
    /// Optional path prefix prepended to every metric name
    pub statsd_prefix: Option<String>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sleep_interval: DEFAULT_SLEEP_INTERVAL,
            statsd_host: DEFAULT_STATSD_HOST.to_string(),
            statsd_port: DEFAULT_STATSD_PORT,
            statsd_prefix: None,
        }
    }
}

impl PluginConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Keys are passed without [`ENV_PREFIX`], e.g. `"ENABLED"`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let enabled = lookup("ENABLED")
            .map(|value| parse_bool(&value))
            .unwrap_or(defaults.enabled);

        let sleep_interval = parse_interval(lookup("SLEEP_INTERVAL_SECONDS").as_deref());

        let statsd_host = lookup("STATSD_HOST")
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .unwrap_or(defaults.statsd_host);

        let statsd_port = match lookup("STATSD_PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(
                    "Invalid StatsD port '{}', using {}",
                    raw, DEFAULT_STATSD_PORT
                );
                DEFAULT_STATSD_PORT
            }),
            None => defaults.statsd_port,
        };

        let statsd_prefix = lookup("STATSD_PREFIX")
            .map(|prefix| prefix.trim().trim_end_matches('.').to_string())
            .filter(|prefix| !prefix.is_empty());

        Self {
            enabled,
            sleep_interval,
            statsd_host,
            statsd_port,
            statsd_prefix,
        }
    }

    /// Returns the `host:port` address of the StatsD sink.
    pub fn statsd_addr(&self) -> String {
        format!("{}:{}", self.statsd_host, self.statsd_port)
    }
}

/// Interprets a boolean option. Anything outside [`TRUTHY`] is `false`.
pub fn parse_bool(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    TRUTHY.contains(&value.as_str())
}

/// Interprets the sampling interval in seconds.
///
/// Missing, non-numeric, non-finite, zero or negative values fall back
/// to [`DEFAULT_SLEEP_INTERVAL`].
pub fn parse_interval(value: Option<&str>) -> Duration {
    let Some(raw) = value else {
        return DEFAULT_SLEEP_INTERVAL;
    };

    let parsed = raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

    match parsed {
        Some(interval) if !interval.is_zero() => interval,
        _ => {
            debug!(
                "Ignoring sleep interval '{}', using {:?}",
                raw, DEFAULT_SLEEP_INTERVAL
            );
            DEFAULT_SLEEP_INTERVAL
        }
    }
}
