//! Connector configuration.
//!
//! Defaults are compiled in; [`ConnectorConfig::from_env`] overrides them from
//! the process environment (and a `.env` file, when present).

use crate::params::{MAX_SESSION_DURATION, MIN_SESSION_DURATION};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Budget for verifying and confirming a rotated key.
pub const DEFAULT_ROTATE_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause between verification attempts of a rotated key.
pub const DEFAULT_VERIFICATION_DELAY: Duration = Duration::from_millis(1000);
/// Pause between persistence confirmation probes.
pub const DEFAULT_PERSIST_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Fraction of the session lifetime after which it is refreshed.
pub const DEFAULT_REFRESH_FRACTION: f64 = 0.8;
/// Shortest period between two scheduled refreshes.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
/// Session lifetime requested when the connection does not name one.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(60 * 60);

const MIN_REFRESH_FRACTION: f64 = 0.5;
/// Upper bound on the refresh fraction; the refresh period never exceeds this
/// share of the session lifetime, whatever the floor.
pub const MAX_REFRESH_FRACTION: f64 = 0.95;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An environment variable could not be parsed
    #[error("Invalid value for {name}: {message}")]
    InvalidValue {
        /// Variable name
        name: String,
        /// Parse failure
        message: String,
    },

    /// A whitelisted STS endpoint is not an https URL
    #[error("Invalid STS endpoint '{endpoint}': {message}")]
    InvalidEndpoint {
        /// Offending endpoint
        endpoint: String,
        /// Why it was rejected
        message: String,
    },

    /// The configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Timing and endpoint configuration for the credential lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfig {
    /// Budget for rotated-key verification, and separately for persistence confirmation
    pub rotate_timeout: Duration,
    /// Pause between verification attempts
    pub verification_delay: Duration,
    /// Pause between persistence confirmation probes
    pub persist_poll_interval: Duration,
    /// Refresh after this fraction of the session lifetime
    pub refresh_fraction: f64,
    /// Lower bound on the refresh period
    pub min_refresh_interval: Duration,
    /// Session lifetime used when a connection does not set one
    pub default_session_duration: Duration,
    /// Allowed STS endpoints; empty means the regional defaults
    pub whitelisted_sts_endpoints: Vec<String>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            rotate_timeout: DEFAULT_ROTATE_TIMEOUT,
            verification_delay: DEFAULT_VERIFICATION_DELAY,
            persist_poll_interval: DEFAULT_PERSIST_POLL_INTERVAL,
            refresh_fraction: DEFAULT_REFRESH_FRACTION,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            default_session_duration: DEFAULT_SESSION_DURATION,
            whitelisted_sts_endpoints: Vec::new(),
        }
    }
}

impl ConnectorConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or if the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectorConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            rotate_timeout: Duration::from_secs(parse_var(
                &lookup,
                "AWS_KEY_ROTATION_TIMEOUT_SECS",
                defaults.rotate_timeout.as_secs(),
            )?),
            verification_delay: Duration::from_millis(parse_var(
                &lookup,
                "AWS_KEY_ROTATION_VERIFY_DELAY_MS",
                duration_millis(defaults.verification_delay),
            )?),
            persist_poll_interval: Duration::from_secs(parse_var(
                &lookup,
                "AWS_KEY_ROTATION_POLL_INTERVAL_SECS",
                defaults.persist_poll_interval.as_secs(),
            )?),
            refresh_fraction: parse_fraction(
                &lookup,
                "AWS_SESSION_REFRESH_FRACTION",
                defaults.refresh_fraction,
            )?,
            min_refresh_interval: Duration::from_secs(parse_var(
                &lookup,
                "AWS_SESSION_MIN_REFRESH_SECS",
                defaults.min_refresh_interval.as_secs(),
            )?),
            default_session_duration: Duration::from_secs(
                parse_var(
                    &lookup,
                    "AWS_SESSION_DURATION_MINUTES",
                    defaults.default_session_duration.as_secs() / 60,
                )?
                .checked_mul(60)
                .ok_or_else(|| ConfigError::InvalidValue {
                    name: "AWS_SESSION_DURATION_MINUTES".to_string(),
                    message: "number too large".to_string(),
                })?,
            ),
            whitelisted_sts_endpoints: match lookup("AWS_WHITELISTED_STS_ENDPOINTS") {
                Some(raw) => parse_endpoints(&raw)?,
                None => defaults.whitelisted_sts_endpoints,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persist_poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "persistence poll interval must be positive".to_string(),
            ));
        }
        if self.min_refresh_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "minimum refresh interval must be positive".to_string(),
            ));
        }
        if self.min_refresh_interval >= MIN_SESSION_DURATION {
            return Err(ConfigError::Invalid(format!(
                "minimum refresh interval {:?} must be shorter than the shortest session {MIN_SESSION_DURATION:?}",
                self.min_refresh_interval
            )));
        }
        if !(MIN_REFRESH_FRACTION..=MAX_REFRESH_FRACTION).contains(&self.refresh_fraction) {
            return Err(ConfigError::Invalid(format!(
                "refresh fraction {} is outside {MIN_REFRESH_FRACTION}..={MAX_REFRESH_FRACTION}",
                self.refresh_fraction
            )));
        }
        if !(MIN_SESSION_DURATION..=MAX_SESSION_DURATION).contains(&self.default_session_duration) {
            return Err(ConfigError::Invalid(format!(
                "default session duration {:?} is outside {MIN_SESSION_DURATION:?}..={MAX_SESSION_DURATION:?}",
                self.default_session_duration
            )));
        }
        Ok(())
    }

    /// Set the rotation budget.
    #[must_use]
    pub const fn with_rotate_timeout(mut self, timeout: Duration) -> Self {
        self.rotate_timeout = timeout;
        self
    }

    /// Set the pause between verification attempts.
    #[must_use]
    pub const fn with_verification_delay(mut self, delay: Duration) -> Self {
        self.verification_delay = delay;
        self
    }

    /// Set the pause between persistence probes.
    #[must_use]
    pub const fn with_persist_poll_interval(mut self, interval: Duration) -> Self {
        self.persist_poll_interval = interval;
        self
    }

    /// Set the refresh fraction (clamped to 0.5 - 0.95).
    ///
    /// A non-finite fraction leaves the current value in place.
    #[must_use]
    pub fn with_refresh_fraction(mut self, fraction: f64) -> Self {
        if fraction.is_finite() {
            self.refresh_fraction = fraction.clamp(MIN_REFRESH_FRACTION, MAX_REFRESH_FRACTION);
        }
        self
    }

    /// Set the lower bound on the refresh period.
    #[must_use]
    pub const fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Set the default session lifetime.
    #[must_use]
    pub const fn with_default_session_duration(mut self, duration: Duration) -> Self {
        self.default_session_duration = duration;
        self
    }

    /// Restrict the allowed STS endpoints.
    #[must_use]
    pub fn with_whitelisted_sts_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelisted_sts_endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name: name.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_fraction<F>(lookup: &F, name: &str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let fraction: f64 = parse_var(lookup, name, default)?;
    if !fraction.is_finite() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("{fraction} is not a finite number"),
        });
    }
    Ok(fraction.clamp(MIN_REFRESH_FRACTION, MAX_REFRESH_FRACTION))
}

fn parse_endpoints(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|endpoint| !endpoint.is_empty())
        .map(|endpoint| {
            let url = Url::parse(endpoint).map_err(|e| ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
            if url.scheme() != "https" {
                return Err(ConfigError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    message: "must use https".to_string(),
                });
            }
            Ok(endpoint.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ConnectorConfig::default();
        assert_eq!(config.rotate_timeout, Duration::from_secs(30));
        assert_eq!(config.verification_delay, Duration::from_secs(1));
        assert_eq!(config.persist_poll_interval, Duration::from_secs(3));
        assert!((config.refresh_fraction - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.default_session_duration, Duration::from_secs(3600));
        assert!(config.whitelisted_sts_endpoints.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_environment_yields_defaults() {
        let config = ConnectorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ConnectorConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let config = ConnectorConfig::from_lookup(lookup(&[
            ("AWS_KEY_ROTATION_TIMEOUT_SECS", "45"),
            ("AWS_KEY_ROTATION_VERIFY_DELAY_MS", "250"),
            ("AWS_SESSION_DURATION_MINUTES", "120"),
            ("AWS_SESSION_REFRESH_FRACTION", "0.99"),
            (
                "AWS_WHITELISTED_STS_ENDPOINTS",
                "https://sts.example.internal, https://sts.eu-west-1.amazonaws.com",
            ),
        ]))
        .unwrap();

        assert_eq!(config.rotate_timeout, Duration::from_secs(45));
        assert_eq!(config.verification_delay, Duration::from_millis(250));
        assert_eq!(config.default_session_duration, Duration::from_secs(7200));
        assert!((config.refresh_fraction - 0.95).abs() < f64::EPSILON);
        assert_eq!(
            config.whitelisted_sts_endpoints,
            vec!["https://sts.example.internal", "https://sts.eu-west-1.amazonaws.com"]
        );
    }

    #[test]
    fn test_unparsable_value_is_rejected() {
        let err = ConnectorConfig::from_lookup(lookup(&[("AWS_KEY_ROTATION_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "AWS_KEY_ROTATION_TIMEOUT_SECS"));
    }

    #[test]
    fn test_plain_http_endpoint_is_rejected() {
        let err = ConnectorConfig::from_lookup(lookup(&[(
            "AWS_WHITELISTED_STS_ENDPOINTS",
            "http://sts.example.internal",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_session_duration_out_of_range() {
        let err = ConnectorConfig::from_lookup(lookup(&[("AWS_SESSION_DURATION_MINUTES", "5")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_refresh_fraction_clamping() {
        let config = ConnectorConfig::default().with_refresh_fraction(0.1);
        assert!((config.refresh_fraction - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_non_finite_refresh_fraction_is_rejected() {
        for raw in ["NaN", "inf", "-inf"] {
            let err = ConnectorConfig::from_lookup(lookup(&[("AWS_SESSION_REFRESH_FRACTION", raw)]))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "AWS_SESSION_REFRESH_FRACTION"),
                "{raw}: {err:?}"
            );
        }
    }

    #[test]
    fn test_non_finite_refresh_fraction_keeps_current_value() {
        let config = ConnectorConfig::default()
            .with_refresh_fraction(0.6)
            .with_refresh_fraction(f64::NAN);
        assert!((config.refresh_fraction - 0.6).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fraction_set_directly_is_validated() {
        let config = ConnectorConfig {
            refresh_fraction: f64::NAN,
            ..ConnectorConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_huge_session_duration_is_rejected() {
        let err = ConnectorConfig::from_lookup(lookup(&[(
            "AWS_SESSION_DURATION_MINUTES",
            "307445734561825861",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "AWS_SESSION_DURATION_MINUTES"));
    }

    #[test]
    fn test_refresh_floor_must_be_shorter_than_any_session() {
        let err = ConnectorConfig::from_lookup(lookup(&[("AWS_SESSION_MIN_REFRESH_SECS", "1200")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = ConnectorConfig::from_lookup(lookup(&[("AWS_SESSION_MIN_REFRESH_SECS", "600")]))
            .unwrap();
        assert_eq!(config.min_refresh_interval, Duration::from_secs(600));
    }
}
