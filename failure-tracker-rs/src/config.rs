// failure-tracker-rs/src/config.rs
// Failure tracking configuration with env loading and fail-fast validation.

use std::env;
use std::time::Duration;

/// Denominator used when turning in-window failures into a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateBasis {
    /// Failures in window divided by failures in window. Any failure yields
    /// 100%, and `FailureStats::failure_rate` stays 0. Matches the
    /// behaviour existing dashboards were built against.
    #[default]
    FailuresInWindow,
    /// Failures in window divided by exchanges reported through
    /// `FailureTracker::note_event`.
    TotalEvents,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("alert failure rate must be a finite percentage in [0, 100], got {0}")]
    AlertRate(f64),

    #[error("confidence threshold must be in [0, 1], got {0}")]
    ConfidenceThreshold(f64),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Debug, Clone)]
pub struct FailureTrackingConfig {
    pub enable_auto_detection: bool,
    /// Patterns with a lower confidence are not reported by detection.
    pub confidence_threshold: f64,
    /// Alert when the in-window failure rate (percent) exceeds this.
    pub alert_failure_rate: f64,
    pub alert_window: Duration,
    pub stats_window: Duration,
    pub enable_alerting: bool,
    /// Upper bound on any single sink call.
    pub sink_timeout: Duration,
    pub rate_basis: RateBasis,
    /// Model version stamped on reported failures that do not name one.
    pub default_model_version: String,
}

impl Default for FailureTrackingConfig {
    fn default() -> Self {
        Self {
            enable_auto_detection: true,
            confidence_threshold: 0.7,
            alert_failure_rate: 15.0,
            alert_window: Duration::from_secs(5 * 60),
            stats_window: Duration::from_secs(60 * 60),
            enable_alerting: true,
            sink_timeout: Duration::from_secs(5),
            rate_basis: RateBasis::FailuresInWindow,
            default_model_version: "gpt-4o-mini".to_string(),
        }
    }
}

impl FailureTrackingConfig {
    /// Construct configuration from environment variables.
    ///
    /// Never panics; unparseable values fall back to the defaults. Range
    /// checks happen in [`FailureTrackingConfig::validate`].
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let enable_auto_detection =
            parse_bool_var("FAILURE_TRACKING_AUTO_DETECT", defaults.enable_auto_detection);
        let enable_alerting = parse_bool_var("FAILURE_TRACKING_ALERTING", defaults.enable_alerting);

        let confidence_threshold = parse_var(
            "FAILURE_TRACKING_CONFIDENCE_THRESHOLD",
            defaults.confidence_threshold,
        );
        let alert_failure_rate = parse_var("FAILURE_TRACKING_ALERT_RATE", defaults.alert_failure_rate);

        let alert_window =
            parse_minutes_var("FAILURE_TRACKING_ALERT_WINDOW_MINUTES", defaults.alert_window);
        let stats_window =
            parse_minutes_var("FAILURE_TRACKING_STATS_WINDOW_MINUTES", defaults.stats_window);
        let sink_timeout = Duration::from_millis(parse_var(
            "FAILURE_TRACKING_SINK_TIMEOUT_MS",
            defaults.sink_timeout.as_millis() as u64,
        ));

        let rate_basis = match env::var("FAILURE_TRACKING_RATE_BASIS") {
            Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
                "total_events" | "events" => RateBasis::TotalEvents,
                "failures" | "failures_in_window" => RateBasis::FailuresInWindow,
                other => {
                    tracing::warn!(value = other, "unknown FAILURE_TRACKING_RATE_BASIS; using default");
                    defaults.rate_basis
                }
            },
            Err(_) => defaults.rate_basis,
        };

        let default_model_version = env::var("FAILURE_TRACKING_DEFAULT_MODEL")
            .ok()
            .filter(|model| !model.trim().is_empty())
            .unwrap_or(defaults.default_model_version);

        Self {
            enable_auto_detection,
            confidence_threshold,
            alert_failure_rate,
            alert_window,
            stats_window,
            enable_alerting,
            sink_timeout,
            rate_basis,
            default_model_version,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.alert_failure_rate.is_finite() || !(0.0..=100.0).contains(&self.alert_failure_rate) {
            return Err(ConfigError::AlertRate(self.alert_failure_rate));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ConfidenceThreshold(self.confidence_threshold));
        }
        if self.alert_window.is_zero() {
            return Err(ConfigError::ZeroDuration("alert_window"));
        }
        if self.stats_window.is_zero() {
            return Err(ConfigError::ZeroDuration("stats_window"));
        }
        if self.sink_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("sink_timeout"));
        }
        Ok(())
    }

    /// Horizon beyond which no view needs a record.
    pub(crate) fn retention(&self) -> Duration {
        self.stats_window.max(self.alert_window)
    }
}

fn parse_bool_var(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(val) => {
            let v = val.trim().to_ascii_lowercase();
            match v.as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    tracing::warn!(var = name, value = %val, "invalid boolean; using default");
                    default
                }
            }
        }
        Err(_) => default,
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match env::var(name) {
        Ok(val) => val.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %val, "invalid value; using default");
            default
        }),
        Err(_) => default,
    }
}

/// Whole minutes from `name`. Values too large to express in seconds fall
/// back to `default`.
fn parse_minutes_var(name: &str, default: Duration) -> Duration {
    let minutes = parse_var(name, default.as_secs() / 60);
    match minutes.checked_mul(60) {
        Some(secs) => Duration::from_secs(secs),
        None => {
            tracing::warn!(var = name, minutes, "window out of range; using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = FailureTrackingConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.alert_window, Duration::from_secs(300));
        assert_eq!(cfg.stats_window, Duration::from_secs(3600));
        assert_eq!(cfg.retention(), Duration::from_secs(3600));
        assert_eq!(cfg.rate_basis, RateBasis::FailuresInWindow);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cfg = FailureTrackingConfig {
            alert_failure_rate: f64::NAN,
            ..FailureTrackingConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::AlertRate(_))));

        let cfg = FailureTrackingConfig {
            alert_failure_rate: 120.0,
            ..FailureTrackingConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::AlertRate(_))));

        let cfg = FailureTrackingConfig {
            confidence_threshold: 1.5,
            ..FailureTrackingConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ConfidenceThreshold(_))
        ));

        let cfg = FailureTrackingConfig {
            alert_window: Duration::ZERO,
            ..FailureTrackingConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ZeroDuration("alert_window"))
        ));
    }

    #[test]
    fn from_env_reads_overrides_and_ignores_garbage() {
        unsafe {
            env::set_var("FAILURE_TRACKING_ALERT_RATE", "25");
            env::set_var("FAILURE_TRACKING_RATE_BASIS", "total_events");
            env::set_var("FAILURE_TRACKING_ALERT_WINDOW_MINUTES", "not-a-number");
            env::set_var("FAILURE_TRACKING_AUTO_DETECT", "off");
        }

        let cfg = FailureTrackingConfig::from_env();

        unsafe {
            env::remove_var("FAILURE_TRACKING_ALERT_RATE");
            env::remove_var("FAILURE_TRACKING_RATE_BASIS");
            env::remove_var("FAILURE_TRACKING_ALERT_WINDOW_MINUTES");
            env::remove_var("FAILURE_TRACKING_AUTO_DETECT");
        }

        assert_eq!(cfg.alert_failure_rate, 25.0);
        assert_eq!(cfg.rate_basis, RateBasis::TotalEvents);
        assert_eq!(cfg.alert_window, Duration::from_secs(300));
        assert!(!cfg.enable_auto_detection);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn oversized_window_minutes_fall_back_to_the_default() {
        unsafe {
            env::set_var("FAILURE_TRACKING_STATS_WINDOW_MINUTES", u64::MAX.to_string());
        }

        let cfg = FailureTrackingConfig::from_env();

        unsafe {
            env::remove_var("FAILURE_TRACKING_STATS_WINDOW_MINUTES");
        }

        assert_eq!(cfg.stats_window, Duration::from_secs(3600));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn window_minutes_convert_to_seconds() {
        unsafe {
            env::set_var("FAILURE_TRACKING_TEST_WINDOW_MINUTES", "7");
        }

        let window =
            parse_minutes_var("FAILURE_TRACKING_TEST_WINDOW_MINUTES", Duration::from_secs(60));

        unsafe {
            env::remove_var("FAILURE_TRACKING_TEST_WINDOW_MINUTES");
        }

        assert_eq!(window, Duration::from_secs(7 * 60));
        assert_eq!(
            parse_minutes_var("FAILURE_TRACKING_UNSET_WINDOW", Duration::from_secs(120)),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn retention_covers_the_longer_window() {
        let cfg = FailureTrackingConfig {
            alert_window: Duration::from_secs(2 * 3600),
            ..FailureTrackingConfig::default()
        };
        assert_eq!(cfg.retention(), Duration::from_secs(2 * 3600));
    }
}
