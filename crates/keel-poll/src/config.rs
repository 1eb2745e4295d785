//! Poll manager configuration

use std::time::Duration;

use keel_common::{
    schedule, Error, LabelKeys, DEFAULT_POLL_SCHEDULE, DEFAULT_SCAN_INTERVAL, DEFAULT_SCAN_TIMEOUT,
};

/// Runtime configuration for [`PollManager`](crate::PollManager)
///
/// Set once at construction; the manager never mutates it.
#[derive(Clone, Debug)]
pub struct PollConfig {
    /// Wall-clock interval between scans
    pub scan_interval: Duration,
    /// Upper bound on a single scan
    pub scan_timeout: Duration,
    /// Schedule used for deployments without a schedule label
    pub default_schedule: String,
    /// Label keys consulted when classifying deployments
    pub labels: LabelKeys,
    /// Return from `start` when the initial scan cannot enumerate namespaces
    pub fail_on_initial_scan_error: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            default_schedule: DEFAULT_POLL_SCHEDULE.to_string(),
            labels: LabelKeys::default(),
            fail_on_initial_scan_error: false,
        }
    }
}

impl PollConfig {
    /// Reject configurations the scan loop cannot honour
    pub fn validate(&self) -> Result<(), Error> {
        if self.scan_interval.is_zero() {
            return Err(Error::config("scan interval must be greater than zero"));
        }
        if self.scan_timeout.is_zero() {
            return Err(Error::config("scan timeout must be greater than zero"));
        }
        if self.scan_timeout > self.scan_interval {
            return Err(Error::config(format!(
                "scan timeout ({:?}) must not exceed scan interval ({:?})",
                self.scan_timeout, self.scan_interval
            )));
        }
        schedule::validate(&self.default_schedule).map_err(|e| {
            Error::config(format!("default poll schedule is invalid: {}", e))
        })?;

        for (name, key) in [
            ("policy", &self.labels.policy),
            ("trigger", &self.labels.trigger),
            ("poll schedule", &self.labels.poll_schedule),
        ] {
            if key.trim().is_empty() {
                return Err(Error::config(format!("{} label key is empty", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PollConfig::default();
        assert_eq!(config.scan_interval, Duration::from_secs(55));
        assert_eq!(config.default_schedule, "@every 1m");
        assert!(!config.fail_on_initial_scan_error);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = PollConfig {
            scan_interval: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scan interval"));
    }

    #[test]
    fn test_timeout_longer_than_interval_is_rejected() {
        let config = PollConfig {
            scan_interval: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(20),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PollConfig {
            scan_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_default_schedule_is_rejected() {
        let config = PollConfig {
            default_schedule: "@sometimes".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default poll schedule"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_empty_label_key_is_rejected() {
        let mut config = PollConfig::default();
        config.labels.trigger = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("trigger label key"));
    }
}
