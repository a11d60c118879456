//! Expiry sweeper schedule configuration

use chrono::Duration;
use serde::Deserialize;

use super::error::ValidationError;

/// Expiry sweeper configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    /// Run the scheduled sweep at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Six-field cron expression (seconds first), evaluated in UTC
    #[serde(default = "default_cron")]
    pub cron: String,

    /// Delay before the first sweep after startup, in seconds
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,

    /// Processed webhook records older than this are purged
    #[serde(default = "default_webhook_retention")]
    pub webhook_retention_days: i64,
}

impl SweeperConfig {
    pub fn startup_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.startup_delay_secs)
    }

    pub fn webhook_retention(&self) -> Duration {
        Duration::days(self.webhook_retention_days)
    }

    /// Validate sweeper configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cron.split_whitespace().count() != 6 {
            return Err(ValidationError::InvalidSchedule(self.cron.clone()));
        }
        if self.webhook_retention_days <= 0 {
            return Err(ValidationError::NonPositive {
                field: "webhook_retention_days",
            });
        }
        Ok(())
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            cron: default_cron(),
            startup_delay_secs: default_startup_delay(),
            webhook_retention_days: default_webhook_retention(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

// Top of every hour.
fn default_cron() -> String {
    "0 0 * * * *".to_string()
}

fn default_startup_delay() -> u64 {
    60
}

fn default_webhook_retention() -> i64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweeper_defaults() {
        let config = SweeperConfig::default();
        assert!(config.enabled);
        assert_eq!(config.cron, "0 0 * * * *");
        assert_eq!(config.startup_delay(), std::time::Duration::from_secs(60));
        assert_eq!(config.webhook_retention(), Duration::days(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_five_field_cron_is_rejected() {
        let config = SweeperConfig {
            cron: "0 * * * *".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidSchedule(_))));
    }

    #[test]
    fn test_zero_retention_is_rejected() {
        let config = SweeperConfig {
            webhook_retention_days: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
