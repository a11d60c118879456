//! Payment configuration (Stripe, boost prices, premium terms)

use chrono::Duration;
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;

use super::error::ValidationError;
use crate::adapters::stripe::DEFAULT_API_BASE_URL;
use crate::domain::promotion::{BoostPlan, BoostPlanCatalog, BoostPlanId};
use crate::domain::subscription::{PremiumTerms, DEFAULT_GRACE_PERIOD_DAYS};

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Payment configuration
#[derive(Clone, Deserialize)]
pub struct PaymentConfig {
    /// Stripe secret API key
    pub stripe_api_key: String,

    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,

    /// Stripe price ID of the premium subscription
    pub premium_price_id: String,

    /// ISO currency code for boost payments
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Boost prices in minor currency units
    #[serde(default)]
    pub boost_prices: BoostPrices,

    /// Minutes during which a pending boost payment is reused
    #[serde(default = "default_freshness_window")]
    pub freshness_window_minutes: i64,

    /// Days a lapsed premium stays readable
    #[serde(default = "default_grace_days")]
    pub premium_grace_days: i64,

    /// Premium length when a subscription reports no period end
    #[serde(default = "default_fallback_days")]
    pub premium_fallback_days: i64,

    /// Reject test-mode webhook events
    #[serde(default)]
    pub require_livemode: bool,

    /// Stripe API base URL override
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Stripe HTTP timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,
}

/// Price of each boost plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BoostPrices {
    #[serde(default = "default_day_price")]
    pub day: i64,
    #[serde(default = "default_three_days_price")]
    pub three_days: i64,
    #[serde(default = "default_week_price")]
    pub week: i64,
}

impl Default for BoostPrices {
    fn default() -> Self {
        Self {
            day: default_day_price(),
            three_days: default_three_days_price(),
            week: default_week_price(),
        }
    }
}

impl BoostPrices {
    fn price_of(&self, id: BoostPlanId) -> i64 {
        match id {
            BoostPlanId::Day => self.day,
            BoostPlanId::ThreeDays => self.three_days,
            BoostPlanId::Week => self.week,
        }
    }
}

fn duration_hours(id: BoostPlanId) -> i64 {
    match id {
        BoostPlanId::Day => 24,
        BoostPlanId::ThreeDays => 72,
        BoostPlanId::Week => 7 * 24,
    }
}

impl PaymentConfig {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_test_")
    }

    /// Check if using Stripe live mode
    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_live_")
    }

    pub fn api_key(&self) -> SecretString {
        SecretString::new(self.stripe_api_key.clone())
    }

    pub fn webhook_secret(&self) -> SecretString {
        SecretString::new(self.stripe_webhook_secret.clone())
    }

    pub fn api_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.api_timeout_secs)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::minutes(self.freshness_window_minutes)
    }

    /// Builds the boost plan catalog from the configured prices.
    pub fn boost_catalog(&self) -> Result<BoostPlanCatalog, ValidationError> {
        let plans = BoostPlanId::ALL
            .into_iter()
            .map(|id| {
                BoostPlan::new(id, self.boost_prices.price_of(id), duration_hours(id) * HOUR_MS)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ValidationError::InvalidBoostPlans(e.to_string()))?;
        BoostPlanCatalog::new(&self.currency, plans)
            .map_err(|e| ValidationError::InvalidBoostPlans(e.to_string()))
    }

    pub fn premium_terms(&self) -> PremiumTerms {
        PremiumTerms::new(self.premium_price_id.trim())
            .with_grace_period(Duration::days(self.premium_grace_days))
            .with_fallback_period_days(self.premium_fallback_days)
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("MARKETPLACE__PAYMENT__STRIPE_API_KEY"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("MARKETPLACE__PAYMENT__STRIPE_WEBHOOK_SECRET"));
        }
        if self.premium_price_id.trim().is_empty() {
            return Err(ValidationError::MissingRequired("MARKETPLACE__PAYMENT__PREMIUM_PRICE_ID"));
        }

        if !self.stripe_api_key.starts_with("sk_") && !self.stripe_api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if !self.premium_price_id.trim().starts_with("price_") {
            return Err(ValidationError::InvalidPremiumPriceId);
        }
        if self.require_livemode && self.is_test_mode() {
            return Err(ValidationError::LiveKeyRequired);
        }

        if self.freshness_window_minutes <= 0 {
            return Err(ValidationError::NonPositive {
                field: "freshness_window_minutes",
            });
        }
        if self.premium_grace_days < 0 {
            return Err(ValidationError::NonPositive {
                field: "premium_grace_days",
            });
        }
        if self.premium_fallback_days <= 0 {
            return Err(ValidationError::NonPositive {
                field: "premium_fallback_days",
            });
        }
        if self.api_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        self.boost_catalog()?;
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: String::new(),
            stripe_webhook_secret: String::new(),
            premium_price_id: String::new(),
            currency: default_currency(),
            boost_prices: BoostPrices::default(),
            freshness_window_minutes: default_freshness_window(),
            premium_grace_days: default_grace_days(),
            premium_fallback_days: default_fallback_days(),
            require_livemode: false,
            api_base_url: default_api_base_url(),
            api_timeout_secs: default_api_timeout(),
        }
    }
}

impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("stripe_api_key", &"[REDACTED]")
            .field("stripe_webhook_secret", &"[REDACTED]")
            .field("premium_price_id", &self.premium_price_id)
            .field("currency", &self.currency)
            .field("boost_prices", &self.boost_prices)
            .field("freshness_window_minutes", &self.freshness_window_minutes)
            .field("premium_grace_days", &self.premium_grace_days)
            .field("premium_fallback_days", &self.premium_fallback_days)
            .field("require_livemode", &self.require_livemode)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

fn default_currency() -> String {
    "mxn".to_string()
}

fn default_day_price() -> i64 {
    150
}

fn default_three_days_price() -> i64 {
    350
}

fn default_week_price() -> i64 {
    600
}

fn default_freshness_window() -> i64 {
    15
}

fn default_grace_days() -> i64 {
    DEFAULT_GRACE_PERIOD_DAYS
}

fn default_fallback_days() -> i64 {
    30
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_api_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> PaymentConfig {
        PaymentConfig {
            stripe_api_key: "sk_test_xxx".to_string(),
            stripe_webhook_secret: "whsec_xxx".to_string(),
            premium_price_id: "price_premium_monthly".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_test_mode() {
        let config = valid();
        assert!(config.is_test_mode());
        assert!(!config.is_live_mode());
    }

    #[test]
    fn test_is_live_mode() {
        let config = PaymentConfig {
            stripe_api_key: "sk_live_xxx".to_string(),
            ..valid()
        };
        assert!(config.is_live_mode());
        assert!(!config.is_test_mode());
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validation_missing_api_key() {
        let config = PaymentConfig {
            stripe_api_key: String::new(),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingRequired("MARKETPLACE__PAYMENT__STRIPE_API_KEY"))
        ));
    }

    #[test]
    fn test_validation_invalid_key_prefix() {
        let config = PaymentConfig {
            stripe_api_key: "pk_test_xxx".to_string(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidStripeKey)));
    }

    #[test]
    fn test_validation_invalid_webhook_secret_prefix() {
        let config = PaymentConfig {
            stripe_webhook_secret: "secret_xxx".to_string(),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidStripeWebhookSecret)
        ));
    }

    #[test]
    fn test_validation_requires_price_id() {
        let config = PaymentConfig {
            premium_price_id: "  ".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = PaymentConfig {
            premium_price_id: "prod_123".to_string(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidPremiumPriceId)));
    }

    #[test]
    fn test_validation_livemode_requires_live_key() {
        let config = PaymentConfig {
            require_livemode: true,
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ValidationError::LiveKeyRequired)));
    }

    #[test]
    fn test_validation_rejects_non_positive_price() {
        let config = PaymentConfig {
            boost_prices: BoostPrices {
                day: 0,
                ..Default::default()
            },
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidBoostPlans(_))));
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let config = PaymentConfig {
            freshness_window_minutes: 0,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_catalog_matches_published_prices() {
        let catalog = valid().boost_catalog().unwrap();
        assert_eq!(catalog, BoostPlanCatalog::default());
    }

    #[test]
    fn test_custom_prices_flow_into_catalog() {
        let config = PaymentConfig {
            currency: "USD".to_string(),
            boost_prices: BoostPrices {
                day: 25,
                ..Default::default()
            },
            ..valid()
        };
        let catalog = config.boost_catalog().unwrap();
        assert_eq!(catalog.currency(), "usd");
        let day = catalog.get(BoostPlanId::Day).unwrap();
        assert_eq!(day.amount, 25);
        assert_eq!(day.duration_ms, 24 * HOUR_MS);
    }

    #[test]
    fn test_premium_terms() {
        let config = PaymentConfig {
            premium_grace_days: 5,
            premium_fallback_days: 31,
            ..valid()
        };
        let terms = config.premium_terms();
        assert_eq!(terms.price_id, "price_premium_monthly");
        assert_eq!(terms.grace_period, Duration::days(5));
        assert_eq!(terms.fallback_period_days, 31);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("sk_test_xxx"));
        assert!(!rendered.contains("whsec_xxx"));
        assert!(rendered.contains("price_premium_monthly"));
    }
}
