//! Boost plans and the injected plan catalog.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Identifier of a purchasable boost duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoostPlanId {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "72h")]
    ThreeDays,
    #[serde(rename = "1week")]
    Week,
}

impl BoostPlanId {
    /// All plan identifiers, shortest first.
    pub const ALL: [BoostPlanId; 3] = [BoostPlanId::Day, BoostPlanId::ThreeDays, BoostPlanId::Week];

    /// Returns the wire name of the plan.
    pub fn as_str(&self) -> &'static str {
        match self {
            BoostPlanId::Day => "24h",
            BoostPlanId::ThreeDays => "72h",
            BoostPlanId::Week => "1week",
        }
    }
}

impl fmt::Display for BoostPlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoostPlanId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "24h" => Ok(BoostPlanId::Day),
            "72h" => Ok(BoostPlanId::ThreeDays),
            "1week" => Ok(BoostPlanId::Week),
            "" => Err(ValidationError::empty_field("plan_id")),
            other => Err(ValidationError::invalid_format(
                "plan_id",
                format!("unknown boost plan '{}'", other),
            )),
        }
    }
}

/// Price and duration of one boost plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostPlan {
    pub id: BoostPlanId,
    /// Price in minor currency units.
    pub amount: i64,
    pub duration_ms: i64,
}

impl BoostPlan {
    pub fn new(id: BoostPlanId, amount: i64, duration_ms: i64) -> Result<Self, ValidationError> {
        if amount <= 0 {
            return Err(ValidationError::out_of_range("amount", 1, i64::MAX, amount));
        }
        if duration_ms <= 0 {
            return Err(ValidationError::out_of_range(
                "duration_ms",
                1,
                i64::MAX,
                duration_ms,
            ));
        }
        Ok(Self {
            id,
            amount,
            duration_ms,
        })
    }
}

/// Read-only table of boost plans, loaded once at startup and shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoostPlanCatalog {
    currency: String,
    plans: BTreeMap<BoostPlanId, BoostPlan>,
}

impl BoostPlanCatalog {
    /// Builds a catalog. Rejects a blank currency or an empty plan list.
    pub fn new(
        currency: impl Into<String>,
        plans: impl IntoIterator<Item = BoostPlan>,
    ) -> Result<Self, ValidationError> {
        let currency = currency.into().trim().to_lowercase();
        if currency.is_empty() {
            return Err(ValidationError::empty_field("currency"));
        }
        let plans: BTreeMap<_, _> = plans.into_iter().map(|p| (p.id, p)).collect();
        if plans.is_empty() {
            return Err(ValidationError::empty_field("boost_plans"));
        }
        Ok(Self { currency, plans })
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn get(&self, id: BoostPlanId) -> Option<&BoostPlan> {
        self.plans.get(&id)
    }

    /// Resolves a raw plan id from a request or from event metadata.
    pub fn resolve(&self, raw: &str) -> Result<&BoostPlan, ValidationError> {
        let id: BoostPlanId = raw.parse()?;
        self.get(id).ok_or_else(|| {
            ValidationError::invalid_format("plan_id", format!("plan '{}' is not offered", raw))
        })
    }

    /// Plans in ascending duration order.
    pub fn plans(&self) -> impl Iterator<Item = &BoostPlan> {
        self.plans.values()
    }

    /// Wire names of offered plans, used in rejection messages.
    pub fn plan_names(&self) -> Vec<&'static str> {
        self.plans.keys().map(|id| id.as_str()).collect()
    }
}

impl Default for BoostPlanCatalog {
    fn default() -> Self {
        Self {
            currency: "mxn".to_string(),
            plans: [
                BoostPlan {
                    id: BoostPlanId::Day,
                    amount: 150,
                    duration_ms: 24 * HOUR_MS,
                },
                BoostPlan {
                    id: BoostPlanId::ThreeDays,
                    amount: 350,
                    duration_ms: 72 * HOUR_MS,
                },
                BoostPlan {
                    id: BoostPlanId::Week,
                    amount: 600,
                    duration_ms: 7 * 24 * HOUR_MS,
                },
            ]
            .into_iter()
            .map(|p| (p.id, p))
            .collect(),
        }
    }
}
