//! Plan tiers and the provider product catalog
//!
//! A plan tier is one of a fixed set of subscription levels, each with a
//! monthly generation quota. Paid tiers map 1:1 to Creem product ids; the
//! mapping is loaded from environment variables so production and test
//! products can differ without a code change.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Subscription plan tier
///
/// `Free` is the default/unentitled state, not a purchasable product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    StarterMonthly,
    StarterYearly,
    ExplorerMonthly,
    ExplorerYearly,
    CreatorMonthly,
    CreatorYearly,
}

impl PlanTier {
    pub const ALL: [PlanTier; 7] = [
        PlanTier::Free,
        PlanTier::StarterMonthly,
        PlanTier::StarterYearly,
        PlanTier::ExplorerMonthly,
        PlanTier::ExplorerYearly,
        PlanTier::CreatorMonthly,
        PlanTier::CreatorYearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::StarterMonthly => "starter_monthly",
            PlanTier::StarterYearly => "starter_yearly",
            PlanTier::ExplorerMonthly => "explorer_monthly",
            PlanTier::ExplorerYearly => "explorer_yearly",
            PlanTier::CreatorMonthly => "creator_monthly",
            PlanTier::CreatorYearly => "creator_yearly",
        }
    }

    /// Generations allowed per billing cycle. Free users cannot generate.
    pub fn monthly_quota(&self) -> i64 {
        match self {
            PlanTier::Free => 0,
            PlanTier::StarterMonthly | PlanTier::StarterYearly => 50,
            PlanTier::ExplorerMonthly | PlanTier::ExplorerYearly => 200,
            PlanTier::CreatorMonthly | PlanTier::CreatorYearly => 500,
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, PlanTier::Free)
    }

    /// Static configuration for this tier (display name, price).
    pub fn config(&self) -> PlanConfig {
        match self {
            PlanTier::Free => PlanConfig {
                name: "Free",
                price_cents: 0,
                billing_period: BillingPeriod::Month,
            },
            PlanTier::StarterMonthly => PlanConfig {
                name: "Starter Monthly",
                price_cents: 799,
                billing_period: BillingPeriod::Month,
            },
            PlanTier::StarterYearly => PlanConfig {
                name: "Starter Yearly",
                price_cents: 5900,
                billing_period: BillingPeriod::Year,
            },
            PlanTier::ExplorerMonthly => PlanConfig {
                name: "Explorer Monthly",
                price_cents: 1499,
                billing_period: BillingPeriod::Month,
            },
            PlanTier::ExplorerYearly => PlanConfig {
                name: "Explorer Yearly",
                price_cents: 9900,
                billing_period: BillingPeriod::Year,
            },
            PlanTier::CreatorMonthly => PlanConfig {
                name: "Creator Monthly",
                price_cents: 3000,
                billing_period: BillingPeriod::Month,
            },
            PlanTier::CreatorYearly => PlanConfig {
                name: "Creator Yearly",
                price_cents: 19900,
                billing_period: BillingPeriod::Year,
            },
        }
    }

    /// Environment variable carrying this tier's Creem product id.
    fn product_env_var(&self) -> Option<&'static str> {
        match self {
            PlanTier::Free => None,
            PlanTier::StarterMonthly => Some("CREEM_PID_STARTER_MONTHLY"),
            PlanTier::StarterYearly => Some("CREEM_PID_STARTER_YEARLY"),
            PlanTier::ExplorerMonthly => Some("CREEM_PID_EXPLORER_MONTHLY"),
            PlanTier::ExplorerYearly => Some("CREEM_PID_EXPLORER_YEARLY"),
            PlanTier::CreatorMonthly => Some("CREEM_PID_CREATOR_MONTHLY"),
            PlanTier::CreatorYearly => Some("CREEM_PID_CREATOR_YEARLY"),
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = UnknownPlanTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanTier::Free),
            "starter_monthly" => Ok(PlanTier::StarterMonthly),
            "starter_yearly" => Ok(PlanTier::StarterYearly),
            "explorer_monthly" => Ok(PlanTier::ExplorerMonthly),
            "explorer_yearly" => Ok(PlanTier::ExplorerYearly),
            "creator_monthly" => Ok(PlanTier::CreatorMonthly),
            "creator_yearly" => Ok(PlanTier::CreatorYearly),
            _ => Err(UnknownPlanTier(s.to_string())),
        }
    }
}

/// Error for unrecognized plan tier strings
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown plan tier: {0}")]
pub struct UnknownPlanTier(pub String);

/// Billing interval for a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Month,
    Year,
}

/// Static configuration for a plan tier
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlanConfig {
    pub name: &'static str,
    pub price_cents: i64,
    pub billing_period: BillingPeriod,
}

/// Maps opaque Creem product ids to internal plan tiers (and back)
///
/// Unrecognized product ids resolve to `None`, never an error: callers
/// degrade to record-only handling instead of crashing on a product the
/// deployment does not know about.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    by_product: HashMap<String, PlanTier>,
    by_tier: HashMap<PlanTier, String>,
}

impl PlanCatalog {
    /// Build the catalog from `CREEM_PID_*` environment variables.
    ///
    /// Unset or empty variables are skipped with a warning so a partially
    /// configured deployment (e.g. only monthly products) still works.
    pub fn from_env() -> Self {
        let mut catalog = Self::default();
        for tier in PlanTier::ALL {
            let Some(var) = tier.product_env_var() else {
                continue;
            };
            match std::env::var(var) {
                Ok(product_id) if !product_id.trim().is_empty() => {
                    catalog.insert(tier, product_id.trim().to_string());
                }
                _ => {
                    tracing::warn!(tier = %tier, env_var = var, "No product id configured for tier");
                }
            }
        }
        catalog
    }

    pub fn insert(&mut self, tier: PlanTier, product_id: String) {
        self.by_product.insert(product_id.clone(), tier);
        self.by_tier.insert(tier, product_id);
    }

    /// Resolve a provider product id to an internal tier.
    pub fn resolve_product(&self, product_id: &str) -> Option<PlanTier> {
        self.by_product.get(product_id).copied()
    }

    /// Look up the provider product id for a tier (checkout direction).
    pub fn product_id(&self, tier: PlanTier) -> Option<&str> {
        self.by_tier.get(&tier).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.by_product.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn plan_tier_round_trips_through_strings() {
        for tier in PlanTier::ALL {
            assert_eq!(tier.as_str().parse::<PlanTier>().unwrap(), tier);
        }
        assert!("platinum_weekly".parse::<PlanTier>().is_err());
    }

    #[test]
    fn quotas_match_plan_levels() {
        assert_eq!(PlanTier::Free.monthly_quota(), 0);
        assert_eq!(PlanTier::StarterMonthly.monthly_quota(), 50);
        assert_eq!(PlanTier::StarterYearly.monthly_quota(), 50);
        assert_eq!(PlanTier::ExplorerYearly.monthly_quota(), 200);
        assert_eq!(PlanTier::CreatorMonthly.monthly_quota(), 500);
    }

    #[test]
    fn free_is_not_paid_and_has_no_product() {
        assert!(!PlanTier::Free.is_paid());
        assert!(PlanTier::Free.product_env_var().is_none());
        assert!(PlanTier::ExplorerMonthly.is_paid());
    }

    #[test]
    fn catalog_resolves_known_products_only() {
        let mut catalog = PlanCatalog::default();
        catalog.insert(PlanTier::ExplorerYearly, "prod_X".to_string());

        assert_eq!(
            catalog.resolve_product("prod_X"),
            Some(PlanTier::ExplorerYearly)
        );
        assert_eq!(catalog.resolve_product("prod_unknown"), None);
        assert_eq!(catalog.product_id(PlanTier::ExplorerYearly), Some("prod_X"));
        assert_eq!(catalog.product_id(PlanTier::StarterMonthly), None);
    }

    #[test]
    #[serial]
    fn catalog_from_env_skips_missing_vars() {
        std::env::set_var("CREEM_PID_STARTER_MONTHLY", "prod_starter_m");
        std::env::remove_var("CREEM_PID_STARTER_YEARLY");
        std::env::remove_var("CREEM_PID_EXPLORER_MONTHLY");
        std::env::remove_var("CREEM_PID_EXPLORER_YEARLY");
        std::env::remove_var("CREEM_PID_CREATOR_MONTHLY");
        std::env::remove_var("CREEM_PID_CREATOR_YEARLY");

        let catalog = PlanCatalog::from_env();
        assert_eq!(
            catalog.resolve_product("prod_starter_m"),
            Some(PlanTier::StarterMonthly)
        );
        assert_eq!(catalog.product_id(PlanTier::CreatorYearly), None);

        std::env::remove_var("CREEM_PID_STARTER_MONTHLY");
    }
}
