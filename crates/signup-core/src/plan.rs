//! Plan Catalog
//!
//! Pricing for the plans offered by the signup wizard. A plan with a zero
//! price is a free trial and skips payment collection entirely.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SignupError};

/// Billing interval
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

/// Pricing information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanPricing {
    pub id: String,
    pub name: String,
    pub description: String,
    pub cents: i64,
    pub interval: BillingInterval,
}

impl PlanPricing {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        cents: i64,
        interval: BillingInterval,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            cents,
            interval,
        }
    }

    /// Whether checkout has to collect a payment method
    pub const fn requires_payment(&self) -> bool {
        self.cents > 0
    }
}

/// Plans available at signup, keyed by `plan_id`
#[derive(Clone, Debug)]
pub struct PlanCatalog {
    plans: HashMap<String, PlanPricing>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::new()
            .with_plan(PlanPricing::new(
                "trial",
                "Free Trial",
                "14 days of every module, no card required",
                0,
                BillingInterval::Monthly,
            ))
            .with_plan(PlanPricing::new(
                "starter",
                "Starter",
                "Sales, inventory and invoicing for one branch",
                2900, // $29/month
                BillingInterval::Monthly,
            ))
            .with_plan(PlanPricing::new(
                "business",
                "Business",
                "Multi-branch, payroll and support tickets",
                7900, // $79/month
                BillingInterval::Monthly,
            ))
            .with_plan(PlanPricing::new(
                "enterprise",
                "Enterprise",
                "Unlimited branches, priority support",
                199_000, // $1990/year
                BillingInterval::Yearly,
            ))
    }
}

impl PlanCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self {
            plans: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_plan(mut self, plan: PlanPricing) -> Self {
        self.plans.insert(plan.id.clone(), plan);
        self
    }

    /// Look up a plan, rejecting unknown ids
    pub fn get(&self, plan_id: &str) -> Result<&PlanPricing> {
        self.plans
            .get(plan_id)
            .ok_or_else(|| SignupError::Validation(format!("Unknown plan: {plan_id}")))
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.len(), 4);
        assert!(!catalog.get("trial").unwrap().requires_payment());
        assert!(catalog.get("starter").unwrap().requires_payment());
        assert_eq!(catalog.get("enterprise").unwrap().interval, BillingInterval::Yearly);
    }

    #[test]
    fn test_unknown_plan_is_validation_error() {
        let err = PlanCatalog::default().get("platinum").unwrap_err();
        assert!(matches!(err, SignupError::Validation(_)));
    }
}
