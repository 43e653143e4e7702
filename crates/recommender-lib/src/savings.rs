//! Monthly cost impact of adopting a recommendation
//!
//! One observed day of cost is scaled by the relative change in each
//! resource and extrapolated to a 30-day month. A decrease in recommended
//! usage yields a positive savings figure.

use crate::models::{Cost, ResourceKind, ResourceMap};

/// Days used to extrapolate one day of cost to a month
pub const DAYS_PER_MONTH: f64 = 30.0;

/// Decimal places kept on relative resource changes
pub const CHANGE_PERCENT_SCALE: i32 = 3;

/// Decimal places kept on currency amounts
pub const CURRENCY_SCALE: i32 = 2;

// Products like 1.005 * 100 land just below the tie in binary; snapping to
// this grid first lets ties round the way decimal arithmetic would.
const TIE_SNAP: f64 = 1e9;

fn snap(scaled: f64) -> f64 {
    if scaled.abs() < 1e6 {
        (scaled * TIE_SNAP).round() / TIE_SNAP
    } else {
        scaled
    }
}

/// Round to `scale` decimals, ties away from zero
pub fn round_half_up(value: f64, scale: i32) -> f64 {
    let factor = 10f64.powi(scale);
    snap(value * factor).round() / factor + 0.0
}

/// Round to `scale` decimals, ties to the even neighbour
pub fn round_half_even(value: f64, scale: i32) -> f64 {
    let factor = 10f64.powi(scale);
    snap(value * factor).round_ties_even() / factor + 0.0
}

/// Extrapolates recommended-vs-current deltas into monthly figures
#[derive(Debug, Clone, Copy)]
pub struct SavingsEstimator {
    days_per_month: f64,
}

impl Default for SavingsEstimator {
    fn default() -> Self {
        Self {
            days_per_month: DAYS_PER_MONTH,
        }
    }
}

impl SavingsEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative change of one resource, rounded half-up to 3 decimals.
    ///
    /// `None` when the current amount is zero or either side is unknown.
    pub fn change_percent(
        &self,
        current: &ResourceMap,
        recommended: &ResourceMap,
        resource: ResourceKind,
    ) -> Option<f64> {
        let current_value = *current.get(&resource)?;
        let recommended_value = *recommended.get(&resource)?;
        if current_value == 0.0 || !current_value.is_finite() || !recommended_value.is_finite() {
            return None;
        }
        Some(round_half_up(
            (recommended_value - current_value) / current_value,
            CHANGE_PERCENT_SCALE,
        ))
    }

    /// Estimated monthly savings, rounded half-up to 2 decimals.
    ///
    /// `None` (never zero) when no resource has both a change and a cost.
    pub fn monthly_savings(
        &self,
        current: &ResourceMap,
        recommended: &ResourceMap,
        last_day_cost: &Cost,
    ) -> Option<f64> {
        let mut cost_change_for_day = 0.0;
        let mut contributed = false;

        for resource in ResourceKind::ALL {
            let change = self.change_percent(current, recommended, resource);
            if let (Some(change), Some(cost)) = (change, last_day_cost.get(resource)) {
                cost_change_for_day += change * cost;
                contributed = true;
            }
        }

        contributed.then(|| {
            round_half_up(-self.days_per_month * cost_change_for_day, CURRENCY_SCALE)
        })
    }

    /// Current monthly spend extrapolated from the last observed day.
    ///
    /// Rounded half-even, unlike savings which round half-up. Listing
    /// screens show both figures side by side, so the two modes are kept
    /// as they are rather than unified.
    pub fn monthly_cost(&self, last_day_cost: &Cost) -> Option<f64> {
        last_day_cost
            .total()
            .map(|total| round_half_even(total * self.days_per_month, CURRENCY_SCALE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resource_map;

    fn cpu_only(value: f64) -> ResourceMap {
        let mut map = ResourceMap::new();
        map.insert(ResourceKind::Cpu, value);
        map
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(1.005, 2), 1.01);
        assert_eq!(round_half_up(2.675, 2), 2.68);
        assert_eq!(round_half_up(-0.0005, 3), -0.001);
        assert_eq!(round_half_up(0.1234, 3), 0.123);
        assert_eq!(round_half_up(-0.0001, 2), 0.0);
        assert!(round_half_up(-0.0001, 2).is_sign_positive());
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(0.125, 2), 0.12);
        assert_eq!(round_half_even(0.135, 2), 0.14);
        assert_eq!(round_half_even(4.5, 0), 4.0);
        assert_eq!(round_half_up(4.5, 0), 5.0);
    }

    #[test]
    fn test_halving_cpu_saves_money() {
        let estimator = SavingsEstimator::new();
        let current = cpu_only(1000.0);
        let recommended = cpu_only(500.0);
        let cost = Cost {
            cpu: Some(10.0),
            memory: None,
        };

        assert_eq!(
            estimator.change_percent(&current, &recommended, ResourceKind::Cpu),
            Some(-0.5)
        );
        assert_eq!(
            estimator.monthly_savings(&current, &recommended, &cost),
            Some(150.0)
        );
    }

    #[test]
    fn test_upsizing_costs_money() {
        let estimator = SavingsEstimator::new();
        let current = resource_map(1024.0, 2048.0);
        let recommended = resource_map(1536.0, 1024.0);
        let cost = Cost {
            cpu: Some(2.0),
            memory: Some(1.0),
        };
        // cpu +0.5 * 2.0 + memory -0.5 * 1.0 = +0.5 per day
        assert_eq!(
            estimator.monthly_savings(&current, &recommended, &cost),
            Some(-15.0)
        );
    }

    #[test]
    fn test_change_percent_rounded_before_multiplying() {
        let estimator = SavingsEstimator::new();
        let current = cpu_only(3.0);
        let recommended = cpu_only(2.0);
        let cost = Cost {
            cpu: Some(100.0),
            memory: None,
        };
        // -0.3333.. rounds to -0.333 first
        assert_eq!(
            estimator.change_percent(&current, &recommended, ResourceKind::Cpu),
            Some(-0.333)
        );
        assert_eq!(
            estimator.monthly_savings(&current, &recommended, &cost),
            Some(999.0)
        );
    }

    #[test]
    fn test_no_cost_means_undefined_savings() {
        let estimator = SavingsEstimator::new();
        let current = resource_map(1000.0, 1000.0);
        let recommended = resource_map(500.0, 500.0);
        assert_eq!(
            estimator.monthly_savings(&current, &recommended, &Cost::default()),
            None
        );
    }

    #[test]
    fn test_zero_current_contributes_nothing() {
        let estimator = SavingsEstimator::new();
        let current = resource_map(0.0, 1000.0);
        let recommended = resource_map(500.0, 1000.0);
        assert_eq!(
            estimator.change_percent(&current, &recommended, ResourceKind::Cpu),
            None
        );

        let cpu_cost_only = Cost {
            cpu: Some(5.0),
            memory: None,
        };
        assert_eq!(
            estimator.monthly_savings(&current, &recommended, &cpu_cost_only),
            None
        );

        let both = Cost {
            cpu: Some(5.0),
            memory: Some(1.0),
        };
        assert_eq!(
            estimator.monthly_savings(&current, &recommended, &both),
            Some(0.0)
        );
    }

    #[test]
    fn test_monthly_cost_half_even() {
        let estimator = SavingsEstimator::new();
        let cost = Cost {
            cpu: Some(0.0125),
            memory: Some(0.0),
        };
        // 0.375 -> 0.38 under half-even (8 is even)
        assert_eq!(estimator.monthly_cost(&cost), Some(0.38));
        let cost = Cost {
            cpu: Some(0.0075),
            memory: None,
        };
        // 0.225 -> 0.22
        assert_eq!(estimator.monthly_cost(&cost), Some(0.22));
        assert_eq!(estimator.monthly_cost(&Cost::default()), None);
    }
}
