// src/strategy/optimization.rs

//! Economic building blocks of the replenishment utility.
//!
//! Expected sales under Normal demand (the newsvendor loss function) and the
//! stockout penalty shapes the planner can be configured with.

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// Penalty charged for expected unmet demand, before urgency weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockoutPenalty {
    /// `per_unit * shortfall`
    Linear { per_unit: f64 },
    /// `per_unit * shortfall + curvature * shortfall^2`; convex, so deep
    /// shortfalls cost disproportionately more.
    Quadratic { per_unit: f64, curvature: f64 },
}

impl StockoutPenalty {
    /// Cost of an expected shortfall. Non-decreasing in `shortfall`.
    pub fn cost(&self, shortfall: f64) -> f64 {
        let s = shortfall.max(0.0);
        match *self {
            StockoutPenalty::Linear { per_unit } => per_unit * s,
            StockoutPenalty::Quadratic {
                per_unit,
                curvature,
            } => per_unit * s + curvature * s * s,
        }
    }

    pub fn validate(&self) -> ControlResult<()> {
        let ok = match *self {
            StockoutPenalty::Linear { per_unit } => per_unit.is_finite() && per_unit >= 0.0,
            StockoutPenalty::Quadratic {
                per_unit,
                curvature,
            } => {
                per_unit.is_finite() && per_unit >= 0.0 && curvature.is_finite() && curvature >= 0.0
            }
        };
        if ok {
            Ok(())
        } else {
            Err(ControlError::config(format!(
                "stockout penalty parameters must be finite and non-negative: {:?}",
                self
            )))
        }
    }
}

/// Scales the stockout penalty with the unit price of the SKU, so a lost
/// laptop weighs more than a lost mouse.
///
/// `weight = max(1, (unit_revenue / reference_price) ^ exponent)`, and the
/// weighted penalty never exceeds `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceWeighting {
    pub reference_price: f64,
    pub exponent: f64,
    pub cap: f64,
}

impl Default for PriceWeighting {
    fn default() -> Self {
        Self {
            reference_price: 50.0,
            exponent: 1.2,
            cap: 50_000.0,
        }
    }
}

impl PriceWeighting {
    pub fn weight(&self, unit_revenue: f64) -> f64 {
        (unit_revenue.max(0.0) / self.reference_price)
            .powf(self.exponent)
            .max(1.0)
    }

    /// Weight `penalty` by price and clamp it to the cap.
    pub fn apply(&self, penalty: f64, unit_revenue: f64) -> f64 {
        (penalty * self.weight(unit_revenue)).min(self.cap)
    }

    pub fn validate(&self) -> ControlResult<()> {
        let ok = self.reference_price.is_finite()
            && self.reference_price > 0.0
            && self.exponent.is_finite()
            && self.exponent >= 0.0
            && self.cap.is_finite()
            && self.cap >= 0.0;
        if ok {
            Ok(())
        } else {
            Err(ControlError::config(format!(
                "price weighting needs a positive reference price and non-negative exponent and cap: {:?}",
                self
            )))
        }
    }
}

/// Error function approximation.
///
/// Abramowitz and Stegun formula 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let p = 0.327_591_1;
    let a1 = 0.254_829_592;
    let a2 = -0.284_496_736;
    let a3 = 1.421_413_741;
    let a4 = -1.453_152_027;
    let a5 = 1.061_405_429;

    let t = 1.0 / (1.0 + p * x);
    let poly = ((((a5 * t + a4) * t + a3) * t + a2) * t + a1) * t;

    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard normal cumulative distribution function.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Standard normal density.
pub fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Expected units sold and expected units short when `available` units face
/// demand distributed `Normal(mu, sigma)`.
///
/// # Formula
/// E[min(D, a)] = mu * Phi(z) + a * (1 - Phi(z)) - sigma * phi(z), z = (a - mu) / sigma
///
/// Sales are clamped to `[0, available]`; shortfall is `max(0, mu - sales)`.
/// A degenerate `sigma` collapses to the deterministic case.
///
/// # Returns
/// `(expected_sales, expected_shortfall)`
pub fn expected_sales_and_shortfall(mu: f64, sigma: f64, available: f64) -> (f64, f64) {
    let available = available.max(0.0);

    if sigma <= 1e-6 {
        let sold = mu.min(available).max(0.0);
        return (sold, (mu - sold).max(0.0));
    }

    let z = (available - mu) / sigma;
    let phi_cap = normal_cdf(z);
    let phi = normal_pdf(z);

    let sales = mu * phi_cap + available * (1.0 - phi_cap) - sigma * phi;
    let sales = sales.min(available).max(0.0);
    (sales, (mu - sales).max(0.0))
}
