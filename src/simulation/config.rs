// src/simulation/config.rs

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::io::demand::Scenario;
use crate::strategy::forecast::ForecastModel;
use crate::strategy::optimization::{PriceWeighting, StockoutPenalty};

/// Economics and demand profile of one SKU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuConfig {
    pub sku_id: String,
    #[serde(default)]
    pub name: String,
    /// Mean of the daily demand distribution. Also the forecast prior before
    /// any demand has been observed.
    pub daily_demand_mean: f64,
    pub daily_demand_std: f64,
    pub unit_revenue: f64,
    pub unit_order_cost: f64,
    /// Charged once for any non-zero order.
    #[serde(default)]
    pub fixed_order_cost: f64,
    pub unit_holding_cost: f64,
    pub initial_stock: u32,
}

impl SkuConfig {
    pub fn new(
        sku_id: impl Into<String>,
        unit_revenue: f64,
        unit_order_cost: f64,
        unit_holding_cost: f64,
        initial_stock: u32,
    ) -> Self {
        let sku_id = sku_id.into();
        Self {
            name: sku_id.clone(),
            sku_id,
            daily_demand_mean: 0.0,
            daily_demand_std: 0.0,
            unit_revenue,
            unit_order_cost,
            fixed_order_cost: 0.0,
            unit_holding_cost,
            initial_stock,
        }
    }

    pub fn with_demand(mut self, mean: f64, std: f64) -> Self {
        self.daily_demand_mean = mean;
        self.daily_demand_std = std;
        self
    }

    pub fn with_fixed_order_cost(mut self, fixed: f64) -> Self {
        self.fixed_order_cost = fixed;
        self
    }

    fn validate(&self) -> ControlResult<()> {
        if self.sku_id.trim().is_empty() {
            return Err(ControlError::config("sku_id cannot be empty"));
        }
        let fields = [
            ("daily_demand_mean", self.daily_demand_mean),
            ("daily_demand_std", self.daily_demand_std),
            ("unit_revenue", self.unit_revenue),
            ("unit_order_cost", self.unit_order_cost),
            ("fixed_order_cost", self.fixed_order_cost),
            ("unit_holding_cost", self.unit_holding_cost),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ControlError::config(format!(
                    "{}: {} must be finite and non-negative, got {}",
                    self.sku_id, field, value
                )));
            }
        }
        Ok(())
    }
}

/// Which selection algorithm the planner tries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Branch-and-bound over the candidate sets, bounded by `solver_timeout_ms`.
    Exact,
    /// Marginal utility-per-cost heuristic only.
    Greedy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Fill rate below which a SKU becomes urgent.
    pub service_level_target: f64,
    /// Number of daily fill rates kept per SKU.
    pub urgency_window: usize,
    /// Urgency added per unit of fill-rate shortfall under the target.
    pub urgency_gain: f64,
    /// Number of daily demand observations kept per SKU for forecasting.
    pub forecast_window: usize,
    pub anomaly_z_threshold: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            service_level_target: 0.95,
            urgency_window: 14,
            urgency_gain: 5.0,
            forecast_window: 14,
            anomaly_z_threshold: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub base_order_size: u32,
    /// Candidates run from 0 to `max_order_multiple * base_order_size`.
    pub max_order_multiple: u32,
    pub bullwhip_weight: f64,
    pub stockout_penalty: StockoutPenalty,
    /// Scales the stockout penalty by unit price. `null` charges every SKU
    /// the same.
    pub price_weighting: Option<PriceWeighting>,
    pub forecast_model: ForecastModel,
    /// Days of demand one order has to cover.
    pub review_horizon_days: u32,
    /// Forecast multiplier applied while a SKU shows a demand spike.
    pub spike_forecast_boost: f64,
    pub overstock_days_of_cover: f64,
    pub stop_orders_days: u32,
    pub solver: SolverKind,
    pub solver_timeout_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_order_size: 25,
            max_order_multiple: 10,
            bullwhip_weight: 1.0,
            stockout_penalty: StockoutPenalty::Linear { per_unit: 300.0 },
            price_weighting: Some(PriceWeighting::default()),
            forecast_model: ForecastModel::MovingAverage,
            review_horizon_days: 1,
            spike_forecast_boost: 1.5,
            overstock_days_of_cover: 45.0,
            stop_orders_days: 2,
            solver: SolverKind::Exact,
            solver_timeout_ms: 250,
        }
    }
}

impl PlannerConfig {
    /// The candidate order quantities, ascending, always starting at zero.
    pub fn candidate_quantities(&self) -> Vec<u32> {
        (0..=self.max_order_multiple)
            .map(|k| k.saturating_mul(self.base_order_size))
            .collect()
    }

    /// Penalty for an expected `shortfall` of a SKU selling at
    /// `unit_revenue`, weighted by its urgency and, if configured, its price.
    pub fn stockout_cost(&self, shortfall: f64, urgency: f64, unit_revenue: f64) -> f64 {
        let penalty = urgency * self.stockout_penalty.cost(shortfall);
        match &self.price_weighting {
            Some(weighting) => weighting.apply(penalty, unit_revenue),
            None => penalty,
        }
    }
}

/// Static configuration of a run. The control loop never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub days: usize,
    pub scenario: Scenario,
    pub seed: u64,
    /// Overrides the scenario's default daily budget when set.
    pub daily_budget: Option<f64>,
    pub skus: Vec<SkuConfig>,
    pub analyzer: AnalyzerConfig,
    pub planner: PlannerConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            days: 90,
            scenario: Scenario::Baseline,
            seed: 42,
            daily_budget: None,
            skus: default_catalog(),
            analyzer: AnalyzerConfig::default(),
            planner: PlannerConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// A configuration over the given SKUs with default tuning.
    pub fn with_skus(skus: Vec<SkuConfig>) -> Self {
        Self {
            skus,
            ..Self::default()
        }
    }

    pub fn from_json_str(raw: &str) -> ControlResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ControlResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Budget ceiling applied every day.
    pub fn daily_budget(&self) -> f64 {
        self.daily_budget
            .unwrap_or_else(|| self.scenario.default_daily_budget())
    }

    pub fn validate(&self) -> ControlResult<()> {
        if self.skus.is_empty() {
            return Err(ControlError::config("at least one SKU is required"));
        }
        let mut seen = HashSet::new();
        for sku in &self.skus {
            sku.validate()?;
            if !seen.insert(sku.sku_id.as_str()) {
                return Err(ControlError::config(format!(
                    "duplicate sku_id {}",
                    sku.sku_id
                )));
            }
        }

        let budget = self.daily_budget();
        if !budget.is_finite() || budget < 0.0 {
            return Err(ControlError::config(format!(
                "daily budget must be finite and non-negative, got {}",
                budget
            )));
        }

        let a = &self.analyzer;
        if !(a.service_level_target > 0.0 && a.service_level_target <= 1.0) {
            return Err(ControlError::config(
                "service_level_target must be in (0, 1]",
            ));
        }
        if a.urgency_window == 0 || a.forecast_window == 0 {
            return Err(ControlError::config("history windows must be at least 1"));
        }
        if !a.urgency_gain.is_finite() || a.urgency_gain < 0.0 {
            return Err(ControlError::config("urgency_gain must be non-negative"));
        }
        if !a.anomaly_z_threshold.is_finite() || a.anomaly_z_threshold <= 0.0 {
            return Err(ControlError::config("anomaly_z_threshold must be positive"));
        }

        let p = &self.planner;
        if p.base_order_size == 0 {
            return Err(ControlError::config("base_order_size must be positive"));
        }
        if p.review_horizon_days == 0 {
            return Err(ControlError::config("review_horizon_days must be at least 1"));
        }
        if !p.bullwhip_weight.is_finite() || p.bullwhip_weight < 0.0 {
            return Err(ControlError::config("bullwhip_weight must be non-negative"));
        }
        if !p.spike_forecast_boost.is_finite() || p.spike_forecast_boost < 1.0 {
            return Err(ControlError::config("spike_forecast_boost must be >= 1"));
        }
        if !p.overstock_days_of_cover.is_finite() || p.overstock_days_of_cover <= 0.0 {
            return Err(ControlError::config(
                "overstock_days_of_cover must be positive",
            ));
        }
        p.stockout_penalty.validate()?;
        if let Some(weighting) = &p.price_weighting {
            weighting.validate()?;
        }
        p.forecast_model.validate()?;

        Ok(())
    }
}

/// The reference warehouse: four electronics SKUs.
pub fn default_catalog() -> Vec<SkuConfig> {
    vec![
        SkuConfig {
            sku_id: "SKU_001".into(),
            name: "Laptop".into(),
            daily_demand_mean: 20.0,
            daily_demand_std: 4.0,
            unit_revenue: 1000.0,
            unit_order_cost: 550.0,
            fixed_order_cost: 50.0,
            unit_holding_cost: 0.3,
            initial_stock: 550,
        },
        SkuConfig {
            sku_id: "SKU_002".into(),
            name: "Phone".into(),
            daily_demand_mean: 35.0,
            daily_demand_std: 8.0,
            unit_revenue: 700.0,
            unit_order_cost: 350.0,
            fixed_order_cost: 45.0,
            unit_holding_cost: 0.25,
            initial_stock: 750,
        },
        SkuConfig {
            sku_id: "SKU_003".into(),
            name: "Headphones".into(),
            daily_demand_mean: 55.0,
            daily_demand_std: 15.0,
            unit_revenue: 120.0,
            unit_order_cost: 45.0,
            fixed_order_cost: 25.0,
            unit_holding_cost: 0.08,
            initial_stock: 550,
        },
        SkuConfig {
            sku_id: "SKU_004".into(),
            name: "Mouse".into(),
            daily_demand_mean: 70.0,
            daily_demand_std: 18.0,
            unit_revenue: 35.0,
            unit_order_cost: 8.0,
            fixed_order_cost: 15.0,
            unit_holding_cost: 0.02,
            initial_stock: 700,
        },
    ]
}
