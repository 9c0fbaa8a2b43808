// src/control/analyzer.rs

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ControlError, ControlResult};
use crate::model::knowledge::KnowledgeStore;
use crate::model::sku::SkuId;
use crate::simulation::config::AnalyzerConfig;
use crate::strategy::forecast::{population_stats, window_spread, Forecast, ForecastModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnomalyKind {
    Spike,
    Drop,
}

/// Today's demand sits far outside the recent window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub z_score: f64,
    pub observed: f64,
    pub expected: f64,
}

/// Monitor and analysis output for one SKU on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct SkuAnalysis {
    pub sku_id: SkuId,
    pub demand: u32,
    pub fulfilled: u32,
    pub lost_sales: u32,
    /// In `[0, 1]`; 1.0 when there was no demand.
    pub fill_rate: f64,
    pub stock_before: u32,
    pub trailing_fill_rate: f64,
    /// At least 1.0; grows with the shortfall under the service target.
    pub urgency: f64,
    pub forecast: Forecast,
    pub anomaly: Option<Anomaly>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    pub day: usize,
    pub skus: BTreeMap<SkuId, SkuAnalysis>,
}

impl AnalysisResult {
    pub fn get(&self, sku_id: &str) -> Option<&SkuAnalysis> {
        self.skus.get(sku_id)
    }

    pub fn anomalies(&self) -> impl Iterator<Item = (&SkuId, &Anomaly)> {
        self.skus
            .iter()
            .filter_map(|(id, a)| a.anomaly.as_ref().map(|an| (id, an)))
    }
}

/// Monitor + Analyze: realizes the day's demand against stock and updates
/// the running statistics the planner feeds on.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalyzerConfig,
    forecast_model: ForecastModel,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig, forecast_model: ForecastModel) -> Self {
        Self {
            config,
            forecast_model,
        }
    }

    /// Urgency for a trailing fill rate. Non-increasing; 1.0 at or above the
    /// service target.
    pub fn urgency(&self, trailing_fill_rate: f64) -> f64 {
        let shortfall = (self.config.service_level_target - trailing_fill_rate).max(0.0);
        1.0 + self.config.urgency_gain * shortfall
    }

    /// Apply `demand_by_sku` to the store and analyze the result.
    ///
    /// The whole input is validated before any SKU is touched, so a rejected
    /// day leaves the store as it was. SKUs missing from the input realize
    /// zero demand.
    ///
    /// # Errors
    /// * [`ControlError::InvalidDemand`] for a negative or non-finite value.
    /// * [`ControlError::InconsistentState`] for a SKU the store does not know.
    pub fn analyze(
        &self,
        day: usize,
        demand_by_sku: &BTreeMap<SkuId, f64>,
        knowledge: &mut KnowledgeStore,
    ) -> ControlResult<AnalysisResult> {
        let mut units: BTreeMap<&str, u32> = BTreeMap::new();
        for (sku_id, &value) in demand_by_sku {
            if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
                return Err(ControlError::InvalidDemand {
                    day,
                    sku: sku_id.clone(),
                    value,
                });
            }
            if !knowledge.contains(sku_id) {
                return Err(ControlError::inconsistent(format!(
                    "demand for {} which the knowledge store does not track",
                    sku_id
                )));
            }
            units.insert(sku_id.as_str(), value.round() as u32);
        }

        let mut result = AnalysisResult {
            day,
            skus: BTreeMap::new(),
        };

        for sku in knowledge.skus_mut() {
            let demand = units.get(sku.sku_id.as_str()).copied().unwrap_or(0);
            let stock_before = sku.on_hand();

            let (fulfilled, lost_sales) = sku.fulfill_demand(demand);
            let fill_rate = if demand == 0 {
                1.0
            } else {
                fulfilled as f64 / demand as f64
            };
            sku.record_fill_rate(fill_rate);

            let prior_window = sku.demand_history();
            let anomaly = self.detect_anomaly(&prior_window, demand as f64);
            sku.record_demand(demand as f64);

            let forecast = self
                .forecast_model
                .forecast(&sku.demand_history(), sku.demand_prior);
            let trailing_fill_rate = sku.trailing_fill_rate();
            let urgency = self.urgency(trailing_fill_rate);

            debug!(
                sku = %sku.sku_id,
                demand,
                fulfilled,
                lost_sales,
                fill_rate,
                urgency,
                forecast_mean = forecast.mean,
                "analyzed sku"
            );

            result.skus.insert(
                sku.sku_id.clone(),
                SkuAnalysis {
                    sku_id: sku.sku_id.clone(),
                    demand,
                    fulfilled,
                    lost_sales,
                    fill_rate,
                    stock_before,
                    trailing_fill_rate,
                    urgency,
                    forecast,
                    anomaly,
                },
            );
        }

        let total_demand: u64 = result.skus.values().map(|a| a.demand as u64).sum();
        let total_lost: u64 = result.skus.values().map(|a| a.lost_sales as u64).sum();
        info!(
            day,
            total_demand,
            total_lost,
            anomalies = result.anomalies().count(),
            "demand analyzed"
        );

        Ok(result)
    }

    /// Z-score of `observed` against the window that preceded it.
    fn detect_anomaly(&self, prior_window: &[f64], observed: f64) -> Option<Anomaly> {
        if prior_window.is_empty() {
            return None;
        }
        let (expected, _) = population_stats(prior_window);
        let z_score = (observed - expected) / window_spread(prior_window);

        let kind = if z_score > self.config.anomaly_z_threshold {
            AnomalyKind::Spike
        } else if z_score < -self.config.anomaly_z_threshold {
            AnomalyKind::Drop
        } else {
            return None;
        };

        Some(Anomaly {
            kind,
            z_score,
            observed,
            expected,
        })
    }
}
