// src/model/snapshot.rs

use serde::Serialize;

use crate::model::sku::SkuId;

/// What happened to one SKU on one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkuDayRecord {
    pub sku_id: SkuId,
    pub demand: u32,
    pub fulfilled: u32,
    pub lost_sales: u32,
    pub fill_rate: f64,
    /// Stock at the start of the day, before demand.
    pub stock_before: u32,
    /// Stock at the end of the day, after demand and replenishment.
    pub stock_after: u32,
    pub order_qty: u32,
    pub urgency: f64,
}

/// A non-fatal problem that was recovered from during a day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DayWarning {
    /// The preferred solver failed and `solver` planned the day instead.
    SolverFallback { solver: String, reason: String },
    /// Committed orders exceeded the budget and were cut back.
    BudgetRepaired { planned: f64, ceiling: f64 },
    /// A telemetry record could not be published.
    Telemetry(String),
}

impl std::fmt::Display for DayWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DayWarning::SolverFallback { solver, reason } => {
                write!(f, "planned by {} after solver failure: {}", solver, reason)
            }
            DayWarning::BudgetRepaired { planned, ceiling } => {
                write!(f, "orders cut from ${:.2} to fit ${:.2}", planned, ceiling)
            }
            DayWarning::Telemetry(msg) => write!(f, "telemetry: {}", msg),
        }
    }
}

/// The immutable record of one simulated day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySnapshot {
    pub day_index: usize,
    pub scenario_tag: String,
    pub skus: Vec<SkuDayRecord>,
    pub daily_budget: f64,
    pub budget_planned: f64,
    pub budget_spent: f64,
    pub planned_utility: f64,
    pub utility_value: f64,
    pub revenue: f64,
    /// Order spend plus end-of-day holding cost.
    pub cost: f64,
    pub margin: f64,
    pub warnings: Vec<DayWarning>,
}

impl DailySnapshot {
    pub fn total_demand(&self) -> u64 {
        self.skus.iter().map(|s| s.demand as u64).sum()
    }

    pub fn total_fulfilled(&self) -> u64 {
        self.skus.iter().map(|s| s.fulfilled as u64).sum()
    }

    pub fn total_lost_sales(&self) -> u64 {
        self.skus.iter().map(|s| s.lost_sales as u64).sum()
    }

    pub fn stock_total(&self) -> u64 {
        self.skus.iter().map(|s| s.stock_after as u64).sum()
    }

    /// Fill rate across all SKUs; 1.0 on a day without demand.
    pub fn fill_rate(&self) -> f64 {
        let demand = self.total_demand();
        if demand == 0 {
            1.0
        } else {
            self.total_fulfilled() as f64 / demand as f64
        }
    }

    pub fn orders_placed(&self) -> usize {
        self.skus.iter().filter(|s| s.order_qty > 0).count()
    }

    pub fn sku(&self, sku_id: &str) -> Option<&SkuDayRecord> {
        self.skus.iter().find(|s| s.sku_id == sku_id)
    }
}
