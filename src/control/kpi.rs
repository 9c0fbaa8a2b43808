// src/control/kpi.rs

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::sku::SkuId;
use crate::model::snapshot::DailySnapshot;
use crate::strategy::forecast::population_stats;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkuKpis {
    pub sku_id: SkuId,
    pub total_demand: u64,
    pub total_fulfilled: u64,
    pub total_lost_sales: u64,
    pub fill_rate: f64,
    pub total_ordered: u64,
    /// Variance of order quantities over variance of demand. `None` while
    /// demand has not varied.
    pub bullwhip_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CumulativeKpis {
    pub days: usize,
    pub total_demand: u64,
    pub total_fulfilled: u64,
    pub total_lost_sales: u64,
    pub fill_rate: f64,
    pub revenue: f64,
    pub cost: f64,
    pub margin: f64,
    pub margin_pct: f64,
    pub budget_available: f64,
    pub budget_planned: f64,
    pub budget_spent: f64,
    pub budget_utilization: f64,
    pub total_utility: f64,
    pub warnings: usize,
    pub per_sku: Vec<SkuKpis>,
}

impl CumulativeKpis {
    pub fn sku(&self, sku_id: &str) -> Option<&SkuKpis> {
        self.per_sku.iter().find(|s| s.sku_id == sku_id)
    }

    pub fn meets_service_target(&self, target: f64) -> bool {
        self.fill_rate >= target
    }
}

#[derive(Default)]
struct SkuSeries {
    demand: Vec<f64>,
    orders: Vec<f64>,
    fulfilled: u64,
    lost: u64,
}

/// Reduce a snapshot history into cumulative KPIs. Pure; the same history
/// always gives the same result.
pub fn aggregate(history: &[DailySnapshot]) -> CumulativeKpis {
    let mut kpis = CumulativeKpis {
        days: history.len(),
        ..CumulativeKpis::default()
    };
    let mut series: BTreeMap<&str, SkuSeries> = BTreeMap::new();

    for day in history {
        kpis.revenue += day.revenue;
        kpis.cost += day.cost;
        kpis.budget_available += day.daily_budget;
        kpis.budget_planned += day.budget_planned;
        kpis.budget_spent += day.budget_spent;
        kpis.total_utility += day.utility_value;
        kpis.warnings += day.warnings.len();

        for rec in &day.skus {
            let s = series.entry(rec.sku_id.as_str()).or_default();
            s.demand.push(rec.demand as f64);
            s.orders.push(rec.order_qty as f64);
            s.fulfilled += rec.fulfilled as u64;
            s.lost += rec.lost_sales as u64;
        }
    }

    kpis.per_sku = series
        .into_iter()
        .map(|(sku_id, s)| {
            let total_demand = s.demand.iter().sum::<f64>() as u64;
            SkuKpis {
                sku_id: sku_id.to_string(),
                total_demand,
                total_fulfilled: s.fulfilled,
                total_lost_sales: s.lost,
                fill_rate: ratio_or_one(s.fulfilled, total_demand),
                total_ordered: s.orders.iter().sum::<f64>() as u64,
                bullwhip_ratio: bullwhip_ratio(&s.orders, &s.demand),
            }
        })
        .collect();

    kpis.total_demand = kpis.per_sku.iter().map(|s| s.total_demand).sum();
    kpis.total_fulfilled = kpis.per_sku.iter().map(|s| s.total_fulfilled).sum();
    kpis.total_lost_sales = kpis.per_sku.iter().map(|s| s.total_lost_sales).sum();
    kpis.fill_rate = ratio_or_one(kpis.total_fulfilled, kpis.total_demand);
    kpis.margin = kpis.revenue - kpis.cost;
    kpis.margin_pct = if kpis.revenue > 0.0 {
        kpis.margin / kpis.revenue * 100.0
    } else {
        0.0
    };
    kpis.budget_utilization = if kpis.budget_available > 0.0 {
        kpis.budget_spent / kpis.budget_available
    } else {
        0.0
    };
    kpis
}

fn ratio_or_one(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        1.0
    } else {
        part as f64 / whole as f64
    }
}

fn bullwhip_ratio(orders: &[f64], demand: &[f64]) -> Option<f64> {
    if demand.len() < 2 {
        return None;
    }
    let (_, demand_std) = population_stats(demand);
    if demand_std <= 1e-9 {
        return None;
    }
    let (_, order_std) = population_stats(orders);
    Some((order_std * order_std) / (demand_std * demand_std))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::snapshot::{DayWarning, SkuDayRecord};
    use approx::assert_abs_diff_eq;

    fn rec(sku_id: &str, demand: u32, fulfilled: u32, order_qty: u32) -> SkuDayRecord {
        SkuDayRecord {
            sku_id: sku_id.to_string(),
            demand,
            fulfilled,
            lost_sales: demand - fulfilled,
            fill_rate: if demand == 0 { 1.0 } else { fulfilled as f64 / demand as f64 },
            stock_before: 0,
            stock_after: 0,
            order_qty,
            urgency: 1.0,
        }
    }

    fn day(day_index: usize, skus: Vec<SkuDayRecord>, revenue: f64, cost: f64) -> DailySnapshot {
        DailySnapshot {
            day_index,
            scenario_tag: "baseline".into(),
            skus,
            daily_budget: 100.0,
            budget_planned: 40.0,
            budget_spent: 25.0,
            planned_utility: 0.0,
            utility_value: 10.0,
            revenue,
            cost,
            margin: revenue - cost,
            warnings: Vec::new(),
        }
    }

    fn history() -> Vec<DailySnapshot> {
        let mut second = day(2, vec![rec("A", 10, 5, 20), rec("B", 0, 0, 0)], 50.0, 30.0);
        second.warnings.push(DayWarning::Telemetry("down".into()));
        vec![
            day(1, vec![rec("A", 4, 4, 0), rec("B", 6, 6, 10)], 100.0, 20.0),
            second,
        ]
    }

    #[test]
    fn totals_add_up() {
        let kpis = aggregate(&history());
        assert_eq!(kpis.days, 2);
        assert_eq!(kpis.total_demand, 20);
        assert_eq!(kpis.total_fulfilled, 15);
        assert_eq!(kpis.total_lost_sales, 5);
        assert_abs_diff_eq!(kpis.fill_rate, 0.75);
        assert_abs_diff_eq!(kpis.margin, 100.0);
        assert_abs_diff_eq!(kpis.margin_pct, 100.0 / 150.0 * 100.0);
        assert_abs_diff_eq!(kpis.budget_utilization, 0.25);
        assert_abs_diff_eq!(kpis.total_utility, 20.0);
        assert_eq!(kpis.warnings, 1);

        let a = kpis.sku("A").unwrap();
        assert_eq!((a.total_demand, a.total_lost_sales, a.total_ordered), (14, 5, 20));
        // orders {0, 20} against demand {4, 10}: 100 / 9
        assert_abs_diff_eq!(a.bullwhip_ratio.unwrap(), 100.0 / 9.0, epsilon = 1e-9);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let h = history();
        assert_eq!(aggregate(&h), aggregate(&h));
    }

    #[test]
    fn empty_history_has_full_fill_rate() {
        let kpis = aggregate(&[]);
        assert_eq!(kpis.days, 0);
        assert_eq!(kpis.fill_rate, 1.0);
        assert_eq!(kpis.budget_utilization, 0.0);
        assert!(kpis.per_sku.is_empty());
    }

    #[test]
    fn flat_demand_has_no_bullwhip_ratio() {
        assert_eq!(bullwhip_ratio(&[0.0, 10.0], &[5.0, 5.0]), None);
        assert_eq!(bullwhip_ratio(&[10.0], &[5.0]), None);
    }
}
