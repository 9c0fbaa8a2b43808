// src/control/executor.rs

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::control::analyzer::AnalysisResult;
use crate::control::planner::OrderProposal;
use crate::error::{ControlError, ControlResult};
use crate::model::knowledge::KnowledgeStore;
use crate::model::sku::SkuId;
use crate::model::snapshot::{DailySnapshot, DayWarning, SkuDayRecord};
use crate::simulation::config::{PlannerConfig, SimulationConfig};

const BUDGET_EPS: f64 = 1e-9;

/// Execute: commits the feasible part of a proposal and closes the day.
#[derive(Debug, Clone)]
pub struct Executor {
    scenario_tag: String,
    planner: PlannerConfig,
}

struct Commit {
    sku_id: SkuId,
    qty: u32,
    urgency: f64,
}

impl Executor {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            scenario_tag: config.scenario.tag().to_string(),
            planner: config.planner.clone(),
        }
    }

    /// Re-check the proposal against the budget, commit it and record the
    /// day's snapshot in the knowledge history.
    ///
    /// An over-budget proposal is cut back, lowest urgency first, in steps of
    /// the base order size. The repair is recorded as a warning on the
    /// snapshot.
    ///
    /// # Errors
    /// * [`ControlError::InfeasibleBudget`] for a negative or non-finite budget.
    /// * [`ControlError::InconsistentState`] when the proposal, the analysis
    ///   and the store disagree on the day or on the SKU set.
    pub fn execute(
        &self,
        proposal: &OrderProposal,
        analysis: &AnalysisResult,
        knowledge: &mut KnowledgeStore,
        daily_budget: f64,
    ) -> ControlResult<DailySnapshot> {
        if !daily_budget.is_finite() || daily_budget < 0.0 {
            return Err(ControlError::InfeasibleBudget(daily_budget));
        }
        if proposal.day != analysis.day {
            return Err(ControlError::inconsistent(format!(
                "proposal for day {} executed against analysis of day {}",
                proposal.day, analysis.day
            )));
        }
        for order in &proposal.orders {
            if !knowledge.contains(&order.sku_id) {
                return Err(ControlError::inconsistent(format!(
                    "order for unknown sku {}",
                    order.sku_id
                )));
            }
        }
        for sku_id in knowledge.sku_ids() {
            if analysis.get(&sku_id).is_none() {
                return Err(ControlError::inconsistent(format!(
                    "{} missing from analysis",
                    sku_id
                )));
            }
        }

        let day = proposal.day;
        let mut warnings = Vec::new();
        if let Some(err) = &proposal.fallback {
            warnings.push(DayWarning::SolverFallback {
                solver: proposal.solver.to_string(),
                reason: err.to_string(),
            });
        }

        let mut commits: Vec<Commit> = proposal
            .orders
            .iter()
            .map(|o| Commit {
                sku_id: o.sku_id.clone(),
                qty: o.qty,
                urgency: o.urgency,
            })
            .collect();

        let planned_spend = self.spend(&commits, knowledge);
        if planned_spend > daily_budget + BUDGET_EPS {
            warn!(
                day,
                planned = planned_spend,
                ceiling = daily_budget,
                "proposal over budget, cutting lowest urgency first"
            );
            self.repair(&mut commits, knowledge, daily_budget);
            warnings.push(DayWarning::BudgetRepaired {
                planned: planned_spend,
                ceiling: daily_budget,
            });
        }

        let qty_by_sku: BTreeMap<&str, u32> =
            commits.iter().map(|c| (c.sku_id.as_str(), c.qty)).collect();

        let mut records = Vec::new();
        let mut spent = 0.0;
        let mut revenue = 0.0;
        let mut holding = 0.0;
        let mut utility_value = 0.0;

        for sku in knowledge.skus_mut() {
            let Some(a) = analysis.get(&sku.sku_id) else {
                continue;
            };
            let qty = qty_by_sku.get(sku.sku_id.as_str()).copied().unwrap_or(0);
            let previous_qty = sku.last_order_qty();
            sku.receive_replenishment(qty);

            let econ = sku.economics;
            let order_cost = econ.order_cost(qty);
            let sales_revenue = a.fulfilled as f64 * econ.unit_revenue;
            let holding_cost = econ.holding_cost(sku.on_hand() as f64, 1.0);

            spent += order_cost;
            revenue += sales_revenue;
            holding += holding_cost;
            utility_value += sales_revenue
                - order_cost
                - holding_cost
                - self
                    .planner
                    .stockout_cost(a.lost_sales as f64, a.urgency, econ.unit_revenue)
                - self.planner.bullwhip_weight * (qty as f64 - previous_qty as f64).abs();

            if qty > 0 {
                debug!(sku = %sku.sku_id, qty, cost = order_cost, on_hand = sku.on_hand(), "order committed");
            }

            records.push(SkuDayRecord {
                sku_id: sku.sku_id.clone(),
                demand: a.demand,
                fulfilled: a.fulfilled,
                lost_sales: a.lost_sales,
                fill_rate: a.fill_rate,
                stock_before: a.stock_before,
                stock_after: sku.on_hand(),
                order_qty: qty,
                urgency: a.urgency,
            });
        }

        for stop in &proposal.stop_orders {
            let until = day + stop.days as usize;
            knowledge.block_orders(&stop.sku_id, until);
            info!(sku = %stop.sku_id, until, "orders blocked");
        }

        let cost = spent + holding;
        let snapshot = DailySnapshot {
            day_index: day,
            scenario_tag: self.scenario_tag.clone(),
            skus: records,
            daily_budget,
            budget_planned: proposal.total_cost,
            budget_spent: spent,
            planned_utility: proposal.total_utility,
            utility_value,
            revenue,
            cost,
            margin: revenue - cost,
            warnings,
        };

        info!(
            day,
            spent,
            revenue,
            margin = snapshot.margin,
            orders = snapshot.orders_placed(),
            "orders executed"
        );

        knowledge.record_snapshot(snapshot.clone());
        Ok(snapshot)
    }

    fn spend(&self, commits: &[Commit], knowledge: &KnowledgeStore) -> f64 {
        commits
            .iter()
            .filter_map(|c| knowledge.sku(&c.sku_id).map(|s| s.economics.order_cost(c.qty)))
            .sum()
    }

    fn repair(&self, commits: &mut [Commit], knowledge: &KnowledgeStore, budget: f64) {
        let mut order: Vec<usize> = (0..commits.len()).collect();
        order.sort_by(|&a, &b| {
            commits[a]
                .urgency
                .total_cmp(&commits[b].urgency)
                .then_with(|| commits[a].sku_id.cmp(&commits[b].sku_id))
        });

        for i in order {
            while commits[i].qty > 0 && self.spend(commits, knowledge) > budget + BUDGET_EPS {
                commits[i].qty -= self.planner.base_order_size.max(1).min(commits[i].qty);
            }
        }
    }
}
