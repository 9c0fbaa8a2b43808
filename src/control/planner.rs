// src/control/planner.rs

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::control::analyzer::{AnalysisResult, AnomalyKind, SkuAnalysis};
use crate::error::{ControlError, ControlResult, SolverError};
use crate::model::knowledge::KnowledgeView;
use crate::model::sku::{SkuId, SkuState};
use crate::simulation::config::{PlannerConfig, SolverKind};
use crate::strategy::optimization::expected_sales_and_shortfall;
use crate::strategy::solver::{BranchAndBound, GreedyKnapsack};
use crate::strategy::traits::{Candidate, Selection, SelectionSolver, SkuOptions};

/// The five terms of the replenishment utility for one SKU.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UtilityTerms {
    pub revenue: f64,
    pub order_cost: f64,
    pub holding_cost: f64,
    pub stockout_penalty: f64,
    pub bullwhip_penalty: f64,
}

impl UtilityTerms {
    pub fn total(&self) -> f64 {
        self.revenue
            - self.order_cost
            - self.holding_cost
            - self.stockout_penalty
            - self.bullwhip_penalty
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOrder {
    pub sku_id: SkuId,
    pub qty: u32,
    pub cost: f64,
    pub expected_utility: f64,
    pub urgency: f64,
}

/// Request to suspend ordering of an overstocked SKU.
#[derive(Debug, Clone, PartialEq)]
pub struct StopOrder {
    pub sku_id: SkuId,
    pub days: u32,
}

/// The planner's answer for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderProposal {
    pub day: usize,
    /// One entry per SKU, in id order. Zero quantities included.
    pub orders: Vec<PlannedOrder>,
    pub total_cost: f64,
    pub total_utility: f64,
    /// Name of the solver that produced the selection.
    pub solver: &'static str,
    /// Why the preferred solver was abandoned, if it was.
    pub fallback: Option<SolverError>,
    pub stop_orders: Vec<StopOrder>,
}

impl OrderProposal {
    pub fn qty(&self, sku_id: &str) -> u32 {
        self.orders
            .iter()
            .find(|o| o.sku_id == sku_id)
            .map_or(0, |o| o.qty)
    }

    pub fn is_all_zero(&self) -> bool {
        self.orders.iter().all(|o| o.qty == 0)
    }
}

/// Plan: chooses one reorder quantity per SKU maximizing total utility
/// under the daily budget.
#[derive(Debug)]
pub struct Planner {
    config: PlannerConfig,
    candidates: Vec<u32>,
    solver: Box<dyn SelectionSolver>,
    fallback: GreedyKnapsack,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        let solver: Box<dyn SelectionSolver> = match config.solver {
            SolverKind::Exact => Box::new(BranchAndBound::new(Duration::from_millis(
                config.solver_timeout_ms,
            ))),
            SolverKind::Greedy => Box::new(GreedyKnapsack::new()),
        };
        Self::with_solver(config, solver)
    }

    pub fn with_solver(config: PlannerConfig, solver: Box<dyn SelectionSolver>) -> Self {
        Self {
            candidates: config.candidate_quantities(),
            config,
            solver,
            fallback: GreedyKnapsack::new(),
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Utility of ordering `qty` units of `sku` today, broken into its terms.
    ///
    /// Expected sales come from the forecast over the review horizon, with
    /// the available stock (`on_hand + qty`) as the ceiling.
    pub fn candidate_terms(&self, sku: &SkuState, analysis: &SkuAnalysis, qty: u32) -> UtilityTerms {
        let horizon = self.config.review_horizon_days as f64;
        let boost = match analysis.anomaly {
            Some(a) if a.kind == AnomalyKind::Spike => self.config.spike_forecast_boost,
            _ => 1.0,
        };
        let mu = analysis.forecast.mean * horizon * boost;
        let sigma = analysis.forecast.std * horizon.sqrt();

        let available = sku.on_hand() as f64 + qty as f64;
        let (sales, shortfall) = expected_sales_and_shortfall(mu, sigma, available);

        let econ = &sku.economics;
        UtilityTerms {
            revenue: sales * econ.unit_revenue,
            order_cost: econ.order_cost(qty),
            holding_cost: econ.holding_cost(available - sales, horizon),
            stockout_penalty: self
                .config
                .stockout_cost(shortfall, analysis.urgency, econ.unit_revenue),
            bullwhip_penalty: self.config.bullwhip_weight
                * (qty as f64 - sku.last_order_qty() as f64).abs(),
        }
    }

    pub fn candidate_utility(&self, sku: &SkuState, analysis: &SkuAnalysis, qty: u32) -> Candidate {
        Candidate {
            qty,
            cost: sku.economics.order_cost(qty),
            utility: self.candidate_terms(sku, analysis, qty).total(),
        }
    }

    /// Build today's order proposal from a frozen view of the knowledge.
    ///
    /// Total planned spend never exceeds `daily_budget`. A zero budget plans
    /// nothing.
    ///
    /// # Errors
    /// * [`ControlError::InfeasibleBudget`] when the budget is negative or
    ///   not finite.
    /// * [`ControlError::InconsistentState`] when a SKU in the view was not
    ///   analyzed.
    pub fn plan(
        &self,
        view: &KnowledgeView,
        analysis: &AnalysisResult,
        daily_budget: f64,
    ) -> ControlResult<OrderProposal> {
        if !daily_budget.is_finite() || daily_budget < 0.0 {
            return Err(ControlError::InfeasibleBudget(daily_budget));
        }

        let mut options = Vec::with_capacity(view.skus().len());
        let mut stop_orders = Vec::new();

        for sku in view.skus() {
            let sku_analysis = analysis.get(&sku.sku_id).ok_or_else(|| {
                ControlError::inconsistent(format!("{} missing from analysis", sku.sku_id))
            })?;

            let mut only_zero = daily_budget <= 0.0 || view.is_blocked(&sku.sku_id);
            if !only_zero && self.is_overstocked(sku, sku_analysis) {
                info!(sku = %sku.sku_id, on_hand = sku.on_hand(), "overstock, suspending orders");
                stop_orders.push(StopOrder {
                    sku_id: sku.sku_id.clone(),
                    days: self.config.stop_orders_days,
                });
                only_zero = true;
            }

            let candidates: Vec<Candidate> = if only_zero {
                vec![self.candidate_utility(sku, sku_analysis, 0)]
            } else {
                prune_dominated(
                    self.candidates
                        .iter()
                        .map(|&q| self.candidate_utility(sku, sku_analysis, q))
                        .collect(),
                )
            };

            options.push(SkuOptions {
                sku_id: sku.sku_id.clone(),
                urgency: sku_analysis.urgency,
                candidates,
            });
        }

        let (selection, solver, fallback) = match self.solver.solve(&options, daily_budget) {
            Ok(selection) => (selection, self.solver.name(), None),
            Err(e) => {
                warn!(solver = self.solver.name(), error = %e, "solver failed, using greedy fallback");
                let selection = self
                    .fallback
                    .solve(&options, daily_budget)
                    .unwrap_or_else(|_| Selection::cheapest(&options));
                (selection, self.fallback.name(), Some(e))
            }
        };

        let orders: Vec<PlannedOrder> = options
            .iter()
            .enumerate()
            .map(|(i, o)| {
                let chosen = selection.chosen(&options, i);
                PlannedOrder {
                    sku_id: o.sku_id.clone(),
                    qty: chosen.qty,
                    cost: chosen.cost,
                    expected_utility: chosen.utility,
                    urgency: o.urgency,
                }
            })
            .collect();

        for order in orders.iter().filter(|o| o.qty > 0) {
            debug!(sku = %order.sku_id, qty = order.qty, cost = order.cost, "planned order");
        }
        info!(
            day = view.day(),
            solver,
            utility = selection.total_utility,
            spend = selection.total_cost,
            budget = daily_budget,
            orders = orders.iter().filter(|o| o.qty > 0).count(),
            "plan ready"
        );

        Ok(OrderProposal {
            day: view.day(),
            orders,
            total_cost: selection.total_cost,
            total_utility: selection.total_utility,
            solver,
            fallback,
            stop_orders,
        })
    }

    fn is_overstocked(&self, sku: &SkuState, analysis: &SkuAnalysis) -> bool {
        let mean = analysis.forecast.mean;
        if mean <= 1.0 {
            return false;
        }
        sku.on_hand() as f64 / mean > self.config.overstock_days_of_cover
    }
}

/// Drop candidates that cost more than a cheaper one without adding utility.
/// The cheapest candidate always survives. Output is ordered by cost.
fn prune_dominated(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        a.cost
            .total_cmp(&b.cost)
            .then_with(|| b.utility.total_cmp(&a.utility))
            .then_with(|| a.qty.cmp(&b.qty))
    });

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        match kept.last() {
            Some(best) if c.utility <= best.utility => {}
            _ => kept.push(c),
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::analyzer::Anomaly;
    use crate::model::knowledge::KnowledgeStore;
    use crate::simulation::config::{SimulationConfig, SkuConfig};
    use crate::strategy::forecast::Forecast;
    use crate::strategy::optimization::StockoutPenalty;
    use std::collections::BTreeMap;

    fn planner_config() -> PlannerConfig {
        PlannerConfig {
            base_order_size: 10,
            max_order_multiple: 1,
            bullwhip_weight: 0.0,
            stockout_penalty: StockoutPenalty::Linear { per_unit: 5.0 },
            ..PlannerConfig::default()
        }
    }

    fn sku_analysis(sku_id: &str, urgency: f64, mean: f64) -> SkuAnalysis {
        SkuAnalysis {
            sku_id: sku_id.to_string(),
            demand: 0,
            fulfilled: 0,
            lost_sales: 0,
            fill_rate: 1.0,
            stock_before: 0,
            trailing_fill_rate: 1.0,
            urgency,
            forecast: Forecast { mean, std: 0.0 },
            anomaly: None,
        }
    }

    fn two_sku_world(stock: u32) -> KnowledgeStore {
        let config = SimulationConfig::with_skus(vec![
            SkuConfig::new("A", 10.0, 1.0, 0.0, stock),
            SkuConfig::new("B", 10.0, 1.0, 0.0, stock),
        ]);
        KnowledgeStore::from_config(&config)
    }

    fn analysis(pairs: &[(&str, f64)], mean: f64) -> AnalysisResult {
        AnalysisResult {
            day: 1,
            skus: pairs
                .iter()
                .map(|(id, u)| (id.to_string(), sku_analysis(id, *u, mean)))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn utility_terms_follow_the_formula() {
        let kb = two_sku_world(4);
        let planner = Planner::new(PlannerConfig {
            bullwhip_weight: 2.0,
            ..planner_config()
        });
        let sku = kb.sku("A").unwrap();
        let terms = planner.candidate_terms(sku, &sku_analysis("A", 2.0, 10.0), 10);
        // 14 available against 10 expected, deterministic
        assert_eq!(terms.revenue, 100.0);
        assert_eq!(terms.order_cost, 10.0);
        assert_eq!(terms.holding_cost, 0.0);
        assert_eq!(terms.stockout_penalty, 0.0);
        assert_eq!(terms.bullwhip_penalty, 20.0);
        assert_eq!(terms.total(), 70.0);

        let none = planner.candidate_terms(sku, &sku_analysis("A", 2.0, 10.0), 0);
        // 6 short, linear 5 per unit, doubled by urgency
        assert_eq!(none.stockout_penalty, 60.0);
    }

    #[test]
    fn more_urgent_sku_gets_the_scarce_budget() {
        let kb = two_sku_world(0);
        let analysis = analysis(&[("A", 3.0), ("B", 1.0)], 10.0);
        for kind in [SolverKind::Exact, SolverKind::Greedy] {
            let planner = Planner::new(PlannerConfig {
                solver: kind,
                ..planner_config()
            });
            let proposal = planner.plan(&kb.view(1), &analysis, 10.0).unwrap();
            assert_eq!(proposal.qty("A"), 10, "{:?}", kind);
            assert_eq!(proposal.qty("B"), 0, "{:?}", kind);
            assert!(proposal.total_cost <= 10.0);
        }
    }

    #[test]
    fn urgency_breaks_exact_ties() {
        // no stockout penalty: both orders are worth exactly the same
        let kb = two_sku_world(0);
        let analysis = analysis(&[("A", 1.0), ("B", 2.0)], 10.0);
        for kind in [SolverKind::Exact, SolverKind::Greedy] {
            let planner = Planner::new(PlannerConfig {
                solver: kind,
                stockout_penalty: StockoutPenalty::Linear { per_unit: 0.0 },
                ..planner_config()
            });
            let proposal = planner.plan(&kb.view(1), &analysis, 10.0).unwrap();
            assert_eq!(proposal.qty("B"), 10, "{:?}", kind);
            assert_eq!(proposal.qty("A"), 0, "{:?}", kind);
        }
    }

    #[test]
    fn zero_budget_plans_nothing() {
        let kb = two_sku_world(0);
        let planner = Planner::new(planner_config());
        let proposal = planner
            .plan(&kb.view(1), &analysis(&[("A", 5.0), ("B", 5.0)], 10.0), 0.0)
            .unwrap();
        assert!(proposal.is_all_zero());
        assert_eq!(proposal.total_cost, 0.0);
        // nothing on hand, nothing ordered: pure stockout penalty
        assert_eq!(proposal.total_utility, -2.0 * 5.0 * 5.0 * 10.0);
    }

    #[test]
    fn negative_budget_is_infeasible() {
        let kb = two_sku_world(0);
        let planner = Planner::new(planner_config());
        let err = planner
            .plan(&kb.view(1), &analysis(&[("A", 1.0), ("B", 1.0)], 10.0), -1.0)
            .unwrap_err();
        assert!(matches!(err, ControlError::InfeasibleBudget(_)));
    }

    #[test]
    fn missing_analysis_is_inconsistent() {
        let kb = two_sku_world(0);
        let planner = Planner::new(planner_config());
        let err = planner
            .plan(&kb.view(1), &analysis(&[("A", 1.0)], 10.0), 100.0)
            .unwrap_err();
        assert!(matches!(err, ControlError::InconsistentState(_)));
    }

    #[test]
    fn solver_timeout_falls_back_to_greedy() {
        let kb = two_sku_world(0);
        let planner = Planner::with_solver(
            planner_config(),
            Box::new(BranchAndBound::new(Duration::ZERO)),
        );
        let proposal = planner
            .plan(&kb.view(1), &analysis(&[("A", 1.0), ("B", 1.0)], 10.0), 100.0)
            .unwrap();
        assert_eq!(proposal.solver, "greedy");
        assert!(matches!(proposal.fallback, Some(SolverError::Timeout { .. })));
        assert_eq!(proposal.qty("A"), 10);
        assert_eq!(proposal.qty("B"), 10);
    }

    #[test]
    fn overstocked_sku_is_stopped() {
        let kb = two_sku_world(1000);
        let planner = Planner::new(planner_config());
        let proposal = planner
            .plan(&kb.view(1), &analysis(&[("A", 1.0), ("B", 1.0)], 10.0), 100.0)
            .unwrap();
        assert!(proposal.is_all_zero());
        assert_eq!(proposal.stop_orders.len(), 2);
        assert_eq!(proposal.stop_orders[0].days, 2);
    }

    #[test]
    fn blocked_sku_only_gets_zero() {
        let mut kb = two_sku_world(0);
        kb.block_orders("A", 3);
        let planner = Planner::new(planner_config());
        let proposal = planner
            .plan(&kb.view(2), &analysis(&[("A", 5.0), ("B", 1.0)], 10.0), 100.0)
            .unwrap();
        assert_eq!(proposal.qty("A"), 0);
        assert_eq!(proposal.qty("B"), 10);
        assert!(proposal.stop_orders.is_empty());
    }

    #[test]
    fn spike_boosts_the_forecast() {
        let kb = two_sku_world(10);
        let planner = Planner::new(planner_config());
        let mut spiking = sku_analysis("A", 1.0, 10.0);
        spiking.anomaly = Some(Anomaly {
            kind: AnomalyKind::Spike,
            z_score: 5.0,
            observed: 30.0,
            expected: 10.0,
        });
        let sku = kb.sku("A").unwrap();
        let calm = planner.candidate_terms(sku, &sku_analysis("A", 1.0, 10.0), 0);
        let boosted = planner.candidate_terms(sku, &spiking, 0);
        assert_eq!(calm.stockout_penalty, 0.0);
        // 15 expected against 10 on hand
        assert_eq!(boosted.stockout_penalty, 25.0);
    }

    #[test]
    fn expensive_skus_are_penalized_harder_for_shortfall() {
        let config = SimulationConfig::with_skus(vec![
            SkuConfig::new("LAPTOP", 1000.0, 550.0, 0.0, 0),
            SkuConfig::new("MOUSE", 35.0, 8.0, 0.0, 0),
        ]);
        let kb = KnowledgeStore::from_config(&config);
        let planner = Planner::new(PlannerConfig {
            stockout_penalty: StockoutPenalty::Linear { per_unit: 300.0 },
            ..planner_config()
        });

        let laptop = planner.candidate_terms(kb.sku("LAPTOP").unwrap(), &sku_analysis("LAPTOP", 1.0, 10.0), 0);
        let mouse = planner.candidate_terms(kb.sku("MOUSE").unwrap(), &sku_analysis("MOUSE", 1.0, 10.0), 0);
        assert_eq!(mouse.stockout_penalty, 3000.0);
        // 3000 * (1000 / 50)^1.2 is past the cap
        assert_eq!(laptop.stockout_penalty, 50_000.0);

        let flat = Planner::new(PlannerConfig {
            stockout_penalty: StockoutPenalty::Linear { per_unit: 300.0 },
            price_weighting: None,
            ..planner_config()
        });
        let unweighted = flat.candidate_terms(kb.sku("LAPTOP").unwrap(), &sku_analysis("LAPTOP", 1.0, 10.0), 0);
        assert_eq!(unweighted.stockout_penalty, 3000.0);
    }

    #[test]
    fn pruning_keeps_only_improving_candidates() {
        let kept = prune_dominated(vec![
            Candidate { qty: 20, cost: 20.0, utility: 5.0 },
            Candidate { qty: 0, cost: 0.0, utility: 1.0 },
            Candidate { qty: 10, cost: 10.0, utility: 8.0 },
            Candidate { qty: 30, cost: 30.0, utility: 9.0 },
        ]);
        let qtys: Vec<u32> = kept.iter().map(|c| c.qty).collect();
        assert_eq!(qtys, vec![0, 10, 30]);
    }
}
