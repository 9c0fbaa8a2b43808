// src/strategy/solver.rs

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use crate::error::SolverError;
use crate::strategy::traits::{cheapest_index, Candidate, Selection, SelectionSolver, SkuOptions};

const UTILITY_EPS: f64 = 1e-9;
const COST_EPS: f64 = 1e-9;
const DEADLINE_CHECK_EVERY: u64 = 64;

// =========================================================================
// 1. Exact: depth-first branch and bound
// =========================================================================

/// Exact solver for the multiple-choice knapsack behind the daily plan.
///
/// SKUs are branched in descending urgency and each SKU's candidates in
/// descending utility, so among equally good plans the first one found (and
/// kept, since only strict improvements replace the incumbent) favours the
/// most urgent SKUs. The search is abandoned with [`SolverError::Timeout`]
/// once `timeout` has elapsed.
#[derive(Debug, Clone)]
pub struct BranchAndBound {
    timeout: Duration,
}

impl BranchAndBound {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl SelectionSolver for BranchAndBound {
    fn name(&self) -> &'static str {
        "branch_and_bound"
    }

    fn solve(&self, options: &[SkuOptions], budget: f64) -> Result<Selection, SolverError> {
        let deadline = Instant::now() + self.timeout;

        let mut order: Vec<usize> = (0..options.len()).collect();
        order.sort_by(|&a, &b| {
            options[b]
                .urgency
                .partial_cmp(&options[a].urgency)
                .unwrap_or(Ordering::Equal)
        });

        let explore: Vec<Vec<usize>> = options
            .iter()
            .map(|o| by_descending_utility(&o.candidates))
            .collect();

        // Optimistic completion value from each depth on, ignoring the budget.
        let mut suffix_best = vec![0.0; order.len() + 1];
        for depth in (0..order.len()).rev() {
            let best = options[order[depth]]
                .candidates
                .iter()
                .filter(|c| c.cost <= budget + COST_EPS)
                .map(|c| c.utility)
                .fold(f64::NEG_INFINITY, f64::max);
            suffix_best[depth] = suffix_best[depth + 1] + best;
        }

        let mut tree = Tree {
            options,
            order: &order,
            explore: &explore,
            suffix_best: &suffix_best,
            deadline,
            nodes: 0,
            best_utility: f64::NEG_INFINITY,
            best: None,
            current: vec![0; options.len()],
        };
        tree.descend(0, budget, 0.0)?;

        match tree.best {
            Some(choices) => Ok(Selection::from_choices(options, choices)),
            None => Ok(Selection::cheapest(options)),
        }
    }
}

struct Tree<'a> {
    options: &'a [SkuOptions],
    order: &'a [usize],
    explore: &'a [Vec<usize>],
    suffix_best: &'a [f64],
    deadline: Instant,
    nodes: u64,
    best_utility: f64,
    best: Option<Vec<usize>>,
    current: Vec<usize>,
}

impl<'a> Tree<'a> {
    fn descend(&mut self, depth: usize, remaining: f64, utility: f64) -> Result<(), SolverError> {
        if self.nodes % DEADLINE_CHECK_EVERY == 0 && Instant::now() >= self.deadline {
            return Err(SolverError::Timeout { nodes: self.nodes });
        }
        self.nodes += 1;

        if depth == self.order.len() {
            if utility > self.best_utility + UTILITY_EPS {
                self.best_utility = utility;
                self.best = Some(self.current.clone());
            }
            return Ok(());
        }

        if utility + self.suffix_best[depth] <= self.best_utility + UTILITY_EPS {
            return Ok(());
        }

        let sku = self.order[depth];
        let explore = self.explore;
        let options = self.options;
        for &c in &explore[sku] {
            let cand = &options[sku].candidates[c];
            if cand.cost > remaining + COST_EPS {
                continue;
            }
            self.current[sku] = c;
            self.descend(depth + 1, remaining - cand.cost, utility + cand.utility)?;
        }
        Ok(())
    }
}

fn by_descending_utility(candidates: &[Candidate]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..candidates.len()).collect();
    idx.sort_by(|&a, &b| {
        candidates[b]
            .utility
            .partial_cmp(&candidates[a].utility)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                candidates[a]
                    .cost
                    .partial_cmp(&candidates[b].cost)
                    .unwrap_or(Ordering::Equal)
            })
    });
    idx
}

// =========================================================================
// 2. Greedy: marginal utility per unit of spend
// =========================================================================

/// Knapsack-style heuristic. Every SKU starts on its cheapest candidate; the
/// upgrade with the best utility gain per extra unit of spend that still fits
/// the remaining budget is applied until no upgrade improves utility.
///
/// Ties on the ratio go to the more urgent SKU, then to the larger gain.
#[derive(Debug, Clone, Default)]
pub struct GreedyKnapsack;

impl GreedyKnapsack {
    pub fn new() -> Self {
        Self
    }
}

struct Upgrade {
    sku: usize,
    candidate: usize,
    ratio: f64,
    urgency: f64,
    gain: f64,
}

impl Upgrade {
    fn beats(&self, other: &Upgrade) -> bool {
        if self.ratio != other.ratio {
            return self.ratio > other.ratio;
        }
        if self.urgency != other.urgency {
            return self.urgency > other.urgency;
        }
        self.gain > other.gain
    }
}

impl SelectionSolver for GreedyKnapsack {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn solve(&self, options: &[SkuOptions], budget: f64) -> Result<Selection, SolverError> {
        let mut current: Vec<usize> = options
            .iter()
            .map(|o| cheapest_index(&o.candidates))
            .collect();
        let mut remaining = budget
            - options
                .iter()
                .zip(&current)
                .map(|(o, &c)| o.candidates[c].cost)
                .sum::<f64>();

        loop {
            let mut best: Option<Upgrade> = None;

            for (s, opt) in options.iter().enumerate() {
                let cur = &opt.candidates[current[s]];
                for (c, cand) in opt.candidates.iter().enumerate() {
                    let gain = cand.utility - cur.utility;
                    let extra = cand.cost - cur.cost;
                    if gain <= UTILITY_EPS || extra > remaining + COST_EPS {
                        continue;
                    }
                    let ratio = if extra <= COST_EPS {
                        f64::INFINITY
                    } else {
                        gain / extra
                    };
                    let upgrade = Upgrade {
                        sku: s,
                        candidate: c,
                        ratio,
                        urgency: opt.urgency,
                        gain,
                    };
                    if best.as_ref().map_or(true, |b| upgrade.beats(b)) {
                        best = Some(upgrade);
                    }
                }
            }

            let Some(up) = best else { break };
            let cur_cost = options[up.sku].candidates[current[up.sku]].cost;
            remaining -= options[up.sku].candidates[up.candidate].cost - cur_cost;
            current[up.sku] = up.candidate;
        }

        Ok(Selection::from_choices(options, current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cand(qty: u32, cost: f64, utility: f64) -> Candidate {
        Candidate { qty, cost, utility }
    }

    fn sku(id: &str, urgency: f64, candidates: Vec<Candidate>) -> SkuOptions {
        SkuOptions {
            sku_id: id.to_string(),
            urgency,
            candidates,
        }
    }

    fn exact() -> BranchAndBound {
        BranchAndBound::new(Duration::from_secs(5))
    }

    #[test]
    fn exact_finds_optimum_greedy_misses() {
        // Greedy takes A's high-ratio small order first and can no longer
        // afford B's large one.
        let options = vec![
            sku("A", 1.0, vec![cand(0, 0.0, 0.0), cand(1, 1.0, 3.0)]),
            sku("B", 1.0, vec![cand(0, 0.0, 0.0), cand(10, 10.0, 20.0)]),
        ];
        let best = exact().solve(&options, 10.0).unwrap();
        assert_eq!(best.choices, vec![0, 1]);
        assert_eq!(best.total_utility, 20.0);

        let greedy = GreedyKnapsack.solve(&options, 10.0).unwrap();
        assert_eq!(greedy.choices, vec![1, 0]);
        assert!(greedy.total_cost <= 10.0);
    }

    #[test]
    fn zero_budget_selects_zero_cost_candidates() {
        let options = vec![sku(
            "A",
            2.0,
            vec![cand(0, 0.0, -50.0), cand(5, 5.0, 100.0)],
        )];
        for solver in [&exact() as &dyn SelectionSolver, &GreedyKnapsack] {
            let sel = solver.solve(&options, 0.0).unwrap();
            assert_eq!(sel.choices, vec![0]);
            assert_eq!(sel.total_cost, 0.0);
        }
    }

    #[test]
    fn equal_utility_goes_to_higher_urgency() {
        let cands = vec![cand(0, 0.0, 0.0), cand(10, 10.0, 90.0)];
        let options = vec![
            sku("LOW", 1.0, cands.clone()),
            sku("HIGH", 3.0, cands),
        ];
        for solver in [&exact() as &dyn SelectionSolver, &GreedyKnapsack] {
            let sel = solver.solve(&options, 10.0).unwrap();
            assert_eq!(sel.choices, vec![0, 1], "solver {}", solver.name());
        }
    }

    #[test]
    fn exact_times_out_with_no_time() {
        let options = vec![sku("A", 1.0, vec![cand(0, 0.0, 0.0), cand(1, 1.0, 1.0)])];
        let err = BranchAndBound::new(Duration::ZERO)
            .solve(&options, 10.0)
            .unwrap_err();
        assert!(matches!(err, SolverError::Timeout { .. }));
    }

    #[test]
    fn no_skus_is_an_empty_selection() {
        let sel = exact().solve(&[], 100.0).unwrap();
        assert!(sel.choices.is_empty());
        assert_eq!(sel.total_cost, 0.0);
    }

    fn arb_options() -> impl Strategy<Value = Vec<SkuOptions>> {
        let sku_strategy = (
            0.5f64..5.0,
            prop::collection::vec((1u32..50, 0.5f64..40.0, -100.0f64..200.0), 0..5),
        )
            .prop_map(|(urgency, extra)| {
                let mut candidates = vec![cand(0, 0.0, 0.0)];
                candidates.extend(extra.into_iter().map(|(q, c, u)| cand(q, c, u)));
                sku("S", urgency, candidates)
            });
        prop::collection::vec(sku_strategy, 1..5)
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: both solvers stay within budget and the exact solver is
        /// never worse than the heuristic.
        #[test]
        fn selections_respect_budget(options in arb_options(), budget in 0.0f64..100.0) {
            let best = exact().solve(&options, budget).unwrap();
            let greedy = GreedyKnapsack.solve(&options, budget).unwrap();

            prop_assert!(best.total_cost <= budget + 1e-6);
            prop_assert!(greedy.total_cost <= budget + 1e-6);
            prop_assert!(best.total_utility + 1e-6 >= greedy.total_utility);
            prop_assert_eq!(best.choices.len(), options.len());
        }
    }
}
