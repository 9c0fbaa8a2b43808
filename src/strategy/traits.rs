// src/strategy/traits.rs

use std::fmt::Debug;

use crate::error::SolverError;

/// One reorder option for one SKU, already priced by the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub qty: u32,
    /// Spend counted against the daily budget.
    pub cost: f64,
    pub utility: f64,
}

/// The candidate set of one SKU.
///
/// Every set handed to a solver must contain a zero-cost candidate, so the
/// all-zero selection is always feasible for a non-negative budget.
#[derive(Debug, Clone, PartialEq)]
pub struct SkuOptions {
    pub sku_id: String,
    /// Higher wins ties.
    pub urgency: f64,
    pub candidates: Vec<Candidate>,
}

/// A choice of exactly one candidate per SKU.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// `choices[i]` indexes into `options[i].candidates`.
    pub choices: Vec<usize>,
    pub total_cost: f64,
    pub total_utility: f64,
}

impl Selection {
    pub fn from_choices(options: &[SkuOptions], choices: Vec<usize>) -> Self {
        let (total_cost, total_utility) = options
            .iter()
            .zip(&choices)
            .map(|(o, &c)| (o.candidates[c].cost, o.candidates[c].utility))
            .fold((0.0, 0.0), |(tc, tu), (c, u)| (tc + c, tu + u));
        Self {
            choices,
            total_cost,
            total_utility,
        }
    }

    /// The cheapest candidate of every SKU.
    pub fn cheapest(options: &[SkuOptions]) -> Self {
        let choices = options.iter().map(|o| cheapest_index(&o.candidates)).collect();
        Self::from_choices(options, choices)
    }

    /// The chosen candidate for SKU `i`.
    pub fn chosen<'a>(&self, options: &'a [SkuOptions], i: usize) -> &'a Candidate {
        &options[i].candidates[self.choices[i]]
    }
}

/// Cheapest candidate, preferring higher utility among equal costs.
pub(crate) fn cheapest_index(candidates: &[Candidate]) -> usize {
    let mut best = 0;
    for (i, c) in candidates.iter().enumerate().skip(1) {
        let b = &candidates[best];
        if c.cost < b.cost || (c.cost == b.cost && c.utility > b.utility) {
            best = i;
        }
    }
    best
}

/// Picks one candidate per SKU maximizing total utility with total cost
/// within `budget`.
///
/// We require `Debug` so the planner can log which solver ran, and
/// `Send + Sync` so a planner can be shared across scenario runs.
pub trait SelectionSolver: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// # Arguments
    /// * `options` - Candidate sets, one per SKU, each with a zero-cost entry.
    /// * `budget` - Non-negative spending ceiling.
    fn solve(&self, options: &[SkuOptions], budget: f64) -> Result<Selection, SolverError>;
}
