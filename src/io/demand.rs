// src/io/demand.rs

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::simulation::config::SkuConfig;

/// The fixed set of demand scenarios a run can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Baseline,
    HighDemand,
    SupplyIssues,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [
        Scenario::Baseline,
        Scenario::HighDemand,
        Scenario::SupplyIssues,
    ];

    /// Tag used in telemetry and reports.
    pub fn tag(&self) -> &'static str {
        match self {
            Scenario::Baseline => "baseline",
            Scenario::HighDemand => "high_demand",
            Scenario::SupplyIssues => "supply_issues",
        }
    }

    pub fn default_daily_budget(&self) -> f64 {
        match self {
            Scenario::Baseline => 30_000.0,
            Scenario::HighDemand => 42_000.0,
            Scenario::SupplyIssues => 35_000.0,
        }
    }

    /// Scales the mean of the daily demand distribution.
    fn mean_multiplier(&self) -> f64 {
        match self {
            Scenario::Baseline => 1.0,
            Scenario::HighDemand => 1.2,
            Scenario::SupplyIssues => 1.0,
        }
    }

    /// Scales the spread of the daily demand distribution. Unreliable supply
    /// shows up downstream as erratic, harder-to-forecast demand.
    fn spread_multiplier(&self) -> f64 {
        match self {
            Scenario::Baseline => 1.0,
            Scenario::HighDemand => 1.2,
            Scenario::SupplyIssues => 1.3,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Anything that can say how many units of a SKU customers want on a day.
pub trait DemandSource {
    /// Non-negative demand for `sku_id` on `day`.
    fn next_demand(&mut self, day: usize, sku_id: &str) -> f64;
}

/// Normally distributed daily demand per SKU, shaped by the scenario.
///
/// Samples are rounded to whole units and clamped at zero. Seeded, so two
/// runs with the same seed see the same demand.
#[derive(Debug, Clone)]
pub struct ScenarioDemand {
    rng: StdRng,
    profiles: BTreeMap<String, Normal<f64>>,
}

impl ScenarioDemand {
    pub fn new(scenario: Scenario, seed: u64, skus: &[SkuConfig]) -> ControlResult<Self> {
        let mut profiles = BTreeMap::new();
        for sku in skus {
            let mean = sku.daily_demand_mean * scenario.mean_multiplier();
            let std = sku.daily_demand_std * scenario.spread_multiplier();
            let normal = Normal::new(mean, std).map_err(|e| {
                ControlError::config(format!("{}: bad demand profile: {}", sku.sku_id, e))
            })?;
            profiles.insert(sku.sku_id.clone(), normal);
        }

        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            profiles,
        })
    }
}

impl DemandSource for ScenarioDemand {
    fn next_demand(&mut self, _day: usize, sku_id: &str) -> f64 {
        match self.profiles.get(sku_id) {
            Some(normal) => {
                let val: f64 = normal.sample(&mut self.rng);
                val.round().max(0.0)
            }
            None => 0.0,
        }
    }
}

/// Replays a fixed demand sequence per SKU. Day `d` (1-based) reads index
/// `d - 1`; past the end of a schedule, or for an unknown SKU, demand is 0.
#[derive(Debug, Clone, Default)]
pub struct ScheduledDemand {
    schedules: BTreeMap<String, Vec<f64>>,
}

impl ScheduledDemand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedule(mut self, sku_id: impl Into<String>, schedule: Vec<u32>) -> Self {
        self.schedules.insert(
            sku_id.into(),
            schedule.into_iter().map(f64::from).collect(),
        );
        self
    }

    /// Raw values, including ones a well-behaved source would never produce.
    pub fn with_raw_schedule(mut self, sku_id: impl Into<String>, schedule: Vec<f64>) -> Self {
        self.schedules.insert(sku_id.into(), schedule);
        self
    }
}

impl DemandSource for ScheduledDemand {
    fn next_demand(&mut self, day: usize, sku_id: &str) -> f64 {
        self.schedules
            .get(sku_id)
            .and_then(|s| s.get(day.wrapping_sub(1)))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Every day has the exact same demand.
pub fn constant_schedule(days: usize, value: u32) -> Vec<u32> {
    vec![value; days]
}

/// `base` demand with a single `spike` on `spike_day` (1-based).
pub fn spike_schedule(days: usize, base: u32, spike: u32, spike_day: usize) -> Vec<u32> {
    (1..=days)
        .map(|d| if d == spike_day { spike } else { base })
        .collect()
}

/// `before` until `step_day` (1-based, exclusive), `after` from then on.
pub fn step_schedule(days: usize, before: u32, after: u32, step_day: usize) -> Vec<u32> {
    (1..=days)
        .map(|d| if d < step_day { before } else { after })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<SkuConfig> {
        vec![SkuConfig::new("A", 10.0, 4.0, 0.1, 0).with_demand(20.0, 5.0)]
    }

    #[test]
    fn scenario_demand_is_reproducible_for_a_seed() {
        let mut a = ScenarioDemand::new(Scenario::Baseline, 7, &catalog()).unwrap();
        let mut b = ScenarioDemand::new(Scenario::Baseline, 7, &catalog()).unwrap();
        for day in 1..=20 {
            assert_eq!(a.next_demand(day, "A"), b.next_demand(day, "A"));
        }
    }

    #[test]
    fn scenario_demand_is_whole_and_non_negative() {
        let skus = vec![SkuConfig::new("A", 10.0, 4.0, 0.1, 0).with_demand(1.0, 5.0)];
        let mut source = ScenarioDemand::new(Scenario::SupplyIssues, 3, &skus).unwrap();
        for day in 1..=200 {
            let d = source.next_demand(day, "A");
            assert!(d >= 0.0);
            assert_eq!(d, d.round());
        }
    }

    #[test]
    fn high_demand_raises_the_average() {
        let skus = vec![SkuConfig::new("A", 10.0, 4.0, 0.1, 0).with_demand(100.0, 1.0)];
        let mut base = ScenarioDemand::new(Scenario::Baseline, 1, &skus).unwrap();
        let mut high = ScenarioDemand::new(Scenario::HighDemand, 1, &skus).unwrap();
        let base_sum: f64 = (1..=50).map(|d| base.next_demand(d, "A")).sum();
        let high_sum: f64 = (1..=50).map(|d| high.next_demand(d, "A")).sum();
        assert!(high_sum > base_sum * 1.1);
    }

    #[test]
    fn unknown_sku_has_no_demand() {
        let mut source = ScenarioDemand::new(Scenario::Baseline, 1, &catalog()).unwrap();
        assert_eq!(source.next_demand(1, "missing"), 0.0);
    }

    #[test]
    fn scheduled_demand_is_one_based_and_zero_past_the_end() {
        let mut source = ScheduledDemand::new().with_schedule("A", vec![4, 12, 0]);
        assert_eq!(source.next_demand(1, "A"), 4.0);
        assert_eq!(source.next_demand(2, "A"), 12.0);
        assert_eq!(source.next_demand(4, "A"), 0.0);
        assert_eq!(source.next_demand(0, "A"), 0.0);
    }

    #[test]
    fn schedule_helpers() {
        assert_eq!(constant_schedule(3, 5), vec![5, 5, 5]);
        assert_eq!(spike_schedule(4, 10, 60, 2), vec![10, 60, 10, 10]);
        assert_eq!(step_schedule(5, 4, 8, 3), vec![4, 4, 8, 8, 8]);
    }

    #[test]
    fn scenario_tags() {
        assert_eq!(Scenario::HighDemand.tag(), "high_demand");
        assert_eq!(Scenario::SupplyIssues.to_string(), "supply_issues");
    }
}
