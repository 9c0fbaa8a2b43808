// src/simulation/engine.rs

use std::collections::BTreeMap;

use tracing::{debug, info, info_span, warn};

use crate::control::analyzer::Analyzer;
use crate::control::executor::Executor;
use crate::control::kpi::{aggregate, CumulativeKpis};
use crate::control::planner::Planner;
use crate::error::ControlResult;
use crate::io::demand::{DemandSource, ScenarioDemand};
use crate::io::telemetry::{TelemetryRecord, TelemetrySink};
use crate::model::knowledge::KnowledgeStore;
use crate::model::snapshot::{DailySnapshot, DayWarning};
use crate::simulation::config::SimulationConfig;

/// Phases of one simulated day, in the only order they may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPhase {
    DemandRealized,
    Analyzed,
    Planned,
    Executed,
    Published,
}

impl DayPhase {
    pub fn next(self) -> Option<DayPhase> {
        match self {
            DayPhase::DemandRealized => Some(DayPhase::Analyzed),
            DayPhase::Analyzed => Some(DayPhase::Planned),
            DayPhase::Planned => Some(DayPhase::Executed),
            DayPhase::Executed => Some(DayPhase::Published),
            DayPhase::Published => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initialized,
    /// `phase` is the last phase that completed.
    DayRunning { day: usize, phase: DayPhase },
    Finished,
}

/// What one call to [`ControlLoop::step`] produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DayOutcome {
    /// The snapshot as recorded in the knowledge history.
    pub snapshot: DailySnapshot,
    /// Problems raised while publishing, after the snapshot was recorded.
    pub telemetry_warnings: Vec<DayWarning>,
}

impl DayOutcome {
    pub fn warnings(&self) -> impl Iterator<Item = &DayWarning> {
        self.snapshot.warnings.iter().chain(&self.telemetry_warnings)
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }
}

/// Drives the MAPE-K loop one day at a time and owns all of its state.
pub struct ControlLoop {
    config: SimulationConfig,
    daily_budget: f64,

    // Knowledge
    knowledge: KnowledgeStore,

    // Collaborators
    demand: Box<dyn DemandSource>,
    telemetry: Box<dyn TelemetrySink>,

    // Stages
    analyzer: Analyzer,
    planner: Planner,
    executor: Executor,

    state: LoopState,
    current_day: usize,
}

impl ControlLoop {
    pub fn new(
        config: SimulationConfig,
        demand: Box<dyn DemandSource>,
        telemetry: Box<dyn TelemetrySink>,
    ) -> ControlResult<Self> {
        config.validate()?;

        let analyzer = Analyzer::new(config.analyzer.clone(), config.planner.forecast_model);
        let planner = Planner::new(config.planner.clone());
        let executor = Executor::new(&config);

        Ok(Self {
            daily_budget: config.daily_budget(),
            knowledge: KnowledgeStore::from_config(&config),
            demand,
            telemetry,
            analyzer,
            planner,
            executor,
            state: LoopState::Initialized,
            current_day: 1,
            config,
        })
    }

    /// A loop fed by the configured scenario's demand generator.
    pub fn for_scenario(config: SimulationConfig, telemetry: Box<dyn TelemetrySink>) -> ControlResult<Self> {
        let demand = ScenarioDemand::new(config.scenario, config.seed, &config.skus)?;
        Self::new(config, Box::new(demand), telemetry)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn history(&self) -> &[DailySnapshot] {
        self.knowledge.history()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run every remaining day and return the cumulative KPIs.
    pub fn run(&mut self) -> ControlResult<CumulativeKpis> {
        self.run_with(|_| Ok(()))
    }

    /// Like [`run`](Self::run), calling `on_day` after each completed day.
    /// An error from `on_day` stops the run.
    pub fn run_with(
        &mut self,
        mut on_day: impl FnMut(&DayOutcome) -> ControlResult<()>,
    ) -> ControlResult<CumulativeKpis> {
        while let Some(outcome) = self.step()? {
            on_day(&outcome)?;
        }
        Ok(aggregate(self.knowledge.history()))
    }

    /// Run one day. Returns `None` once the configured horizon is done.
    ///
    /// A fatal error leaves the loop in the phase that last completed.
    pub fn step(&mut self) -> ControlResult<Option<DayOutcome>> {
        if self.state == LoopState::Finished {
            return Ok(None);
        }
        if self.current_day > self.config.days {
            self.state = LoopState::Finished;
            info!(days = self.config.days, "control loop finished");
            return Ok(None);
        }

        let day = self.current_day;
        let span = info_span!("day", day, scenario = self.config.scenario.tag());
        let _enter = span.enter();

        // =================================================================
        // MONITOR: realize today's demand
        // =================================================================
        let mut demand_by_sku = BTreeMap::new();
        for sku_id in self.knowledge.sku_ids() {
            let value = self.demand.next_demand(day, &sku_id);
            demand_by_sku.insert(sku_id, value);
        }
        self.advance(day, DayPhase::DemandRealized);

        // =================================================================
        // ANALYZE
        // =================================================================
        let analysis = self.analyzer.analyze(day, &demand_by_sku, &mut self.knowledge)?;
        self.advance(day, DayPhase::Analyzed);

        // =================================================================
        // PLAN: against a frozen view of the knowledge
        // =================================================================
        let view = self.knowledge.view(day);
        let proposal = self.planner.plan(&view, &analysis, self.daily_budget)?;
        self.advance(day, DayPhase::Planned);

        // =================================================================
        // EXECUTE
        // =================================================================
        let snapshot = self
            .executor
            .execute(&proposal, &analysis, &mut self.knowledge, self.daily_budget)?;
        self.advance(day, DayPhase::Executed);

        // =================================================================
        // PUBLISH: best effort
        // =================================================================
        let telemetry_warnings = self.publish(&snapshot);
        self.advance(day, DayPhase::Published);

        self.current_day += 1;
        Ok(Some(DayOutcome {
            snapshot,
            telemetry_warnings,
        }))
    }

    fn advance(&mut self, day: usize, phase: DayPhase) {
        debug!(?phase, "phase complete");
        self.state = LoopState::DayRunning { day, phase };
    }

    fn publish(&mut self, snapshot: &DailySnapshot) -> Vec<DayWarning> {
        let mut warnings = Vec::new();
        for record in TelemetryRecord::for_day(snapshot) {
            if let Err(e) = self.telemetry.publish(&record) {
                warn!(measurement = %record.measurement, error = %e, "telemetry publish failed");
                warnings.push(DayWarning::Telemetry(e.to_string()));
            }
        }
        if let Err(e) = self.telemetry.flush() {
            warn!(error = %e, "telemetry flush failed");
            warnings.push(DayWarning::Telemetry(e.to_string()));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use crate::io::demand::{constant_schedule, ScheduledDemand};
    use crate::io::telemetry::{MemorySink, NullSink};
    use crate::simulation::config::SkuConfig;

    fn config(days: usize) -> SimulationConfig {
        let mut config = SimulationConfig::with_skus(vec![
            SkuConfig::new("A", 10.0, 4.0, 0.1, 20).with_demand(5.0, 1.0),
        ]);
        config.days = days;
        config.daily_budget = Some(1_000.0);
        config.planner.base_order_size = 5;
        config
    }

    fn scheduled(days: usize) -> Box<dyn DemandSource> {
        Box::new(ScheduledDemand::new().with_schedule("A", constant_schedule(days, 5)))
    }

    struct BrokenSink;

    impl TelemetrySink for BrokenSink {
        fn publish(&mut self, _record: &TelemetryRecord) -> Result<(), TelemetryError> {
            Err(TelemetryError::Publish("connection refused".into()))
        }
    }

    #[test]
    fn phases_run_in_order() {
        let mut phase = DayPhase::DemandRealized;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            seen.push(next);
            phase = next;
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(seen.last(), Some(&DayPhase::Published));
    }

    #[test]
    fn state_moves_from_initialized_to_finished() {
        let mut control = ControlLoop::new(config(2), scheduled(2), Box::new(NullSink)).unwrap();
        assert_eq!(control.state(), LoopState::Initialized);

        control.step().unwrap();
        assert_eq!(
            control.state(),
            LoopState::DayRunning {
                day: 1,
                phase: DayPhase::Published
            }
        );

        let kpis = control.run().unwrap();
        assert_eq!(control.state(), LoopState::Finished);
        assert_eq!(kpis.days, 2);
        assert!(control.step().unwrap().is_none());
    }

    #[test]
    fn publishes_daily_and_sku_metrics() {
        let sink = MemorySink::new();
        let mut control = ControlLoop::new(config(3), scheduled(3), Box::new(sink.clone())).unwrap();
        control.run().unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].measurement, "daily_metrics");
        assert_eq!(records[0].timestamp, 1);
        assert_eq!(records[5].timestamp, 3);
    }

    #[test]
    fn telemetry_failure_does_not_stop_the_loop() {
        let mut control = ControlLoop::new(config(3), scheduled(3), Box::new(BrokenSink)).unwrap();
        let mut flagged = 0;
        let kpis = control
            .run_with(|outcome| {
                if outcome.has_warnings() {
                    flagged += 1;
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(kpis.days, 3);
        assert_eq!(flagged, 3);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut bad = config(3);
        bad.skus.clear();
        assert!(ControlLoop::new(bad, scheduled(3), Box::new(NullSink)).is_err());
    }

    #[test]
    fn scenario_runs_are_reproducible() {
        let mut cfg = SimulationConfig::default();
        cfg.days = 10;
        cfg.planner.solver = crate::simulation::config::SolverKind::Greedy;
        let a = ControlLoop::for_scenario(cfg.clone(), Box::new(NullSink))
            .unwrap()
            .run()
            .unwrap();
        let b = ControlLoop::for_scenario(cfg, Box::new(NullSink))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(a, b);
    }
}
