use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use mapek_inventory::io::demand::Scenario;
use mapek_inventory::io::reporting::{self, ResultsTable, ScenarioSummary};
use mapek_inventory::io::telemetry::{LineProtocolSink, LogSink, NullSink, TelemetrySink};
use mapek_inventory::logging::init_logging;
use mapek_inventory::simulation::config::SimulationConfig;
use mapek_inventory::simulation::engine::ControlLoop;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScenarioArg {
    Baseline,
    HighDemand,
    SupplyIssues,
    /// Run all three and compare them.
    All,
}

impl ScenarioArg {
    fn scenarios(self) -> Vec<Scenario> {
        match self {
            ScenarioArg::Baseline => vec![Scenario::Baseline],
            ScenarioArg::HighDemand => vec![Scenario::HighDemand],
            ScenarioArg::SupplyIssues => vec![Scenario::SupplyIssues],
            ScenarioArg::All => Scenario::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TelemetryArg {
    None,
    /// Emit metrics as log events.
    Log,
    /// Append line-protocol metrics to a file in the output directory.
    File,
}

/// Autonomous inventory manager: a MAPE-K reorder loop over a simulated warehouse
#[derive(Parser, Debug)]
#[command(name = "mapek-inventory")]
#[command(version, about)]
struct Args {
    /// Demand scenario to simulate
    #[arg(short, long, value_enum, default_value = "baseline")]
    scenario: ScenarioArg,

    /// Number of days to simulate (overrides the config file)
    #[arg(short, long)]
    days: Option<usize>,

    /// RNG seed for demand generation (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,

    /// JSON configuration file; defaults to the reference warehouse
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Daily budget, replacing the scenario default
    #[arg(short, long)]
    budget: Option<f64>,

    /// Directory for CSV results and telemetry files
    #[arg(short, long, default_value = "results")]
    output_dir: PathBuf,

    /// Where daily metrics are published
    #[arg(long, value_enum, default_value = "none")]
    telemetry: TelemetryArg,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Only print the final reports
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_json)?;

    // 1. SETUP CONFIGURATION
    let mut base = match &args.config {
        Some(path) => SimulationConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(days) = args.days {
        base.days = days;
    }
    if let Some(seed) = args.seed {
        base.seed = seed;
    }
    if args.budget.is_some() {
        base.daily_budget = args.budget;
    }

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    println!("=== Autonomous Inventory Manager (MAPE-K) ===");

    // 2. RUN EVERY REQUESTED SCENARIO
    let mut summaries = Vec::new();
    for scenario in args.scenario.scenarios() {
        let mut config = base.clone();
        config.scenario = scenario;
        let target = config.analyzer.service_level_target;

        let sink = build_sink(&args, scenario)?;
        let mut control = ControlLoop::for_scenario(config, sink)
            .with_context(|| format!("setting up {} scenario", scenario))?;

        println!(
            "\nRunning {} for {} days (budget ${:.2}/day)...",
            scenario,
            control.config().days,
            control.config().daily_budget()
        );
        info!(%scenario, "scenario started");

        // 3. RUN, STREAMING RESULTS AS DAYS COMPLETE
        let output_file = args
            .output_dir
            .join(format!("{}_daily_metrics.csv", scenario.tag()));
        let mut table = ResultsTable::create(&output_file)
            .with_context(|| format!("opening {}", output_file.display()))?;

        let quiet = args.quiet;
        let kpis = control
            .run_with(|outcome| {
                table.append(&outcome.snapshot)?;
                if !quiet {
                    let extra: Vec<String> = outcome
                        .telemetry_warnings
                        .iter()
                        .map(|w| w.to_string())
                        .collect();
                    println!("{}", reporting::format_day_line(&outcome.snapshot, &extra));
                }
                Ok(())
            })
            .with_context(|| format!("{} scenario aborted", scenario))?;
        println!("{} rows written to {}", table.rows(), output_file.display());

        // 4. PRINT KPI ANALYSIS
        println!("\n{}", reporting::format_final_report(scenario.tag(), &kpis, target));
        summaries.push(ScenarioSummary::from_kpis(scenario.tag(), &kpis, target));
    }

    // 5. COMPARE SCENARIOS
    if summaries.len() > 1 {
        let comparison_file = args.output_dir.join("scenario_comparison.csv");
        reporting::write_scenario_comparison(&comparison_file, &summaries)?;
        println!("=== Scenario Comparison ===");
        println!("{}", reporting::format_comparison(&summaries));
        println!("Comparison written to {}", comparison_file.display());
    }

    println!("\nSimulation Complete.");
    Ok(())
}

fn build_sink(args: &Args, scenario: Scenario) -> Result<Box<dyn TelemetrySink>> {
    Ok(match args.telemetry {
        TelemetryArg::None => Box::new(NullSink),
        TelemetryArg::Log => Box::new(LogSink),
        TelemetryArg::File => {
            let path = args
                .output_dir
                .join(format!("{}_telemetry.lp", scenario.tag()));
            Box::new(
                LineProtocolSink::create(&path)
                    .with_context(|| format!("opening {}", path.display()))?,
            )
        }
    })
}
