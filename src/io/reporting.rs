// src/io/reporting.rs

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::control::kpi::CumulativeKpis;
use crate::error::ControlResult;
use crate::model::snapshot::DailySnapshot;

/// One CSV row per SKU and day, carrying every snapshot field.
#[derive(Debug, Clone, Serialize)]
pub struct ResultsRow<'a> {
    pub day: usize,
    pub scenario: &'a str,
    pub sku_id: &'a str,
    pub demand: u32,
    pub fulfilled: u32,
    pub lost_sales: u32,
    pub fill_rate: f64,
    pub stock_before: u32,
    pub stock_after: u32,
    pub order_qty: u32,
    pub urgency: f64,
    pub daily_budget: f64,
    pub budget_planned: f64,
    pub budget_spent: f64,
    pub planned_utility: f64,
    pub utility_value: f64,
    pub revenue: f64,
    pub cost: f64,
    pub margin: f64,
    pub warnings: String,
}

impl<'a> ResultsRow<'a> {
    pub fn for_day(snapshot: &'a DailySnapshot) -> Vec<Self> {
        let warnings = snapshot
            .warnings
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        snapshot
            .skus
            .iter()
            .map(|s| ResultsRow {
                day: snapshot.day_index,
                scenario: &snapshot.scenario_tag,
                sku_id: &s.sku_id,
                demand: s.demand,
                fulfilled: s.fulfilled,
                lost_sales: s.lost_sales,
                fill_rate: s.fill_rate,
                stock_before: s.stock_before,
                stock_after: s.stock_after,
                order_qty: s.order_qty,
                urgency: s.urgency,
                daily_budget: snapshot.daily_budget,
                budget_planned: snapshot.budget_planned,
                budget_spent: snapshot.budget_spent,
                planned_utility: snapshot.planned_utility,
                utility_value: snapshot.utility_value,
                revenue: snapshot.revenue,
                cost: snapshot.cost,
                margin: snapshot.margin,
                warnings: warnings.clone(),
            })
            .collect()
    }
}

/// The per SKU-day results table, appended to as the days complete.
///
/// Rows are flushed after every day, so a run that aborts keeps the days it
/// finished.
pub struct ResultsTable<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl ResultsTable<File> {
    /// # Arguments
    /// * `file_path` - Where to save the table (e.g. "results/baseline_daily_metrics.csv").
    pub fn create(file_path: impl AsRef<Path>) -> ControlResult<Self> {
        Ok(Self::from_writer(File::create(file_path)?))
    }
}

impl<W: Write> ResultsTable<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            rows: 0,
        }
    }

    /// Append the rows of one day and flush them.
    pub fn append(&mut self, snapshot: &DailySnapshot) -> ControlResult<()> {
        for row in ResultsRow::for_day(snapshot) {
            self.writer.serialize(row)?;
            self.rows += 1;
        }
        self.writer.flush()?;
        debug!(day = snapshot.day_index, rows = self.rows, "results rows appended");
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }
}

/// One line of the scenario comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioSummary {
    pub scenario: String,
    pub days: usize,
    pub fill_rate: f64,
    pub revenue: f64,
    pub cost: f64,
    pub margin: f64,
    pub margin_pct: f64,
    pub lost_sales: u64,
    pub demand: u64,
    pub sales: u64,
    pub budget_utilization: f64,
    pub service_target_met: bool,
}

impl ScenarioSummary {
    pub fn from_kpis(scenario: &str, kpis: &CumulativeKpis, service_target: f64) -> Self {
        Self {
            scenario: scenario.to_string(),
            days: kpis.days,
            fill_rate: kpis.fill_rate,
            revenue: kpis.revenue,
            cost: kpis.cost,
            margin: kpis.margin,
            margin_pct: kpis.margin_pct,
            lost_sales: kpis.total_lost_sales,
            demand: kpis.total_demand,
            sales: kpis.total_fulfilled,
            budget_utilization: kpis.budget_utilization,
            service_target_met: kpis.meets_service_target(service_target),
        }
    }
}

pub fn write_scenario_comparison(file_path: impl AsRef<Path>, summaries: &[ScenarioSummary]) -> ControlResult<()> {
    let path = file_path.as_ref();
    let mut wtr = csv::Writer::from_path(path)?;
    for summary in summaries {
        wtr.serialize(summary)?;
    }
    wtr.flush()?;
    info!(scenarios = summaries.len(), path = %path.display(), "comparison written");
    Ok(())
}

/// The one-line console summary of a day. Days with recovered errors are
/// marked with `[!]` and list them.
pub fn format_day_line(snapshot: &DailySnapshot, extra_warnings: &[String]) -> String {
    let mut line = format!(
        "Day {:>3} [{}]: fill {:>5.1}% | lost {:>4} | stock {:>6} | spent ${:>10.2} / ${:.2} | margin ${:>11.2} | orders {}",
        snapshot.day_index,
        snapshot.scenario_tag,
        snapshot.fill_rate() * 100.0,
        snapshot.total_lost_sales(),
        snapshot.stock_total(),
        snapshot.budget_spent,
        snapshot.daily_budget,
        snapshot.margin,
        snapshot.orders_placed(),
    );

    let warnings: Vec<String> = snapshot
        .warnings
        .iter()
        .map(|w| w.to_string())
        .chain(extra_warnings.iter().cloned())
        .collect();
    if !warnings.is_empty() {
        line.push_str(" [!] ");
        line.push_str(&warnings.join("; "));
    }
    line
}

pub fn format_final_report(scenario: &str, kpis: &CumulativeKpis, service_target: f64) -> String {
    let verdict = if kpis.meets_service_target(service_target) { "met" } else { "missed" };
    let mut lines = vec![
        format!("=== {} ({} days) ===", scenario, kpis.days),
        format!(
            "Fill rate:          {:.2}% (target {:.0}%, {})",
            kpis.fill_rate * 100.0,
            service_target * 100.0,
            verdict
        ),
        format!("Demand / sales:     {} / {}", kpis.total_demand, kpis.total_fulfilled),
        format!("Lost sales:         {}", kpis.total_lost_sales),
        format!("Revenue:            ${:.2}", kpis.revenue),
        format!("Cost:               ${:.2}", kpis.cost),
        format!("Margin:             ${:.2} ({:.1}%)", kpis.margin, kpis.margin_pct),
        format!(
            "Budget utilization: {:.1}% (${:.2} of ${:.2})",
            kpis.budget_utilization * 100.0,
            kpis.budget_spent,
            kpis.budget_available
        ),
        format!("Realized utility:   {:.2}", kpis.total_utility),
        format!("Warnings:           {}", kpis.warnings),
        String::new(),
        "--- Per SKU ---".to_string(),
    ];

    for sku in &kpis.per_sku {
        let bullwhip = sku
            .bullwhip_ratio
            .map_or_else(|| "n/a".to_string(), |r| format!("{:.2}", r));
        lines.push(format!(
            "{:<10} fill {:>6.2}% | lost {:>6} | ordered {:>7} | bullwhip {}",
            sku.sku_id,
            sku.fill_rate * 100.0,
            sku.total_lost_sales,
            sku.total_ordered,
            bullwhip
        ));
    }
    lines.join("\n")
}

pub fn format_comparison(summaries: &[ScenarioSummary]) -> String {
    let mut lines = vec![format!(
        "{:<14} {:>8} {:>14} {:>14} {:>14} {:>8} {:>8} {:>7}",
        "scenario", "fill %", "revenue", "cost", "margin", "margin %", "lost", "target"
    )];
    for s in summaries {
        lines.push(format!(
            "{:<14} {:>8.2} {:>14.2} {:>14.2} {:>14.2} {:>8.1} {:>8} {:>7}",
            s.scenario,
            s.fill_rate * 100.0,
            s.revenue,
            s.cost,
            s.margin,
            s.margin_pct,
            s.lost_sales,
            if s.service_target_met { "yes" } else { "no" }
        ));
    }
    lines.join("\n")
}
