// src/io/telemetry.rs

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::error::TelemetryError;
use crate::model::snapshot::DailySnapshot;

pub const DAILY_MEASUREMENT: &str = "daily_metrics";
pub const SKU_MEASUREMENT: &str = "sku_metrics";

/// A flat, timestamped metrics point.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    /// The simulated day index.
    pub timestamp: u64,
}

impl TelemetryRecord {
    pub fn new(measurement: impl Into<String>, timestamp: u64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Day-level KPIs, tagged by scenario.
    pub fn daily_metrics(snapshot: &DailySnapshot) -> Self {
        Self::new(DAILY_MEASUREMENT, snapshot.day_index as u64)
            .tag("scenario", snapshot.scenario_tag.as_str())
            .field("revenue", snapshot.revenue)
            .field("fill_rate", snapshot.fill_rate())
            .field("stock_total", snapshot.stock_total() as f64)
            .field("lost_sales", snapshot.total_lost_sales() as f64)
            .field("budget_planned", snapshot.budget_planned)
            .field("budget_spent", snapshot.budget_spent)
            .field("utility_value", snapshot.utility_value)
            .field("margin", snapshot.margin)
    }

    /// One record per SKU, tagged by scenario and SKU.
    pub fn sku_metrics(snapshot: &DailySnapshot) -> Vec<Self> {
        snapshot
            .skus
            .iter()
            .map(|s| {
                Self::new(SKU_MEASUREMENT, snapshot.day_index as u64)
                    .tag("scenario", snapshot.scenario_tag.as_str())
                    .tag("sku", s.sku_id.as_str())
                    .field("stock", s.stock_after as f64)
                    .field("demand", s.demand as f64)
                    .field("sales", s.fulfilled as f64)
                    .field("lost", s.lost_sales as f64)
                    .field("order_qty", s.order_qty as f64)
            })
            .collect()
    }

    /// All records describing one day.
    pub fn for_day(snapshot: &DailySnapshot) -> Vec<Self> {
        let mut records = vec![Self::daily_metrics(snapshot)];
        records.extend(Self::sku_metrics(snapshot));
        records
    }

    /// Render as `measurement,tag=v field=x timestamp`.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (k, v) in &self.tags {
            line.push(',');
            line.push_str(&escape(k, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(v, &[',', '=', ' ']));
        }
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k, &[',', '=', ' ']), v))
            .collect();
        line.push(' ');
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(&self.timestamp.to_string());
        line
    }
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Destination for telemetry records.
///
/// Publishing is synchronous and best-effort: the control loop logs a failed
/// publish and carries on.
pub trait TelemetrySink: Send {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError>;

    fn flush(&mut self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn publish(&mut self, _record: &TelemetryRecord) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Emits records as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        info!(target: "telemetry", line = %record.to_line_protocol(), "metrics");
        Ok(())
    }
}

/// Appends one line-protocol line per record to a writer.
#[derive(Debug)]
pub struct LineProtocolSink<W: Write> {
    writer: W,
}

impl LineProtocolSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> LineProtocolSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TelemetrySink for LineProtocolSink<W> {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        writeln!(self.writer, "{}", record.to_line_protocol())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// In-memory sink for tests. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    inner: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TelemetrySink for MemorySink {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        self.inner
            .lock()
            .map_err(|e| TelemetryError::Publish(e.to_string()))?
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::snapshot::SkuDayRecord;

    fn snapshot() -> DailySnapshot {
        DailySnapshot {
            day_index: 3,
            scenario_tag: "high_demand".into(),
            skus: vec![SkuDayRecord {
                sku_id: "SKU_001".into(),
                demand: 10,
                fulfilled: 8,
                lost_sales: 2,
                fill_rate: 0.8,
                stock_before: 8,
                stock_after: 25,
                order_qty: 25,
                urgency: 1.0,
            }],
            daily_budget: 100.0,
            budget_planned: 50.0,
            budget_spent: 50.0,
            planned_utility: 1.0,
            utility_value: 2.0,
            revenue: 80.0,
            cost: 55.0,
            margin: 25.0,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn daily_metrics_carry_the_kpis() {
        let rec = TelemetryRecord::daily_metrics(&snapshot());
        assert_eq!(rec.measurement, "daily_metrics");
        assert_eq!(rec.timestamp, 3);
        assert_eq!(rec.tags["scenario"], "high_demand");
        assert_eq!(rec.fields["fill_rate"], 0.8);
        assert_eq!(rec.fields["stock_total"], 25.0);
        assert_eq!(rec.fields["lost_sales"], 2.0);
        assert_eq!(rec.fields.len(), 8);
    }

    #[test]
    fn sku_metrics_are_tagged_by_sku() {
        let recs = TelemetryRecord::sku_metrics(&snapshot());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].tags["sku"], "SKU_001");
        assert_eq!(recs[0].fields["sales"], 8.0);
        assert_eq!(TelemetryRecord::for_day(&snapshot()).len(), 2);
    }

    #[test]
    fn line_protocol_escapes_tags() {
        let rec = TelemetryRecord::new("daily metrics", 7)
            .tag("scenario", "a,b=c")
            .field("x", 1.5)
            .field("y", 2.0);
        assert_eq!(
            rec.to_line_protocol(),
            r"daily\ metrics,scenario=a\,b\=c x=1.5,y=2 7"
        );
    }

    #[test]
    fn line_sink_writes_one_line_per_record() {
        let mut sink = LineProtocolSink::new(Vec::new());
        for rec in TelemetryRecord::for_day(&snapshot()) {
            sink.publish(&rec).unwrap();
        }
        sink.flush().unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 2);
        assert!(out.starts_with("daily_metrics,scenario=high_demand "));
    }

    #[test]
    fn memory_sink_clones_share_records() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer
            .publish(&TelemetryRecord::daily_metrics(&snapshot()))
            .unwrap();
        assert_eq!(sink.records().len(), 1);
    }
}
