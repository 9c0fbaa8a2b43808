// src/error.rs

use thiserror::Error;

/// Result type used by the control loop stages.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that halt a simulation run.
///
/// Anything in here means upstream data (demand, configuration) broke its
/// contract. Continuing would silently corrupt the cumulative KPIs.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A demand value was negative, NaN or infinite.
    #[error("invalid demand for {sku} on day {day}: {value}")]
    InvalidDemand { day: usize, sku: String, value: f64 },

    /// The demand input and the knowledge store disagree on the SKU set.
    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    /// The zero-order solution cannot be represented under this budget.
    #[error("infeasible budget: {0}")]
    InfeasibleBudget(f64),

    /// The static configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("report output failed: {0}")]
    Report(#[from] csv::Error),

    #[error("i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse failed: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl ControlError {
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::InconsistentState(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Errors raised by a selection solver. Never surfaced past the planner.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolverError {
    #[error("solver timed out after exploring {nodes} nodes")]
    Timeout { nodes: u64 },
}

/// Errors raised by a telemetry sink. Logged and recorded, never fatal.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("publish rejected: {0}")]
    Publish(String),

    #[error("telemetry i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
