//! The MAPE-K stages run once per simulated day.

pub mod analyzer;
pub mod executor;
pub mod kpi;
pub mod planner;
