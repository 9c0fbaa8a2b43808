//! Autonomous inventory replenishment driven by a MAPE-K control loop.
//!
//! Every simulated day the loop realizes demand against stock (monitor and
//! analyze), picks one reorder quantity per SKU under a daily budget (plan),
//! commits the orders (execute) and publishes the day's metrics. All state
//! lives in a [`model::knowledge::KnowledgeStore`] owned by the
//! [`simulation::engine::ControlLoop`].

pub mod control;
pub mod error;
pub mod io;
pub mod logging;
pub mod model;
pub mod simulation;
pub mod strategy;
