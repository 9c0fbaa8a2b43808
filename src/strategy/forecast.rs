// src/strategy/forecast.rs

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// Point forecast of next-period demand with its uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Forecast {
    pub mean: f64,
    pub std: f64,
}

/// How the planner turns recent demand into an expected next-day demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastModel {
    /// Tomorrow looks like today.
    LastValue,
    /// Plain average over the history window.
    MovingAverage,
    /// Exponential smoothing seeded with the oldest observation.
    /// `alpha` near 1 reacts fast, near 0 stays stable.
    ExponentialSmoothing { alpha: f64 },
}

impl ForecastModel {
    pub fn validate(&self) -> ControlResult<()> {
        if let ForecastModel::ExponentialSmoothing { alpha } = self {
            if !(*alpha > 0.0 && *alpha <= 1.0) {
                return Err(ControlError::config(format!(
                    "smoothing alpha must be in (0, 1], got {}",
                    alpha
                )));
            }
        }
        Ok(())
    }

    /// Forecast from `history` (oldest first).
    ///
    /// With no history the `prior` is returned as-is, with its spread floored
    /// the same way an observed spread would be.
    pub fn forecast(&self, history: &[f64], prior: Forecast) -> Forecast {
        let Some(&last) = history.last() else {
            return Forecast {
                mean: prior.mean,
                std: prior.std.max(spread_floor(prior.mean)),
            };
        };

        let mean = match self {
            ForecastModel::LastValue => last,
            ForecastModel::MovingAverage => population_stats(history).0,
            ForecastModel::ExponentialSmoothing { alpha } => history[1..]
                .iter()
                .fold(history[0], |s, &x| alpha * x + (1.0 - alpha) * s),
        };

        Forecast {
            mean,
            std: window_spread(history),
        }
    }
}

/// Spread of a demand window. A single observation or a flat window says
/// nothing about variability, so those get a floor tied to the level.
pub fn window_spread(history: &[f64]) -> f64 {
    let (mean, std) = population_stats(history);
    if history.len() < 2 || std < 1e-6 {
        spread_floor(mean)
    } else {
        std
    }
}

fn spread_floor(level: f64) -> f64 {
    (level.abs() * 0.25).max(1.0)
}

/// Mean and population standard deviation. `(0, 0)` for an empty slice.
pub fn population_stats(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
