// src/model/sku.rs

use std::collections::VecDeque;

use serde::Serialize;

use crate::simulation::config::SkuConfig;
use crate::strategy::forecast::Forecast;

pub type SkuId = String;

/// Per-unit economics of a SKU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SkuEconomics {
    pub unit_revenue: f64,
    pub unit_order_cost: f64,
    pub fixed_order_cost: f64,
    pub unit_holding_cost: f64,
}

impl SkuEconomics {
    /// Spend for ordering `qty` units. Ordering nothing costs nothing.
    pub fn order_cost(&self, qty: u32) -> f64 {
        if qty == 0 {
            0.0
        } else {
            qty as f64 * self.unit_order_cost + self.fixed_order_cost
        }
    }

    pub fn holding_cost(&self, units: f64, days: f64) -> f64 {
        units.max(0.0) * self.unit_holding_cost * days
    }
}

/// The state of a single stock-keeping unit in the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct SkuState {
    // Identity
    pub sku_id: SkuId,
    pub name: String,
    pub economics: SkuEconomics,
    /// Demand assumed before anything has been observed.
    pub demand_prior: Forecast,

    // State Variables
    on_hand: u32,
    last_order_qty: u32,

    // Rolling windows, oldest first
    service_level_history: VecDeque<f64>,
    service_window: usize,
    demand_history: VecDeque<f64>,
    demand_window: usize,
}

impl SkuState {
    pub fn new(config: &SkuConfig, service_window: usize, demand_window: usize) -> Self {
        Self {
            sku_id: config.sku_id.clone(),
            name: config.name.clone(),
            economics: SkuEconomics {
                unit_revenue: config.unit_revenue,
                unit_order_cost: config.unit_order_cost,
                fixed_order_cost: config.fixed_order_cost,
                unit_holding_cost: config.unit_holding_cost,
            },
            demand_prior: Forecast {
                mean: config.daily_demand_mean,
                std: config.daily_demand_std,
            },
            on_hand: config.initial_stock,
            last_order_qty: 0,
            service_level_history: VecDeque::with_capacity(service_window),
            service_window: service_window.max(1),
            demand_history: VecDeque::with_capacity(demand_window),
            demand_window: demand_window.max(1),
        }
    }

    pub fn on_hand(&self) -> u32 {
        self.on_hand
    }

    pub fn last_order_qty(&self) -> u32 {
        self.last_order_qty
    }

    pub fn service_level_history(&self) -> &VecDeque<f64> {
        &self.service_level_history
    }

    /// Demand window as a contiguous slice copy, oldest first.
    pub fn demand_history(&self) -> Vec<f64> {
        self.demand_history.iter().copied().collect()
    }

    /// Serve `demand` from stock. Whatever cannot be served is lost, never
    /// backlogged.
    ///
    /// Returns `(fulfilled, lost_sales)`.
    pub fn fulfill_demand(&mut self, demand: u32) -> (u32, u32) {
        let fulfilled = demand.min(self.on_hand);
        self.on_hand -= fulfilled;
        (fulfilled, demand - fulfilled)
    }

    /// Post a committed order to stock. Replenishment is immediate.
    pub fn receive_replenishment(&mut self, qty: u32) {
        self.on_hand = self.on_hand.saturating_add(qty);
        self.last_order_qty = qty;
    }

    pub fn record_fill_rate(&mut self, fill_rate: f64) {
        push_bounded(&mut self.service_level_history, fill_rate, self.service_window);
    }

    pub fn record_demand(&mut self, demand: f64) {
        push_bounded(&mut self.demand_history, demand, self.demand_window);
    }

    /// Average fill rate over the service window; 1.0 before any day ran.
    pub fn trailing_fill_rate(&self) -> f64 {
        if self.service_level_history.is_empty() {
            return 1.0;
        }
        self.service_level_history.iter().sum::<f64>() / self.service_level_history.len() as f64
    }
}

fn push_bounded(window: &mut VecDeque<f64>, value: f64, cap: usize) {
    window.push_back(value);
    while window.len() > cap {
        window.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sku(stock: u32) -> SkuState {
        let config = SkuConfig::new("A", 10.0, 4.0, 0.5, stock).with_fixed_order_cost(3.0);
        SkuState::new(&config, 3, 2)
    }

    #[test]
    fn short_stock_loses_the_rest() {
        let mut s = sku(10);
        assert_eq!(s.fulfill_demand(4), (4, 0));
        assert_eq!(s.fulfill_demand(12), (6, 6));
        assert_eq!(s.on_hand(), 0);
    }

    #[test]
    fn replenishment_updates_stock_and_last_order() {
        let mut s = sku(1);
        s.receive_replenishment(20);
        assert_eq!(s.on_hand(), 21);
        assert_eq!(s.last_order_qty(), 20);
        s.receive_replenishment(0);
        assert_eq!(s.last_order_qty(), 0);
    }

    #[test]
    fn windows_are_bounded() {
        let mut s = sku(0);
        for rate in [0.1, 0.2, 0.3, 0.4] {
            s.record_fill_rate(rate);
        }
        assert_eq!(s.service_level_history().len(), 3);
        assert!((s.trailing_fill_rate() - 0.3).abs() < 1e-12);

        for d in [5.0, 6.0, 7.0] {
            s.record_demand(d);
        }
        assert_eq!(s.demand_history(), vec![6.0, 7.0]);
    }

    #[test]
    fn fixed_cost_only_on_real_orders() {
        let s = sku(0);
        assert_eq!(s.economics.order_cost(0), 0.0);
        assert_eq!(s.economics.order_cost(5), 23.0);
    }
}
