// src/model/knowledge.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::model::sku::{SkuId, SkuState};
use crate::model::snapshot::DailySnapshot;
use crate::simulation::config::SimulationConfig;

/// The shared knowledge of the control loop.
///
/// Owned by the loop driver. The analyzer and the executor get it by `&mut`,
/// one after the other; the planner only ever sees a [`KnowledgeView`].
#[derive(Debug, Clone, Default)]
pub struct KnowledgeStore {
    skus: BTreeMap<SkuId, SkuState>,
    history: Vec<DailySnapshot>,
    /// SKU -> last day (inclusive) on which ordering is suspended.
    blocks: BTreeMap<SkuId, usize>,
}

impl KnowledgeStore {
    pub fn new(skus: impl IntoIterator<Item = SkuState>) -> Self {
        Self {
            skus: skus.into_iter().map(|s| (s.sku_id.clone(), s)).collect(),
            history: Vec::new(),
            blocks: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.skus.iter().map(|c| {
            SkuState::new(
                c,
                config.analyzer.urgency_window,
                config.analyzer.forecast_window,
            )
        }))
    }

    pub fn sku(&self, sku_id: &str) -> Option<&SkuState> {
        self.skus.get(sku_id)
    }

    pub fn sku_mut(&mut self, sku_id: &str) -> Option<&mut SkuState> {
        self.skus.get_mut(sku_id)
    }

    pub fn contains(&self, sku_id: &str) -> bool {
        self.skus.contains_key(sku_id)
    }

    /// SKUs in id order.
    pub fn skus(&self) -> impl Iterator<Item = &SkuState> {
        self.skus.values()
    }

    pub fn skus_mut(&mut self) -> impl Iterator<Item = &mut SkuState> {
        self.skus.values_mut()
    }

    pub fn sku_ids(&self) -> Vec<SkuId> {
        self.skus.keys().cloned().collect()
    }

    pub fn stock_total(&self) -> u64 {
        self.skus.values().map(|s| s.on_hand() as u64).sum()
    }

    pub fn history(&self) -> &[DailySnapshot] {
        &self.history
    }

    pub fn record_snapshot(&mut self, snapshot: DailySnapshot) {
        self.history.push(snapshot);
    }

    /// Suspend ordering for `sku_id` through `until_day`.
    pub fn block_orders(&mut self, sku_id: &str, until_day: usize) {
        self.blocks.insert(sku_id.to_string(), until_day);
    }

    pub fn is_blocked(&self, sku_id: &str, day: usize) -> bool {
        self.blocks.get(sku_id).is_some_and(|&until| day <= until)
    }

    /// An owned, read-only copy of the SKU state as of `day`.
    pub fn view(&self, day: usize) -> KnowledgeView {
        KnowledgeView {
            day,
            skus: self.skus.values().cloned().collect(),
            blocked: self
                .skus
                .keys()
                .filter(|id| self.is_blocked(id, day))
                .cloned()
                .collect(),
        }
    }
}

/// Frozen SKU state handed to the planner. Later writes to the store never
/// show through.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeView {
    day: usize,
    skus: Vec<SkuState>,
    blocked: BTreeSet<SkuId>,
}

impl KnowledgeView {
    pub fn day(&self) -> usize {
        self.day
    }

    /// SKUs in id order.
    pub fn skus(&self) -> &[SkuState] {
        &self.skus
    }

    pub fn sku(&self, sku_id: &str) -> Option<&SkuState> {
        self.skus.iter().find(|s| s.sku_id == sku_id)
    }

    pub fn is_blocked(&self, sku_id: &str) -> bool {
        self.blocked.contains(sku_id)
    }
}
