//! Per-pattern vote weights and their online adaptation

use crate::patterns::PatternId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_WEIGHT: f64 = 0.01;
pub const MAX_WEIGHT: f64 = 0.5;
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;

fn clamp_weight(weight: f64) -> f64 {
    if weight.is_nan() {
        MIN_WEIGHT
    } else {
        weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
    }
}

/// Pattern -> vote weight, always within [`MIN_WEIGHT`, `MAX_WEIGHT`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable(BTreeMap<PatternId, f64>);

impl WeightTable {
    /// Fixed starting weights for every detector
    pub fn defaults() -> Self {
        Self(
            PatternId::ALL
                .iter()
                .map(|p| (*p, p.default_weight()))
                .collect(),
        )
    }

    pub fn get(&self, pattern: PatternId) -> f64 {
        self.0
            .get(&pattern)
            .copied()
            .unwrap_or_else(|| pattern.default_weight())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PatternId, &f64)> {
        self.0.iter()
    }

    fn set(&mut self, pattern: PatternId, weight: f64) {
        self.0.insert(pattern, clamp_weight(weight));
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Running outcome counts for one pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternPerformance {
    pub total: u64,
    pub correct: u64,
}

impl PatternPerformance {
    /// correct / total, 0 before the first observation
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    fn record(&mut self, was_correct: bool) {
        self.total += 1;
        if was_correct {
            self.correct += 1;
        }
    }
}

/// Serializable engine learning state, persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    pub weights: BTreeMap<PatternId, f64>,
    pub performance: BTreeMap<PatternId, PatternPerformance>,
    pub learning_rate: f64,
    pub saved_at: DateTime<Utc>,
}

/// Owns the weight table; the only writer of weights
#[derive(Debug, Clone)]
pub struct WeightAdapter {
    weights: WeightTable,
    performance: BTreeMap<PatternId, PatternPerformance>,
    learning_rate: f64,
}

impl WeightAdapter {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            weights: WeightTable::defaults(),
            performance: BTreeMap::new(),
            learning_rate,
        }
    }

    /// Record whether a trade this pattern contributed to was correct and
    /// nudge its weight toward its rolling accuracy. Returns the new weight.
    pub fn record_outcome(&mut self, pattern: PatternId, was_correct: bool) -> f64 {
        let perf = self.performance.entry(pattern).or_default();
        perf.record(was_correct);
        let accuracy = perf.accuracy();

        let adjusted = self.weights.get(pattern) + self.learning_rate * (accuracy - 0.5);
        self.weights.set(pattern, adjusted);
        self.weights.get(pattern)
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn performance(&self, pattern: PatternId) -> PatternPerformance {
        self.performance.get(&pattern).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> EngineState {
        EngineState {
            weights: self.weights.0.clone(),
            performance: self.performance.clone(),
            learning_rate: self.learning_rate,
            saved_at: Utc::now(),
        }
    }

    /// Load persisted weights and counts. Out-of-range values are repaired;
    /// the configured learning rate is kept.
    pub fn restore(&mut self, state: &EngineState) {
        let mut weights = WeightTable::defaults();
        for (pattern, weight) in &state.weights {
            weights.set(*pattern, *weight);
        }
        self.weights = weights;

        self.performance = state
            .performance
            .iter()
            .map(|(pattern, perf)| {
                let repaired = PatternPerformance {
                    total: perf.total,
                    correct: perf.correct.min(perf.total),
                };
                (*pattern, repaired)
            })
            .collect();
    }
}

impl Default for WeightAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE)
    }
}
