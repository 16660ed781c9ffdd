//! Prediction engine
//!
//! Wires the detector set, the aggregator and the weight adapter together.
//! The engine is plain data: callers own it and decide when it learns.

pub mod aggregator;
pub mod weights;

#[cfg(test)]
mod tests;

pub use aggregator::{aggregate, AggregatedPrediction, Direction, MAX_CONFIDENCE, NEUTRAL_CONFIDENCE};
pub use weights::{
    EngineState, PatternPerformance, WeightAdapter, WeightTable, DEFAULT_LEARNING_RATE,
    MAX_WEIGHT, MIN_WEIGHT,
};

use crate::patterns::{detect_all, PatternId, PatternSignal};
use crate::types::{Candle, CandleColor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Detector output for one window together with the aggregated vote
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub signals: Vec<PatternSignal>,
    pub prediction: AggregatedPrediction,
}

impl Analysis {
    /// The signal a given pattern emitted for this window, if it fired
    pub fn signal_for(&self, pattern: PatternId) -> Option<&PatternSignal> {
        self.signals.iter().find(|s| s.pattern == pattern)
    }
}

/// Adapter view of one pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelStat {
    /// Rolling accuracy (0-100)
    pub accuracy: f64,
    pub weight: f64,
    pub trades: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PatternEngine {
    adapter: WeightAdapter,
}

impl PatternEngine {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            adapter: WeightAdapter::new(learning_rate),
        }
    }

    /// Run every detector over the window and vote with the current weights
    pub fn analyze(&self, window: &[Candle]) -> Analysis {
        let signals = detect_all(window);
        let prediction = aggregate(&signals, self.adapter.weights());
        Analysis { signals, prediction }
    }

    /// Feed the outcome of an admitted trade back to every contributing pattern.
    /// Returns whether the aggregated call was correct.
    pub fn learn(&mut self, prediction: &AggregatedPrediction, outcome: CandleColor) -> bool {
        let was_correct = prediction.direction.color() == Some(outcome);
        for pattern in &prediction.contributing {
            self.adapter.record_outcome(*pattern, was_correct);
        }
        was_correct
    }

    pub fn weights(&self) -> &WeightTable {
        self.adapter.weights()
    }

    pub fn performance(&self, pattern: PatternId) -> PatternPerformance {
        self.adapter.performance(pattern)
    }

    pub fn model_stats(&self) -> BTreeMap<PatternId, ModelStat> {
        PatternId::ALL
            .iter()
            .map(|pattern| {
                let perf = self.adapter.performance(*pattern);
                let stat = ModelStat {
                    accuracy: perf.accuracy() * 100.0,
                    weight: self.adapter.weights().get(*pattern),
                    trades: perf.total,
                };
                (*pattern, stat)
            })
            .collect()
    }

    pub fn snapshot(&self) -> EngineState {
        self.adapter.snapshot()
    }

    pub fn restore(&mut self, state: &EngineState) {
        self.adapter.restore(state);
    }
}
