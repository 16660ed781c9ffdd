//! Candle pattern detection
//!
//! A fixed library of stateless detectors. Each one inspects a trailing
//! window of candles (chronological, most recent last) and either proposes
//! the color of the next candle or abstains.
//!
//! Confidence values are heuristic magnitudes derived from body, wick and
//! run-length ratios. They are not calibrated probabilities.

pub mod detectors;


use crate::types::{Candle, CandleColor};
use serde::{Deserialize, Serialize};

pub use detectors::{
    detect_breakout_after_run, detect_dual_alternation, detect_engulfing,
    detect_extremum_reversal, detect_indecision_reversal, detect_majority,
    detect_minority, detect_odd_run_reversal, detect_triple_continuation,
};

/// Identity of a detector; also the key of the weight table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternId {
    MajorityOfThree,
    MinorityOfThree,
    TripleContinuation,
    DualAlternation,
    BreakoutAfterRun,
    Engulfing,
    IndecisionReversal,
    OddRunReversal,
    ExtremumReversal,
}

impl PatternId {
    /// Every detector, in evaluation order
    pub const ALL: [PatternId; 9] = [
        PatternId::MajorityOfThree,
        PatternId::MinorityOfThree,
        PatternId::TripleContinuation,
        PatternId::DualAlternation,
        PatternId::BreakoutAfterRun,
        PatternId::Engulfing,
        PatternId::IndecisionReversal,
        PatternId::OddRunReversal,
        PatternId::ExtremumReversal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternId::MajorityOfThree => "majority_of_three",
            PatternId::MinorityOfThree => "minority_of_three",
            PatternId::TripleContinuation => "triple_continuation",
            PatternId::DualAlternation => "dual_alternation",
            PatternId::BreakoutAfterRun => "breakout_after_run",
            PatternId::Engulfing => "engulfing",
            PatternId::IndecisionReversal => "indecision_reversal",
            PatternId::OddRunReversal => "odd_run_reversal",
            PatternId::ExtremumReversal => "extremum_reversal",
        }
    }

    /// Shortest window the detector can evaluate
    pub fn min_window(&self) -> usize {
        match self {
            PatternId::Engulfing | PatternId::IndecisionReversal => 2,
            PatternId::MajorityOfThree
            | PatternId::MinorityOfThree
            | PatternId::TripleContinuation
            | PatternId::OddRunReversal
            | PatternId::ExtremumReversal => 3,
            PatternId::DualAlternation | PatternId::BreakoutAfterRun => 4,
        }
    }

    /// Vote weight assigned at engine construction
    pub fn default_weight(&self) -> f64 {
        match self {
            PatternId::MajorityOfThree => 0.10,
            PatternId::MinorityOfThree => 0.10,
            PatternId::TripleContinuation => 0.15,
            PatternId::DualAlternation => 0.10,
            PatternId::BreakoutAfterRun => 0.12,
            PatternId::Engulfing => 0.18,
            PatternId::IndecisionReversal => 0.14,
            PatternId::OddRunReversal => 0.10,
            PatternId::ExtremumReversal => 0.12,
        }
    }

    /// Run this detector over a window
    pub fn detect(&self, window: &[Candle]) -> Option<PatternSignal> {
        match self {
            PatternId::MajorityOfThree => detect_majority(window),
            PatternId::MinorityOfThree => detect_minority(window),
            PatternId::TripleContinuation => detect_triple_continuation(window),
            PatternId::DualAlternation => detect_dual_alternation(window),
            PatternId::BreakoutAfterRun => detect_breakout_after_run(window),
            PatternId::Engulfing => detect_engulfing(window),
            PatternId::IndecisionReversal => detect_indecision_reversal(window),
            PatternId::OddRunReversal => detect_odd_run_reversal(window),
            PatternId::ExtremumReversal => detect_extremum_reversal(window),
        }
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detector's proposal for the next candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSignal {
    pub pattern: PatternId,
    pub predicted: CandleColor,
    /// Heuristic strength (0-1)
    pub confidence: f64,
    /// Human-readable explanation
    pub rationale: String,
}

/// Run every detector over the window
pub fn detect_all(window: &[Candle]) -> Vec<PatternSignal> {
    debug_assert!(
        window.windows(2).all(|w| w[0].instrument == w[1].instrument),
        "detector window mixes instruments"
    );

    PatternId::ALL
        .iter()
        .filter_map(|pattern| pattern.detect(window))
        .collect()
}

/// Longest minimum window across the detector set
pub fn warmup_len() -> usize {
    PatternId::ALL
        .iter()
        .map(|p| p.min_window())
        .max()
        .unwrap_or(0)
}
