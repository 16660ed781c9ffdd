//! Confidence-weighted voting over fired pattern signals

use super::weights::WeightTable;
use crate::patterns::{PatternId, PatternSignal};
use crate::types::CandleColor;
use serde::{Deserialize, Serialize};

/// Confidence reported when the vote has no winner
pub const NEUTRAL_CONFIDENCE: f64 = 0.3;
/// Upper bound on an aggregated confidence
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Final call of the vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    /// Candle color this direction bets on, if any
    pub fn color(self) -> Option<CandleColor> {
        match self {
            Direction::Up => Some(CandleColor::Up),
            Direction::Down => Some(CandleColor::Down),
            Direction::Neutral => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
            Direction::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

impl From<CandleColor> for Direction {
    fn from(color: CandleColor) -> Self {
        match color {
            CandleColor::Up => Direction::Up,
            CandleColor::Down => Direction::Down,
        }
    }
}

/// Aggregated prediction for the next candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPrediction {
    pub direction: Direction,
    pub confidence: f64,
    /// Every pattern that fired, whichever side it voted for
    pub contributing: Vec<PatternId>,
    pub score_up: f64,
    pub score_down: f64,
    pub rationale: String,
}

impl AggregatedPrediction {
    /// Whether this prediction counts as a trade under the given threshold
    pub fn is_admitted(&self, admission_threshold: f64) -> bool {
        self.direction != Direction::Neutral && self.confidence > admission_threshold
    }
}

/// Combine fired signals into one prediction
///
/// Pure: the same signals and weights always give the same result.
pub fn aggregate(signals: &[PatternSignal], weights: &WeightTable) -> AggregatedPrediction {
    let mut score_up = 0.0;
    let mut score_down = 0.0;
    let mut contributing = Vec::with_capacity(signals.len());
    let mut reasons = Vec::with_capacity(signals.len());

    for signal in signals {
        let score = signal.confidence * weights.get(signal.pattern);
        match signal.predicted {
            CandleColor::Up => score_up += score,
            CandleColor::Down => score_down += score,
        }
        contributing.push(signal.pattern);
        reasons.push(format!("{}: {}", signal.pattern, signal.rationale));
    }

    let (direction, confidence) = if signals.is_empty() {
        (Direction::Neutral, NEUTRAL_CONFIDENCE)
    } else if score_up == score_down {
        (Direction::Neutral, NEUTRAL_CONFIDENCE)
    } else {
        let margin = (score_up - score_down).abs() / (score_up + score_down);
        let direction = if score_up > score_down {
            Direction::Up
        } else {
            Direction::Down
        };
        (direction, margin.min(MAX_CONFIDENCE))
    };

    let rationale = if reasons.is_empty() {
        "No pattern identified".to_string()
    } else {
        format!(
            "{} ({:.3} up vs {:.3} down): {}",
            direction,
            score_up,
            score_down,
            reasons.join("; ")
        )
    };

    AggregatedPrediction {
        direction,
        confidence,
        contributing,
        score_up,
        score_down,
        rationale,
    }
}
