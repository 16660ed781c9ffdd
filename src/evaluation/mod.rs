//! Walk-forward evaluation
//!
//! Each instrument's series is split chronologically into a training segment
//! and a test segment. The engine learns only from training outcomes; the
//! reported accuracy comes from the test segment alone.


use crate::engine::PatternEngine;
use crate::patterns::{warmup_len, PatternId};
use crate::types::Candle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Longest trailing window handed to the detectors
pub const LOOKBACK: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    /// Share of each series used for training (0-1, exclusive)
    pub train_fraction: f64,
    /// Aggregated confidence a prediction must strictly exceed to count
    pub admission_threshold: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            admission_threshold: 0.4,
        }
    }
}

/// Coarse maturity label derived from test accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LearningPhase {
    Initial,
    Developing,
    Learning,
    Optimizing,
    Ready,
}

impl LearningPhase {
    /// `accuracy` is a fraction (0-1)
    pub fn from_accuracy(accuracy: f64) -> Self {
        let pct = accuracy * 100.0;
        if pct >= 95.0 {
            LearningPhase::Ready
        } else if pct >= 80.0 {
            LearningPhase::Optimizing
        } else if pct >= 60.0 {
            LearningPhase::Learning
        } else if pct >= 40.0 {
            LearningPhase::Developing
        } else {
            LearningPhase::Initial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LearningPhase::Initial => "INITIAL",
            LearningPhase::Developing => "DEVELOPING",
            LearningPhase::Learning => "LEARNING",
            LearningPhase::Optimizing => "OPTIMIZING",
            LearningPhase::Ready => "READY",
        }
    }
}

impl std::str::FromStr for LearningPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL" => Ok(LearningPhase::Initial),
            "DEVELOPING" => Ok(LearningPhase::Developing),
            "LEARNING" => Ok(LearningPhase::Learning),
            "OPTIMIZING" => Ok(LearningPhase::Optimizing),
            "READY" => Ok(LearningPhase::Ready),
            other => Err(format!("unknown learning phase: {}", other)),
        }
    }
}

impl std::fmt::Display for LearningPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slice of each test segment a trade falls in: first 30%, next 40%, last 30%
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPhase {
    Early,
    Middle,
    Recent,
}

impl TestPhase {
    pub const ALL: [TestPhase; 3] = [TestPhase::Early, TestPhase::Middle, TestPhase::Recent];

    /// Phase of position `i` in a segment of `len` candles
    pub fn of(i: usize, len: usize) -> Self {
        let early_end = (len as f64 * 0.3).floor() as usize;
        let middle_end = (len as f64 * 0.7).floor() as usize;
        if i < early_end {
            TestPhase::Early
        } else if i < middle_end {
            TestPhase::Middle
        } else {
            TestPhase::Recent
        }
    }
}

/// Test-pass trade counts, per pattern or per phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternStats {
    /// Admitted trades counted here
    pub total: u64,
    /// Of those, how many the aggregated prediction got right
    pub correct: u64,
}

impl PatternStats {
    fn record(&mut self, was_correct: bool) {
        self.total += 1;
        if was_correct {
            self.correct += 1;
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Test-phase accuracy (0-1), 0 when no trade was admitted
    pub accuracy: f64,
    pub total_trades: u64,
    pub correct_trades: u64,
    pub per_pattern_stats: BTreeMap<PatternId, PatternStats>,
    /// Test trades split by where they fall in each test segment
    pub phase_results: BTreeMap<TestPhase, PatternStats>,
    pub training_trades: u64,
    pub training_correct: u64,
    /// Candles that survived cleaning, across all instruments
    pub data_points: usize,
    pub instruments_evaluated: usize,
    /// Instruments whose test segment is too short to score
    pub instruments_skipped: Vec<String>,
    pub learning_phase: LearningPhase,
}

#[derive(Debug, Default)]
struct PassTally {
    trades: u64,
    correct: u64,
}

/// Split at `floor(len * train_fraction)`, order preserved
pub fn split_chronological(series: &[Candle], train_fraction: f64) -> (&[Candle], &[Candle]) {
    let fraction = train_fraction.clamp(0.0, 1.0);
    let cut = ((series.len() as f64) * fraction).floor() as usize;
    series.split_at(cut.min(series.len()))
}

/// Sort by open time, drop duplicate timestamps and foreign candles
pub fn clean_series(instrument: &str, candles: &[Candle]) -> Vec<Candle> {
    let mut series: Vec<Candle> = candles
        .iter()
        .filter(|c| c.instrument == instrument)
        .cloned()
        .collect();
    let foreign = candles.len() - series.len();
    if foreign > 0 {
        warn!("⚠️ Dropped {} candles not belonging to {}", foreign, instrument);
    }
    series.sort_by_key(|c| c.open_time);
    series.dedup_by_key(|c| c.open_time);
    series
}

pub struct WalkForwardEvaluator {
    config: WalkForwardConfig,
}

impl WalkForwardEvaluator {
    pub fn new(config: WalkForwardConfig) -> Self {
        Self { config }
    }

    /// Train on every instrument's early segment, then score the late segments
    pub fn evaluate(
        &self,
        engine: &mut PatternEngine,
        candles_by_instrument: &BTreeMap<String, Vec<Candle>>,
    ) -> EvaluationResult {
        let mut data_points = 0;
        let mut skipped = Vec::new();
        let mut splits = Vec::with_capacity(candles_by_instrument.len());

        for (instrument, candles) in candles_by_instrument {
            let series = clean_series(instrument, candles);
            data_points += series.len();

            let (train, test) = split_chronological(&series, self.config.train_fraction);
            // A short train segment only means nothing is learned from it
            if positions(test).is_empty() {
                debug!(
                    "{}: test segment too short to score ({} candles), skipping",
                    instrument,
                    test.len()
                );
                skipped.push(instrument.clone());
            }
            let cut = train.len();
            splits.push((series, cut));
        }

        let mut training = PassTally::default();
        for (series, cut) in &splits {
            self.train_pass(engine, &series[..*cut], &mut training);
        }

        let mut testing = PassTally::default();
        let mut per_pattern: BTreeMap<PatternId, PatternStats> = BTreeMap::new();
        let mut phases: BTreeMap<TestPhase, PatternStats> =
            TestPhase::ALL.iter().map(|p| (*p, PatternStats::default())).collect();
        for (series, cut) in &splits {
            self.test_pass(engine, &series[*cut..], &mut testing, &mut per_pattern, &mut phases);
        }

        let accuracy = if testing.trades == 0 {
            0.0
        } else {
            testing.correct as f64 / testing.trades as f64
        };

        EvaluationResult {
            accuracy,
            total_trades: testing.trades,
            correct_trades: testing.correct,
            per_pattern_stats: per_pattern,
            phase_results: phases,
            training_trades: training.trades,
            training_correct: training.correct,
            data_points,
            instruments_evaluated: splits.len() - skipped.len(),
            instruments_skipped: skipped,
            learning_phase: LearningPhase::from_accuracy(accuracy),
        }
    }

    fn train_pass(&self, engine: &mut PatternEngine, segment: &[Candle], tally: &mut PassTally) {
        for i in positions(segment) {
            let analysis = engine.analyze(window_ending_at(segment, i));
            if !analysis.prediction.is_admitted(self.config.admission_threshold) {
                continue;
            }
            let was_correct = engine.learn(&analysis.prediction, segment[i + 1].color);
            tally.trades += 1;
            if was_correct {
                tally.correct += 1;
            }
        }
    }

    fn test_pass(
        &self,
        engine: &PatternEngine,
        segment: &[Candle],
        tally: &mut PassTally,
        per_pattern: &mut BTreeMap<PatternId, PatternStats>,
        phases: &mut BTreeMap<TestPhase, PatternStats>,
    ) {
        for i in positions(segment) {
            let analysis = engine.analyze(window_ending_at(segment, i));
            if !analysis.prediction.is_admitted(self.config.admission_threshold) {
                continue;
            }
            let was_correct = analysis.prediction.direction.color() == Some(segment[i + 1].color);
            tally.trades += 1;
            if was_correct {
                tally.correct += 1;
            }

            // Every fired pattern shares the trade's outcome, as in training
            for signal in &analysis.signals {
                per_pattern.entry(signal.pattern).or_default().record(was_correct);
            }
            phases
                .entry(TestPhase::of(i, segment.len()))
                .or_default()
                .record(was_correct);
        }
    }
}

impl Default for WalkForwardEvaluator {
    fn default() -> Self {
        Self::new(WalkForwardConfig::default())
    }
}

/// Indices with a full warmup behind them and a next candle ahead
fn positions(segment: &[Candle]) -> std::ops::Range<usize> {
    let start = warmup_len();
    let end = segment.len().saturating_sub(1);
    start..end.max(start)
}

fn window_ending_at(segment: &[Candle], i: usize) -> &[Candle] {
    let start = (i + 1).saturating_sub(LOOKBACK);
    &segment[start..=i]
}
