//! Cycle orchestration
//!
//! A single [`CycleOrchestrator`] owns the run state. `start()` runs one
//! cycle immediately and then arms a ticker; `stop()` resets the counters and
//! retires the ticker. Each start opens a new run epoch: a cycle only commits
//! its results if the epoch it was started under is still current.
//!
//! ```text
//! IDLE --start--> RUNNING --stop--> IDLE
//!                    |
//!                 ticker: fetch -> evaluate -> update state -> persist
//! ```

#[cfg(test)]
mod tests;

use crate::client::{fetch_batched, BatchConfig, CandleRequest, CandleSource};
use crate::config::Config;
use crate::engine::{AggregatedPrediction, ModelStat, PatternEngine, DEFAULT_LEARNING_RATE};
use crate::error::{OracleError, Result};
use crate::evaluation::{
    clean_series, EvaluationResult, WalkForwardConfig, WalkForwardEvaluator, LOOKBACK,
};
use crate::patterns::{PatternId, PatternSignal};
use crate::storage::{MetricsSnapshot, MetricsStore};
use crate::types::group_by_instrument;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How many patterns to name in the per-cycle summary
const TOP_PATTERNS_LOGGED: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CycleStatus {
    #[default]
    Idle,
    Running,
}

/// Run state as reported to callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleState {
    pub status: CycleStatus,
    pub cycle_count: u64,
    /// Best test accuracy seen this run (0-1)
    pub best_accuracy: f64,
    pub total_trades: u64,
    pub correct_trades: u64,
    pub failed_cycles: u64,
    pub last_accuracy: Option<f64>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl CycleState {
    pub fn is_running(&self) -> bool {
        self.status == CycleStatus::Running
    }
}

/// Everything a cycle needs to know
#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub interval: Duration,
    pub instruments: Vec<String>,
    pub request: CandleRequest,
    pub batch: BatchConfig,
    pub walk_forward: WalkForwardConfig,
    pub learning_rate: f64,
}

impl CycleConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.cycle.interval_secs),
            instruments: config.cycle.instruments.clone(),
            request: CandleRequest::latest(config.market_data.interval.clone(), config.market_data.limit),
            batch: config.market_data.batch_config(),
            walk_forward: config.evaluation.walk_forward(),
            learning_rate: config.evaluation.learning_rate,
        }
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            instruments: vec!["BTCUSDT".to_string()],
            request: CandleRequest::latest("1m", 500),
            batch: BatchConfig::default(),
            walk_forward: WalkForwardConfig::default(),
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

/// What happened to one cycle body
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(EvaluationResult),
    Failed(OracleError),
    /// The run was stopped or restarted while the cycle was in flight
    Discarded,
    /// No run is active
    Skipped,
}

/// Current engine prediction for one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalReport {
    pub instrument: String,
    /// Open time of the newest candle considered (ms)
    pub as_of: i64,
    pub candles_used: usize,
    pub prediction: AggregatedPrediction,
    pub signals: Vec<PatternSignal>,
}

pub struct CycleOrchestrator {
    config: CycleConfig,
    source: Arc<dyn CandleSource>,
    store: Arc<dyn MetricsStore>,
    evaluator: WalkForwardEvaluator,
    engine: Mutex<PatternEngine>,
    state: Mutex<CycleState>,
    /// Current run epoch; bumped by every start and stop
    epoch: watch::Sender<u64>,
    /// Serializes cycle bodies
    gate: tokio::sync::Mutex<()>,
    /// Serializes metrics writes so a stop's reset is never overwritten by a retired cycle
    persist: tokio::sync::Mutex<()>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    run_id: Uuid,
}

impl CycleOrchestrator {
    pub fn new(
        config: CycleConfig,
        source: Arc<dyn CandleSource>,
        store: Arc<dyn MetricsStore>,
    ) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            evaluator: WalkForwardEvaluator::new(config.walk_forward),
            engine: Mutex::new(PatternEngine::new(config.learning_rate)),
            config,
            source,
            store,
            state: Mutex::new(CycleState::default()),
            epoch,
            gate: tokio::sync::Mutex::new(()),
            persist: tokio::sync::Mutex::new(()),
            ticker: Mutex::new(None),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn current_epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    fn bump_epoch(&self) -> u64 {
        self.epoch.send_modify(|epoch| *epoch += 1);
        self.current_epoch()
    }

    /// Restore engine weights and run counters from the store. Status stays IDLE.
    pub async fn rehydrate(&self) -> Result<()> {
        if let Some(engine_state) = self.store.load_engine().await? {
            self.engine.lock().restore(&engine_state);
            info!("♻️ Restored engine state saved at {}", engine_state.saved_at);
        }

        if let Some(metrics) = self.store.load_metrics().await? {
            if metrics.cycle_count == 0 {
                debug!("Stored metrics record a reset, counters start at zero");
                return Ok(());
            }
            let mut state = self.state.lock();
            state.cycle_count = metrics.cycle_count;
            state.best_accuracy = metrics.best_accuracy;
            state.total_trades = metrics.cumulative_trades;
            state.correct_trades = metrics.cumulative_correct;
            state.last_accuracy = Some(metrics.accuracy);
            state.last_cycle_at = Some(metrics.last_update);
            info!(
                "♻️ Restored metrics: {} cycles, best accuracy {:.2}%",
                metrics.cycle_count,
                metrics.best_accuracy * 100.0
            );
        }
        Ok(())
    }

    /// Begin cycling. A no-op returning the current state when already running.
    pub async fn start(self: &Arc<Self>) -> CycleState {
        let epoch = {
            let mut state = self.state.lock();
            if state.is_running() {
                debug!("Start requested while running, ignoring");
                return state.clone();
            }
            state.status = CycleStatus::Running;
            self.bump_epoch()
        };

        info!(
            "🚀 Starting cycles over {} instruments every {:?}",
            self.config.instruments.len(),
            self.config.interval
        );
        self.run_cycle(epoch).await;

        if self.current_epoch() == epoch {
            let handle = tokio::spawn(Arc::clone(self).ticker(epoch));
            // A replaced handle belongs to a retired epoch and exits on its own
            self.ticker.lock().replace(handle);
        }
        self.status()
    }

    /// Stop cycling and reset the counters, both in memory and in the store.
    /// In-flight work is not aborted; its results are discarded.
    pub async fn stop(&self) -> CycleState {
        let snapshot = {
            let mut state = self.state.lock();
            *state = CycleState::default();
            self.bump_epoch();
            state.clone()
        };
        self.ticker.lock().take();
        info!("🛑 Cycles stopped");

        let reset = MetricsSnapshot::reset(self.model_stats(), self.run_id);
        let _persist = self.persist.lock().await;
        if let Err(e) = self.store.upsert_metrics(&reset).await {
            warn!("⚠️ Failed to persist counter reset: {}", e);
        }
        snapshot
    }

    pub fn status(&self) -> CycleState {
        self.state.lock().clone()
    }

    /// Run one cycle for the active run, if any
    pub async fn tick(&self) -> CycleOutcome {
        let epoch = {
            let state = self.state.lock();
            if !state.is_running() {
                return CycleOutcome::Skipped;
            }
            self.current_epoch()
        };
        self.run_cycle(epoch).await
    }

    pub fn model_stats(&self) -> BTreeMap<PatternId, ModelStat> {
        self.engine.lock().model_stats()
    }

    /// Latest prediction for one instrument with the current weights
    pub async fn signal(&self, instrument: &str) -> Result<SignalReport> {
        let request = CandleRequest::latest(self.config.request.interval.clone(), LOOKBACK as u32);
        let fetch = self.source.fetch_candles(instrument, &request);
        let candles = match tokio::time::timeout(self.config.batch.request_timeout, fetch).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(OracleError::Timeout {
                    instrument: instrument.to_string(),
                    timeout: self.config.batch.request_timeout,
                })
            }
        };

        let series = clean_series(instrument, &candles);
        let Some(last) = series.last() else {
            return Err(OracleError::NoData(format!("no candles for {}", instrument)));
        };
        let as_of = last.open_time;

        let analysis = self.engine.lock().analyze(&series);
        Ok(SignalReport {
            instrument: instrument.to_string(),
            as_of,
            candles_used: series.len(),
            prediction: analysis.prediction,
            signals: analysis.signals,
        })
    }

    async fn ticker(self: Arc<Self>, epoch: u64) {
        let period = self.config.interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut changes = self.epoch.subscribe();

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = changes.changed() => {
                    if changed.is_err() || *changes.borrow() != epoch {
                        break;
                    }
                    continue;
                }
            }
            if self.current_epoch() != epoch {
                break;
            }
            self.run_cycle(epoch).await;
        }
        debug!("Ticker for epoch {} exited", epoch);
    }

    async fn run_cycle(&self, epoch: u64) -> CycleOutcome {
        let _gate = self.gate.lock().await;
        if self.current_epoch() != epoch {
            return CycleOutcome::Discarded;
        }

        match self.cycle_body(epoch).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("❌ Cycle failed: {}", e);
                let mut state = self.state.lock();
                if self.current_epoch() == epoch {
                    state.failed_cycles += 1;
                }
                CycleOutcome::Failed(e)
            }
        }
    }

    async fn cycle_body(&self, epoch: u64) -> Result<CycleOutcome> {
        let started = Instant::now();

        let report = fetch_batched(
            self.source.as_ref(),
            &self.config.instruments,
            &self.config.request,
            &self.config.batch,
        )
        .await?;
        if report.candles.is_empty() {
            return Err(OracleError::NoData(format!(
                "no candles from {} instruments ({} failed)",
                self.config.instruments.len(),
                report.failed.len()
            )));
        }
        if self.current_epoch() != epoch {
            info!("Run stopped during fetch, discarding cycle");
            return Ok(CycleOutcome::Discarded);
        }

        let by_instrument = group_by_instrument(report.candles);
        // Learn on a copy; it replaces the live engine only if the run is still current
        let mut candidate = self.engine.lock().clone();
        let result = self.evaluator.evaluate(&mut candidate, &by_instrument);
        let engine_state = candidate.snapshot();
        let model_stats = candidate.model_stats();

        let snapshot = {
            let mut state = self.state.lock();
            if self.current_epoch() != epoch {
                info!("Run stopped during evaluation, discarding cycle");
                return Ok(CycleOutcome::Discarded);
            }
            *self.engine.lock() = candidate;
            state.cycle_count += 1;
            state.total_trades += result.total_trades;
            state.correct_trades += result.correct_trades;
            state.best_accuracy = state.best_accuracy.max(result.accuracy);
            state.last_accuracy = Some(result.accuracy);
            let now = Utc::now();
            state.last_cycle_at = Some(now);

            MetricsSnapshot {
                accuracy: result.accuracy,
                learning_phase: result.learning_phase,
                total_trades: result.total_trades,
                correct_trades: result.correct_trades,
                data_points: result.data_points as u64,
                last_update: now,
                cycle_count: state.cycle_count,
                best_accuracy: state.best_accuracy,
                cumulative_trades: state.total_trades,
                cumulative_correct: state.correct_trades,
                per_pattern_stats: result.per_pattern_stats.clone(),
                model_weights: model_stats,
                run_id: self.run_id,
            }
        };

        info!(
            "🔄 Cycle {}: accuracy {:.2}% ({}/{} trades), best {:.2}%, phase {}, {} candles in {:.1}s",
            snapshot.cycle_count,
            result.accuracy * 100.0,
            result.correct_trades,
            result.total_trades,
            snapshot.best_accuracy * 100.0,
            result.learning_phase,
            result.data_points,
            started.elapsed().as_secs_f64()
        );
        log_top_patterns(&result);

        let _persist = self.persist.lock().await;
        if self.current_epoch() != epoch {
            debug!("Run stopped before persisting, keeping the reset");
            return Ok(CycleOutcome::Discarded);
        }
        if let Err(e) = self.store.upsert_metrics(&snapshot).await {
            warn!("⚠️ Failed to persist metrics: {}", e);
        }
        if let Err(e) = self.store.save_engine(&engine_state).await {
            warn!("⚠️ Failed to persist engine state: {}", e);
        }

        Ok(CycleOutcome::Completed(result))
    }
}

fn log_top_patterns(result: &EvaluationResult) {
    let mut ranked: Vec<_> = result
        .per_pattern_stats
        .iter()
        .filter(|(_, stats)| stats.total > 0)
        .collect();
    ranked.sort_by(|a, b| b.1.accuracy().total_cmp(&a.1.accuracy()));

    for (pattern, stats) in ranked.into_iter().take(TOP_PATTERNS_LOGGED) {
        info!(
            "   🏆 {}: {:.2}% ({}/{})",
            pattern,
            stats.accuracy() * 100.0,
            stats.correct,
            stats.total
        );
    }
}
