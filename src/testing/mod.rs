//! Test fixtures
//!
//! Candle builders and a scripted [`CandleSource`] for tests and the offline
//! `simulate` command.

use crate::client::{CandleRange, CandleRequest, CandleSource};
use crate::error::{OracleError, Result};
use crate::types::{Candle, CandleColor};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One-minute spacing between synthetic candles
pub const CANDLE_SPACING_MS: i64 = 60_000;
/// Arbitrary fixed origin for synthetic series (2024-01-01T00:00:00Z)
pub const SERIES_START_MS: i64 = 1_704_067_200_000;

/// Candle without wicks at position `index` of a synthetic series
pub fn candle(instrument: &str, index: i64, open: f64, close: f64) -> Candle {
    Candle::new(
        instrument,
        SERIES_START_MS + index * CANDLE_SPACING_MS,
        open,
        open.max(close),
        open.min(close),
        close,
        1.0,
    )
}

/// Series with the given colors; every candle has the same 1% body
pub fn series_from_colors(instrument: &str, colors: &[CandleColor]) -> Vec<Candle> {
    colors
        .iter()
        .enumerate()
        .map(|(i, color)| {
            let close = match color {
                CandleColor::Up => 101.0,
                CandleColor::Down => 99.0,
            };
            candle(instrument, i as i64, 100.0, close)
        })
        .collect()
}

/// Strictly alternating UP/DOWN series starting with UP
pub fn alternating_series(instrument: &str, len: usize) -> Vec<Candle> {
    let colors: Vec<CandleColor> = (0..len)
        .map(|i| if i % 2 == 0 { CandleColor::Up } else { CandleColor::Down })
        .collect();
    series_from_colors(instrument, &colors)
}

/// Seeded random walk starting at 100 with up to 0.5% moves and small wicks
pub fn random_walk(instrument: &str, len: usize, seed: u64) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = 100.0_f64;

    (0..len)
        .map(|i| {
            let open = price;
            let close = open * (1.0 + rng.random_range(-0.005..0.005));
            let high = open.max(close) * (1.0 + rng.random_range(0.0..0.003));
            let low = open.min(close) * (1.0 - rng.random_range(0.0..0.003));
            let volume = rng.random_range(10.0..1_000.0);
            price = close;
            Candle::new(
                instrument,
                SERIES_START_MS + i as i64 * CANDLE_SPACING_MS,
                open,
                high,
                low,
                close,
                volume,
            )
        })
        .collect()
}

/// In-memory [`CandleSource`] serving fixed series
///
/// Instruments can be marked as failing or slow to exercise the skip and
/// timeout paths.
#[derive(Default)]
pub struct StaticCandleSource {
    series: HashMap<String, Vec<Candle>>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: AtomicUsize,
}

impl StaticCandleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, instrument: &str, candles: Vec<Candle>) -> Self {
        self.series.insert(instrument.to_string(), candles);
        self
    }

    /// Make every fetch for `instrument` fail until [`Self::recover`]
    pub fn fail(&self, instrument: &str) {
        self.failing.lock().insert(instrument.to_string());
    }

    pub fn recover(&self, instrument: &str) {
        self.failing.lock().remove(instrument);
        self.delays.lock().remove(instrument);
    }

    /// Hold every fetch for `instrument` for `delay` before answering
    pub fn slow_down(&self, instrument: &str, delay: Duration) {
        self.delays.lock().insert(instrument.to_string(), delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandleSource for StaticCandleSource {
    async fn fetch_candles(&self, instrument: &str, request: &CandleRequest) -> Result<Vec<Candle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delays.lock().get(instrument).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(instrument) {
            return Err(OracleError::DataFetch {
                instrument: instrument.to_string(),
                message: "scripted failure".to_string(),
            });
        }

        let series = self.series.get(instrument).cloned().unwrap_or_default();
        let candles = match request.range {
            CandleRange::Latest { limit } => {
                let skip = series.len().saturating_sub(limit as usize);
                series.into_iter().skip(skip).collect()
            }
            CandleRange::Between { start, end, limit } => series
                .into_iter()
                .filter(|c| c.open_time >= start && c.open_time <= end)
                .take(limit as usize)
                .collect(),
        };
        Ok(candles)
    }
}
