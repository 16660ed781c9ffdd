//! Core candle types shared by every module

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction of a single candle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CandleColor {
    Up,
    Down,
}

impl CandleColor {
    /// Close strictly above open is UP; ties resolve to DOWN
    pub fn from_prices(open: f64, close: f64) -> Self {
        if close > open {
            CandleColor::Up
        } else {
            CandleColor::Down
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            CandleColor::Up => CandleColor::Down,
            CandleColor::Down => CandleColor::Up,
        }
    }
}

impl std::fmt::Display for CandleColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandleColor::Up => write!(f, "UP"),
            CandleColor::Down => write!(f, "DOWN"),
        }
    }
}

/// One OHLCV observation for an instrument
///
/// `color` is derived once in [`Candle::new`] and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    /// Instrument symbol (e.g., "BTCUSDT")
    pub instrument: String,
    /// Open time in milliseconds since the Unix epoch
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub color: CandleColor,
}

impl Candle {
    pub fn new(
        instrument: impl Into<String>,
        open_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            open_time,
            open,
            high,
            low,
            close,
            volume,
            color: CandleColor::from_prices(open, close),
        }
    }

    /// Absolute body size
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Body size relative to the open price
    pub fn body_ratio(&self) -> f64 {
        if self.open > 0.0 {
            self.body() / self.open
        } else {
            0.0
        }
    }

    pub fn upper_wick(&self) -> f64 {
        (self.high - self.open.max(self.close)).max(0.0)
    }

    pub fn lower_wick(&self) -> f64 {
        (self.open.min(self.close) - self.low).max(0.0)
    }

    pub fn open_time_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.open_time).single()
    }
}

/// Group a flat candle list into per-instrument series
///
/// Series keep their input order; the evaluator sorts them.
pub fn group_by_instrument(candles: Vec<Candle>) -> BTreeMap<String, Vec<Candle>> {
    let mut grouped: BTreeMap<String, Vec<Candle>> = BTreeMap::new();
    for candle in candles {
        grouped.entry(candle.instrument.clone()).or_default().push(candle);
    }
    grouped
}
