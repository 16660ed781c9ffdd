//! Market data sources
//!
//! [`CandleSource`] is the seam between the orchestrator and the exchange.
//! [`fetch_batched`] fans requests out in bounded chunks and keeps going when
//! individual instruments fail.

pub mod binance;


pub use binance::BinanceClient;

use crate::error::{OracleError, Result};
use crate::types::Candle;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which slice of history to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleRange {
    /// Most recent `limit` candles
    Latest { limit: u32 },
    /// Candles opening within `[start, end]` (ms), capped at `limit`
    Between { start: i64, end: i64, limit: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleRequest {
    /// Exchange interval string (e.g., "1m")
    pub interval: String,
    pub range: CandleRange,
}

impl CandleRequest {
    pub fn latest(interval: impl Into<String>, limit: u32) -> Self {
        Self {
            interval: interval.into(),
            range: CandleRange::Latest { limit },
        }
    }

    pub fn between(interval: impl Into<String>, start: i64, end: i64, limit: u32) -> Self {
        Self {
            interval: interval.into(),
            range: CandleRange::Between { start, end, limit },
        }
    }
}

/// Anything that can produce candles for an instrument
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch_candles(&self, instrument: &str, request: &CandleRequest) -> Result<Vec<Candle>>;
}

/// Fan-out limits for [`fetch_batched`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchConfig {
    /// Instruments fetched concurrently per chunk
    pub batch_size: usize,
    /// Stagger between request starts inside a chunk
    pub request_delay: Duration,
    /// Pause between chunks
    pub batch_delay: Duration,
    /// Upper bound on a single fetch
    pub request_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            request_delay: Duration::from_millis(50),
            batch_delay: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of a batched fetch
#[derive(Debug, Default)]
pub struct FetchReport {
    pub candles: Vec<Candle>,
    /// Instruments skipped this round, with the reason
    pub failed: Vec<(String, OracleError)>,
}

impl FetchReport {
    pub fn succeeded(&self) -> usize {
        let mut instruments: Vec<&str> = self.candles.iter().map(|c| c.instrument.as_str()).collect();
        instruments.sort_unstable();
        instruments.dedup();
        instruments.len()
    }
}

async fn fetch_one(
    source: &dyn CandleSource,
    instrument: &str,
    request: &CandleRequest,
    timeout: Duration,
) -> Result<Vec<Candle>> {
    match tokio::time::timeout(timeout, source.fetch_candles(instrument, request)).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout {
            instrument: instrument.to_string(),
            timeout,
        }),
    }
}

/// Fetch every instrument in chunks of `batch_size`
///
/// Instrument-scoped failures are collected in the report. Any other error
/// aborts the whole fetch.
pub async fn fetch_batched(
    source: &dyn CandleSource,
    instruments: &[String],
    request: &CandleRequest,
    config: &BatchConfig,
) -> Result<FetchReport> {
    let batch_size = config.batch_size.max(1);
    let chunks = instruments.chunks(batch_size).count();
    let mut report = FetchReport::default();

    for (index, chunk) in instruments.chunks(batch_size).enumerate() {
        debug!("Fetching chunk {}/{} ({} instruments)", index + 1, chunks, chunk.len());

        let requests = chunk.iter().enumerate().map(|(slot, instrument)| async move {
            let stagger = config.request_delay * slot as u32;
            if !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
            let result = fetch_one(source, instrument, request, config.request_timeout).await;
            (instrument, result)
        });

        for (instrument, result) in join_all(requests).await {
            match result {
                Ok(candles) => report.candles.extend(candles),
                Err(e) if e.is_instrument_scoped() => {
                    warn!("⚠️ Skipping {}: {}", instrument, e);
                    report.failed.push((instrument.clone(), e));
                }
                Err(e) => return Err(e),
            }
        }

        if index + 1 < chunks && !config.batch_delay.is_zero() {
            tokio::time::sleep(config.batch_delay).await;
        }
    }

    info!(
        "📥 Fetched {} candles for {}/{} instruments",
        report.candles.len(),
        report.succeeded(),
        instruments.len()
    );
    Ok(report)
}
