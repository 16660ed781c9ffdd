//! Binance spot REST client for klines

use super::{CandleRange, CandleRequest, CandleSource};
use crate::error::{OracleError, Result};
use crate::types::Candle;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
/// Largest page the klines endpoint serves
pub const MAX_KLINES_PER_REQUEST: u32 = 1000;

#[derive(Clone)]
pub struct BinanceClient {
    http: Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_klines(
        &self,
        instrument: &str,
        interval: &str,
        limit: u32,
        window: Option<(i64, i64)>,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let mut query = vec![
            ("symbol", instrument.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.min(MAX_KLINES_PER_REQUEST).to_string()),
        ];
        if let Some((start, end)) = window {
            query.push(("startTime", start.to_string()));
            query.push(("endTime", end.to_string()));
        }

        let resp = self.http.get(&url).query(&query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::DataFetch {
                instrument: instrument.to_string(),
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let rows: Vec<Vec<Value>> = resp.json().await?;
        debug!("{} {}: {} klines", instrument, interval, rows.len());
        parse_klines(instrument, &rows)
    }

    /// Page through `[start, end]` until `limit` candles or the range is exhausted
    async fn get_range(
        &self,
        instrument: &str,
        interval: &str,
        start: i64,
        end: i64,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let mut candles: Vec<Candle> = Vec::new();
        let mut cursor = start;

        while cursor <= end && (candles.len() as u32) < limit {
            let remaining = limit - candles.len() as u32;
            let page = self
                .get_klines(instrument, interval, remaining, Some((cursor, end)))
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            let next = last.open_time + 1;
            let full_page = page.len() as u32 >= remaining.min(MAX_KLINES_PER_REQUEST);
            candles.extend(page);
            if !full_page {
                break;
            }
            cursor = next;
        }

        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    async fn fetch_candles(&self, instrument: &str, request: &CandleRequest) -> Result<Vec<Candle>> {
        match request.range {
            CandleRange::Latest { limit } => {
                self.get_klines(instrument, &request.interval, limit, None).await
            }
            CandleRange::Between { start, end, limit } => {
                self.get_range(instrument, &request.interval, start, end, limit).await
            }
        }
    }
}

fn field_f64(row: &[Value], index: usize) -> Option<f64> {
    match row.get(index)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Parse raw kline rows: `[openTime, open, high, low, close, volume, ...]`
///
/// Prices arrive as decimal strings.
pub fn parse_klines(instrument: &str, rows: &[Vec<Value>]) -> Result<Vec<Candle>> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let malformed = || OracleError::DataFetch {
                instrument: instrument.to_string(),
                message: format!("malformed kline at row {}", index),
            };
            let open_time = row.first().and_then(Value::as_i64).ok_or_else(malformed)?;
            let open = field_f64(row, 1).ok_or_else(malformed)?;
            let high = field_f64(row, 2).ok_or_else(malformed)?;
            let low = field_f64(row, 3).ok_or_else(malformed)?;
            let close = field_f64(row, 4).ok_or_else(malformed)?;
            let volume = field_f64(row, 5).ok_or_else(malformed)?;
            Ok(Candle::new(instrument, open_time, open, high, low, close, volume))
        })
        .collect()
}
