//! Candle Oracle
//!
//! Predicts the color of the next candle by combining heuristic pattern
//! detectors through an adaptively weighted vote, and keeps re-evaluating
//! that vote with a chronological train/test walk-forward over live klines.
//!
//! ## Architecture
//!
//! ```text
//! HTTP control (monitor) → Cycle orchestrator → Market data (client)
//!                                  ↓
//!                 Walk-forward evaluator → Engine (patterns → aggregator ↔ weights)
//!                                  ↓
//!                          Metrics store (storage)
//! ```

pub mod client;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod monitor;
pub mod patterns;
pub mod storage;
pub mod testing;
pub mod types;

#[cfg(test)]
mod types_tests;
