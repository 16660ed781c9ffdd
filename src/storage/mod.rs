//! Persistence of cycle metrics and engine state
//!
//! Both are singleton rows: every write replaces the previous one.

pub mod memory;
pub mod sqlite;


pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::engine::{EngineState, ModelStat};
use crate::error::Result;
use crate::evaluation::{LearningPhase, PatternStats};
use crate::patterns::PatternId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Latest cycle outcome plus running totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Test accuracy of the latest cycle (0-1)
    pub accuracy: f64,
    pub learning_phase: LearningPhase,
    pub total_trades: u64,
    pub correct_trades: u64,
    pub data_points: u64,
    pub last_update: DateTime<Utc>,
    pub cycle_count: u64,
    pub best_accuracy: f64,
    pub cumulative_trades: u64,
    pub cumulative_correct: u64,
    pub per_pattern_stats: BTreeMap<PatternId, PatternStats>,
    pub model_weights: BTreeMap<PatternId, ModelStat>,
    /// Process run that wrote the snapshot
    pub run_id: Uuid,
}

impl MetricsSnapshot {
    /// Snapshot written by a stop: zeroed counters, current weights
    pub fn reset(model_weights: BTreeMap<PatternId, ModelStat>, run_id: Uuid) -> Self {
        Self {
            accuracy: 0.0,
            learning_phase: LearningPhase::Initial,
            total_trades: 0,
            correct_trades: 0,
            data_points: 0,
            last_update: Utc::now(),
            cycle_count: 0,
            best_accuracy: 0.0,
            cumulative_trades: 0,
            cumulative_correct: 0,
            per_pattern_stats: BTreeMap::new(),
            model_weights,
            run_id,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn upsert_metrics(&self, snapshot: &MetricsSnapshot) -> Result<()>;

    async fn load_metrics(&self) -> Result<Option<MetricsSnapshot>>;

    async fn save_engine(&self, state: &EngineState) -> Result<()>;

    async fn load_engine(&self) -> Result<Option<EngineState>>;
}

/// Open the configured backend
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn MetricsStore>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("💾 Using in-memory metrics store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Sqlite => {
            let path = config.resolved_path();
            info!("💾 Using SQLite metrics store at {}", path.display());
            Ok(Arc::new(SqliteStore::connect(&path).await?))
        }
    }
}
