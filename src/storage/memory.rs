//! Process-local store, used for tests and `storage.backend = "memory"`

use super::{MetricsSnapshot, MetricsStore};
use crate::engine::EngineState;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    metrics: Mutex<Option<MetricsSnapshot>>,
    engine: Mutex<Option<EngineState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn upsert_metrics(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        *self.metrics.lock() = Some(snapshot.clone());
        Ok(())
    }

    async fn load_metrics(&self) -> Result<Option<MetricsSnapshot>> {
        Ok(self.metrics.lock().clone())
    }

    async fn save_engine(&self, state: &EngineState) -> Result<()> {
        *self.engine.lock() = Some(state.clone());
        Ok(())
    }

    async fn load_engine(&self) -> Result<Option<EngineState>> {
        Ok(self.engine.lock().clone())
    }
}
