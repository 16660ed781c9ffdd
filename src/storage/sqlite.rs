//! SQLite-backed store

use super::{MetricsSnapshot, MetricsStore};
use crate::engine::EngineState;
use crate::error::{OracleError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS cycle_metrics (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        accuracy REAL NOT NULL,
        learning_phase TEXT NOT NULL,
        total_trades INTEGER NOT NULL,
        correct_trades INTEGER NOT NULL,
        data_points INTEGER NOT NULL,
        last_update TEXT NOT NULL,
        cycle_count INTEGER NOT NULL,
        best_accuracy REAL NOT NULL,
        cumulative_trades INTEGER NOT NULL,
        cumulative_correct INTEGER NOT NULL,
        per_pattern_stats TEXT NOT NULL,
        model_weights TEXT NOT NULL,
        run_id TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS engine_state (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        state TEXT NOT NULL,
        saved_at TEXT NOT NULL
    )"#,
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and apply the schema
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OracleError::Config(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn metrics_rows(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM cycle_metrics")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| OracleError::Internal(format!("bad timestamp {:?}: {}", value, e)))
}

#[async_trait]
impl MetricsStore for SqliteStore {
    async fn upsert_metrics(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO cycle_metrics (
                id, accuracy, learning_phase, total_trades, correct_trades, data_points,
                last_update, cycle_count, best_accuracy, cumulative_trades,
                cumulative_correct, per_pattern_stats, model_weights, run_id
            ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                accuracy = excluded.accuracy,
                learning_phase = excluded.learning_phase,
                total_trades = excluded.total_trades,
                correct_trades = excluded.correct_trades,
                data_points = excluded.data_points,
                last_update = excluded.last_update,
                cycle_count = excluded.cycle_count,
                best_accuracy = excluded.best_accuracy,
                cumulative_trades = excluded.cumulative_trades,
                cumulative_correct = excluded.cumulative_correct,
                per_pattern_stats = excluded.per_pattern_stats,
                model_weights = excluded.model_weights,
                run_id = excluded.run_id"#,
        )
        .bind(snapshot.accuracy)
        .bind(snapshot.learning_phase.as_str())
        .bind(snapshot.total_trades as i64)
        .bind(snapshot.correct_trades as i64)
        .bind(snapshot.data_points as i64)
        .bind(snapshot.last_update.to_rfc3339())
        .bind(snapshot.cycle_count as i64)
        .bind(snapshot.best_accuracy)
        .bind(snapshot.cumulative_trades as i64)
        .bind(snapshot.cumulative_correct as i64)
        .bind(serde_json::to_string(&snapshot.per_pattern_stats)?)
        .bind(serde_json::to_string(&snapshot.model_weights)?)
        .bind(snapshot.run_id.to_string())
        .execute(&self.pool)
        .await?;

        debug!("Upserted metrics for cycle {}", snapshot.cycle_count);
        Ok(())
    }

    async fn load_metrics(&self) -> Result<Option<MetricsSnapshot>> {
        let Some(row) = sqlx::query("SELECT * FROM cycle_metrics WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let phase: String = row.try_get("learning_phase")?;
        let last_update: String = row.try_get("last_update")?;
        let per_pattern: String = row.try_get("per_pattern_stats")?;
        let weights: String = row.try_get("model_weights")?;
        let run_id: String = row.try_get("run_id")?;

        Ok(Some(MetricsSnapshot {
            accuracy: row.try_get("accuracy")?,
            learning_phase: phase
                .parse()
                .map_err(|_| OracleError::Internal(format!("unknown learning phase {:?}", phase)))?,
            total_trades: row.try_get::<i64, _>("total_trades")? as u64,
            correct_trades: row.try_get::<i64, _>("correct_trades")? as u64,
            data_points: row.try_get::<i64, _>("data_points")? as u64,
            last_update: parse_time(&last_update)?,
            cycle_count: row.try_get::<i64, _>("cycle_count")? as u64,
            best_accuracy: row.try_get("best_accuracy")?,
            cumulative_trades: row.try_get::<i64, _>("cumulative_trades")? as u64,
            cumulative_correct: row.try_get::<i64, _>("cumulative_correct")? as u64,
            per_pattern_stats: serde_json::from_str(&per_pattern)?,
            model_weights: serde_json::from_str(&weights)?,
            run_id: Uuid::parse_str(&run_id)
                .map_err(|e| OracleError::Internal(format!("bad run id {:?}: {}", run_id, e)))?,
        }))
    }

    async fn save_engine(&self, state: &EngineState) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO engine_state (id, state, saved_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET state = excluded.state, saved_at = excluded.saved_at"#,
        )
        .bind(serde_json::to_string(state)?)
        .bind(state.saved_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_engine(&self) -> Result<Option<EngineState>> {
        let row = sqlx::query("SELECT state FROM engine_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let state: String = row.try_get("state")?;
                Ok(Some(serde_json::from_str(&state)?))
            }
            None => Ok(None),
        }
    }
}
