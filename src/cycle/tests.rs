//! Unit tests for the cycle orchestrator

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::client::{BatchConfig, CandleRequest};
    use crate::engine::PatternEngine;
    use crate::error::OracleError;
    use crate::evaluation::{LearningPhase, WalkForwardConfig, LOOKBACK};
    use crate::patterns::PatternId;
    use crate::storage::{MemoryStore, MetricsSnapshot, MetricsStore, MockMetricsStore};
    use crate::testing::{alternating_series, random_walk, StaticCandleSource};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    const INSTRUMENTS: [&str; 2] = ["BTCUSDT", "ETHUSDT"];

    fn test_config() -> CycleConfig {
        CycleConfig {
            // Long enough that the ticker never fires during a test
            interval: Duration::from_secs(3600),
            instruments: INSTRUMENTS.iter().map(|s| s.to_string()).collect(),
            request: CandleRequest::latest("1m", 100),
            batch: BatchConfig {
                batch_size: 10,
                request_delay: Duration::ZERO,
                batch_delay: Duration::ZERO,
                request_timeout: Duration::from_secs(5),
            },
            walk_forward: WalkForwardConfig {
                train_fraction: 0.8,
                admission_threshold: 0.3,
            },
            learning_rate: 0.01,
        }
    }

    fn alternating_source() -> Arc<StaticCandleSource> {
        Arc::new(
            StaticCandleSource::new()
                .with_series("BTCUSDT", alternating_series("BTCUSDT", 100))
                .with_series("ETHUSDT", alternating_series("ETHUSDT", 100)),
        )
    }

    fn orchestrator(
        source: Arc<StaticCandleSource>,
        store: Arc<dyn MetricsStore>,
    ) -> Arc<CycleOrchestrator> {
        Arc::new(CycleOrchestrator::new(test_config(), source, store))
    }

    #[tokio::test]
    async fn test_start_runs_first_cycle() {
        let source = alternating_source();
        let orch = orchestrator(source.clone(), Arc::new(MemoryStore::new()));

        let state = orch.start().await;
        assert_eq!(state.status, CycleStatus::Running);
        assert_eq!(state.cycle_count, 1);
        assert_eq!(state.best_accuracy, 1.0);
        assert_eq!(state.failed_cycles, 0);
        assert_eq!(source.calls(), INSTRUMENTS.len());
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_start_while_running_is_noop() {
        let source = alternating_source();
        let orch = orchestrator(source.clone(), Arc::new(MemoryStore::new()));

        orch.start().await;
        let again = orch.start().await;
        assert_eq!(again.cycle_count, 1);
        assert_eq!(source.calls(), INSTRUMENTS.len());
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_starts_run_one_cycle() {
        let source = alternating_source();
        let orch = orchestrator(source.clone(), Arc::new(MemoryStore::new()));

        let (a, b) = tokio::join!(orch.start(), orch.start());
        assert!(a.is_running() && b.is_running());
        assert_eq!(orch.status().cycle_count, 1);
        assert_eq!(source.calls(), INSTRUMENTS.len());
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_tick_accumulates() {
        let orch = orchestrator(alternating_source(), Arc::new(MemoryStore::new()));
        let first = orch.start().await;

        match orch.tick().await {
            CycleOutcome::Completed(result) => {
                assert_eq!(result.learning_phase, LearningPhase::Ready);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let state = orch.status();
        assert_eq!(state.cycle_count, 2);
        assert_eq!(state.total_trades, first.total_trades * 2);
        assert_eq!(state.correct_trades, state.total_trades);
        assert_eq!(state.last_accuracy, Some(1.0));
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_stop_resets_state() {
        let orch = orchestrator(alternating_source(), Arc::new(MemoryStore::new()));
        orch.start().await;
        orch.tick().await;

        let stopped = orch.stop().await;
        assert_eq!(stopped, CycleState::default());
        assert_eq!(orch.status().status, CycleStatus::Idle);

        // Idle until the next start
        assert!(matches!(orch.tick().await, CycleOutcome::Skipped));
        assert_eq!(orch.status().cycle_count, 0);

        let restarted = orch.start().await;
        assert_eq!(restarted.cycle_count, 1);
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_stop_reset_survives_rehydrate() {
        let store = Arc::new(MemoryStore::new());
        let orch = orchestrator(alternating_source(), store.clone());
        orch.start().await;
        orch.tick().await;
        assert_eq!(orch.status().cycle_count, 2);
        orch.stop().await;

        let saved = store.load_metrics().await.unwrap().unwrap();
        assert_eq!(saved.cycle_count, 0);
        assert_eq!(saved.cumulative_trades, 0);
        assert_eq!(saved.model_weights.len(), PatternId::ALL.len());

        let restarted = orchestrator(alternating_source(), store);
        restarted.rehydrate().await.unwrap();
        assert_eq!(restarted.status(), CycleState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_runs_cycles_on_schedule() {
        let source = alternating_source();
        let config = CycleConfig {
            interval: Duration::from_millis(100),
            ..test_config()
        };
        let orch = Arc::new(CycleOrchestrator::new(
            config,
            source.clone(),
            Arc::new(MemoryStore::new()),
        ));

        orch.start().await;
        tokio::time::sleep(Duration::from_millis(350)).await;

        let state = orch.status();
        assert!(state.cycle_count >= 3, "only {} cycles ran", state.cycle_count);
        assert_eq!(source.calls(), state.cycle_count as usize * INSTRUMENTS.len());
        assert_eq!(state.failed_cycles, 0);
        orch.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_retires_ticker() {
        let source = alternating_source();
        let config = CycleConfig {
            interval: Duration::from_millis(100),
            ..test_config()
        };
        let orch = Arc::new(CycleOrchestrator::new(
            config,
            source.clone(),
            Arc::new(MemoryStore::new()),
        ));

        orch.start().await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(orch.status().cycle_count >= 2);

        orch.stop().await;
        let calls_at_stop = source.calls();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(source.calls(), calls_at_stop);
        assert_eq!(orch.status(), CycleState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_slow_fetch_discards_cycle() {
        let source = alternating_source();
        let store = Arc::new(MemoryStore::new());
        let orch = orchestrator(source.clone(), store.clone());
        orch.start().await;
        let weights_before = orch.model_stats();

        source.slow_down("BTCUSDT", Duration::from_secs(2));
        let in_flight = tokio::spawn({
            let orch = orch.clone();
            async move { orch.tick().await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;

        let stopped = orch.stop().await;
        assert_eq!(stopped, CycleState::default());

        let outcome = in_flight.await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Discarded), "got {:?}", outcome);

        // Neither the counters, the stored reset nor the weights see the retired cycle
        assert_eq!(orch.status(), CycleState::default());
        assert_eq!(store.load_metrics().await.unwrap().unwrap().cycle_count, 0);
        assert_eq!(orch.model_stats(), weights_before);
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_schedule() {
        let source = alternating_source();
        let orch = orchestrator(source.clone(), Arc::new(MemoryStore::new()));
        orch.start().await;

        for instrument in INSTRUMENTS {
            source.fail(instrument);
        }
        assert!(matches!(
            orch.tick().await,
            CycleOutcome::Failed(OracleError::NoData(_))
        ));
        let state = orch.status();
        assert!(state.is_running());
        assert_eq!(state.failed_cycles, 1);
        assert_eq!(state.cycle_count, 1);

        for instrument in INSTRUMENTS {
            source.recover(instrument);
        }
        assert!(matches!(orch.tick().await, CycleOutcome::Completed(_)));
        assert_eq!(orch.status().cycle_count, 2);
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_one_failing_instrument_is_skipped() {
        let source = alternating_source();
        source.fail("ETHUSDT");
        let orch = orchestrator(source.clone(), Arc::new(MemoryStore::new()));

        let state = orch.start().await;
        assert_eq!(state.cycle_count, 1);
        assert_eq!(state.failed_cycles, 0);
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_metrics() {
        let mut store = MockMetricsStore::new();
        store
            .expect_upsert_metrics()
            .returning(|_| Err(OracleError::Internal("disk full".to_string())));
        store
            .expect_save_engine()
            .returning(|_| Err(OracleError::Internal("disk full".to_string())));

        let orch = orchestrator(alternating_source(), Arc::new(store));
        let state = orch.start().await;
        assert_eq!(state.cycle_count, 1);
        assert_eq!(state.failed_cycles, 0);
        assert!(state.total_trades > 0);
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_cycle_persists_snapshot_and_engine() {
        let store = Arc::new(MemoryStore::new());
        let orch = orchestrator(alternating_source(), store.clone());
        let state = orch.start().await;

        let saved = store.load_metrics().await.unwrap().unwrap();
        assert_eq!(saved.cycle_count, 1);
        assert_eq!(saved.run_id, orch.run_id());
        assert_eq!(saved.cumulative_trades, state.total_trades);
        assert_eq!(saved.model_weights.len(), PatternId::ALL.len());
        assert!(store.load_engine().await.unwrap().is_some());
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_rehydrate_restores_counters_and_weights() {
        let store = Arc::new(MemoryStore::new());

        let mut engine_state = PatternEngine::default().snapshot();
        engine_state.weights.insert(PatternId::Engulfing, 0.33);
        store.save_engine(&engine_state).await.unwrap();
        store
            .upsert_metrics(&MetricsSnapshot {
                accuracy: 0.62,
                learning_phase: LearningPhase::Learning,
                total_trades: 50,
                correct_trades: 31,
                data_points: 1000,
                last_update: Utc::now(),
                cycle_count: 12,
                best_accuracy: 0.7,
                cumulative_trades: 600,
                cumulative_correct: 350,
                per_pattern_stats: BTreeMap::new(),
                model_weights: BTreeMap::new(),
                run_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        let orch = orchestrator(alternating_source(), store);
        orch.rehydrate().await.unwrap();

        let state = orch.status();
        assert_eq!(state.status, CycleStatus::Idle);
        assert_eq!(state.cycle_count, 12);
        assert_eq!(state.best_accuracy, 0.7);
        assert_eq!(state.total_trades, 600);
        assert_eq!(state.correct_trades, 350);
        assert_eq!(orch.model_stats()[&PatternId::Engulfing].weight, 0.33);
    }

    #[tokio::test]
    async fn test_rehydrate_with_empty_store() {
        let orch = orchestrator(alternating_source(), Arc::new(MemoryStore::new()));
        orch.rehydrate().await.unwrap();
        assert_eq!(orch.status(), CycleState::default());
    }

    #[tokio::test]
    async fn test_signal_uses_latest_candles() {
        let source = Arc::new(
            StaticCandleSource::new().with_series("SOLUSDT", random_walk("SOLUSDT", 200, 8)),
        );
        let orch = orchestrator(source, Arc::new(MemoryStore::new()));

        let report = orch.signal("SOLUSDT").await.unwrap();
        assert_eq!(report.instrument, "SOLUSDT");
        assert_eq!(report.candles_used, LOOKBACK);
        assert!(report.prediction.confidence <= 0.95);

        let missing = orch.signal("NOPEUSDT").await;
        assert!(matches!(missing, Err(OracleError::NoData(_))));
    }

    #[test]
    fn test_state_json_shape() {
        let state = CycleState {
            status: CycleStatus::Running,
            cycle_count: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "RUNNING");
        assert_eq!(json["cycleCount"], 3);
        assert_eq!(json["failedCycles"], 0);
    }
}
