//! Unit tests for the aggregator, weight adapter and engine

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::patterns::{PatternId, PatternSignal};
    use crate::testing::series_from_colors;
    use crate::types::CandleColor::{self, Down, Up};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn make_signal(pattern: PatternId, predicted: CandleColor, confidence: f64) -> PatternSignal {
        PatternSignal {
            pattern,
            predicted,
            confidence,
            rationale: "test".to_string(),
        }
    }

    #[test]
    fn test_aggregate_empty_is_neutral() {
        let prediction = aggregate(&[], &WeightTable::defaults());
        assert_eq!(prediction.direction, Direction::Neutral);
        assert_eq!(prediction.confidence, NEUTRAL_CONFIDENCE);
        assert!(prediction.contributing.is_empty());
        assert!(!prediction.is_admitted(0.0));
    }

    #[test]
    fn test_aggregate_tie_is_neutral() {
        // Same default weight, same confidence, opposite sides
        let signals = vec![
            make_signal(PatternId::MajorityOfThree, Up, 0.6),
            make_signal(PatternId::MinorityOfThree, Down, 0.6),
        ];
        let prediction = aggregate(&signals, &WeightTable::defaults());
        assert_eq!(prediction.direction, Direction::Neutral);
        assert_eq!(prediction.confidence, NEUTRAL_CONFIDENCE);
        assert_eq!(prediction.contributing.len(), 2);
    }

    #[test]
    fn test_aggregate_confidence_is_margin() {
        let signals = vec![
            make_signal(PatternId::MajorityOfThree, Up, 0.6),
            make_signal(PatternId::MinorityOfThree, Down, 0.2),
        ];
        let prediction = aggregate(&signals, &WeightTable::defaults());
        assert_eq!(prediction.direction, Direction::Up);
        // (0.06 - 0.02) / (0.06 + 0.02)
        assert!((prediction.confidence - 0.5).abs() < 1e-9);
        assert!((prediction.score_up - 0.06).abs() < 1e-9);
        assert!((prediction.score_down - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_unanimous_is_clamped() {
        let signals = vec![make_signal(PatternId::Engulfing, Down, 0.9)];
        let prediction = aggregate(&signals, &WeightTable::defaults());
        assert_eq!(prediction.direction, Direction::Down);
        assert_eq!(prediction.confidence, MAX_CONFIDENCE);
        assert!(prediction.is_admitted(0.4));
    }

    #[test]
    fn test_direction_display_matches_wire_format() {
        assert_eq!(Direction::Up.to_string(), "UP");
        assert_eq!(Direction::Neutral.to_string(), "NEUTRAL");

        let tie = vec![
            make_signal(PatternId::MajorityOfThree, Up, 0.6),
            make_signal(PatternId::MinorityOfThree, Down, 0.6),
        ];
        let neutral = aggregate(&tie, &WeightTable::defaults());
        assert!(neutral.rationale.starts_with("NEUTRAL ("), "{}", neutral.rationale);

        let down = aggregate(
            &[make_signal(PatternId::Engulfing, Down, 0.9)],
            &WeightTable::defaults(),
        );
        assert!(down.rationale.starts_with("DOWN ("), "{}", down.rationale);
        assert_eq!(
            serde_json::to_value(down.direction).unwrap(),
            serde_json::json!(down.direction.to_string())
        );
    }

    #[test]
    fn test_aggregate_is_pure() {
        let signals = vec![
            make_signal(PatternId::TripleContinuation, Up, 0.9),
            make_signal(PatternId::OddRunReversal, Down, 0.45),
        ];
        let weights = WeightTable::defaults();
        let first = aggregate(&signals, &weights);
        let second = aggregate(&signals, &weights);
        assert_eq!(first, second);
        assert_eq!(weights, WeightTable::defaults());
    }

    #[test]
    fn test_admission_is_strict() {
        let signals = vec![
            make_signal(PatternId::MajorityOfThree, Up, 0.6),
            make_signal(PatternId::MinorityOfThree, Down, 0.2),
        ];
        let prediction = aggregate(&signals, &WeightTable::defaults());
        assert!(!prediction.is_admitted(prediction.confidence));
        assert!(prediction.is_admitted(prediction.confidence - 1e-6));
    }

    #[test]
    fn test_weights_bounded_under_random_outcomes() {
        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut adapter = WeightAdapter::new(0.2);
            for _ in 0..2_000 {
                let pattern = PatternId::ALL[rng.random_range(0..PatternId::ALL.len())];
                adapter.record_outcome(pattern, rng.random_bool(0.5));
            }
            for (_, weight) in adapter.weights().iter() {
                assert!((MIN_WEIGHT..=MAX_WEIGHT).contains(weight));
            }
            for pattern in PatternId::ALL {
                let perf = adapter.performance(pattern);
                assert!(perf.correct <= perf.total);
            }
        }
    }

    #[test]
    fn test_weights_saturate_at_bounds() {
        let mut adapter = WeightAdapter::new(1.0);
        for _ in 0..50 {
            adapter.record_outcome(PatternId::Engulfing, true);
            adapter.record_outcome(PatternId::OddRunReversal, false);
        }
        assert_eq!(adapter.weights().get(PatternId::Engulfing), MAX_WEIGHT);
        assert_eq!(adapter.weights().get(PatternId::OddRunReversal), MIN_WEIGHT);
    }

    #[test]
    fn test_majority_weight_rises_after_correct_call() {
        let mut engine = PatternEngine::default();
        let window = series_from_colors("BTCUSDT", &[Up, Down, Up]);

        let analysis = engine.analyze(&window);
        let majority = analysis.signal_for(PatternId::MajorityOfThree).unwrap();
        assert_eq!(majority.predicted, Up);
        assert!(majority.confidence > 0.0);

        let before = engine.weights().get(PatternId::MajorityOfThree);
        let prediction = aggregate(std::slice::from_ref(majority), engine.weights());
        assert!(engine.learn(&prediction, Up));
        assert!(engine.weights().get(PatternId::MajorityOfThree) > before);

        let perf = engine.performance(PatternId::MajorityOfThree);
        assert_eq!((perf.total, perf.correct), (1, 1));
    }

    #[test]
    fn test_learn_credits_every_contributor() {
        let mut engine = PatternEngine::default();
        let signals = vec![
            make_signal(PatternId::MajorityOfThree, Up, 0.6),
            make_signal(PatternId::MinorityOfThree, Down, 0.2),
        ];
        let prediction = aggregate(&signals, engine.weights());

        assert!(engine.learn(&prediction, Up));
        for pattern in [PatternId::MajorityOfThree, PatternId::MinorityOfThree] {
            let perf = engine.performance(pattern);
            assert_eq!((perf.total, perf.correct), (1, 1));
        }
        assert_eq!(engine.performance(PatternId::Engulfing).total, 0);
    }

    #[test]
    fn test_model_stats_cover_all_patterns() {
        let mut engine = PatternEngine::default();
        let prediction = aggregate(
            &[make_signal(PatternId::Engulfing, Up, 0.8)],
            engine.weights(),
        );
        engine.learn(&prediction, Down);

        let stats = engine.model_stats();
        assert_eq!(stats.len(), PatternId::ALL.len());
        assert_eq!(stats[&PatternId::Engulfing].trades, 1);
        assert_eq!(stats[&PatternId::Engulfing].accuracy, 0.0);
        assert_eq!(stats[&PatternId::MajorityOfThree].trades, 0);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut engine = PatternEngine::new(0.05);
        for _ in 0..10 {
            let prediction = aggregate(
                &[make_signal(PatternId::TripleContinuation, Up, 0.9)],
                engine.weights(),
            );
            engine.learn(&prediction, Up);
        }
        let state = engine.snapshot();
        let json = serde_json::to_string(&state).unwrap();
        let decoded: EngineState = serde_json::from_str(&json).unwrap();

        let mut restored = PatternEngine::new(0.05);
        restored.restore(&decoded);
        assert_eq!(restored.weights(), engine.weights());
        assert_eq!(
            restored.performance(PatternId::TripleContinuation),
            engine.performance(PatternId::TripleContinuation)
        );
    }

    #[test]
    fn test_restore_repairs_invalid_state() {
        let mut state = PatternEngine::default().snapshot();
        state.weights.insert(PatternId::Engulfing, 3.0);
        state.weights.insert(PatternId::BreakoutAfterRun, -1.0);
        state
            .performance
            .insert(PatternId::Engulfing, PatternPerformance { total: 2, correct: 5 });

        let mut engine = PatternEngine::default();
        engine.restore(&state);
        assert_eq!(engine.weights().get(PatternId::Engulfing), MAX_WEIGHT);
        assert_eq!(engine.weights().get(PatternId::BreakoutAfterRun), MIN_WEIGHT);
        assert_eq!(engine.performance(PatternId::Engulfing).correct, 2);
    }
}
