//! Eight engine instances appending to one result log concurrently must
//! produce exactly 8 x 50 parseable generation records with no
//! interleaving.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use seismicity::catalog::CountVector;
use seismicity::fitness::FitnessContext;
use seismicity::genetic::{EvolutionEngine, GaConfig};
use seismicity::results::{read_log, ResultSink};

#[test]
fn eight_concurrent_writers_produce_four_hundred_clean_records() {
    const WRITERS: usize = 8;
    const GENERATIONS: usize = 50;

    let dir = TempDir::new().unwrap();
    let sink = ResultSink::new(dir.path().join("results.log"))
        .with_retry(200, Duration::from_millis(5));
    let ctx = Arc::new(
        FitnessContext::new(CountVector::from_counts(vec![2, 0, 1, 0]), 0.7).unwrap(),
    );
    let cancel = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for writer in 0..WRITERS {
            let sink = sink.clone();
            let ctx = ctx.clone();
            let cancel = &cancel;
            scope.spawn(move || {
                let config = GaConfig {
                    population_size: 10,
                    num_generations: GENERATIONS,
                    seed: Some(writer as u64 + 1),
                    ..GaConfig::default()
                };
                let engine = EvolutionEngine::new(config, ctx).unwrap();
                let result = engine.run(cancel).unwrap();
                assert_eq!(result.history.len(), GENERATIONS);
                sink.append_run(
                    &format!("writer{writer}"),
                    &result.history,
                    &result.best_counts,
                )
                .unwrap();
            });
        }
    });

    let records = read_log(sink.path()).unwrap();
    assert_eq!(records.len(), WRITERS);

    let total_generations: usize = records.iter().map(|r| r.stats.len()).sum();
    assert_eq!(total_generations, WRITERS * GENERATIONS);

    for record in &records {
        assert!(record.label.starts_with("writer"));
        assert_eq!(record.model.len(), 4);
        for (i, stats) in record.stats.iter().enumerate() {
            assert_eq!(stats.generation, i);
            assert!(stats.min.is_finite());
            assert!(stats.max.is_finite());
        }
    }

    // Every writer appended exactly one block.
    let mut labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
    labels.sort_unstable();
    labels.dedup();
    assert_eq!(labels.len(), WRITERS);
}
