//! Operator-combination parameter sweeps.
//!
//! The legacy experiments forked one OS process per operator combination;
//! here the same fan-out runs on a fixed pool of worker threads inside one
//! process. Each job is a fully independent engine run over the shared
//! read-only fitness context, and every result funnels through the same
//! locked sink, so the on-disk contract is identical to the multi-process
//! setup.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::fitness::FitnessContext;
use crate::genetic::{EvolutionEngine, GaConfig};
use crate::operators::{Crossover, Mutation, Selection};
use crate::results::ResultSink;

/// One engine run to execute: a label for the result log plus the full
/// engine configuration.
#[derive(Debug, Clone)]
pub struct SweepJob {
    pub label: String,
    pub config: GaConfig,
}

/// Outcome of one sweep job. A failed job carries its error instead of
/// aborting the rest of the sweep.
#[derive(Debug)]
pub struct SweepOutcome {
    pub label: String,
    pub result: Result<f64>,
}

/// Enumerate the full crossover x mutation x selection grid over a base
/// configuration, labeled by the operators' legacy codes.
pub fn operator_matrix(base: &GaConfig) -> Vec<SweepJob> {
    let mut jobs = Vec::new();
    for cx_code in 0..=5 {
        for mut_code in 10..=12 {
            for sel_code in 23..=27 {
                let crossover = match Crossover::from_code(cx_code) {
                    Some(op) => op,
                    None => continue,
                };
                let mutation = match Mutation::from_code(mut_code) {
                    Some(op) => op,
                    None => continue,
                };
                let selection = match Selection::from_code(sel_code) {
                    Some(op) => op,
                    None => continue,
                };
                jobs.push(SweepJob {
                    label: format!("cx{cx_code}-mu{mut_code}-se{sel_code}"),
                    config: GaConfig {
                        crossover,
                        mutation,
                        selection,
                        ..base.clone()
                    },
                });
            }
        }
    }
    jobs
}

/// Run every job on `workers` threads, appending each finished run to the
/// sink. Returns one outcome per job, in job order.
pub fn run_sweep(
    jobs: Vec<SweepJob>,
    ctx: Arc<FitnessContext>,
    sink: &ResultSink,
    workers: usize,
    cancel: &AtomicBool,
) -> Vec<SweepOutcome> {
    let workers = workers.max(1).min(jobs.len().max(1));
    let next_job = AtomicUsize::new(0);
    let outcomes: Mutex<Vec<Option<SweepOutcome>>> =
        Mutex::new((0..jobs.len()).map(|_| None).collect());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next_job.fetch_add(1, Ordering::Relaxed);
                if index >= jobs.len() {
                    break;
                }
                let job = &jobs[index];
                let result = if cancel.load(Ordering::Relaxed) {
                    log::info!("sweep cancelled, skipping {}", job.label);
                    Err(crate::error::Error::Config("sweep cancelled".into()))
                } else {
                    log::info!("sweep job {} starting", job.label);
                    run_job(job, ctx.clone(), sink, cancel)
                };
                if let Err(e) = &result {
                    log::error!("sweep job {} did not complete: {e}", job.label);
                }
                let mut slots = outcomes.lock().unwrap();
                slots[index] = Some(SweepOutcome {
                    label: job.label.clone(),
                    result,
                });
            });
        }
    });

    outcomes
        .into_inner()
        .unwrap()
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| {
            outcome.unwrap_or(SweepOutcome {
                label: jobs[index].label.clone(),
                result: Err(crate::error::Error::Config(
                    "sweep worker exited before claiming the job".into(),
                )),
            })
        })
        .collect()
}

fn run_job(
    job: &SweepJob,
    ctx: Arc<FitnessContext>,
    sink: &ResultSink,
    cancel: &AtomicBool,
) -> Result<f64> {
    let engine = EvolutionEngine::new(job.config.clone(), ctx)?;
    let run = engine.run(cancel)?;
    sink.append_run(&job.label, &run.history, &run.best_counts)?;
    Ok(run.best.fitness_or_rejected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CountVector;
    use crate::results::read_log;
    use tempfile::TempDir;

    fn context() -> Arc<FitnessContext> {
        Arc::new(FitnessContext::new(CountVector::from_counts(vec![2, 0, 1, 0]), 0.7).unwrap())
    }

    fn tiny_config() -> GaConfig {
        GaConfig {
            population_size: 8,
            num_generations: 5,
            seed: Some(11),
            ..GaConfig::default()
        }
    }

    #[test]
    fn matrix_covers_the_full_operator_grid() {
        let jobs = operator_matrix(&tiny_config());
        assert_eq!(jobs.len(), 6 * 3 * 5);
        // Labels are unique.
        let mut labels: Vec<&str> = jobs.iter().map(|j| j.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), 90);
    }

    #[test]
    fn sweep_funnels_every_run_through_the_sink() {
        let dir = TempDir::new().unwrap();
        let sink = ResultSink::new(dir.path().join("sweep.log"));
        let jobs: Vec<SweepJob> = operator_matrix(&tiny_config()).into_iter().take(6).collect();

        let outcomes = run_sweep(jobs, context(), &sink, 3, &AtomicBool::new(false));
        assert_eq!(outcomes.len(), 6);
        for outcome in &outcomes {
            let best = outcome.result.as_ref().unwrap();
            assert!(best.is_finite());
        }

        let records = read_log(sink.path()).unwrap();
        assert_eq!(records.len(), 6);
        for record in &records {
            assert_eq!(record.stats.len(), 5);
            assert_eq!(record.model.len(), 4);
        }
    }

    #[test]
    fn cancelled_sweep_skips_remaining_jobs() {
        let dir = TempDir::new().unwrap();
        let sink = ResultSink::new(dir.path().join("sweep.log"));
        let jobs: Vec<SweepJob> = operator_matrix(&tiny_config()).into_iter().take(4).collect();

        let outcomes = run_sweep(jobs, context(), &sink, 2, &AtomicBool::new(true));
        // Jobs claimed after cancellation produce no sink records.
        assert!(read_log(sink.path()).is_err() || read_log(sink.path()).unwrap().is_empty());
        assert_eq!(outcomes.len(), 4);
    }
}
