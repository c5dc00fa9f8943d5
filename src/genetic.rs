//! Generational genetic algorithm over candidate rate models.
//!
//! One engine instance owns one run: initialize a random population,
//! iterate selection → crossover → mutation → re-evaluation with an
//! elitism guarantee, and return the best individual with per-generation
//! statistics. The engine itself is strictly sequential across
//! generations; fitness evaluation inside a generation fans out across
//! rayon because the scorer is pure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::fitness::{FitnessContext, Individual};
use crate::operators::{Crossover, Mutation, Selection};

/// Configuration for one evolution run.
#[derive(Debug, Clone)]
pub struct GaConfig {
    pub population_size: usize,
    pub num_generations: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub crossover: Crossover,
    pub mutation: Mutation,
    pub selection: Selection,
    /// Fixed RNG seed for reproducible runs; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: 500,
            num_generations: 100,
            crossover_rate: 0.9,
            mutation_rate: 0.1,
            crossover: Crossover::OnePoint,
            mutation: Mutation::PolynomialBounded {
                indpb: 0.05,
                eta: 1.0,
                low: 0.0,
                up: 1.0,
            },
            selection: Selection::Tournament { size: 3 },
            seed: None,
        }
    }
}

impl GaConfig {
    fn validate(&self) -> Result<()> {
        if self.population_size < 2 {
            return Err(Error::Config(format!(
                "population size must be at least 2, got {}",
                self.population_size
            )));
        }
        if self.num_generations == 0 {
            return Err(Error::Config("number of generations must be positive".into()));
        }
        for (name, rate) in [
            ("crossover rate", self.crossover_rate),
            ("mutation rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(Error::Config(format!("{name} must be in [0, 1], got {rate}")));
            }
        }
        Ok(())
    }
}

/// Fitness statistics for one completed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationStats {
    pub generation: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    /// Wall-clock seconds since the run started.
    pub elapsed_secs: f64,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Best individual of the final population.
    pub best: Individual,
    /// The best genome decoded into a per-cell count model.
    pub best_counts: Vec<u64>,
    pub history: Vec<GenerationStats>,
    /// True when cancellation stopped the run before all generations ran.
    pub cancelled: bool,
}

pub struct EvolutionEngine {
    config: GaConfig,
    ctx: Arc<FitnessContext>,
}

impl EvolutionEngine {
    pub fn new(config: GaConfig, ctx: Arc<FitnessContext>) -> Result<Self> {
        config.validate()?;
        if ctx.cell_count() == 0 {
            return Err(Error::Config("fitness context has zero grid cells".into()));
        }
        Ok(Self { config, ctx })
    }

    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    /// Run the full evolution. The cancellation flag is checked at the top
    /// of every generation; a cancelled run finalizes normally from the
    /// population it has.
    pub fn run(&self, cancel: &AtomicBool) -> Result<RunResult> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let started = Instant::now();

        // Initialize: random genomes, all evaluated up front.
        let mut population: Vec<Individual> = (0..self.config.population_size)
            .map(|_| Individual::random(&mut rng, self.ctx.cell_count()))
            .collect();
        self.evaluate_invalid(&mut population)?;

        let mut history = Vec::with_capacity(self.config.num_generations);
        let mut cancelled = false;

        for generation in 0..self.config.num_generations {
            if cancel.load(Ordering::Relaxed) {
                log::info!("cancellation requested, stopping after generation {generation}");
                cancelled = true;
                break;
            }

            // Select parents and clone them into the offspring pool.
            let mut offspring = self.config.selection.select(
                &mut rng,
                &population,
                self.config.population_size,
            );

            // Paired crossover, then independent mutation. Operators
            // invalidate fitness on whatever they touch.
            for pair in offspring.chunks_mut(2) {
                if pair.len() == 2 && rng.gen::<f64>() < self.config.crossover_rate {
                    let (a, b) = pair.split_at_mut(1);
                    self.config.crossover.apply(&mut rng, &mut a[0], &mut b[0]);
                }
            }
            for ind in offspring.iter_mut() {
                if rng.gen::<f64>() < self.config.mutation_rate {
                    self.config.mutation.apply(&mut rng, ind);
                }
            }

            // Variation can push genes out of the unit interval; repair
            // before re-evaluating.
            for ind in offspring.iter_mut() {
                if ind.fitness.is_none() {
                    ind.repair(&mut rng);
                }
            }
            self.evaluate_invalid(&mut offspring)?;

            // Elitism: the previous generation's best replaces the worst
            // offspring slot, so the best-seen fitness never decreases.
            let best_prev = best_index(&population);
            let worst_new = worst_index(&offspring);
            offspring[worst_new] = population[best_prev].clone();

            population = offspring;
            history.push(compute_stats(generation, &population, started.elapsed().as_secs_f64()));
        }

        let best = population[best_index(&population)].clone();
        let best_counts = self.ctx.decode(&best.genome);
        Ok(RunResult {
            best,
            best_counts,
            history,
            cancelled,
        })
    }

    /// Evaluate every individual whose fitness is stale. Evaluations are
    /// independent and read-only over the shared context, so they run in
    /// parallel.
    fn evaluate_invalid(&self, population: &mut [Individual]) -> Result<()> {
        let ctx = &self.ctx;
        population
            .par_iter_mut()
            .filter(|ind| ind.fitness.is_none())
            .try_for_each(|ind| -> Result<()> {
                ind.fitness = Some(ctx.evaluate(&ind.genome)?);
                Ok(())
            })
    }
}

fn best_index(population: &[Individual]) -> usize {
    let mut best = 0;
    for (i, ind) in population.iter().enumerate() {
        if ind.fitness_or_rejected() > population[best].fitness_or_rejected() {
            best = i;
        }
    }
    best
}

fn worst_index(population: &[Individual]) -> usize {
    let mut worst = 0;
    for (i, ind) in population.iter().enumerate() {
        if ind.fitness_or_rejected() < population[worst].fitness_or_rejected() {
            worst = i;
        }
    }
    worst
}

fn compute_stats(generation: usize, population: &[Individual], elapsed_secs: f64) -> GenerationStats {
    let fitnesses: Vec<f64> = population.iter().map(Individual::fitness_or_rejected).collect();
    let min = fitnesses.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = fitnesses.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = fitnesses.iter().sum::<f64>() / fitnesses.len() as f64;
    let variance =
        fitnesses.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / fitnesses.len() as f64;

    GenerationStats {
        generation,
        min,
        max,
        mean,
        std: variance.sqrt(),
        elapsed_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CountVector;

    fn small_context() -> Arc<FitnessContext> {
        // 2x2 grid, three events in cell 0, modest rate.
        Arc::new(FitnessContext::new(CountVector::from_counts(vec![3, 0, 0, 1]), 0.8).unwrap())
    }

    fn small_config() -> GaConfig {
        GaConfig {
            population_size: 20,
            num_generations: 30,
            seed: Some(42),
            ..GaConfig::default()
        }
    }

    #[test]
    fn rejects_degenerate_configs() {
        let ctx = small_context();
        let mut config = small_config();
        config.population_size = 1;
        assert!(EvolutionEngine::new(config, ctx.clone()).is_err());

        let mut config = small_config();
        config.crossover_rate = 1.5;
        assert!(EvolutionEngine::new(config, ctx.clone()).is_err());

        let mut config = small_config();
        config.num_generations = 0;
        assert!(EvolutionEngine::new(config, ctx).is_err());
    }

    #[test]
    fn best_fitness_never_decreases() {
        let engine = EvolutionEngine::new(small_config(), small_context()).unwrap();
        let result = engine.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(result.history.len(), 30);
        for window in result.history.windows(2) {
            assert!(
                window[1].max >= window[0].max,
                "best fitness regressed: {} -> {}",
                window[0].max,
                window[1].max
            );
        }
    }

    #[test]
    fn every_fitness_is_finite() {
        let engine = EvolutionEngine::new(small_config(), small_context()).unwrap();
        let result = engine.run(&AtomicBool::new(false)).unwrap();

        assert!(result.best.fitness.unwrap().is_finite());
        for stats in &result.history {
            assert!(stats.min.is_finite());
            assert!(stats.max.is_finite());
            assert!(stats.mean.is_finite());
            assert!(stats.std.is_finite());
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let a = EvolutionEngine::new(small_config(), small_context())
            .unwrap()
            .run(&AtomicBool::new(false))
            .unwrap();
        let b = EvolutionEngine::new(small_config(), small_context())
            .unwrap()
            .run(&AtomicBool::new(false))
            .unwrap();
        assert_eq!(a.best.genome, b.best.genome);
        assert_eq!(a.history.last().unwrap().max, b.history.last().unwrap().max);
    }

    #[test]
    fn decoded_model_matches_grid_size() {
        let engine = EvolutionEngine::new(small_config(), small_context()).unwrap();
        let result = engine.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(result.best_counts.len(), 4);
    }

    #[test]
    fn cancellation_stops_before_the_next_generation() {
        let engine = EvolutionEngine::new(small_config(), small_context()).unwrap();
        let result = engine.run(&AtomicBool::new(true)).unwrap();
        assert!(result.cancelled);
        assert!(result.history.is_empty());
        // Finalize still yields an evaluated best individual.
        assert!(result.best.fitness.unwrap().is_finite());
    }

    #[test]
    fn stats_track_the_population() {
        let engine = EvolutionEngine::new(small_config(), small_context()).unwrap();
        let result = engine.run(&AtomicBool::new(false)).unwrap();
        for stats in &result.history {
            assert!(stats.min <= stats.mean);
            assert!(stats.mean <= stats.max);
            assert!(stats.std >= 0.0);
        }
        // Elapsed time is monotone across generations.
        for window in result.history.windows(2) {
            assert!(window[1].elapsed_secs >= window[0].elapsed_secs);
        }
    }
}
