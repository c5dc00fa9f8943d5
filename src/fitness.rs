//! Candidate rate models and their fitness evaluation.
//!
//! An [`Individual`] is a genome of unit-interval reals, one per grid cell.
//! Evaluation decodes each gene into an expected event count through the
//! Poisson quantile (inverse CDF) keyed by the training-window rate, then
//! scores the decoded model against the observed counts. All the inputs the
//! legacy scripts kept in module globals live in an explicit
//! [`FitnessContext`] instead.

use rand::Rng;
use statrs::distribution::{DiscreteCDF, Poisson};

use crate::catalog::CountVector;
use crate::error::{Error, Result};
use crate::likelihood::PoissonScorer;

/// Fitness assigned to a statistically inadmissible model. Far below any
/// achievable joint log-likelihood, yet small enough that summing a whole
/// population of sentinels keeps mean and variance finite.
pub const REJECTED_FITNESS: f64 = -1.0e30;

/// One candidate spatial rate model.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    /// Unit-interval gene per grid cell.
    pub genome: Vec<f64>,
    /// Joint log-likelihood; `None` until evaluated and whenever an
    /// operator has touched the genome since.
    pub fitness: Option<f64>,
}

impl Individual {
    /// Uniformly random genome of the given length.
    pub fn random<R: Rng>(rng: &mut R, len: usize) -> Self {
        Self {
            genome: (0..len).map(|_| rng.gen::<f64>()).collect(),
            fitness: None,
        }
    }

    pub fn from_genome(genome: Vec<f64>) -> Self {
        Self {
            genome,
            fitness: None,
        }
    }

    /// Mark the fitness stale. Every operator that touches the genome
    /// calls this; reading a stale fitness is a bug the `Option` makes
    /// impossible.
    pub fn invalidate(&mut self) {
        self.fitness = None;
    }

    /// Fitness for comparisons; rejected-level when not yet evaluated.
    pub fn fitness_or_rejected(&self) -> f64 {
        self.fitness.unwrap_or(REJECTED_FITNESS)
    }

    /// Pull genes back into the unit interval after variation: negatives
    /// are mirrored, overshoots are resampled.
    pub fn repair<R: Rng>(&mut self, rng: &mut R) {
        for gene in &mut self.genome {
            if *gene < 0.0 {
                *gene = -*gene;
            }
            if *gene > 1.0 {
                *gene = rng.gen::<f64>();
            }
        }
    }
}

/// Everything a fitness evaluation needs: observed counts for the target
/// time slice, the per-cell Poisson rate from the training window, and the
/// scorer. Immutable and shared by reference across a whole run.
#[derive(Debug, Clone)]
pub struct FitnessContext {
    observed: CountVector,
    rate: f64,
    poisson: Poisson,
    scorer: PoissonScorer,
}

impl FitnessContext {
    pub fn new(observed: CountVector, rate: f64) -> Result<Self> {
        Self::with_scorer(observed, rate, PoissonScorer::new())
    }

    pub fn with_scorer(observed: CountVector, rate: f64, scorer: PoissonScorer) -> Result<Self> {
        if observed.is_empty() {
            return Err(Error::Config("observed count vector is empty".into()));
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::Config(format!(
                "per-cell rate must be positive and finite, got {rate}"
            )));
        }
        let poisson = Poisson::new(rate)
            .map_err(|e| Error::Config(format!("invalid Poisson rate {rate}: {e}")))?;
        Ok(Self {
            observed,
            rate,
            poisson,
            scorer,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.observed.len()
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn observed(&self) -> &CountVector {
        &self.observed
    }

    /// Map one gene to an expected event count: the smallest k whose
    /// Poisson CDF at the training rate reaches the gene value.
    pub fn quantile(&self, gene: f64) -> u64 {
        // The quantile is only defined on [0, 1); 1.0 would chase the
        // unbounded upper tail.
        let p = gene.clamp(0.0, 1.0 - f64::EPSILON);
        let mut k = 0u64;
        while self.poisson.cdf(k) < p {
            k += 1;
        }
        k
    }

    /// Decode a whole genome into a per-cell expected-count model.
    pub fn decode(&self, genome: &[f64]) -> Vec<u64> {
        genome.iter().map(|&g| self.quantile(g)).collect()
    }

    /// Evaluate a genome: decode, score, and collapse a rejected model to
    /// the finite sentinel so the population statistics never see an
    /// infinity.
    pub fn evaluate(&self, genome: &[f64]) -> Result<f64> {
        if genome.len() != self.cell_count() {
            return Err(Error::GenomeLength {
                expected: self.cell_count(),
                got: genome.len(),
            });
        }
        let expected = self.decode(genome);
        let score = self.scorer.score(self.observed.as_slice(), &expected)?;
        if score.rejected || !score.joint.is_finite() {
            Ok(REJECTED_FITNESS)
        } else {
            Ok(score.joint)
        }
    }
}
