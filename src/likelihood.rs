//! Binned Poisson log-likelihood scoring.
//!
//! For each grid cell the scorer compares an observed event count against a
//! candidate model's expected count and accumulates a log10 likelihood
//! contribution. Two conventions are inherited from the legacy analysis
//! chain and preserved numerically: a cell where both counts are zero
//! contributes exactly `+1`, and a model that expects zero events in a cell
//! that observed some is rejected outright.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use statrs::function::gamma::ln_gamma;

use crate::error::{Error, Result};

/// log10(k!) via the log-gamma function. Stable for counts far beyond the
/// ~170 where naive factorial multiplication overflows an f64.
pub fn log10_factorial(k: u64) -> f64 {
    ln_gamma(k as f64 + 1.0) / std::f64::consts::LN_10
}

/// Precomputed factorial table read from a two-column `n n!` text file,
/// kept for compatibility with deployments that still ship one. Values are
/// stored as log10(n!) so large entries survive the parse.
#[derive(Debug, Clone)]
pub struct FactorialTable {
    log10: Vec<f64>,
}

impl FactorialTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let mut log10 = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (n, fact): (u64, f64) = match (fields.next(), fields.next()) {
                (Some(n), Some(f)) => {
                    let n = n.parse().map_err(|_| Error::Parse {
                        line: i as u64 + 1,
                        reason: format!("non-integer n: {n:?}"),
                    })?;
                    let f = f.parse().map_err(|_| Error::Parse {
                        line: i as u64 + 1,
                        reason: format!("non-numeric n!: {f:?}"),
                    })?;
                    (n, f)
                }
                _ => {
                    return Err(Error::Parse {
                        line: i as u64 + 1,
                        reason: "expected two columns: n n!".into(),
                    })
                }
            };
            if n as usize != log10.len() {
                return Err(Error::Parse {
                    line: i as u64 + 1,
                    reason: format!("rows must be consecutive from 0, got n = {n}"),
                });
            }
            log10.push(fact.log10());
        }

        Ok(Self { log10 })
    }

    /// log10(k!) from the table, `None` when k is beyond the table.
    pub fn log10_factorial(&self, k: u64) -> Option<f64> {
        self.log10.get(k as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.log10.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log10.is_empty()
    }
}

/// Outcome of scoring one candidate model against the observations.
#[derive(Debug, Clone)]
pub struct Score {
    /// Per-cell log-likelihood contributions, cell index order.
    pub per_cell: Vec<f64>,
    /// Sum over all cells; negative infinity when the model is rejected.
    pub joint: f64,
    /// True when the model expected zero events in a cell that observed some.
    pub rejected: bool,
}

/// Pure, thread-safe scorer. Holds no mutable state, so one instance may be
/// shared across all concurrent fitness evaluations.
#[derive(Debug, Clone, Default)]
pub struct PoissonScorer {
    table: Option<FactorialTable>,
}

impl PoissonScorer {
    pub fn new() -> Self {
        Self { table: None }
    }

    /// Use a factorial table file for counts it covers, falling back to
    /// log-gamma beyond its range.
    pub fn with_table(table: FactorialTable) -> Self {
        Self { table: Some(table) }
    }

    fn log10_fact(&self, k: u64) -> f64 {
        self.table
            .as_ref()
            .and_then(|t| t.log10_factorial(k))
            .unwrap_or_else(|| log10_factorial(k))
    }

    /// Score an expected-count model against observed counts.
    ///
    /// Per cell: both zero contributes `+1`; observed without expectation
    /// contributes `-inf` and rejects the model; otherwise the cell
    /// contributes `-expected + observed*log10(expected) -
    /// log10(observed!)`.
    pub fn score(&self, observed: &[u64], expected: &[u64]) -> Result<Score> {
        if observed.len() != expected.len() {
            return Err(Error::GenomeLength {
                expected: observed.len(),
                got: expected.len(),
            });
        }

        let mut per_cell = Vec::with_capacity(observed.len());
        let mut rejected = false;

        for (&obs, &exp) in observed.iter().zip(expected.iter()) {
            let value = if obs == 0 && exp == 0 {
                1.0
            } else if obs != 0 && exp == 0 {
                rejected = true;
                f64::NEG_INFINITY
            } else {
                let lambda = exp as f64;
                -lambda + obs as f64 * lambda.log10() - self.log10_fact(obs)
            };
            per_cell.push(value);
        }

        let joint = per_cell.iter().sum();
        Ok(Score {
            per_cell,
            joint,
            rejected,
        })
    }
}
