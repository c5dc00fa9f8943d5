//! Pluggable variation and selection strategies.
//!
//! The legacy driver scripts selected operators by integer argv codes fed
//! into if/elif chains; here each family is a tagged enum chosen once at
//! configuration time. The numeric codes survive as
//! [`Crossover::from_code`] and friends because batch tooling still passes
//! them on the command line. Crossover and mutation always invalidate the
//! fitness of every individual whose genome they touch; that is part of
//! the operator contract, not a caller convention.

use rand::Rng;

use crate::fitness::Individual;

/// Crossover strategies over pairs of unit-interval genomes.
#[derive(Debug, Clone, PartialEq)]
pub enum Crossover {
    OnePoint,
    TwoPoint,
    Uniform { indpb: f64 },
    Blend { alpha: f64 },
    SimulatedBinary { eta: f64 },
    SimulatedBinaryBounded { eta: f64, low: f64, up: f64 },
}

impl Crossover {
    /// Legacy argv code (0-5) with the scripts' parameterization.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::OnePoint),
            1 => Some(Self::TwoPoint),
            2 => Some(Self::Uniform { indpb: 0.5 }),
            3 => Some(Self::Blend { alpha: 0.5 }),
            4 => Some(Self::SimulatedBinary { eta: 0.5 }),
            5 => Some(Self::SimulatedBinaryBounded {
                eta: 0.5,
                low: 0.0,
                up: 1.0,
            }),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "one-point" => Self::from_code(0),
            "two-point" => Self::from_code(1),
            "uniform" => Self::from_code(2),
            "blend" => Self::from_code(3),
            "simulated-binary" => Self::from_code(4),
            "simulated-binary-bounded" => Self::from_code(5),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::OnePoint => 0,
            Self::TwoPoint => 1,
            Self::Uniform { .. } => 2,
            Self::Blend { .. } => 3,
            Self::SimulatedBinary { .. } => 4,
            Self::SimulatedBinaryBounded { .. } => 5,
        }
    }

    /// Cross two individuals in place, producing two children.
    pub fn apply<R: Rng>(&self, rng: &mut R, a: &mut Individual, b: &mut Individual) {
        let size = a.genome.len().min(b.genome.len());
        if size < 2 {
            return;
        }
        a.invalidate();
        b.invalidate();

        match *self {
            Self::OnePoint => {
                let point = rng.gen_range(1..size);
                for i in point..size {
                    std::mem::swap(&mut a.genome[i], &mut b.genome[i]);
                }
            }
            Self::TwoPoint => {
                let mut p1 = rng.gen_range(1..size);
                let mut p2 = rng.gen_range(1..size);
                if p1 > p2 {
                    std::mem::swap(&mut p1, &mut p2);
                }
                for i in p1..p2 {
                    std::mem::swap(&mut a.genome[i], &mut b.genome[i]);
                }
            }
            Self::Uniform { indpb } => {
                for i in 0..size {
                    if rng.gen::<f64>() < indpb {
                        std::mem::swap(&mut a.genome[i], &mut b.genome[i]);
                    }
                }
            }
            Self::Blend { alpha } => {
                for i in 0..size {
                    let gamma = (1.0 + 2.0 * alpha) * rng.gen::<f64>() - alpha;
                    let (x1, x2) = (a.genome[i], b.genome[i]);
                    a.genome[i] = (1.0 - gamma) * x1 + gamma * x2;
                    b.genome[i] = gamma * x1 + (1.0 - gamma) * x2;
                }
            }
            Self::SimulatedBinary { eta } => {
                for i in 0..size {
                    let r = rng.gen::<f64>();
                    let beta = if r <= 0.5 {
                        (2.0 * r).powf(1.0 / (eta + 1.0))
                    } else {
                        (1.0 / (2.0 * (1.0 - r))).powf(1.0 / (eta + 1.0))
                    };
                    let (x1, x2) = (a.genome[i], b.genome[i]);
                    a.genome[i] = 0.5 * ((1.0 + beta) * x1 + (1.0 - beta) * x2);
                    b.genome[i] = 0.5 * ((1.0 - beta) * x1 + (1.0 + beta) * x2);
                }
            }
            Self::SimulatedBinaryBounded { eta, low, up } => {
                for i in 0..size {
                    if rng.gen::<f64>() > 0.5 {
                        continue;
                    }
                    let (x1, x2) = (a.genome[i], b.genome[i]);
                    if (x1 - x2).abs() <= 1e-14 {
                        continue;
                    }
                    let x_min = x1.min(x2);
                    let x_max = x1.max(x2);
                    let r = rng.gen::<f64>();

                    let contract = |beta: f64| -> f64 {
                        let alpha = 2.0 - beta.powf(-(eta + 1.0));
                        if r <= 1.0 / alpha {
                            (r * alpha).powf(1.0 / (eta + 1.0))
                        } else {
                            (1.0 / (2.0 - r * alpha)).powf(1.0 / (eta + 1.0))
                        }
                    };

                    let beta_low = 1.0 + 2.0 * (x_min - low) / (x_max - x_min);
                    let c1 = 0.5 * (x_min + x_max - contract(beta_low) * (x_max - x_min));

                    let beta_up = 1.0 + 2.0 * (up - x_max) / (x_max - x_min);
                    let c2 = 0.5 * (x_min + x_max + contract(beta_up) * (x_max - x_min));

                    let c1 = c1.clamp(low, up);
                    let c2 = c2.clamp(low, up);
                    if rng.gen::<f64>() <= 0.5 {
                        a.genome[i] = c2;
                        b.genome[i] = c1;
                    } else {
                        a.genome[i] = c1;
                        b.genome[i] = c2;
                    }
                }
            }
        }
    }
}

/// Mutation strategies over a single genome.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Unit-interval complement of each selected gene.
    FlipBit { indpb: f64 },
    /// Swap each selected gene with another random position.
    ShuffleIndexes { indpb: f64 },
    /// Polynomial bounded perturbation of each selected gene.
    PolynomialBounded {
        indpb: f64,
        eta: f64,
        low: f64,
        up: f64,
    },
}

impl Mutation {
    /// Legacy argv code (10-12) with the scripts' parameterization.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            10 => Some(Self::FlipBit { indpb: 0.05 }),
            11 => Some(Self::ShuffleIndexes { indpb: 0.05 }),
            12 => Some(Self::PolynomialBounded {
                indpb: 0.05,
                eta: 1.0,
                low: 0.0,
                up: 1.0,
            }),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "flip-bit" => Self::from_code(10),
            "shuffle-indexes" => Self::from_code(11),
            "polynomial-bounded" => Self::from_code(12),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::FlipBit { .. } => 10,
            Self::ShuffleIndexes { .. } => 11,
            Self::PolynomialBounded { .. } => 12,
        }
    }

    /// Mutate an individual in place.
    pub fn apply<R: Rng>(&self, rng: &mut R, ind: &mut Individual) {
        let size = ind.genome.len();
        if size == 0 {
            return;
        }
        ind.invalidate();

        match *self {
            Self::FlipBit { indpb } => {
                for gene in &mut ind.genome {
                    if rng.gen::<f64>() < indpb {
                        *gene = 1.0 - *gene;
                    }
                }
            }
            Self::ShuffleIndexes { indpb } => {
                if size < 2 {
                    return;
                }
                for i in 0..size {
                    if rng.gen::<f64>() < indpb {
                        let mut other = rng.gen_range(0..size - 1);
                        if other >= i {
                            other += 1;
                        }
                        ind.genome.swap(i, other);
                    }
                }
            }
            Self::PolynomialBounded {
                indpb,
                eta,
                low,
                up,
            } => {
                let span = up - low;
                for gene in &mut ind.genome {
                    if rng.gen::<f64>() >= indpb {
                        continue;
                    }
                    let x = *gene;
                    let delta_1 = (x - low) / span;
                    let delta_2 = (up - x) / span;
                    let r = rng.gen::<f64>();
                    let mut_pow = 1.0 / (eta + 1.0);

                    let delta_q = if r < 0.5 {
                        let xy = 1.0 - delta_1;
                        let val = 2.0 * r + (1.0 - 2.0 * r) * xy.powf(eta + 1.0);
                        val.powf(mut_pow) - 1.0
                    } else {
                        let xy = 1.0 - delta_2;
                        let val = 2.0 * (1.0 - r) + 2.0 * (r - 0.5) * xy.powf(eta + 1.0);
                        1.0 - val.powf(mut_pow)
                    };

                    *gene = (x + delta_q * span).clamp(low, up);
                }
            }
        }
    }
}

/// Parent selection strategies.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Tournament { size: usize },
    Roulette,
    Random,
    Best,
    Worst,
}

impl Selection {
    /// Legacy argv code (23-27).
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            23 => Some(Self::Tournament { size: 3 }),
            24 => Some(Self::Roulette),
            25 => Some(Self::Random),
            26 => Some(Self::Best),
            27 => Some(Self::Worst),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tournament" => Self::from_code(23),
            "roulette" => Self::from_code(24),
            "random" => Self::from_code(25),
            "best" => Self::from_code(26),
            "worst" => Self::from_code(27),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::Tournament { .. } => 23,
            Self::Roulette => 24,
            Self::Random => 25,
            Self::Best => 26,
            Self::Worst => 27,
        }
    }

    /// Select `k` parents from an evaluated population, cloning each pick.
    /// Cloning deep-copies the genome, so no two live individuals ever
    /// share one.
    pub fn select<R: Rng>(&self, rng: &mut R, population: &[Individual], k: usize) -> Vec<Individual> {
        if population.is_empty() {
            return Vec::new();
        }
        match *self {
            Self::Tournament { size } => (0..k)
                .map(|_| {
                    let mut best = &population[rng.gen_range(0..population.len())];
                    for _ in 1..size.max(1) {
                        let challenger = &population[rng.gen_range(0..population.len())];
                        if challenger.fitness_or_rejected() > best.fitness_or_rejected() {
                            best = challenger;
                        }
                    }
                    best.clone()
                })
                .collect(),
            Self::Roulette => {
                // Log-likelihood fitness is negative; shift so the worst
                // individual carries zero weight, then spin.
                let min = population
                    .iter()
                    .map(Individual::fitness_or_rejected)
                    .fold(f64::INFINITY, f64::min);
                let weights: Vec<f64> = population
                    .iter()
                    .map(|ind| ind.fitness_or_rejected() - min)
                    .collect();
                let total: f64 = weights.iter().sum();
                if !(total > 0.0) {
                    // Degenerate flat population; fall back to uniform.
                    return Self::Random.select(rng, population, k);
                }
                (0..k)
                    .map(|_| {
                        let spin = rng.gen::<f64>() * total;
                        let mut cumulative = 0.0;
                        let mut chosen = population.len() - 1;
                        for (i, w) in weights.iter().enumerate() {
                            cumulative += w;
                            if cumulative >= spin {
                                chosen = i;
                                break;
                            }
                        }
                        population[chosen].clone()
                    })
                    .collect()
            }
            Self::Random => (0..k)
                .map(|_| population[rng.gen_range(0..population.len())].clone())
                .collect(),
            Self::Best => sorted_clones(population, k, true),
            Self::Worst => sorted_clones(population, k, false),
        }
    }
}

fn sorted_clones(population: &[Individual], k: usize, descending: bool) -> Vec<Individual> {
    let mut order: Vec<&Individual> = population.iter().collect();
    order.sort_by(|a, b| {
        let cmp = a
            .fitness_or_rejected()
            .partial_cmp(&b.fitness_or_rejected())
            .unwrap_or(std::cmp::Ordering::Equal);
        if descending {
            cmp.reverse()
        } else {
            cmp
        }
    });
    order.iter().cycle().take(k).map(|ind| (*ind).clone()).collect()
}
