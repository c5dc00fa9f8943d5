//! Configuration loading and CLI argument parsing

use clap::Parser;
use serde::Deserialize;

use seismicity::operators::{Crossover, Mutation, Selection};

#[derive(Parser, Debug)]
#[command(name = "search")]
#[command(about = "Genetic-algorithm search for spatial seismicity rate models")]
pub struct Args {
    /// Path to config file
    #[arg(short = 'c', long, default_value = "search.toml")]
    pub config: String,

    /// Path to the earthquake catalog (overrides config)
    #[arg(long)]
    pub catalog: Option<String>,

    /// Result log path (overrides config)
    #[arg(short = 'o', long)]
    pub output: Option<String>,

    /// RNG seed for a reproducible run (overrides config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run the full operator-combination sweep instead of a single run
    #[arg(long)]
    pub sweep: bool,

    /// Worker threads for the sweep
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Legacy crossover operator code (0-5, overrides config)
    #[arg(long)]
    pub crossover_code: Option<u32>,

    /// Legacy mutation operator code (10-12, overrides config)
    #[arg(long)]
    pub mutation_code: Option<u32>,

    /// Legacy selection operator code (23-27, overrides config)
    #[arg(long)]
    pub selection_code: Option<u32>,

    /// Verbose per-generation output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub region: RegionConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub ga: GaSection,
}

#[derive(Debug, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog: String,
    #[serde(default = "default_output")]
    pub output: String,
    /// Optional legacy two-column factorial table
    #[serde(default)]
    pub factorial_table: Option<String>,
}

fn default_catalog_path() -> String {
    "jmacat_20000101_20131115_Mth2.5.dat".to_string()
}
fn default_output() -> String {
    "results.log".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog_path(),
            output: default_output(),
            factorial_table: None,
        }
    }
}

/// Kanto-region defaults, 45x45 cells of roughly 0.05 degrees.
#[derive(Debug, Deserialize)]
pub struct RegionConfig {
    #[serde(default = "default_min_lon")]
    pub min_lon: f64,
    #[serde(default = "default_max_lon")]
    pub max_lon: f64,
    #[serde(default = "default_min_lat")]
    pub min_lat: f64,
    #[serde(default = "default_max_lat")]
    pub max_lat: f64,
    #[serde(default = "default_bins")]
    pub lon_bins: usize,
    #[serde(default = "default_bins")]
    pub lat_bins: usize,
}

fn default_min_lon() -> f64 {
    138.8
}
fn default_max_lon() -> f64 {
    141.05
}
fn default_min_lat() -> f64 {
    34.8
}
fn default_max_lat() -> f64 {
    37.05
}
fn default_bins() -> usize {
    45
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            min_lon: default_min_lon(),
            max_lon: default_max_lon(),
            min_lat: default_min_lat(),
            max_lat: default_max_lat(),
            lon_bins: default_bins(),
            lat_bins: default_bins(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_min_magnitude")]
    pub min_magnitude: f64,
    #[serde(default = "default_max_depth")]
    pub max_depth: f64,
    /// First training year; the tested slice is `window_years` later.
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    /// Last training year of the multi-slice driver loop.
    #[serde(default = "default_end_year")]
    pub end_year: i32,
    #[serde(default = "default_window_years")]
    pub window_years: u32,
}

fn default_min_magnitude() -> f64 {
    2.5
}
fn default_max_depth() -> f64 {
    100.0
}
fn default_start_year() -> i32 {
    2000
}
fn default_end_year() -> i32 {
    2005
}
fn default_window_years() -> u32 {
    5
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            min_magnitude: default_min_magnitude(),
            max_depth: default_max_depth(),
            start_year: default_start_year(),
            end_year: default_end_year(),
            window_years: default_window_years(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GaSection {
    #[serde(default = "default_population")]
    pub population_size: usize,
    #[serde(default = "default_generations")]
    pub num_generations: usize,
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    #[serde(default = "default_crossover")]
    pub crossover: String,
    #[serde(default = "default_mutation")]
    pub mutation: String,
    #[serde(default = "default_selection")]
    pub selection: String,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_population() -> usize {
    500
}
fn default_generations() -> usize {
    100
}
fn default_crossover_rate() -> f64 {
    0.9
}
fn default_mutation_rate() -> f64 {
    0.1
}
fn default_crossover() -> String {
    "one-point".to_string()
}
fn default_mutation() -> String {
    "polynomial-bounded".to_string()
}
fn default_selection() -> String {
    "tournament".to_string()
}

impl Default for GaSection {
    fn default() -> Self {
        Self {
            population_size: default_population(),
            num_generations: default_generations(),
            crossover_rate: default_crossover_rate(),
            mutation_rate: default_mutation_rate(),
            crossover: default_crossover(),
            mutation: default_mutation(),
            selection: default_selection(),
            seed: None,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse {}: {}", path, e);
                Config::default()
            }),
            Err(_) => {
                eprintln!("Warning: No config file at {}, using defaults", path);
                Config::default()
            }
        }
    }
}

/// Resolve the three operators from CLI codes (if given) or config names.
pub fn resolve_operators(
    args: &Args,
    config: &Config,
) -> Result<(Crossover, Mutation, Selection), String> {
    let crossover = match args.crossover_code {
        Some(code) => Crossover::from_code(code)
            .ok_or_else(|| format!("unknown crossover code {code} (expected 0-5)"))?,
        None => Crossover::from_name(&config.ga.crossover)
            .ok_or_else(|| format!("unknown crossover {:?}", config.ga.crossover))?,
    };
    let mutation = match args.mutation_code {
        Some(code) => Mutation::from_code(code)
            .ok_or_else(|| format!("unknown mutation code {code} (expected 10-12)"))?,
        None => Mutation::from_name(&config.ga.mutation)
            .ok_or_else(|| format!("unknown mutation {:?}", config.ga.mutation))?,
    };
    let selection = match args.selection_code {
        Some(code) => Selection::from_code(code)
            .ok_or_else(|| format!("unknown selection code {code} (expected 23-27)"))?,
        None => Selection::from_name(&config.ga.selection)
            .ok_or_else(|| format!("unknown selection {:?}", config.ga.selection))?,
    };
    Ok((crossover, mutation, selection))
}
