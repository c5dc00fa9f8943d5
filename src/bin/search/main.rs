//! Seismicity Rate Model Search - Worker
//!
//! This binary drives the search over one or more time slices:
//! 1. Bins the catalog's training window into a per-cell Poisson rate
//! 2. Loads the observed counts for the tested year
//! 3. Runs the genetic algorithm (or the full operator sweep)
//! 4. Appends the per-generation statistics and best model to the
//!    result log under an exclusive file lock

mod config;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use seismicity::catalog::{self, CatalogQuery};
use seismicity::fitness::FitnessContext;
use seismicity::genetic::{EvolutionEngine, GaConfig};
use seismicity::grid::Region;
use seismicity::likelihood::{FactorialTable, PoissonScorer};
use seismicity::results::ResultSink;
use seismicity::sweep::{operator_matrix, run_sweep};

use config::{resolve_operators, Args, Config};

fn main() {
    env_logger::init();
    let args = Args::parse();
    let config = Config::load(&args.config);

    if let Err(e) = run(&args, &config) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args, config: &Config) -> seismicity::Result<()> {
    let catalog_path = args.catalog.clone().unwrap_or(config.paths.catalog.clone());
    let output_path = args.output.clone().unwrap_or(config.paths.output.clone());

    let region = Region::new(
        config.region.min_lon,
        config.region.max_lon,
        config.region.min_lat,
        config.region.max_lat,
        config.region.lon_bins,
        config.region.lat_bins,
    )?;

    let (crossover, mutation, selection) =
        resolve_operators(args, config).map_err(seismicity::Error::Config)?;
    let ga_config = GaConfig {
        population_size: config.ga.population_size,
        num_generations: config.ga.num_generations,
        crossover_rate: config.ga.crossover_rate,
        mutation_rate: config.ga.mutation_rate,
        crossover,
        mutation,
        selection,
        seed: args.seed.or(config.ga.seed),
    };

    let scorer = match &config.paths.factorial_table {
        Some(path) => {
            println!("Loading factorial table from {path}...");
            PoissonScorer::with_table(FactorialTable::load(path)?)
        }
        None => PoissonScorer::new(),
    };

    print_banner(&region, &catalog_path, &ga_config);

    let cancel = Arc::new(AtomicBool::new(false));
    setup_interrupt_handler(cancel.clone());

    let sink = ResultSink::new(&output_path);
    let query_base = CatalogQuery {
        year: 0,
        min_magnitude: config.catalog.min_magnitude,
        max_depth: config.catalog.max_depth,
    };

    // One slice per training year: the model is fit to the year one
    // window past the training start, exactly as the legacy drivers
    // stepped through the catalog.
    for start_year in config.catalog.start_year..=config.catalog.end_year {
        if cancel.load(Ordering::Relaxed) {
            println!("Interrupted, stopping before year {start_year}");
            break;
        }

        let tested_year = start_year + config.catalog.window_years as i32;
        let query = CatalogQuery {
            year: tested_year,
            ..query_base.clone()
        };

        let rate = catalog::mean_rate(
            &catalog_path,
            &region,
            &query,
            start_year,
            config.catalog.window_years,
        )?;
        let slice = catalog::load_slice(&catalog_path, &region, &query)?;

        println!("───────────────────────────────────────────────────────────────");
        println!(
            "  Slice {start_year}-{} testing {tested_year}: rate {rate:.4} events/cell, \
             {} observed in region ({} skipped lines)",
            tested_year - 1,
            slice.total_in_region,
            slice.skipped_lines
        );

        if slice.total_in_region == 0 {
            println!("  No events in region for {tested_year}, skipping slice");
            continue;
        }

        let ctx = Arc::new(FitnessContext::with_scorer(
            slice.counts,
            rate,
            scorer.clone(),
        )?);

        if args.sweep {
            let jobs = operator_matrix(&ga_config);
            println!("  Sweeping {} operator combinations on {} workers", jobs.len(), args.workers);
            let outcomes = run_sweep(jobs, ctx, &sink, args.workers, &cancel);
            let mut completed = 0;
            let mut best: Option<(&str, f64)> = None;
            for outcome in &outcomes {
                if let Ok(fitness) = &outcome.result {
                    completed += 1;
                    if best.map_or(true, |(_, b)| *fitness > b) {
                        best = Some((&outcome.label, *fitness));
                    }
                }
            }
            println!("  Sweep finished: {completed}/{} runs completed", outcomes.len());
            if let Some((label, fitness)) = best {
                println!("  Best combination: {label} with log-likelihood {fitness:.4}");
            }
        } else {
            let engine = EvolutionEngine::new(ga_config.clone(), ctx)?;
            let result = engine.run(&cancel)?;
            let label = format!(
                "year{tested_year}-cx{}-mu{}-se{}",
                ga_config.crossover.code(),
                ga_config.mutation.code(),
                ga_config.selection.code()
            );
            sink.append_run(&label, &result.history, &result.best_counts)?;

            if args.verbose {
                for stats in &result.history {
                    println!(
                        "  gen {:>3}  min {:>14.4}  max {:>14.4}  mean {:>14.4}  std {:>12.4}",
                        stats.generation, stats.min, stats.max, stats.mean, stats.std
                    );
                }
            }
            println!(
                "  Best log-likelihood {:.4} after {} generations{}",
                result.best.fitness_or_rejected(),
                result.history.len(),
                if result.cancelled { " (cancelled)" } else { "" }
            );
        }
    }

    println!();
    println!("Results appended to {output_path}");
    Ok(())
}

fn print_banner(region: &Region, catalog_path: &str, config: &GaConfig) {
    println!("═══════════════════════════════════════════════════════════════");
    println!("  SEISMICITY RATE MODEL SEARCH");
    println!("  PID: {}", std::process::id());
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Catalog: {catalog_path}");
    println!(
        "  Grid: {} x {} cells ({} total)",
        region.lon_bins(),
        region.lat_bins(),
        region.cell_count()
    );
    println!(
        "  Population: {}, Generations: {}",
        config.population_size, config.num_generations
    );
    println!(
        "  Crossover rate: {:.2}, Mutation rate: {:.2}",
        config.crossover_rate, config.mutation_rate
    );
    println!();
}

fn setup_interrupt_handler(cancel: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        if cancel.swap(true, Ordering::SeqCst) {
            eprintln!("\nForce quit.");
            std::process::exit(1);
        }
        eprintln!("\nInterrupt received, will stop at the next generation...");
    })
    .expect("Error setting Ctrl-C handler");
}
