//! GA TSP Solver - Command Line Interface
//!
//! Evolves tours for a TSPLIB instance and prints the best ones found.

use clap::{Parser, ValueEnum};
use ga_tsp_solver::config::{available_parallelism, ExecutionStrategy, GaConfig};
use ga_tsp_solver::genetic::GeneticAlgorithm;
use ga_tsp_solver::instance::TspInstance;
use indicatif::ProgressBar;

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ga-tsp-solver")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "Phased parallel genetic algorithm for the TSP")]
struct Cli {
    /// TSPLIB instance with a NODE_COORD_SECTION
    dataset: PathBuf,

    /// Number of tours in the population
    population_size: usize,

    /// Number of generations
    iterations: usize,

    /// Threads to use, the orchestrator included (defaults to the core count)
    worker_count: Option<usize>,

    /// How the generation phases are executed
    #[arg(long, value_enum, default_value = "barrier-pool")]
    strategy: Strategy,

    /// Random seed (drawn from entropy when omitted)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of best tours to print
    #[arg(short, long, default_value = "10")]
    top: usize,

    /// Write the run report as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show a progress bar over generations
    #[arg(long)]
    progress: bool,

    /// Print run details and population statistics
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Strategy {
    /// Single thread
    Sequential,
    /// Persistent worker pool stepped through barriers
    BarrierPool,
    /// Rayon parallel-for per phase
    ParallelFor,
}

impl From<Strategy> for ExecutionStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Sequential => ExecutionStrategy::Sequential,
            Strategy::BarrierPool => ExecutionStrategy::BarrierPool,
            Strategy::ParallelFor => ExecutionStrategy::ParallelFor,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let instance = match TspInstance::from_file(&cli.dataset) {
        Ok(inst) => inst,
        Err(e) => {
            eprintln!("Error loading instance {:?}: {}", cli.dataset, e);
            std::process::exit(1);
        }
    };

    let config = GaConfig {
        population_size: cli.population_size,
        iterations: cli.iterations,
        workers: cli.worker_count.unwrap_or_else(available_parallelism),
        strategy: cli.strategy.into(),
        seed: cli.seed,
        top_k: cli.top,
    };

    let ga = match GeneticAlgorithm::new(instance, config) {
        Ok(ga) => ga,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if cli.verbose {
        let plan = ga.plan();
        println!(
            "Instance {} ({} cities), population {}, {} generations",
            ga.instance().name,
            ga.instance().dimension(),
            plan.population_size,
            plan.iterations
        );
        println!("Strategy {}, {} pool workers, seed {}", plan.strategy, plan.pool_size, ga.seed());
    }

    let bar = cli.progress.then(|| ProgressBar::new(ga.plan().iterations as u64));
    let result = ga.run_with_observer(|view| {
        if let Some(bar) = &bar {
            if view.generation > 0 {
                bar.inc(1);
            }
        }
    });
    if let Some(bar) = &bar {
        bar.finish();
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Run failed: {}", e);
            std::process::exit(1);
        }
    };

    for tour in &report.tours {
        println!("{}", tour);
    }

    if cli.verbose {
        println!(
            "\nBest {:.3}  Mean {:.3}  Std dev {:.3}  Elapsed {:.3}s",
            report.best_length, report.mean_length, report.length_std_dev, report.elapsed_secs
        );
    }

    if let Some(out_path) = cli.output {
        let written = serde_json::to_string_pretty(&report)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(&out_path, json).map_err(|e| e.to_string()));
        match written {
            Ok(()) => println!("\nReport saved to {:?}", out_path),
            Err(e) => {
                eprintln!("Error writing report to {:?}: {}", out_path, e);
                std::process::exit(1);
            }
        }
    }
}
