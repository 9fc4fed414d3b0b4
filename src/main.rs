use anyhow::Result;
use clap::Parser;
use cryptoforecast::config::PipelineConfig;
use cryptoforecast::data_source::Period;
use cryptoforecast::pipeline::{PipelineOutcome, PredictionPipeline, RunOptions};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

/// Cryptocurrency price prediction system
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cryptocurrency symbol
    #[arg(short, long, default_value = "BTC-USD")]
    symbol: String,

    /// Time period for historical data (1mo, 3mo, 6mo, 1y, 2y)
    #[arg(short, long, default_value = "1y")]
    period: Period,

    /// Skip the text report
    #[arg(long)]
    no_viz: bool,

    /// Skip saving models and results
    #[arg(long)]
    no_save: bool,

    /// Directory for saved artifacts [default: output_dir from the config, "output"]
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

fn print_outcome(outcome: &PipelineOutcome) {
    let rule = "=".repeat(60);
    println!("\n{}", rule);
    println!("PIPELINE RESULTS SUMMARY");
    println!("{}", rule);
    println!("Cryptocurrency: {}", outcome.symbol);
    println!("Period: {}", outcome.period);
    match outcome.best_model {
        Some(model) => {
            println!("Best Model: {}", model);
            println!("Best R² Score: {:.4}", outcome.best_score);
        }
        None => println!("Best Model: none"),
    }
    if !outcome.persistence_warnings.is_empty() {
        println!("Warnings: {} output file(s) could not be saved", outcome.persistence_warnings.len());
    }
    println!("{}", rule);
}

fn run(args: Args) -> Result<()> {
    info!("Loading configuration from: {}", args.config.display());
    let config = PipelineConfig::load_from_file(&args.config)?;

    let options = RunOptions {
        symbol: args.symbol,
        period: args.period,
        create_report: !args.no_viz,
        save_output: !args.no_save,
        output_dir: args
            .output_dir
            .unwrap_or_else(|| PathBuf::from(&config.output_config.output_dir)),
    };

    let pipeline = PredictionPipeline::new(config)?;
    let outcome = pipeline.run(&options)?;
    print_outcome(&outcome);
    Ok(())
}

fn main() -> ExitCode {
    // Initialize logger with default info level if RUST_LOG not set
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();
    info!("Starting cryptocurrency prediction pipeline");

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Pipeline failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
