#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process;

use genedx::config::StudyConfig;
use genedx::pipeline::{RunOptions, run_from_path};
use genedx::report::format_summary;

#[derive(Args)]
pub struct EvaluateArgs {
    /// Path to the study file (.toml) naming the cohorts and models
    pub config: PathBuf,

    /// Directory for tables and figures, overriding the study file
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Seed for fold shuffling and model initialisation, overriding the study file
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Number of cross-validation folds, overriding the study file
    #[arg(long, value_name = "K")]
    pub folds: Option<usize>,

    /// Skip writing the ROC figures
    #[arg(long)]
    pub no_plots: bool,
}

#[derive(Args)]
pub struct InitArgs {
    /// Where to write the template study file
    #[arg(default_value = "study.toml")]
    pub path: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "genedx",
    version,
    about = "Diagnostic classifier comparison for gene-expression cohorts",
    long_about = "Cross-validates a roster of binary classifiers on a training cohort, \
                 refits each on the full cohort and scores independent validation cohorts."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every model of a study and write the results
    #[command(
        about = "Cross-validate and externally validate every model (outputs: model_performance.tsv, predictions.tsv, *_ROC.svg)"
    )]
    Evaluate(EvaluateArgs),

    /// Write a template study file
    #[command(about = "Write a template study file (outputs: study.toml)")]
    Init(InitArgs),

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Evaluate(args)) => evaluate(args),
        Some(Commands::Init(args)) => init(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|e| e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

pub fn evaluate(args: EvaluateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let options = RunOptions {
        output_dir: args.output_dir,
        seed: args.seed,
        folds: args.folds,
        skip_plots: args.no_plots,
    };
    let summary = run_from_path(&args.config, &options)?;

    println!("\n{}", format_summary(&summary.results));
    println!("Files written:");
    for file in &summary.files {
        println!("  {}", file.display());
    }
    Ok(())
}

pub fn init(args: InitArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.path.exists() {
        return Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!(
                "'{}' already exists; refusing to overwrite it",
                args.path.display()
            ),
        )));
    }
    fs::write(&args.path, StudyConfig::template()?)?;
    println!("Template study written to {}", args.path.display());
    println!("Edit the cohort paths, then run: genedx evaluate {}", args.path.display());
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let build_timestamp: u64 = env!("GENEDX_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("genedx {}", env!("CARGO_PKG_VERSION"));

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        match now.checked_sub(build_timestamp) {
            Some(age) if age > 0 => println!("Built: {}", format_duration_ago(age)),
            _ => println!("Built: just now"),
        }
    }
}
