use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use hoopcast::artifacts;
use hoopcast::assembler::TrainingTable;
use hoopcast::config::ModelConfig;
use hoopcast::ensemble;

const DEFAULT_CONFIG: &str = "config/nba.toml";
const DEFAULT_TABLE: &str = "data/training.csv";
const DEFAULT_MODELS: &str = "data/models";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let config_path = parse_path_arg("--config")
        .or_else(|| std::env::var("HOOPCAST_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = ModelConfig::load(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;

    let table_path = parse_path_arg("--table").unwrap_or_else(|| PathBuf::from(DEFAULT_TABLE));
    let file = File::open(&table_path).with_context(|| format!("open {}", table_path.display()))?;
    let table = TrainingTable::read_csv(BufReader::new(file))?;

    let run_id = parse_string_arg("--run-id").unwrap_or_else(ensemble::new_run_id);
    let model = ensemble::train_stack(&config, &table, &run_id)?;

    let models_dir = parse_path_arg("--models").unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS));
    if !has_flag("--dry-run") {
        artifacts::save_stack(&models_dir, &model)?;
    }

    println!("run {run_id}");
    println!(
        "{:<14} {:>8} {:>10} {:>10} {:>10}",
        "model", "samples", "log_loss", "brier", "accuracy"
    );
    for base in model.base_models() {
        let m = base.record().metrics.evaluation;
        println!(
            "{:<14} {:>8} {:>10.4} {:>10.4} {:>10.3}",
            base.id(),
            m.samples,
            m.log_loss,
            m.brier,
            m.accuracy
        );
    }
    let m = model.record().metrics.evaluation;
    println!(
        "{:<14} {:>8} {:>10.4} {:>10.4} {:>10.3}",
        ensemble::ENSEMBLE_ID,
        m.samples,
        m.log_loss,
        m.brier,
        m.accuracy
    );
    let coefs = model.coefficients();
    println!("intercept {:+.4}", coefs.intercept);
    for (column, weight) in coefs.meta_columns.iter().zip(&coefs.coefficients) {
        println!("  {column:<20} {weight:+.4}");
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hoopcast=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    parse_string_arg(name).map(PathBuf::from)
}

fn parse_string_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
