use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hoopcast::aggregator::Aggregator;
use hoopcast::assembler;
use hoopcast::cohorts::Mode;
use hoopcast::config::ModelConfig;
use hoopcast::history::GameHistory;
use hoopcast::per::LeagueAverageCache;
use hoopcast::records::Game;
use hoopcast::store;
use hoopcast::synthetic::SyntheticLeague;

const DEFAULT_CONFIG: &str = "config/nba.toml";
const DEFAULT_OUT: &str = "data/training.csv";
const SYNTHETIC_SEASONS: u32 = 5;
const SYNTHETIC_TEAMS: u32 = 10;
const SYNTHETIC_DAYS: u32 = 40;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let config_path = parse_path_arg("--config")
        .or_else(|| std::env::var("HOOPCAST_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = ModelConfig::load(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;
    let specs = config.feature_specs()?;

    let history = if has_flag("--synthetic") {
        let seed = parse_u64_arg("--seed").unwrap_or(7);
        SyntheticLeague::generate(seed, SYNTHETIC_SEASONS, SYNTHETIC_TEAMS, SYNTHETIC_DAYS)
            .history(&config.league)
    } else {
        let db_path = parse_path_arg("--db").unwrap_or_else(store::default_db_path);
        let conn = store::open_db(&db_path)?;
        store::load_history(&conn, &config.league)?
    };

    let games = completed_games(&history);
    if games.is_empty() {
        return Err(anyhow!("no completed games for league `{}`", config.league.name));
    }

    let cache = LeagueAverageCache::new();
    let agg = Aggregator::new(&history, &cache, &config);
    let table = assembler::assemble_table(&agg, &specs, &games, Mode::Train)?;

    let out = parse_path_arg("--out").unwrap_or_else(|| PathBuf::from(DEFAULT_OUT));
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let file = File::create(&out).with_context(|| format!("create {}", out.display()))?;
    table.write_csv(BufWriter::new(file))?;

    info!(
        rows = table.rows.len(),
        seasons = ?table.seasons(),
        league_seasons_cached = cache.len(),
        out = %out.display(),
        "wrote training table"
    );
    println!(
        "wrote {} rows x {} feature columns to {}",
        table.rows.len(),
        table.columns().len(),
        out.display()
    );
    Ok(())
}

fn completed_games(history: &GameHistory) -> Vec<Game> {
    history.schedule().filter(|g| g.is_final()).cloned().collect()
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
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<u64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<u64>()
        {
            return Some(v);
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
