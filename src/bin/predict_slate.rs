use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use tracing_subscriber::EnvFilter;

use hoopcast::artifacts;
use hoopcast::config::ModelConfig;
use hoopcast::per::LeagueAverageCache;
use hoopcast::predict;
use hoopcast::records::Game;
use hoopcast::store;
use hoopcast::synthetic::SyntheticLeague;

const DEFAULT_CONFIG: &str = "config/nba.toml";
const DEFAULT_MODELS: &str = "data/models";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let config_path = parse_string_arg("--config")
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOOPCAST_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = ModelConfig::load(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;

    let models_dir = parse_string_arg("--models")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS));
    let model = artifacts::load_stack(&models_dir)?;

    let (history, games) = if has_flag("--synthetic") {
        let seed = parse_string_arg("--seed")
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(7);
        let league = SyntheticLeague::generate(seed, 5, 10, 40);
        (league.history(&config.league), league.upcoming(1))
    } else {
        let db_path = parse_string_arg("--db")
            .map(PathBuf::from)
            .unwrap_or_else(store::default_db_path);
        let conn = store::open_db(&db_path)?;
        let history = store::load_history(&conn, &config.league)?;
        let date = match parse_string_arg("--date") {
            Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .with_context(|| format!("bad --date `{raw}`, expected YYYY-MM-DD"))?,
            None => chrono::Local::now().date_naive(),
        };
        let games: Vec<Game> = history
            .schedule()
            .filter(|g| g.date == date && !g.is_final())
            .cloned()
            .collect();
        (history, games)
    };
    if games.is_empty() {
        return Err(anyhow!("no unplayed games on the requested slate"));
    }

    let cache = LeagueAverageCache::new();
    let slate = predict::predict_games(&history, &cache, &config, &model, &games)?;

    if has_flag("--json") {
        println!(
            "{}",
            serde_json::to_string_pretty(&slate).context("serialize predictions")?
        );
        return Ok(());
    }

    for row in &slate {
        let bases = row
            .prediction
            .base_outputs
            .iter()
            .map(|o| format!("{}={:.3}", o.model_id, o.probability))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{} {} @ {}  p_home={:.3} p_away={:.3}  [{}]",
            row.game.date,
            row.game.away_abbr,
            row.game.home_abbr,
            row.prediction.p_home,
            row.p_away(),
            bases
        );
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
