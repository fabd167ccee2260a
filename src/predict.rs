//! Probabilities for upcoming games, with cohorts taken from the live roster.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::assembler;
use crate::cohorts::Mode;
use crate::config::ModelConfig;
use crate::ensemble::{EnsembleModel, EnsemblePrediction};
use crate::history::GameHistory;
use crate::per::{LeagueAverageCache, PerScale};
use crate::records::Game;

#[derive(Debug, Clone, Serialize)]
pub struct SlatePrediction {
    pub game: Game,
    pub meta_columns: Vec<String>,
    pub per_scale: PerScale,
    #[serde(flatten)]
    pub prediction: EnsemblePrediction,
}

impl SlatePrediction {
    pub fn p_away(&self) -> f64 {
        1.0 - self.prediction.p_home
    }
}

pub fn predict_games(
    history: &GameHistory,
    league_cache: &LeagueAverageCache,
    config: &ModelConfig,
    model: &EnsembleModel,
    games: &[Game],
) -> Result<Vec<SlatePrediction>> {
    let specs = config.feature_specs().context("parse configured features")?;
    let agg = Aggregator::new(history, league_cache, config);
    let table = assembler::assemble_table(&agg, &specs, games, Mode::Predict)?;

    let meta_columns = model.coefficients().meta_columns.clone();
    let mut out = Vec::with_capacity(table.rows.len());
    for (row, game) in table.rows.iter().zip(games) {
        let prediction = model
            .predict(&table, row)
            .with_context(|| format!("predict game {}", game.game_id))?;
        if row.per_scale != PerScale::Normalized {
            warn!(game = game.game_id, "player features built from unnormalized PER");
        }
        out.push(SlatePrediction {
            game: game.clone(),
            meta_columns: meta_columns.clone(),
            per_scale: row.per_scale,
            prediction,
        });
    }
    info!(games = out.len(), run_id = %model.coefficients().run_id, "predicted slate");
    Ok(out)
}
