//! Per-game feature rows and the training table built from them.

use std::collections::HashMap;
use std::io::{Read, Write};

use anyhow::{Context, Result, anyhow};
use chrono::Datelike;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregator::{Aggregator, GameCache};
use crate::cohorts::Mode;
use crate::error::ModelError;
use crate::feature_spec::{Calc, FeatureSpec, Side, Stat, Window};
use crate::per::PerScale;
use crate::records::{Game, GameId};
use crate::seasons::SeasonRange;

pub const IDENTITY_COLUMNS: [&str; 6] = [
    "season_year",
    "month",
    "day",
    "home_team_abbr",
    "away_team_abbr",
    "game_id",
];
pub const PREDICTION_COLUMNS: [&str; 4] = [
    "pred_home_points",
    "pred_away_points",
    "pred_margin",
    "pred_point_total",
];
pub const TARGET_COLUMNS: [&str; 3] = ["HomeWon", "home_points", "away_points"];

/// Feature values of one game. Only [`FeatureVectorBuilder`] can add entries;
/// once built the vector is read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    game_id: GameId,
    keys: Vec<String>,
    values: Vec<f64>,
    per_scale: PerScale,
}

impl FeatureVector {
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn per_scale(&self) -> PerScale {
        self.per_scale
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.keys.iter().position(|k| k == key).map(|i| self.values[i])
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug)]
pub struct FeatureVectorBuilder {
    inner: FeatureVector,
}

impl FeatureVectorBuilder {
    pub fn new(game_id: GameId) -> Self {
        Self {
            inner: FeatureVector {
                game_id,
                keys: Vec::new(),
                values: Vec::new(),
                per_scale: PerScale::Normalized,
            },
        }
    }

    pub fn push(&mut self, key: impl Into<String>, value: f64) {
        self.inner.keys.push(key.into());
        self.inner.values.push(value);
    }

    pub fn per_scale(&mut self, scale: PerScale) {
        self.inner.per_scale = scale;
    }

    pub fn build(self) -> FeatureVector {
        self.inner
    }
}

fn expected_points_spec(side: Side) -> FeatureSpec {
    FeatureSpec {
        stat: Stat::ExpPoints,
        window: Window::Season,
        calc: Calc::Derived,
        side,
        context: None,
    }
}

/// Evaluates every spec for one game, then the point predictions.
pub fn assemble_game(
    agg: &Aggregator<'_>,
    specs: &[FeatureSpec],
    game: &Game,
    mode: Mode,
) -> FeatureVector {
    let mut cache = GameCache::new(mode);
    let mut builder = FeatureVectorBuilder::new(game.game_id);
    for spec in specs {
        let value = agg.evaluate_with(spec, game.home_team, game, game.date, &mut cache);
        builder.push(spec.key(), value);
    }

    let home = agg.evaluate_with(&expected_points_spec(Side::Home), game.home_team, game, game.date, &mut cache);
    let away = agg.evaluate_with(&expected_points_spec(Side::Away), game.home_team, game, game.date, &mut cache);
    builder.push(PREDICTION_COLUMNS[0], home);
    builder.push(PREDICTION_COLUMNS[1], away);
    builder.push(PREDICTION_COLUMNS[2], home - away);
    builder.push(PREDICTION_COLUMNS[3], home + away);
    builder.per_scale(cache.per_scale());
    builder.build()
}

pub fn assemble_games(
    agg: &Aggregator<'_>,
    specs: &[FeatureSpec],
    games: &[Game],
    mode: Mode,
) -> Vec<FeatureVector> {
    let out: Vec<FeatureVector> = games
        .par_iter()
        .map(|game| assemble_game(agg, specs, game, mode))
        .collect();
    debug!(games = out.len(), specs = specs.len(), "assembled feature vectors");
    out
}

pub fn assemble_table(
    agg: &Aggregator<'_>,
    specs: &[FeatureSpec],
    games: &[Game],
    mode: Mode,
) -> Result<TrainingTable> {
    let vectors = assemble_games(agg, specs, games, mode);
    let table = TrainingTable::from_vectors(games, vectors)?;
    info!(rows = table.rows.len(), columns = table.columns().len(), "built feature table");
    Ok(table)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub season: i32,
    pub month: u32,
    pub day: u32,
    pub home_abbr: String,
    pub away_abbr: String,
    pub game_id: GameId,
    pub values: Vec<f64>,
    pub home_won: Option<bool>,
    pub home_points: Option<u32>,
    pub away_points: Option<u32>,
    /// Not written to CSV; rows read back are always normalized.
    pub per_scale: PerScale,
}

impl TableRow {
    pub fn is_labelled(&self) -> bool {
        self.home_won.is_some()
    }

    /// Labelled and built from league-normalized PER.
    pub fn is_trainable(&self) -> bool {
        self.is_labelled() && self.per_scale == PerScale::Normalized
    }
}

/// Training data: identity columns, one column per feature key plus the point
/// predictions, and targets last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingTable {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub game_ids: Vec<GameId>,
    pub x: Vec<Vec<f64>>,
    pub y: Vec<bool>,
}

impl TrainingTable {
    pub fn new(columns: Vec<String>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self {
            columns,
            index,
            rows: Vec::new(),
        }
    }

    pub fn from_vectors(games: &[Game], vectors: Vec<FeatureVector>) -> Result<Self> {
        let Some(first) = vectors.first() else {
            return Ok(Self::default());
        };
        let mut table = Self::new(first.keys().to_vec());
        let by_id: HashMap<GameId, &Game> = games.iter().map(|g| (g.game_id, g)).collect();
        for v in vectors {
            let game = by_id
                .get(&v.game_id())
                .ok_or_else(|| anyhow!("feature vector for unknown game {}", v.game_id()))?;
            if v.keys() != table.columns.as_slice() {
                return Err(anyhow!("feature vector for game {} has a different layout", game.game_id));
            }
            table.rows.push(TableRow {
                season: game.season,
                month: game.date.month(),
                day: game.date.day(),
                home_abbr: game.home_abbr.clone(),
                away_abbr: game.away_abbr.clone(),
                game_id: game.game_id,
                values: v.values().to_vec(),
                home_won: game.home_won(),
                home_points: game.home_points,
                away_points: game.away_points,
                per_scale: v.per_scale(),
            });
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn row(&self, game_id: GameId) -> Option<&TableRow> {
        self.rows.iter().find(|r| r.game_id == game_id)
    }

    pub fn seasons(&self) -> Vec<i32> {
        let mut out: Vec<i32> = self.rows.iter().map(|r| r.season).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn resolve(&self, model: &str, names: &[String]) -> Result<Vec<usize>, ModelError> {
        names
            .iter()
            .map(|name| {
                self.column_index(name).ok_or_else(|| ModelError::MissingColumn {
                    model: model.to_string(),
                    column: name.clone(),
                })
            })
            .collect()
    }

    /// Trainable rows in `seasons`, projected onto `columns`.
    pub fn select(&self, columns: &[usize], seasons: SeasonRange) -> Selection {
        let mut out = Selection::default();
        for row in &self.rows {
            let Some(won) = row.home_won else {
                continue;
            };
            if !row.is_trainable() || !seasons.contains(row.season) {
                continue;
            }
            out.game_ids.push(row.game_id);
            out.x.push(columns.iter().map(|&i| row.values[i]).collect());
            out.y.push(won);
        }
        out
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        let header = IDENTITY_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .chain(self.columns.iter().cloned())
            .chain(TARGET_COLUMNS.iter().map(|s| s.to_string()));
        w.write_record(header).context("write training table header")?;

        let mut skipped = 0usize;
        for row in &self.rows {
            if row.per_scale != PerScale::Normalized {
                skipped += 1;
                continue;
            }
            let mut record: Vec<String> = vec![
                row.season.to_string(),
                row.month.to_string(),
                row.day.to_string(),
                row.home_abbr.clone(),
                row.away_abbr.clone(),
                row.game_id.to_string(),
            ];
            record.extend(row.values.iter().map(|v| v.to_string()));
            record.push(
                row.home_won
                    .map(|w| (if w { "1" } else { "0" }).to_string())
                    .unwrap_or_default(),
            );
            record.push(row.home_points.map(|p| p.to_string()).unwrap_or_default());
            record.push(row.away_points.map(|p| p.to_string()).unwrap_or_default());
            w.write_record(&record)
                .with_context(|| format!("write training row for game {}", row.game_id))?;
        }
        w.flush().context("flush training table")?;
        if skipped > 0 {
            warn!(skipped, "rows built from unnormalized PER left out of the table");
        }
        Ok(())
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut r = csv::Reader::from_reader(reader);
        let header: Vec<String> = r
            .headers()
            .context("read training table header")?
            .iter()
            .map(|s| s.to_string())
            .collect();
        let n_id = IDENTITY_COLUMNS.len();
        let n_target = TARGET_COLUMNS.len();
        if header.len() < n_id + n_target
            || header[..n_id] != IDENTITY_COLUMNS
            || header[header.len() - n_target..] != TARGET_COLUMNS
        {
            return Err(anyhow!("training table header does not have the expected layout"));
        }
        let mut table = Self::new(header[n_id..header.len() - n_target].to_vec());

        for (line, record) in r.records().enumerate() {
            let record = record.with_context(|| format!("read training row {}", line + 1))?;
            let field = |i: usize| record.get(i).unwrap_or("");
            let parse_opt = |i: usize| -> Result<Option<u32>> {
                let raw = field(i);
                if raw.is_empty() {
                    return Ok(None);
                }
                raw.parse::<u32>()
                    .map(Some)
                    .with_context(|| format!("row {}: bad integer `{raw}`", line + 1))
            };
            let values = (n_id..header.len() - n_target)
                .map(|i| {
                    field(i)
                        .parse::<f64>()
                        .with_context(|| format!("row {}: bad value in `{}`", line + 1, header[i]))
                })
                .collect::<Result<Vec<f64>>>()?;
            let target = header.len() - n_target;
            let home_won = match field(target) {
                "" => None,
                "1" => Some(true),
                "0" => Some(false),
                other => return Err(anyhow!("row {}: bad HomeWon `{other}`", line + 1)),
            };
            table.rows.push(TableRow {
                season: field(0)
                    .parse()
                    .with_context(|| format!("row {}: bad season", line + 1))?,
                month: field(1).parse().with_context(|| format!("row {}: bad month", line + 1))?,
                day: field(2).parse().with_context(|| format!("row {}: bad day", line + 1))?,
                home_abbr: field(3).to_string(),
                away_abbr: field(4).to_string(),
                game_id: field(5)
                    .parse()
                    .with_context(|| format!("row {}: bad game id", line + 1))?,
                values,
                home_won,
                home_points: parse_opt(target + 1)?,
                away_points: parse_opt(target + 2)?,
                per_scale: PerScale::Normalized,
            });
        }
        info!(rows = table.rows.len(), columns = table.columns.len(), "training table loaded");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::per::LeagueAverageCache;
    use crate::synthetic::{SyntheticLeague, league_config};

    fn specs() -> Vec<FeatureSpec> {
        ["margin|season|avg|home", "margin|season|avg|away", "margin|season|avg|diff", "per|games_5|weighted_MIN|home|rotation"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect()
    }

    #[test]
    fn builder_appends_in_order() {
        let mut b = FeatureVectorBuilder::new(9);
        b.push("a", 1.0);
        b.push("b", 2.0);
        let v = b.build();
        assert_eq!(v.keys(), ["a".to_string(), "b".to_string()]);
        assert_eq!(v.get("b"), Some(2.0));
        assert_eq!(v.get("c"), None);
    }

    #[test]
    fn parallel_assembly_matches_sequential() {
        let league = SyntheticLeague::generate(12, 1, 6, 16);
        let history = league.history(&league_config());
        let cache = LeagueAverageCache::new();
        let agg = Aggregator::with_defaults(&history, &cache);
        let games: Vec<Game> = history.schedule().cloned().collect();
        let specs = specs();
        let par = assemble_games(&agg, &specs, &games, Mode::Train);
        let seq: Vec<FeatureVector> = games
            .iter()
            .map(|g| assemble_game(&agg, &specs, g, Mode::Train))
            .collect();
        assert_eq!(par, seq);
        for v in &par {
            let diff = v.get("margin|season|avg|diff").unwrap();
            let home = v.get("margin|season|avg|home").unwrap();
            let away = v.get("margin|season|avg|away").unwrap();
            assert_eq!(diff, home - away);
        }
    }

    #[test]
    fn csv_round_trip_keeps_layout_and_targets() {
        let league = SyntheticLeague::generate(13, 1, 4, 8);
        let history = league.history(&league_config());
        let cache = LeagueAverageCache::new();
        let agg = Aggregator::with_defaults(&history, &cache);
        let mut games: Vec<Game> = history.schedule().cloned().collect();
        games.extend(league.upcoming(1));
        let vectors = assemble_games(&agg, &specs(), &games, Mode::Train);
        let table = TrainingTable::from_vectors(&games, vectors).unwrap();

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("season_year,month,day,home_team_abbr,away_team_abbr,game_id,"));
        assert!(header.ends_with("pred_point_total,HomeWon,home_points,away_points"));

        let back = TrainingTable::read_csv(buf.as_slice()).unwrap();
        assert_eq!(back, table);
        assert!(back.rows.iter().any(|r| !r.is_labelled()));
    }

    fn row(game_id: GameId, per_scale: PerScale) -> TableRow {
        TableRow {
            season: 2019,
            month: 1,
            day: 2,
            home_abbr: "AAA".into(),
            away_abbr: "BBB".into(),
            game_id,
            values: vec![game_id as f64],
            home_won: Some(true),
            home_points: Some(101),
            away_points: Some(99),
            per_scale,
        }
    }

    #[test]
    fn unnormalized_rows_never_reach_training() {
        let mut table = TrainingTable::new(vec!["x".into()]);
        table.rows.push(row(1, PerScale::Normalized));
        table.rows.push(row(2, PerScale::Unnormalized));
        assert!(!table.rows[1].is_trainable());

        let picked = table.select(&[0], SeasonRange::new(2019, 2019).unwrap());
        assert_eq!(picked.game_ids, vec![1]);

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let back = TrainingTable::read_csv(buf.as_slice()).unwrap();
        assert_eq!(back.rows.len(), 1);
        assert_eq!(back.rows[0].game_id, 1);
    }

    #[test]
    fn resolve_reports_missing_column() {
        let table = TrainingTable::new(vec!["a".into()]);
        let err = table.resolve("m1", &["b".to_string()]).unwrap_err();
        assert!(matches!(err, ModelError::MissingColumn { .. }));
    }
}
