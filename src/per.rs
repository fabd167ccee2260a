//! Player efficiency rating.
//!
//! Hollinger's unadjusted PER per player-game, pace-adjusted, then scaled so the
//! minutes-weighted league average over the season to date is exactly 15.0.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::history::GameHistory;
use crate::records::{GamePlayerStat, TeamGameRecord, ratio};

pub const LEAGUE_AVERAGE_PER: f64 = 15.0;

/// Whether a PER value was scaled to the league average or is raw aPER.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerScale {
    Normalized,
    Unnormalized,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerValue {
    pub value: f64,
    pub scale: PerScale,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LeagueTotals {
    pub team_games: usize,
    pub points: f64,
    pub fgm: f64,
    pub fga: f64,
    pub ftm: f64,
    pub fta: f64,
    pub oreb: f64,
    pub trb: f64,
    pub assists: f64,
    pub turnovers: f64,
    pub fouls: f64,
    pace_sum: f64,
    pace_games: usize,
}

impl LeagueTotals {
    pub fn from_team_rows<'a>(rows: impl IntoIterator<Item = &'a TeamGameRecord>) -> Self {
        let mut out = LeagueTotals::default();
        for r in rows {
            out.team_games += 1;
            out.points += r.points as f64;
            out.fgm += r.fgm as f64;
            out.fga += r.fga as f64;
            out.ftm += r.ftm as f64;
            out.fta += r.fta as f64;
            out.oreb += r.oreb as f64;
            out.trb += r.rebounds() as f64;
            out.assists += r.assists as f64;
            out.turnovers += r.turnovers as f64;
            out.fouls += r.fouls as f64;
            if r.pace > 0.0 {
                out.pace_sum += r.pace;
                out.pace_games += 1;
            }
        }
        out
    }

    pub fn pace(&self) -> f64 {
        ratio(self.pace_sum, self.pace_games as f64)
    }

    pub fn vop(&self) -> f64 {
        ratio(
            self.points,
            self.fga - self.oreb + self.turnovers + 0.44 * self.fta,
        )
    }

    pub fn drbp(&self) -> f64 {
        ratio(self.trb - self.oreb, self.trb)
    }

    pub fn factor(&self) -> f64 {
        let ast_fg = ratio(self.assists, self.fgm);
        let fg_ft = ratio(self.fgm, self.ftm);
        2.0 / 3.0 - ratio(0.5 * ast_fg, 2.0 * fg_ft)
    }
}

/// Unadjusted PER for one player-game. Zero when the player did not play.
pub fn unadjusted_per(p: &GamePlayerStat, team: Option<&TeamGameRecord>, lg: &LeagueTotals) -> f64 {
    if p.minutes <= 0.0 {
        return 0.0;
    }
    let tm_ast_fg = match team {
        Some(t) if t.fgm > 0 => t.assists as f64 / t.fgm as f64,
        _ => ratio(lg.assists, lg.fgm),
    };
    let vop = lg.vop();
    let drbp = lg.drbp();
    let factor = lg.factor();
    let fg = p.fgm as f64;
    let fga = p.fga as f64;
    let ft = p.ftm as f64;
    let fta = p.fta as f64;
    let orb = p.oreb as f64;
    let trb = p.rebounds() as f64;
    let foul_value = ratio(lg.ftm, lg.fouls) - 0.44 * ratio(lg.fta, lg.fouls) * vop;

    let total = p.fg3m as f64 + (2.0 / 3.0) * p.assists as f64
        + (2.0 - factor * tm_ast_fg) * fg
        + ft * 0.5 * (1.0 + (1.0 - tm_ast_fg) + (2.0 / 3.0) * tm_ast_fg)
        - vop * p.turnovers as f64
        - vop * drbp * (fga - fg)
        - vop * 0.44 * (0.44 + 0.56 * drbp) * (fta - ft)
        + vop * (1.0 - drbp) * (trb - orb)
        + vop * drbp * orb
        + vop * p.steals as f64
        + vop * drbp * p.blocks as f64
        - p.fouls as f64 * foul_value;

    ratio(total, p.minutes)
}

/// Pace-adjusted PER. Falls back to the unadjusted value when team pace is unknown.
pub fn adjusted_per(p: &GamePlayerStat, team: Option<&TeamGameRecord>, lg: &LeagueTotals) -> f64 {
    let uper = unadjusted_per(p, team, lg);
    let team_pace = team.map(|t| t.pace).unwrap_or(0.0);
    let lg_pace = lg.pace();
    if team_pace > 0.0 && lg_pace > 0.0 {
        uper * (lg_pace / team_pace)
    } else {
        uper
    }
}

/// League constants for one season as of one date, and the multiplier that
/// scales aPER to the league average.
#[derive(Debug, Clone)]
pub struct SeasonPer {
    pub league: String,
    pub season: i32,
    pub as_of: NaiveDate,
    pub totals: LeagueTotals,
    pub lg_aper: Option<f64>,
    pub scale: PerScale,
    multiplier: f64,
}

impl SeasonPer {
    /// Uses only the season's rows dated strictly before `as_of`.
    pub fn compute(history: &GameHistory, season: i32, as_of: NaiveDate) -> Self {
        let totals = LeagueTotals::from_team_rows(history.season_team_rows_before(season, as_of));

        let mut weighted = 0.0;
        let mut minutes = 0.0;
        for p in history.season_player_rows_before(season, as_of) {
            if p.minutes <= 0.0 {
                continue;
            }
            let value = adjusted_per(p, history.team_record(p.team_id, p.game_id), &totals);
            if !value.is_finite() {
                continue;
            }
            weighted += value * p.minutes;
            minutes += p.minutes;
        }

        let lg_aper = (minutes > 0.0).then(|| weighted / minutes);
        let usable = lg_aper.filter(|v| v.is_finite() && *v > 0.0);
        let (scale, multiplier) = match usable {
            Some(lg) => (PerScale::Normalized, LEAGUE_AVERAGE_PER / lg),
            None if minutes > 0.0 => {
                warn!(
                    league = history.league(),
                    season,
                    %as_of,
                    lg_aper = ?lg_aper,
                    "league average aPER unavailable; PER left unnormalized"
                );
                (PerScale::Unnormalized, 1.0)
            }
            // Nothing played yet, so there is no value to scale.
            None => (PerScale::Unnormalized, 1.0),
        };
        debug!(season, %as_of, minutes, ?scale, "league PER constants computed");

        SeasonPer {
            league: history.league().to_string(),
            season,
            as_of,
            totals,
            lg_aper: usable,
            scale,
            multiplier,
        }
    }

    /// PER of one box line. Lines outside the season or on/after `as_of` are 0.0.
    pub fn get(&self, history: &GameHistory, p: &GamePlayerStat) -> PerValue {
        let value = if p.season != self.season || p.game_date >= self.as_of || p.minutes <= 0.0 {
            0.0
        } else {
            let aper = adjusted_per(p, history.team_record(p.team_id, p.game_id), &self.totals);
            if aper.is_finite() { aper * self.multiplier } else { 0.0 }
        };
        PerValue {
            value,
            scale: self.scale,
        }
    }

    pub fn value(&self, history: &GameHistory, p: &GamePlayerStat) -> f64 {
        self.get(history, p).value
    }

    pub fn is_normalized(&self) -> bool {
        self.scale == PerScale::Normalized
    }
}

type CacheKey = (String, i32, NaiveDate);

/// Memo table of league constants per (league, season, as-of date), shared
/// read-only across workers.
///
/// Each key is computed at most once; concurrent callers for the same key wait
/// on the same cell and receive the same `Arc`.
#[derive(Debug, Default)]
pub struct LeagueAverageCache {
    entries: RwLock<HashMap<CacheKey, Arc<OnceCell<Arc<SeasonPer>>>>>,
}

impl LeagueAverageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(&self, league: &str, season: i32, as_of: NaiveDate, compute: F) -> Arc<SeasonPer>
    where
        F: FnOnce() -> SeasonPer,
    {
        let key = (league.to_string(), season, as_of);
        let existing = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        let cell = match existing {
            Some(cell) => cell,
            None => self
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key)
                .or_default()
                .clone(),
        };
        cell.get_or_init(|| Arc::new(compute())).clone()
    }

    pub fn season_per(&self, history: &GameHistory, season: i32, as_of: NaiveDate) -> Arc<SeasonPer> {
        self.get_or_compute(history.league(), season, as_of, || {
            SeasonPer::compute(history, season, as_of)
        })
    }

    pub fn league_aper(&self, history: &GameHistory, season: i32, as_of: NaiveDate) -> Option<f64> {
        self.season_per(history, season, as_of).lg_aper
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
