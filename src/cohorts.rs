//! Player cohorts for one team as of one date.
//!
//! There is exactly one resolution routine, [`resolve_cohorts`]. Train and predict
//! mode only differ in where the roster, injury list and starter flags come from,
//! which is what the [`CohortSource`] implementations encapsulate. Usage figures
//! (MPG, games played, PER) always come from the season's box lines before `as_of`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::config::CohortConfig;
use crate::history::GameHistory;
use crate::per::SeasonPer;
use crate::records::{Game, PlayerId, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CohortKind {
    Roster,
    Active,
    Usage,
    Rotation,
    Starters,
    Bench,
    Injured,
    Star,
}

pub const ALL_COHORTS: [CohortKind; 8] = [
    CohortKind::Roster,
    CohortKind::Active,
    CohortKind::Usage,
    CohortKind::Rotation,
    CohortKind::Starters,
    CohortKind::Bench,
    CohortKind::Injured,
    CohortKind::Star,
];

impl CohortKind {
    pub fn token(&self) -> &'static str {
        match self {
            CohortKind::Roster => "roster",
            CohortKind::Active => "active",
            CohortKind::Usage => "usage",
            CohortKind::Rotation => "rotation",
            CohortKind::Starters => "starters",
            CohortKind::Bench => "bench",
            CohortKind::Injured => "injured",
            CohortKind::Star => "star",
        }
    }

    pub fn from_token(raw: &str) -> Option<Self> {
        ALL_COHORTS.iter().copied().find(|k| k.token() == raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Predict,
}

/// Where a team's roster, injury list and starter flags come from.
pub trait CohortSource {
    fn mode(&self) -> Mode;
    fn roster(&self, team: TeamId) -> BTreeSet<PlayerId>;
    fn injured(&self, team: TeamId) -> BTreeSet<PlayerId>;
    fn flagged_starters(&self, team: TeamId) -> BTreeSet<PlayerId>;
}

/// Train mode: everything is read from recorded history for `game`.
pub struct HistoricalSource<'a> {
    history: &'a GameHistory,
    game: &'a Game,
}

impl<'a> HistoricalSource<'a> {
    pub fn new(history: &'a GameHistory, game: &'a Game) -> Self {
        Self { history, game }
    }
}

impl CohortSource for HistoricalSource<'_> {
    fn mode(&self) -> Mode {
        Mode::Train
    }

    fn roster(&self, team: TeamId) -> BTreeSet<PlayerId> {
        self.history
            .player_rows_before(team, self.game.season, self.game.date)
            .iter()
            .filter(|r| r.minutes > 0.0)
            .map(|r| r.player_id)
            .collect()
    }

    fn injured(&self, team: TeamId) -> BTreeSet<PlayerId> {
        self.history
            .team_record(team, self.game.game_id)
            .map(|r| r.injured.iter().copied().collect())
            .unwrap_or_default()
    }

    fn flagged_starters(&self, team: TeamId) -> BTreeSet<PlayerId> {
        self.history
            .player_rows_for_game(team, self.game)
            .iter()
            .filter(|r| r.starter)
            .map(|r| r.player_id)
            .collect()
    }
}

/// Predict mode: roster, injuries and starters come from the live roster table.
pub struct LiveRosterSource<'a> {
    history: &'a GameHistory,
}

impl<'a> LiveRosterSource<'a> {
    pub fn new(history: &'a GameHistory) -> Self {
        Self { history }
    }
}

impl CohortSource for LiveRosterSource<'_> {
    fn mode(&self) -> Mode {
        Mode::Predict
    }

    fn roster(&self, team: TeamId) -> BTreeSet<PlayerId> {
        self.history.roster(team).iter().map(|e| e.player_id).collect()
    }

    fn injured(&self, team: TeamId) -> BTreeSet<PlayerId> {
        self.history
            .roster(team)
            .iter()
            .filter(|e| e.injured)
            .map(|e| e.player_id)
            .collect()
    }

    fn flagged_starters(&self, team: TeamId) -> BTreeSet<PlayerId> {
        self.history
            .roster(team)
            .iter()
            .filter(|e| e.starter)
            .map(|e| e.player_id)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerUsage {
    pub games: u32,
    pub minutes: f64,
    pub mpg: f64,
    /// Minutes-weighted PER over the same games.
    pub per: f64,
}

impl PlayerUsage {
    pub fn star_score(&self) -> f64 {
        self.mpg * self.per
    }
}

pub fn season_usage(
    history: &GameHistory,
    per: &SeasonPer,
    team: TeamId,
    season: i32,
    as_of: NaiveDate,
) -> BTreeMap<PlayerId, PlayerUsage> {
    let mut acc: BTreeMap<PlayerId, (u32, f64, f64)> = BTreeMap::new();
    for row in history.player_rows_before(team, season, as_of) {
        if row.minutes <= 0.0 {
            continue;
        }
        let entry = acc.entry(row.player_id).or_default();
        entry.0 += 1;
        entry.1 += row.minutes;
        entry.2 += per.value(history, row) * row.minutes;
    }
    acc.into_iter()
        .map(|(player, (games, minutes, per_min))| {
            let usage = PlayerUsage {
                games,
                minutes,
                mpg: minutes / games as f64,
                per: if minutes > 0.0 { per_min / minutes } else { 0.0 },
            };
            (player, usage)
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cohorts {
    pub team: TeamId,
    pub roster: BTreeSet<PlayerId>,
    pub low_mpg: BTreeSet<PlayerId>,
    pub low_gp: BTreeSet<PlayerId>,
    pub usage_players: BTreeSet<PlayerId>,
    pub injured: BTreeSet<PlayerId>,
    pub active: BTreeSet<PlayerId>,
    /// Ordered by MPG descending, ties by player id.
    pub rotation: Vec<PlayerId>,
    pub starters: BTreeSet<PlayerId>,
    pub bench: BTreeSet<PlayerId>,
    pub star: Option<PlayerId>,
    pub usage: BTreeMap<PlayerId, PlayerUsage>,
}

impl Cohorts {
    pub fn empty(team: TeamId) -> Self {
        Self {
            team,
            ..Default::default()
        }
    }

    pub fn members(&self, kind: CohortKind) -> BTreeSet<PlayerId> {
        match kind {
            CohortKind::Roster => self.roster.clone(),
            CohortKind::Active => self.active.clone(),
            CohortKind::Usage => self.usage_players.clone(),
            CohortKind::Rotation => self.rotation.iter().copied().collect(),
            CohortKind::Starters => self.starters.clone(),
            CohortKind::Bench => self.bench.clone(),
            CohortKind::Injured => self.injured.clone(),
            CohortKind::Star => self.star.into_iter().collect(),
        }
    }

    pub fn usage_of(&self, player: PlayerId) -> PlayerUsage {
        self.usage.get(&player).copied().unwrap_or_default()
    }

    pub fn mpg(&self, player: PlayerId) -> f64 {
        self.usage_of(player).mpg
    }
}

/// Resolves every cohort of `team` as of `as_of`, the same way in both modes.
pub fn resolve_cohorts(
    source: &dyn CohortSource,
    usage: BTreeMap<PlayerId, PlayerUsage>,
    cfg: &CohortConfig,
    team: TeamId,
    team_games_to_date: usize,
) -> Cohorts {
    let roster = source.roster(team);
    if roster.is_empty() {
        return Cohorts::empty(team);
    }
    let gp_thresh = cfg.gp_thresh(team_games_to_date);
    let of = |p: &PlayerId| usage.get(p).copied().unwrap_or_default();

    let low_mpg: BTreeSet<PlayerId> = roster
        .iter()
        .copied()
        .filter(|p| of(p).mpg < cfg.mpg_thresh)
        .collect();
    let low_gp: BTreeSet<PlayerId> = roster
        .iter()
        .copied()
        .filter(|p| of(p).games < gp_thresh)
        .collect();
    let usage_players: BTreeSet<PlayerId> = roster
        .iter()
        .copied()
        .filter(|p| !low_mpg.contains(p) && !low_gp.contains(p))
        .collect();
    let injured: BTreeSet<PlayerId> = source.injured(team).intersection(&roster).copied().collect();
    let active: BTreeSet<PlayerId> = roster.difference(&injured).copied().collect();

    let mut rotation: Vec<PlayerId> = active
        .iter()
        .copied()
        .filter(|p| usage_players.contains(p))
        .collect();
    rotation.sort_by(|a, b| of(b).mpg.total_cmp(&of(a).mpg).then(a.cmp(b)));
    rotation.truncate(cfg.rotation_size);

    let starters: BTreeSet<PlayerId> = source
        .flagged_starters(team)
        .into_iter()
        .filter(|p| rotation.contains(p))
        .collect();
    let bench: BTreeSet<PlayerId> = rotation
        .iter()
        .copied()
        .filter(|p| !starters.contains(p))
        .collect();

    let mut star: Option<(PlayerId, f64)> = None;
    for p in &usage_players {
        let score = of(p).star_score();
        match star {
            Some((_, best)) if best >= score => {}
            _ => star = Some((*p, score)),
        }
    }

    let usage = roster.iter().map(|p| (*p, of(p))).collect();
    Cohorts {
        team,
        roster,
        low_mpg,
        low_gp,
        usage_players,
        injured,
        active,
        rotation,
        starters,
        bench,
        star: star.map(|(p, _)| p),
        usage,
    }
}
