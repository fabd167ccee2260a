//! Read-only, date-sorted index of historical rows.
//!
//! Every slicing method takes an `as_of` date and only returns rows strictly
//! before it, so feature code cannot see the game it is describing.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::config::LeagueConfig;
use crate::records::{GameId, Game, GamePlayerStat, PlayerId, RosterEntry, TeamGameRecord, TeamId};

#[derive(Debug, Clone, Default)]
pub struct GameHistory {
    league: String,
    games: HashMap<GameId, Game>,
    schedule: Vec<GameId>,
    team_rows: HashMap<TeamId, Vec<TeamGameRecord>>,
    team_index: HashMap<(TeamId, GameId), usize>,
    player_rows: HashMap<TeamId, Vec<GamePlayerStat>>,
    rosters: HashMap<TeamId, Vec<RosterEntry>>,
}

impl GameHistory {
    pub fn from_rows(
        league: &LeagueConfig,
        games: Vec<Game>,
        team_rows: Vec<TeamGameRecord>,
        player_rows: Vec<GamePlayerStat>,
        rosters: Vec<RosterEntry>,
    ) -> Self {
        let mut out = GameHistory {
            league: league.name.clone(),
            ..Default::default()
        };

        for game in games {
            if league.excluded_game_types.contains(&game.game_type) {
                continue;
            }
            out.games.insert(game.game_id, game);
        }
        let mut schedule: Vec<&Game> = out.games.values().collect();
        schedule.sort_by(|a, b| a.date.cmp(&b.date).then(a.game_id.cmp(&b.game_id)));
        out.schedule = schedule.into_iter().map(|g| g.game_id).collect();

        for row in team_rows {
            if !league.admits(row.game_type, row.complete) {
                continue;
            }
            out.team_rows.entry(row.team_id).or_default().push(row);
        }
        for rows in out.team_rows.values_mut() {
            rows.sort_by(|a, b| {
                (a.season, a.game_date, a.game_id).cmp(&(b.season, b.game_date, b.game_id))
            });
        }
        for (team, rows) in &out.team_rows {
            for (idx, row) in rows.iter().enumerate() {
                out.team_index.insert((*team, row.game_id), idx);
            }
        }

        for row in player_rows {
            if !league.admits(row.game_type, row.complete) {
                continue;
            }
            out.player_rows.entry(row.team_id).or_default().push(row);
        }
        for rows in out.player_rows.values_mut() {
            rows.sort_by(|a, b| {
                (a.season, a.game_date, a.game_id, a.player_id).cmp(&(
                    b.season,
                    b.game_date,
                    b.game_id,
                    b.player_id,
                ))
            });
        }

        for entry in rosters {
            out.rosters.entry(entry.team_id).or_default().push(entry);
        }
        for entries in out.rosters.values_mut() {
            entries.sort_by_key(|e| e.player_id);
        }
        out
    }

    pub fn league(&self) -> &str {
        &self.league
    }

    pub fn game(&self, game_id: GameId) -> Option<&Game> {
        self.games.get(&game_id)
    }

    pub fn schedule(&self) -> impl Iterator<Item = &Game> {
        self.schedule.iter().filter_map(|id| self.games.get(id))
    }

    pub fn seasons(&self) -> Vec<i32> {
        let mut out: Vec<i32> = self.games.values().map(|g| g.season).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Team rows of `season` played strictly before `as_of`.
    pub fn team_games_before(&self, team: TeamId, season: i32, as_of: NaiveDate) -> &[TeamGameRecord] {
        let Some(rows) = self.team_rows.get(&team) else {
            return &[];
        };
        let lo = rows.partition_point(|r| r.season < season);
        let hi = rows.partition_point(|r| r.season < season || (r.season == season && r.game_date < as_of));
        &rows[lo..hi.max(lo)]
    }

    pub fn team_games_all_before(&self, team: TeamId, as_of: NaiveDate) -> Vec<&TeamGameRecord> {
        self.team_rows
            .get(&team)
            .map(|rows| rows.iter().filter(|r| r.game_date < as_of).collect())
            .unwrap_or_default()
    }

    pub fn team_record(&self, team: TeamId, game_id: GameId) -> Option<&TeamGameRecord> {
        let idx = *self.team_index.get(&(team, game_id))?;
        self.team_rows.get(&team)?.get(idx)
    }

    pub fn player_rows_before(&self, team: TeamId, season: i32, as_of: NaiveDate) -> &[GamePlayerStat] {
        let Some(rows) = self.player_rows.get(&team) else {
            return &[];
        };
        let lo = rows.partition_point(|r| r.season < season);
        let hi = rows.partition_point(|r| r.season < season || (r.season == season && r.game_date < as_of));
        &rows[lo..hi.max(lo)]
    }

    /// Box lines recorded for `team` in one game (used for train-mode starter flags).
    pub fn player_rows_for_game(&self, team: TeamId, game: &Game) -> &[GamePlayerStat] {
        let Some(rows) = self.player_rows.get(&team) else {
            return &[];
        };
        let lo = rows.partition_point(|r| {
            (r.season, r.game_date, r.game_id) < (game.season, game.date, game.game_id)
        });
        let hi = rows.partition_point(|r| {
            (r.season, r.game_date, r.game_id) <= (game.season, game.date, game.game_id)
        });
        &rows[lo..hi.max(lo)]
    }

    /// `team`'s records against `opponent` strictly before `as_of`, oldest first.
    pub fn meetings_before(
        &self,
        team: TeamId,
        opponent: TeamId,
        as_of: NaiveDate,
    ) -> Vec<&TeamGameRecord> {
        self.team_rows
            .get(&team)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.opponent_id == opponent && r.game_date < as_of)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn season_team_rows_before(
        &self,
        season: i32,
        as_of: NaiveDate,
    ) -> impl Iterator<Item = &TeamGameRecord> {
        self.team_rows
            .keys()
            .flat_map(move |team| self.team_games_before(*team, season, as_of))
    }

    pub fn season_player_rows_before(
        &self,
        season: i32,
        as_of: NaiveDate,
    ) -> impl Iterator<Item = &GamePlayerStat> {
        self.player_rows
            .keys()
            .flat_map(move |team| self.player_rows_before(*team, season, as_of))
    }

    pub fn roster(&self, team: TeamId) -> &[RosterEntry] {
        self.rosters.get(&team).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roster_entry(&self, team: TeamId, player: PlayerId) -> Option<&RosterEntry> {
        self.roster(team).iter().find(|e| e.player_id == player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticLeague, league_config};

    #[test]
    fn slices_never_include_the_as_of_date() {
        let league = SyntheticLeague::generate(7, 1, 6, 30);
        let history = league.history(&league_config());
        let game = history.schedule().nth(40).unwrap().clone();
        let rows = history.team_games_before(game.home_team, game.season, game.date);
        assert!(rows.iter().all(|r| r.game_date < game.date));
        let players = history.player_rows_before(game.home_team, game.season, game.date);
        assert!(players.iter().all(|r| r.game_date < game.date));
    }

    #[test]
    fn excluded_game_types_are_dropped() {
        let league = SyntheticLeague::generate(3, 1, 4, 12).with_all_star_game();
        let history = league.history(&league_config());
        assert!(
            history
                .schedule()
                .all(|g| g.game_type != crate::records::GameType::AllStar)
        );
    }

    #[test]
    fn game_rows_are_found_by_game() {
        let league = SyntheticLeague::generate(11, 1, 4, 10);
        let history = league.history(&league_config());
        let game = history.schedule().nth(5).unwrap().clone();
        let rows = history.player_rows_for_game(game.home_team, &game);
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| r.game_id == game.game_id));
        assert!(history.team_record(game.home_team, game.game_id).is_some());
    }

    #[test]
    fn league_slices_stop_before_the_as_of_date() {
        let league = SyntheticLeague::generate(13, 2, 6, 20);
        let history = league.history(&league_config());
        let game = history.schedule().nth(70).unwrap().clone();
        let teams: Vec<_> = history.season_team_rows_before(game.season, game.date).collect();
        assert!(!teams.is_empty());
        assert!(teams.iter().all(|r| r.season == game.season && r.game_date < game.date));
        let players = history.season_player_rows_before(game.season, game.date);
        assert!(players.into_iter().all(|r| r.season == game.season && r.game_date < game.date));
        let whole = history.season_team_rows_before(game.season, NaiveDate::MAX).count();
        assert!(whole > teams.len());
    }
}
