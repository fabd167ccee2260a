use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::LeagueConfig;
use crate::history::GameHistory;
use crate::records::{
    Game, GameId, GamePlayerStat, GameType, PlayerId, RosterEntry, TeamGameRecord, TeamId, Venue,
};

const ROSTER_SIZE: u32 = 13;
const FIRST_SEASON: i32 = 2015;
// Base minutes by depth-chart slot; sums to about 240.
const BASE_MINUTES: [f64; ROSTER_SIZE as usize] = [
    35.0, 34.0, 32.0, 30.0, 28.0, 24.0, 20.0, 15.0, 10.0, 6.0, 3.0, 2.0, 1.0,
];
const HOME_EDGE: f64 = 1.5;

pub fn league_config() -> LeagueConfig {
    LeagueConfig {
        name: "synthetic".to_string(),
        excluded_game_types: vec![GameType::Preseason, GameType::AllStar],
    }
}

pub fn player_id(team: TeamId, slot: u32) -> PlayerId {
    team * 100 + slot + 1
}

#[derive(Debug, Clone)]
pub struct SyntheticLeague {
    pub strengths: Vec<f64>,
    pub games: Vec<Game>,
    pub team_rows: Vec<TeamGameRecord>,
    pub player_rows: Vec<GamePlayerStat>,
    pub rosters: Vec<RosterEntry>,
    next_game_id: GameId,
    seed: u64,
}

struct Side {
    team: TeamId,
    venue: Venue,
    lines: Vec<GamePlayerStat>,
    injured: Vec<PlayerId>,
    pace: f64,
    travel_km: f64,
}

impl SyntheticLeague {
    /// `days` match days per season; on each one every team plays once (one team
    /// sits out when `teams` is odd).
    pub fn generate(seed: u64, seasons: u32, teams: u32, days: u32) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let teams = teams.max(2);
        let strengths: Vec<f64> = (0..teams).map(|_| rng.gen_range(-7.0..7.0)).collect();
        let mut out = SyntheticLeague {
            strengths,
            games: Vec::new(),
            team_rows: Vec::new(),
            player_rows: Vec::new(),
            rosters: Vec::new(),
            next_game_id: 1,
            seed,
        };

        for s in 0..seasons {
            let season = FIRST_SEASON + s as i32;
            let mut date = NaiveDate::from_ymd_opt(season - 1, 10, 20).unwrap_or_default();
            for day in 0..days {
                for (home, away) in round_robin(teams, day) {
                    out.play(&mut rng, season, date, home, away, GameType::Regular);
                }
                date += Duration::days(rng.gen_range(1..=3));
            }
        }

        for team in 1..=teams {
            for slot in 0..ROSTER_SIZE {
                out.rosters.push(RosterEntry {
                    team_id: team,
                    player_id: player_id(team, slot),
                    injured: slot < 10 && rng.gen_bool(0.08),
                    starter: slot < 5,
                });
            }
        }
        out
    }

    pub fn teams(&self) -> u32 {
        self.strengths.len() as u32
    }

    pub fn seasons(&self) -> Vec<i32> {
        let mut out: Vec<i32> = self.games.iter().map(|g| g.season).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn with_all_star_game(mut self) -> Self {
        let mut rng = StdRng::seed_from_u64(self.seed ^ 0xA5A5);
        let Some(last) = self.games.last().cloned() else {
            return self;
        };
        self.play(&mut rng, last.season, last.date, 1, 2, GameType::AllStar);
        self
    }

    /// Unplayed games scheduled after the last recorded date.
    pub fn upcoming(&self, days: u32) -> Vec<Game> {
        let Some(last) = self.games.last() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut id = self.next_game_id;
        let mut date = last.date;
        for day in 0..days {
            date += Duration::days(1);
            for (home, away) in round_robin(self.teams(), day + 7) {
                out.push(Game {
                    game_id: id,
                    season: last.season,
                    date,
                    home_team: home,
                    away_team: away,
                    home_abbr: abbr(home),
                    away_abbr: abbr(away),
                    game_type: GameType::Regular,
                    home_points: None,
                    away_points: None,
                });
                id += 1;
            }
        }
        out
    }

    pub fn history(&self, league: &LeagueConfig) -> GameHistory {
        GameHistory::from_rows(
            league,
            self.games.clone(),
            self.team_rows.clone(),
            self.player_rows.clone(),
            self.rosters.clone(),
        )
    }

    fn strength(&self, team: TeamId) -> f64 {
        self.strengths
            .get(team.saturating_sub(1) as usize)
            .copied()
            .unwrap_or(0.0)
    }

    fn play(
        &mut self,
        rng: &mut StdRng,
        season: i32,
        date: NaiveDate,
        home: TeamId,
        away: TeamId,
        game_type: GameType,
    ) {
        let game_id = self.next_game_id;
        self.next_game_id += 1;

        let edge = self.strength(home) - self.strength(away) + HOME_EDGE;
        let pace = rng.gen_range(94.0..104.0);
        let mut home_side = self.side(rng, game_id, season, date, home, away, Venue::Home, edge / 2.0, pace, game_type);
        let away_side = self.side(rng, game_id, season, date, away, home, Venue::Away, -edge / 2.0, pace, game_type);

        let home_points: u32 = home_side.lines.iter().map(|l| l.points).sum();
        let away_points: u32 = away_side.lines.iter().map(|l| l.points).sum();
        if home_points == away_points
            && let Some(first) = home_side.lines.first_mut()
        {
            first.ftm += 1;
            first.fta += 1;
            first.points += 1;
        }
        let home_points: u32 = home_side.lines.iter().map(|l| l.points).sum();

        for (me, them) in [(&home_side, &away_side), (&away_side, &home_side)] {
            let row = team_row(me, them, game_id, season, date, game_type, self.last_date(me.team, season));
            self.team_rows.push(row);
        }
        self.player_rows.extend(home_side.lines);
        self.player_rows.extend(away_side.lines);
        self.games.push(Game {
            game_id,
            season,
            date,
            home_team: home,
            away_team: away,
            home_abbr: abbr(home),
            away_abbr: abbr(away),
            game_type,
            home_points: Some(home_points),
            away_points: Some(away_points),
        });
    }

    fn last_date(&self, team: TeamId, season: i32) -> Option<NaiveDate> {
        self.team_rows
            .iter()
            .rev()
            .find(|r| r.team_id == team && r.season == season)
            .map(|r| r.game_date)
    }

    #[allow(clippy::too_many_arguments)]
    fn side(
        &self,
        rng: &mut StdRng,
        game_id: GameId,
        season: i32,
        date: NaiveDate,
        team: TeamId,
        opponent: TeamId,
        venue: Venue,
        edge: f64,
        pace: f64,
        game_type: GameType,
    ) -> Side {
        let injured: Vec<PlayerId> = (0..10)
            .filter(|_| rng.gen_bool(0.04))
            .map(|slot| player_id(team, slot))
            .collect();
        let shooting = 0.46 + edge * 0.004;
        let mut lines = Vec::new();
        let mut starters = 0;
        for slot in 0..ROSTER_SIZE {
            let player = player_id(team, slot);
            if injured.contains(&player) {
                continue;
            }
            let minutes = (BASE_MINUTES[slot as usize] + noise(rng, 3.0)).max(0.0);
            let minutes = if minutes < 1.0 { 0.0 } else { (minutes * 10.0).round() / 10.0 };
            let starter = minutes > 0.0 && starters < 5;
            if starter {
                starters += 1;
            }

            let usage = minutes * (pace / 100.0);
            let fga = (usage * rng.gen_range(0.30..0.45)).round() as u32;
            let pct = (shooting + noise(rng, 0.06)).clamp(0.2, 0.75);
            let fgm = ((fga as f64) * pct).round() as u32;
            let fg3a = ((fga as f64) * rng.gen_range(0.2..0.45)).round() as u32;
            let fg3m = (((fg3a as f64) * rng.gen_range(0.25..0.45)).round() as u32).min(fgm);
            let fta = (usage * rng.gen_range(0.05..0.15)).round() as u32;
            let ftm = ((fta as f64) * rng.gen_range(0.65..0.9)).round() as u32;
            let scale = |rate: f64, rng: &mut StdRng| (minutes * rate * rng.gen_range(0.5..1.5)).round() as u32;

            lines.push(GamePlayerStat {
                game_id,
                player_id: player,
                team_id: team,
                opponent_id: opponent,
                season,
                game_date: date,
                venue,
                game_type,
                starter,
                complete: true,
                minutes,
                points: 2 * (fgm - fg3m) + 3 * fg3m + ftm,
                oreb: scale(0.05, rng),
                dreb: scale(0.15, rng),
                assists: scale(0.12, rng),
                steals: scale(0.03, rng),
                blocks: scale(0.02, rng),
                turnovers: scale(0.06, rng),
                fouls: scale(0.07, rng),
                fgm,
                fga,
                fg3m,
                fg3a,
                ftm,
                fta,
            });
        }
        let travel_km = match venue {
            Venue::Home => 0.0,
            Venue::Away => rng.gen_range(300.0..3500.0),
        };
        Side {
            team,
            venue,
            lines,
            injured,
            pace,
            travel_km,
        }
    }
}

fn team_row(
    me: &Side,
    them: &Side,
    game_id: GameId,
    season: i32,
    date: NaiveDate,
    game_type: GameType,
    last: Option<NaiveDate>,
) -> TeamGameRecord {
    let sum = |side: &Side, f: fn(&GamePlayerStat) -> u32| side.lines.iter().map(f).sum::<u32>();
    TeamGameRecord {
        game_id,
        team_id: me.team,
        opponent_id: them.team,
        season,
        game_date: date,
        venue: me.venue,
        game_type,
        complete: true,
        points: sum(me, |l| l.points),
        opp_points: sum(them, |l| l.points),
        fgm: sum(me, |l| l.fgm),
        fga: sum(me, |l| l.fga),
        fg3m: sum(me, |l| l.fg3m),
        fg3a: sum(me, |l| l.fg3a),
        ftm: sum(me, |l| l.ftm),
        fta: sum(me, |l| l.fta),
        oreb: sum(me, |l| l.oreb),
        dreb: sum(me, |l| l.dreb),
        opp_oreb: sum(them, |l| l.oreb),
        opp_dreb: sum(them, |l| l.dreb),
        assists: sum(me, |l| l.assists),
        steals: sum(me, |l| l.steals),
        blocks: sum(me, |l| l.blocks),
        turnovers: sum(me, |l| l.turnovers),
        fouls: sum(me, |l| l.fouls),
        pace: me.pace,
        rest_days: last.map(|d| (date - d).num_days() as u32),
        travel_km: me.travel_km,
        injured: me.injured.clone(),
    }
}

/// Circle-method pairing for one match day; home/away flips every other day.
fn round_robin(teams: u32, day: u32) -> Vec<(TeamId, TeamId)> {
    let n = if teams % 2 == 0 { teams } else { teams + 1 };
    let rounds = n - 1;
    let r = day % rounds;
    let slot = |i: u32| -> u32 {
        if i == 0 { 0 } else { 1 + (i - 1 + r) % rounds }
    };
    let mut out = Vec::new();
    for i in 0..n / 2 {
        let a = slot(i) + 1;
        let b = slot(n - 1 - i) + 1;
        if a > teams || b > teams {
            continue;
        }
        if (day / rounds + i) % 2 == 0 {
            out.push((a, b));
        } else {
            out.push((b, a));
        }
    }
    out
}

fn abbr(team: TeamId) -> String {
    format!("T{team:02}")
}

fn noise(rng: &mut StdRng, scale: f64) -> f64 {
    let s: f64 = (0..4).map(|_| rng.gen_range(-1.0_f64..1.0)).sum();
    s * scale / 1.15
}
