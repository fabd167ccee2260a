use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type GameId = u64;
pub type TeamId = u32;
pub type PlayerId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    Regular,
    Playoff,
    PlayIn,
    Preseason,
    AllStar,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Regular => "regular",
            GameType::Playoff => "playoff",
            GameType::PlayIn => "play_in",
            GameType::Preseason => "preseason",
            GameType::AllStar => "all_star",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "regular" => Some(GameType::Regular),
            "playoff" => Some(GameType::Playoff),
            "play_in" => Some(GameType::PlayIn),
            "preseason" => Some(GameType::Preseason),
            "all_star" => Some(GameType::AllStar),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: GameId,
    pub season: i32,
    pub date: NaiveDate,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_abbr: String,
    pub away_abbr: String,
    pub game_type: GameType,
    pub home_points: Option<u32>,
    pub away_points: Option<u32>,
}

impl Game {
    pub fn is_final(&self) -> bool {
        self.home_points.is_some() && self.away_points.is_some()
    }

    pub fn home_won(&self) -> Option<bool> {
        let (Some(h), Some(a)) = (self.home_points, self.away_points) else {
            return None;
        };
        Some(h > a)
    }

    pub fn involves(&self, team: TeamId) -> bool {
        self.home_team == team || self.away_team == team
    }

    pub fn opponent_of(&self, team: TeamId) -> TeamId {
        if self.home_team == team {
            self.away_team
        } else {
            self.home_team
        }
    }
}

/// Team box score for one game. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamGameRecord {
    pub game_id: GameId,
    pub team_id: TeamId,
    pub opponent_id: TeamId,
    pub season: i32,
    pub game_date: NaiveDate,
    pub venue: Venue,
    pub game_type: GameType,
    pub complete: bool,
    pub points: u32,
    pub opp_points: u32,
    pub fgm: u32,
    pub fga: u32,
    pub fg3m: u32,
    pub fg3a: u32,
    pub ftm: u32,
    pub fta: u32,
    pub oreb: u32,
    pub dreb: u32,
    pub opp_oreb: u32,
    pub opp_dreb: u32,
    pub assists: u32,
    pub steals: u32,
    pub blocks: u32,
    pub turnovers: u32,
    pub fouls: u32,
    pub pace: f64,
    pub rest_days: Option<u32>,
    pub travel_km: f64,
    /// Players listed as out for this game.
    #[serde(default)]
    pub injured: Vec<PlayerId>,
}

impl TeamGameRecord {
    pub fn margin(&self) -> f64 {
        self.points as f64 - self.opp_points as f64
    }

    pub fn won(&self) -> bool {
        self.points > self.opp_points
    }

    pub fn possessions(&self) -> f64 {
        (self.fga as f64 - self.oreb as f64 + self.turnovers as f64 + 0.44 * self.fta as f64)
            .max(0.0)
    }

    pub fn off_rating(&self) -> f64 {
        ratio(100.0 * self.points as f64, self.possessions())
    }

    pub fn def_rating(&self) -> f64 {
        ratio(100.0 * self.opp_points as f64, self.possessions())
    }

    pub fn rebounds(&self) -> u32 {
        self.oreb + self.dreb
    }
}

/// Box line for one player in one game. Immutable once the game is final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamePlayerStat {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub team_id: TeamId,
    pub opponent_id: TeamId,
    pub season: i32,
    pub game_date: NaiveDate,
    pub venue: Venue,
    pub game_type: GameType,
    pub starter: bool,
    pub complete: bool,
    pub minutes: f64,
    pub points: u32,
    pub oreb: u32,
    pub dreb: u32,
    pub assists: u32,
    pub steals: u32,
    pub blocks: u32,
    pub turnovers: u32,
    pub fouls: u32,
    pub fgm: u32,
    pub fga: u32,
    pub fg3m: u32,
    pub fg3a: u32,
    pub ftm: u32,
    pub fta: u32,
}

impl GamePlayerStat {
    pub fn rebounds(&self) -> u32 {
        self.oreb + self.dreb
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub team_id: TeamId,
    pub player_id: PlayerId,
    pub injured: bool,
    pub starter: bool,
}

/// Division that resolves a zero or non-finite denominator to 0.0.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        return 0.0;
    }
    let out = num / den;
    if out.is_finite() { out } else { 0.0 }
}
