// Sqlite persistence of raw game rows. The feature core only reads from here;
// the upsert functions are the ingestion side of the contract.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, params};
use tracing::info;

use crate::config::LeagueConfig;
use crate::history::GameHistory;
use crate::records::{Game, GameId, GamePlayerStat, GameType, PlayerId, RosterEntry, TeamGameRecord, TeamId, Venue};

pub const DB_PATH_ENV: &str = "HOOPCAST_DB_PATH";

pub fn default_db_path() -> PathBuf {
    std::env::var(DB_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/hoopcast.sqlite"))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS games (
            game_id INTEGER PRIMARY KEY,
            league TEXT NOT NULL,
            season INTEGER NOT NULL,
            game_date TEXT NOT NULL,
            home_team INTEGER NOT NULL,
            away_team INTEGER NOT NULL,
            home_abbr TEXT NOT NULL,
            away_abbr TEXT NOT NULL,
            game_type TEXT NOT NULL,
            home_points INTEGER NULL,
            away_points INTEGER NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_league_season ON games(league, season);
        CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date);

        CREATE TABLE IF NOT EXISTS team_games (
            game_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            opponent_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            game_date TEXT NOT NULL,
            venue TEXT NOT NULL,
            game_type TEXT NOT NULL,
            complete INTEGER NOT NULL,
            points INTEGER NOT NULL,
            opp_points INTEGER NOT NULL,
            fgm INTEGER NOT NULL,
            fga INTEGER NOT NULL,
            fg3m INTEGER NOT NULL,
            fg3a INTEGER NOT NULL,
            ftm INTEGER NOT NULL,
            fta INTEGER NOT NULL,
            oreb INTEGER NOT NULL,
            dreb INTEGER NOT NULL,
            opp_oreb INTEGER NOT NULL,
            opp_dreb INTEGER NOT NULL,
            assists INTEGER NOT NULL,
            steals INTEGER NOT NULL,
            blocks INTEGER NOT NULL,
            turnovers INTEGER NOT NULL,
            fouls INTEGER NOT NULL,
            pace REAL NOT NULL,
            rest_days INTEGER NULL,
            travel_km REAL NOT NULL,
            PRIMARY KEY (game_id, team_id)
        );
        CREATE INDEX IF NOT EXISTS idx_team_games_team ON team_games(team_id, season);

        CREATE TABLE IF NOT EXISTS player_games (
            game_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            opponent_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            game_date TEXT NOT NULL,
            venue TEXT NOT NULL,
            game_type TEXT NOT NULL,
            starter INTEGER NOT NULL,
            complete INTEGER NOT NULL,
            minutes REAL NOT NULL,
            points INTEGER NOT NULL,
            oreb INTEGER NOT NULL,
            dreb INTEGER NOT NULL,
            assists INTEGER NOT NULL,
            steals INTEGER NOT NULL,
            blocks INTEGER NOT NULL,
            turnovers INTEGER NOT NULL,
            fouls INTEGER NOT NULL,
            fgm INTEGER NOT NULL,
            fga INTEGER NOT NULL,
            fg3m INTEGER NOT NULL,
            fg3a INTEGER NOT NULL,
            ftm INTEGER NOT NULL,
            fta INTEGER NOT NULL,
            PRIMARY KEY (game_id, player_id)
        );
        CREATE INDEX IF NOT EXISTS idx_player_games_team ON player_games(team_id, season);

        CREATE TABLE IF NOT EXISTS game_injuries (
            game_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            PRIMARY KEY (game_id, team_id, player_id)
        );

        CREATE TABLE IF NOT EXISTS rosters (
            team_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            injured INTEGER NOT NULL,
            starter INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (team_id, player_id)
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn venue_str(venue: Venue) -> &'static str {
    match venue {
        Venue::Home => "home",
        Venue::Away => "away",
    }
}

fn venue_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Venue> {
    let raw: String = row.get(idx)?;
    match raw.as_str() {
        "home" => Ok(Venue::Home),
        "away" => Ok(Venue::Away),
        _ => Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown venue `{raw}`").into(),
        )),
    }
}

fn game_type_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<GameType> {
    let raw: String = row.get(idx)?;
    GameType::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unknown game type `{raw}`").into())
    })
}

fn upsert_game(tx: &Transaction<'_>, league: &str, g: &Game) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO games (
            game_id, league, season, game_date, home_team, away_team,
            home_abbr, away_abbr, game_type, home_points, away_points
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(game_id) DO UPDATE SET
            league = excluded.league,
            season = excluded.season,
            game_date = excluded.game_date,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            home_abbr = excluded.home_abbr,
            away_abbr = excluded.away_abbr,
            game_type = excluded.game_type,
            home_points = excluded.home_points,
            away_points = excluded.away_points
        "#,
        params![
            g.game_id as i64,
            league,
            g.season,
            g.date,
            g.home_team,
            g.away_team,
            g.home_abbr,
            g.away_abbr,
            g.game_type.as_str(),
            g.home_points,
            g.away_points,
        ],
    )
    .with_context(|| format!("upsert game {}", g.game_id))?;
    Ok(())
}

fn upsert_team_game(tx: &Transaction<'_>, r: &TeamGameRecord) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO team_games (
            game_id, team_id, opponent_id, season, game_date, venue, game_type, complete,
            points, opp_points, fgm, fga, fg3m, fg3a, ftm, fta,
            oreb, dreb, opp_oreb, opp_dreb, assists, steals, blocks, turnovers, fouls,
            pace, rest_days, travel_km
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25,
            ?26, ?27, ?28
        )
        ON CONFLICT(game_id, team_id) DO UPDATE SET
            opponent_id = excluded.opponent_id,
            season = excluded.season,
            game_date = excluded.game_date,
            venue = excluded.venue,
            game_type = excluded.game_type,
            complete = excluded.complete,
            points = excluded.points,
            opp_points = excluded.opp_points,
            fgm = excluded.fgm,
            fga = excluded.fga,
            fg3m = excluded.fg3m,
            fg3a = excluded.fg3a,
            ftm = excluded.ftm,
            fta = excluded.fta,
            oreb = excluded.oreb,
            dreb = excluded.dreb,
            opp_oreb = excluded.opp_oreb,
            opp_dreb = excluded.opp_dreb,
            assists = excluded.assists,
            steals = excluded.steals,
            blocks = excluded.blocks,
            turnovers = excluded.turnovers,
            fouls = excluded.fouls,
            pace = excluded.pace,
            rest_days = excluded.rest_days,
            travel_km = excluded.travel_km
        "#,
        params![
            r.game_id as i64,
            r.team_id,
            r.opponent_id,
            r.season,
            r.game_date,
            venue_str(r.venue),
            r.game_type.as_str(),
            r.complete,
            r.points,
            r.opp_points,
            r.fgm,
            r.fga,
            r.fg3m,
            r.fg3a,
            r.ftm,
            r.fta,
            r.oreb,
            r.dreb,
            r.opp_oreb,
            r.opp_dreb,
            r.assists,
            r.steals,
            r.blocks,
            r.turnovers,
            r.fouls,
            r.pace,
            r.rest_days,
            r.travel_km,
        ],
    )
    .with_context(|| format!("upsert team game {}/{}", r.game_id, r.team_id))?;

    tx.execute(
        "DELETE FROM game_injuries WHERE game_id = ?1 AND team_id = ?2",
        params![r.game_id as i64, r.team_id],
    )
    .context("clear game injuries")?;
    for player in &r.injured {
        tx.execute(
            "INSERT OR IGNORE INTO game_injuries (game_id, team_id, player_id) VALUES (?1, ?2, ?3)",
            params![r.game_id as i64, r.team_id, player],
        )
        .context("insert game injury")?;
    }
    Ok(())
}

fn upsert_player_game(tx: &Transaction<'_>, p: &GamePlayerStat) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO player_games (
            game_id, player_id, team_id, opponent_id, season, game_date, venue, game_type,
            starter, complete, minutes, points, oreb, dreb, assists, steals, blocks,
            turnovers, fouls, fgm, fga, fg3m, fg3a, ftm, fta
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
            ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
        )
        ON CONFLICT(game_id, player_id) DO UPDATE SET
            team_id = excluded.team_id,
            opponent_id = excluded.opponent_id,
            season = excluded.season,
            game_date = excluded.game_date,
            venue = excluded.venue,
            game_type = excluded.game_type,
            starter = excluded.starter,
            complete = excluded.complete,
            minutes = excluded.minutes,
            points = excluded.points,
            oreb = excluded.oreb,
            dreb = excluded.dreb,
            assists = excluded.assists,
            steals = excluded.steals,
            blocks = excluded.blocks,
            turnovers = excluded.turnovers,
            fouls = excluded.fouls,
            fgm = excluded.fgm,
            fga = excluded.fga,
            fg3m = excluded.fg3m,
            fg3a = excluded.fg3a,
            ftm = excluded.ftm,
            fta = excluded.fta
        "#,
        params![
            p.game_id as i64,
            p.player_id,
            p.team_id,
            p.opponent_id,
            p.season,
            p.game_date,
            venue_str(p.venue),
            p.game_type.as_str(),
            p.starter,
            p.complete,
            p.minutes,
            p.points,
            p.oreb,
            p.dreb,
            p.assists,
            p.steals,
            p.blocks,
            p.turnovers,
            p.fouls,
            p.fgm,
            p.fga,
            p.fg3m,
            p.fg3a,
            p.ftm,
            p.fta,
        ],
    )
    .with_context(|| format!("upsert player game {}/{}", p.game_id, p.player_id))?;
    Ok(())
}

/// Counts of rows written by [`upsert_rows`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub games: usize,
    pub team_games: usize,
    pub player_games: usize,
}

/// Writes one batch of ingested rows in a single transaction.
pub fn upsert_rows(
    conn: &mut Connection,
    league: &str,
    games: &[Game],
    team_rows: &[TeamGameRecord],
    player_rows: &[GamePlayerStat],
) -> Result<UpsertSummary> {
    let tx = conn.transaction().context("begin upsert transaction")?;
    for g in games {
        upsert_game(&tx, league, g)?;
    }
    for r in team_rows {
        upsert_team_game(&tx, r)?;
    }
    for p in player_rows {
        upsert_player_game(&tx, p)?;
    }
    tx.commit().context("commit upsert transaction")?;
    Ok(UpsertSummary {
        games: games.len(),
        team_games: team_rows.len(),
        player_games: player_rows.len(),
    })
}

/// Replaces the live roster of every team present in `entries`.
pub fn replace_rosters(conn: &mut Connection, entries: &[RosterEntry]) -> Result<usize> {
    let tx = conn.transaction().context("begin roster transaction")?;
    let mut teams: Vec<TeamId> = entries.iter().map(|e| e.team_id).collect();
    teams.sort_unstable();
    teams.dedup();
    for team in &teams {
        tx.execute("DELETE FROM rosters WHERE team_id = ?1", params![team])
            .context("clear roster")?;
    }
    let now = chrono::Utc::now().to_rfc3339();
    for e in entries {
        tx.execute(
            r#"
            INSERT INTO rosters (team_id, player_id, injured, starter, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(team_id, player_id) DO UPDATE SET
                injured = excluded.injured,
                starter = excluded.starter,
                updated_at = excluded.updated_at
            "#,
            params![e.team_id, e.player_id, e.injured, e.starter, now],
        )
        .context("upsert roster entry")?;
    }
    tx.commit().context("commit roster transaction")?;
    Ok(entries.len())
}

pub fn load_games(conn: &Connection, league: &str) -> Result<Vec<Game>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT game_id, season, game_date, home_team, away_team,
                   home_abbr, away_abbr, game_type, home_points, away_points
            FROM games
            WHERE league = ?1
            ORDER BY game_date ASC, game_id ASC
            "#,
        )
        .context("prepare load games query")?;
    let rows = stmt
        .query_map(params![league], |row| {
            Ok(Game {
                game_id: row.get::<_, u64>(0)?,
                season: row.get(1)?,
                date: row.get(2)?,
                home_team: row.get(3)?,
                away_team: row.get(4)?,
                home_abbr: row.get(5)?,
                away_abbr: row.get(6)?,
                game_type: game_type_at(row, 7)?,
                home_points: row.get(8)?,
                away_points: row.get(9)?,
            })
        })
        .context("query load games")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode game row")?);
    }
    Ok(out)
}

fn load_injuries(conn: &Connection) -> Result<HashMap<(GameId, TeamId), Vec<PlayerId>>> {
    let mut stmt = conn
        .prepare("SELECT game_id, team_id, player_id FROM game_injuries ORDER BY player_id")
        .context("prepare load injuries query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, u64>(0)?, row.get::<_, u32>(1)?, row.get::<_, u32>(2)?))
        })
        .context("query load injuries")?;
    let mut out: HashMap<(GameId, TeamId), Vec<PlayerId>> = HashMap::new();
    for row in rows {
        let (game, team, player) = row.context("decode injury row")?;
        out.entry((game, team)).or_default().push(player);
    }
    Ok(out)
}

pub fn load_team_games(conn: &Connection, league: &str) -> Result<Vec<TeamGameRecord>> {
    let mut injuries = load_injuries(conn)?;
    let mut stmt = conn
        .prepare(
            r#"
            SELECT t.game_id, t.team_id, t.opponent_id, t.season, t.game_date, t.venue,
                   t.game_type, t.complete, t.points, t.opp_points, t.fgm, t.fga,
                   t.fg3m, t.fg3a, t.ftm, t.fta, t.oreb, t.dreb, t.opp_oreb, t.opp_dreb,
                   t.assists, t.steals, t.blocks, t.turnovers, t.fouls, t.pace,
                   t.rest_days, t.travel_km
            FROM team_games t
            JOIN games g ON g.game_id = t.game_id
            WHERE g.league = ?1
            ORDER BY t.game_date ASC, t.game_id ASC, t.team_id ASC
            "#,
        )
        .context("prepare load team games query")?;
    let rows = stmt
        .query_map(params![league], |row| {
            Ok(TeamGameRecord {
                game_id: row.get::<_, u64>(0)?,
                team_id: row.get(1)?,
                opponent_id: row.get(2)?,
                season: row.get(3)?,
                game_date: row.get(4)?,
                venue: venue_at(row, 5)?,
                game_type: game_type_at(row, 6)?,
                complete: row.get(7)?,
                points: row.get(8)?,
                opp_points: row.get(9)?,
                fgm: row.get(10)?,
                fga: row.get(11)?,
                fg3m: row.get(12)?,
                fg3a: row.get(13)?,
                ftm: row.get(14)?,
                fta: row.get(15)?,
                oreb: row.get(16)?,
                dreb: row.get(17)?,
                opp_oreb: row.get(18)?,
                opp_dreb: row.get(19)?,
                assists: row.get(20)?,
                steals: row.get(21)?,
                blocks: row.get(22)?,
                turnovers: row.get(23)?,
                fouls: row.get(24)?,
                pace: row.get(25)?,
                rest_days: row.get(26)?,
                travel_km: row.get(27)?,
                injured: Vec::new(),
            })
        })
        .context("query load team games")?;

    let mut out = Vec::new();
    for row in rows {
        let mut record = row.context("decode team game row")?;
        record.injured = injuries
            .remove(&(record.game_id, record.team_id))
            .unwrap_or_default();
        out.push(record);
    }
    Ok(out)
}

pub fn load_player_games(conn: &Connection, league: &str) -> Result<Vec<GamePlayerStat>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT p.game_id, p.player_id, p.team_id, p.opponent_id, p.season, p.game_date,
                   p.venue, p.game_type, p.starter, p.complete, p.minutes, p.points,
                   p.oreb, p.dreb, p.assists, p.steals, p.blocks, p.turnovers, p.fouls,
                   p.fgm, p.fga, p.fg3m, p.fg3a, p.ftm, p.fta
            FROM player_games p
            JOIN games g ON g.game_id = p.game_id
            WHERE g.league = ?1
            ORDER BY p.game_date ASC, p.game_id ASC, p.player_id ASC
            "#,
        )
        .context("prepare load player games query")?;
    let rows = stmt
        .query_map(params![league], |row| {
            Ok(GamePlayerStat {
                game_id: row.get::<_, u64>(0)?,
                player_id: row.get(1)?,
                team_id: row.get(2)?,
                opponent_id: row.get(3)?,
                season: row.get(4)?,
                game_date: row.get(5)?,
                venue: venue_at(row, 6)?,
                game_type: game_type_at(row, 7)?,
                starter: row.get(8)?,
                complete: row.get(9)?,
                minutes: row.get(10)?,
                points: row.get(11)?,
                oreb: row.get(12)?,
                dreb: row.get(13)?,
                assists: row.get(14)?,
                steals: row.get(15)?,
                blocks: row.get(16)?,
                turnovers: row.get(17)?,
                fouls: row.get(18)?,
                fgm: row.get(19)?,
                fga: row.get(20)?,
                fg3m: row.get(21)?,
                fg3a: row.get(22)?,
                ftm: row.get(23)?,
                fta: row.get(24)?,
            })
        })
        .context("query load player games")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode player game row")?);
    }
    Ok(out)
}

pub fn load_rosters(conn: &Connection) -> Result<Vec<RosterEntry>> {
    let mut stmt = conn
        .prepare("SELECT team_id, player_id, injured, starter FROM rosters ORDER BY team_id, player_id")
        .context("prepare load rosters query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RosterEntry {
                team_id: row.get(0)?,
                player_id: row.get(1)?,
                injured: row.get(2)?,
                starter: row.get(3)?,
            })
        })
        .context("query load rosters")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode roster row")?);
    }
    Ok(out)
}

/// Loads every stored row of `league` into an in-memory history. The league's
/// admission rule drops excluded game types and incomplete rows.
pub fn load_history(conn: &Connection, league: &LeagueConfig) -> Result<GameHistory> {
    let games = load_games(conn, &league.name)?;
    let team_rows = load_team_games(conn, &league.name)?;
    let player_rows = load_player_games(conn, &league.name)?;
    let rosters = load_rosters(conn)?;
    info!(
        league = %league.name,
        games = games.len(),
        team_rows = team_rows.len(),
        player_rows = player_rows.len(),
        "loaded history from sqlite"
    );
    Ok(GameHistory::from_rows(league, games, team_rows, player_rows, rosters))
}
