use chrono::NaiveDate;

use hoopcast::aggregator::Aggregator;
use hoopcast::config::LeagueConfig;
use hoopcast::ensemble::EnsembleCoefficients;
use hoopcast::feature_spec::FeatureSpec;
use hoopcast::history::GameHistory;
use hoopcast::injury::injury_severity;
use hoopcast::per::LeagueAverageCache;
use hoopcast::records::{Game, GamePlayerStat, GameType, PlayerId, TeamGameRecord, TeamId, Venue};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 11, d).unwrap()
}

fn league() -> LeagueConfig {
    LeagueConfig {
        name: "test".into(),
        excluded_game_types: vec![GameType::Preseason, GameType::AllStar],
    }
}

fn team_row(game_id: u64, team: TeamId, opp: TeamId, date: NaiveDate, venue: Venue, pts: u32, opp_pts: u32) -> TeamGameRecord {
    TeamGameRecord {
        game_id,
        team_id: team,
        opponent_id: opp,
        season: 2019,
        game_date: date,
        venue,
        game_type: GameType::Regular,
        complete: true,
        points: pts,
        opp_points: opp_pts,
        fgm: 40,
        fga: 88,
        fg3m: 11,
        fg3a: 32,
        ftm: 17,
        fta: 22,
        oreb: 10,
        dreb: 34,
        opp_oreb: 10,
        opp_dreb: 34,
        assists: 24,
        steals: 8,
        blocks: 5,
        turnovers: 13,
        fouls: 20,
        pace: 99.0,
        rest_days: None,
        travel_km: 0.0,
        injured: vec![],
    }
}

fn game(game_id: u64, home: TeamId, away: TeamId, date: NaiveDate, score: Option<(u32, u32)>) -> Game {
    Game {
        game_id,
        season: 2019,
        date,
        home_team: home,
        away_team: away,
        home_abbr: format!("H{home}"),
        away_abbr: format!("A{away}"),
        game_type: GameType::Regular,
        home_points: score.map(|s| s.0),
        away_points: score.map(|s| s.1),
    }
}

/// Adds one final game with both team rows.
fn play(games: &mut Vec<Game>, rows: &mut Vec<TeamGameRecord>, id: u64, home: TeamId, away: TeamId, date: NaiveDate, hp: u32, ap: u32) {
    games.push(game(id, home, away, date, Some((hp, ap))));
    rows.push(team_row(id, home, away, date, Venue::Home, hp, ap));
    rows.push(team_row(id, away, home, date, Venue::Away, ap, hp));
}

/// Box line whose counting stats all scale with `points`.
#[allow(clippy::too_many_arguments)]
fn player_row(game_id: u64, player: PlayerId, team: TeamId, opp: TeamId, date: NaiveDate, venue: Venue, minutes: f64, points: u32) -> GamePlayerStat {
    GamePlayerStat {
        game_id,
        player_id: player,
        team_id: team,
        opponent_id: opp,
        season: 2019,
        game_date: date,
        venue,
        game_type: GameType::Regular,
        starter: minutes >= 30.0,
        complete: true,
        minutes,
        points,
        oreb: 0,
        dreb: points / 5,
        assists: points / 6,
        steals: 0,
        blocks: 0,
        turnovers: points / 10,
        fouls: 0,
        fgm: points / 2,
        fga: points / 2 + points / 4,
        fg3m: 0,
        fg3a: 0,
        ftm: 0,
        fta: 0,
    }
}

/// Ten home games for team 1 against team 2 with a fixed four-man rotation:
/// 36, 30, 20 and 5 minutes. The third player scores 10 then 14.
fn rotation_league(extra: impl FnOnce(&mut Vec<Game>, &mut Vec<TeamGameRecord>)) -> GameHistory {
    let mut games = Vec::new();
    let mut rows = Vec::new();
    let mut players = Vec::new();
    for g in 0..10u32 {
        let id = g as u64 + 1;
        let date = day(g + 1);
        play(&mut games, &mut rows, id, 1, 2, date, 110, 100);
        let third = if g < 5 { 10 } else { 14 };
        for (player, minutes, points) in [(11, 36.0, 30), (12, 30.0, 20), (13, 20.0, third), (14, 5.0, 2)] {
            players.push(player_row(id, player, 1, 2, date, Venue::Home, minutes, points));
        }
    }
    extra(&mut games, &mut rows);
    GameHistory::from_rows(&league(), games, rows, players, vec![])
}

fn spec(raw: &str) -> FeatureSpec {
    raw.parse().unwrap()
}

#[test]
fn scenario_diff_is_home_minus_away() {
    // Team 1 wins its home games by 4 and 6; team 2 wins its road games by 1 and 3.
    let mut games = Vec::new();
    let mut rows = Vec::new();
    play(&mut games, &mut rows, 1, 1, 3, day(1), 104, 100);
    play(&mut games, &mut rows, 2, 4, 2, day(2), 99, 100);
    play(&mut games, &mut rows, 3, 1, 4, day(3), 106, 100);
    play(&mut games, &mut rows, 4, 3, 2, day(4), 97, 100);
    // Road loss for team 1 must not leak into its home-only value.
    play(&mut games, &mut rows, 5, 3, 1, day(5), 120, 100);
    let target = game(6, 1, 2, day(8), None);
    games.push(target.clone());

    let history = GameHistory::from_rows(&league(), games, rows, vec![], vec![]);
    let cache = LeagueAverageCache::new();
    let agg = Aggregator::with_defaults(&history, &cache);

    let home = agg.evaluate(&spec("margin|season|avg|home"), 0, &target, target.date);
    let away = agg.evaluate(&spec("margin|season|avg|away"), 0, &target, target.date);
    let diff = agg.evaluate(&spec("margin|season|avg|diff"), 0, &target, target.date);
    assert!((home - 5.0).abs() < 1e-12);
    assert!((away - 2.0).abs() < 1e-12);
    assert!((diff - 3.0).abs() < 1e-12);
}

#[test]
fn scenario_team_without_games_reports_zero() {
    let target = game(1, 1, 2, day(1), None);
    let history = GameHistory::from_rows(&league(), vec![target.clone()], vec![], vec![], vec![]);
    let cache = LeagueAverageCache::new();
    let agg = Aggregator::with_defaults(&history, &cache);

    for raw in [
        "margin|season|avg|home",
        "margin|games_10|std|home",
        "margin|season|eb|home",
        "efg_pct|season|raw|home",
        "per|season|weighted_MIN|home|rotation",
        "inj_severity|season|raw|home",
    ] {
        let v = agg.evaluate(&spec(raw), 0, &target, target.date);
        assert_eq!(v, 0.0, "{raw}");
    }
}

#[test]
fn scenario_injury_severity_ratio() {
    let v = injury_severity(20.0, 200.0);
    assert!((v - 0.10).abs() < 1e-6);
}

#[test]
fn scenario_no_meetings_gives_zero_h2h() {
    let mut games = Vec::new();
    let mut rows = Vec::new();
    play(&mut games, &mut rows, 1, 1, 3, day(1), 110, 100);
    play(&mut games, &mut rows, 2, 2, 4, day(2), 110, 100);
    let target = game(3, 1, 2, day(5), None);
    games.push(target.clone());
    let history = GameHistory::from_rows(&league(), games, rows, vec![], vec![]);
    let cache = LeagueAverageCache::new();
    let agg = Aggregator::with_defaults(&history, &cache);

    for raw in [
        "margin_h2h|season|avg|home",
        "margin_h2h|season|eb|home",
        "margin_h2h|season|logw|home",
        "margin_h2h|games_6|eb|diff",
        "win_h2h|games_6|beta|home",
        "h2h_games|season|raw|home",
    ] {
        assert_eq!(agg.evaluate(&spec(raw), 0, &target, target.date), 0.0, "{raw}");
    }
}

#[test]
fn scenario_negligible_passthrough_weight() {
    let coefs = EnsembleCoefficients {
        run_id: "scenario".into(),
        meta_columns: vec![
            "form".into(),
            "shooting".into(),
            "players".into(),
            "availability".into(),
            "matchup".into(),
            "pred_margin".into(),
        ],
        intercept: -1.5,
        coefficients: vec![0.8, 0.85, 0.9, 0.78, 0.95, 0.005],
    };
    // pred_margin enters standardized, so one standard deviation is +1.0.
    let base = [0.7, 0.7, 0.7, 0.7, 0.7, 0.0];
    let mut bumped = base;
    bumped[5] += 1.0;
    let p0 = coefs.p_home(&base);
    let p1 = coefs.p_home(&bumped);
    assert!(p1 > p0);
    assert!(p1 - p0 < 0.001);
}

#[test]
fn scenario_top_n_player_calcs() {
    let target = game(20, 1, 2, day(15), None);
    let history = rotation_league(|games, _| games.push(target.clone()));
    let cache = LeagueAverageCache::new();
    let agg = Aggregator::with_defaults(&history, &cache);
    let eval = |raw: &str| agg.evaluate(&spec(raw), 1, &target, target.date);

    // Minutes order: 11 (30 ppg), 12 (20 ppg), 13 (12 ppg), 14.
    assert!((eval("player_points|season|top2_avg|") - 25.0).abs() < 1e-12);
    let weighted = (30.0 * 36.0 + 20.0 * 30.0) / 66.0;
    assert!((eval("player_points|season|top2_weighted_MPG|") - weighted).abs() < 1e-12);
    assert!((eval("player_points|season|top3_sum|") - 62.0).abs() < 1e-12);
    // Only five games of the window: the third player scored 14 in each.
    assert!((eval("player_points|games_5|top3_sum|") - 64.0).abs() < 1e-12);
}

#[test]
fn scenario_delta_days_and_logw() {
    // Team 1 home margins 2, 4, 6, 10 on days 1, 5, 6, 9.
    let mut games = Vec::new();
    let mut rows = Vec::new();
    play(&mut games, &mut rows, 1, 1, 3, day(1), 102, 100);
    play(&mut games, &mut rows, 2, 1, 3, day(5), 104, 100);
    play(&mut games, &mut rows, 3, 1, 4, day(6), 106, 100);
    play(&mut games, &mut rows, 4, 1, 4, day(9), 110, 100);
    let target = game(5, 1, 2, day(10), None);
    games.push(target.clone());
    let history = GameHistory::from_rows(&league(), games, rows, vec![], vec![]);
    let cache = LeagueAverageCache::new();
    let agg = Aggregator::with_defaults(&history, &cache);
    let eval = |raw: &str| agg.evaluate(&spec(raw), 1, &target, target.date);

    // Last three average 20/3, last one 10.
    assert!((eval("margin|games_3|delta:games_3-games_1|") - (20.0 / 3.0 - 10.0)).abs() < 1e-12);
    // days_5 from day 10 starts on day 5 inclusive.
    assert!((eval("margin|days_5|avg|") - 20.0 / 3.0).abs() < 1e-12);
    assert!((eval("margin|days_1|avg|") - 10.0).abs() < 1e-12);
    assert_eq!(eval("margin|days_1|avg|away"), 0.0);
    // Mean 5.5 over four games.
    assert!((eval("margin|season|logw|") - 5.5 * 5f64.ln()).abs() < 1e-12);
}

#[test]
fn scenario_same_venue_meetings() {
    let mut games = Vec::new();
    let mut rows = Vec::new();
    play(&mut games, &mut rows, 1, 1, 2, day(1), 110, 100);
    play(&mut games, &mut rows, 2, 2, 1, day(3), 104, 100);
    play(&mut games, &mut rows, 3, 1, 2, day(5), 102, 100);
    let target = game(4, 1, 2, day(8), None);
    games.push(target.clone());
    let history = GameHistory::from_rows(&league(), games, rows, vec![], vec![]);
    let cache = LeagueAverageCache::new();
    let agg = Aggregator::with_defaults(&history, &cache);
    let eval = |raw: &str| agg.evaluate(&spec(raw), 0, &target, target.date);

    assert!((eval("margin_h2h|season|avg|home") - 8.0 / 3.0).abs() < 1e-12);
    // Team 1 hosted games 1 and 3; team 2 was the visitor in both.
    assert!((eval("margin_h2h|season|avg|home|same_venue") - 6.0).abs() < 1e-12);
    assert!((eval("margin_h2h|season|avg|away|same_venue") + 6.0).abs() < 1e-12);
    assert_eq!(eval("h2h_games|season|raw|home|same_venue"), 2.0);
}

#[test]
fn scenario_injured_star_from_cohorts_to_features() {
    let target = game(20, 1, 2, day(15), None);
    let history = rotation_league(|games, rows| {
        games.push(target.clone());
        // Pre-game row carrying the injury report: the top scorer and the
        // five-minute player are out.
        let mut report = team_row(20, 1, 2, day(15), Venue::Home, 0, 0);
        report.injured = vec![11, 14];
        rows.push(report);
    });
    let cache = LeagueAverageCache::new();
    let agg = Aggregator::with_defaults(&history, &cache);
    let eval = |raw: &str| agg.evaluate(&spec(raw), 0, &target, target.date);

    // Player 14 is under the minutes threshold, so only 36 of 86 usage minutes go.
    assert!((eval("inj_min_lost|season|raw|home") - 36.0).abs() < 1e-9);
    assert!((eval("inj_severity|season|raw|home") - injury_severity(36.0, 86.0)).abs() < 1e-12);
    assert_eq!(eval("inj_top1_star_out|season|raw|home"), 1.0);
    let share = eval("inj_star_score_share|season|raw|home");
    assert!(share > 0.3 && share < 1.0, "{share}");

    // Rotation features now skip the injured star.
    let healthy = eval("player_points|season|top2_avg|home|rotation");
    assert!((healthy - 16.0).abs() < 1e-12);
    assert_eq!(eval("inj_min_lost|season|raw|away"), 0.0);
}
