//! Head-to-head shrinkage over prior meetings of two teams.

use chrono::{Duration, NaiveDate};

use crate::feature_spec::Window;
use crate::records::TeamGameRecord;

/// Empirical-Bayes shrinkage of a mean of `n` observations toward zero.
pub fn eb_shrink(n: usize, mean: f64, k: f64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    (n / (n + k)) * mean
}

pub fn log_weight(n: usize, mean: f64) -> f64 {
    mean * (n as f64).ln_1p()
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct H2hSummary {
    pub games: usize,
    pub margin_sum: f64,
    pub wins: usize,
}

impl H2hSummary {
    pub fn from_meetings<'a>(meetings: impl IntoIterator<Item = &'a TeamGameRecord>) -> Self {
        let mut out = H2hSummary::default();
        for m in meetings {
            out.games += 1;
            out.margin_sum += m.margin();
            if m.won() {
                out.wins += 1;
            }
        }
        out
    }

    pub fn margin_avg(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.margin_sum / self.games as f64
    }

    pub fn margin_eb(&self, k: f64) -> f64 {
        eb_shrink(self.games, self.margin_avg(), k)
    }

    pub fn margin_logw(&self) -> f64 {
        log_weight(self.games, self.margin_avg())
    }

    pub fn win_pct(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.wins as f64 / self.games as f64
    }

    /// `(wins + alpha) / (games + alpha + beta)`, or 0.0 with no meetings.
    pub fn win_beta(&self, alpha: f64, beta: f64) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        (self.wins as f64 + alpha) / (self.games as f64 + alpha + beta)
    }
}

/// First date inside a `days_N` window ending at `as_of`. `None` when the
/// window reaches past the calendar, meaning every row qualifies.
pub fn days_window_start(as_of: NaiveDate, days: u32) -> Option<NaiveDate> {
    Duration::try_days(days as i64).and_then(|d| as_of.checked_sub_signed(d))
}

/// Applies a window to meetings sorted oldest first. `season` keeps the current
/// season only; game and day windows reach back across seasons.
pub fn window_meetings<'a>(
    meetings: &[&'a TeamGameRecord],
    window: Window,
    season: i32,
    as_of: NaiveDate,
) -> Vec<&'a TeamGameRecord> {
    match window {
        Window::Season => meetings
            .iter()
            .copied()
            .filter(|m| m.season == season)
            .collect(),
        Window::Games(n) => {
            let skip = meetings.len().saturating_sub(n as usize);
            meetings[skip..].to_vec()
        }
        Window::Days(n) => {
            let start = days_window_start(as_of, n);
            meetings
                .iter()
                .copied()
                .filter(|m| start.is_none_or(|s| m.game_date >= s))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_is_zero_everywhere() {
        let s = H2hSummary::default();
        assert_eq!(s.margin_avg(), 0.0);
        assert_eq!(s.margin_eb(7.0), 0.0);
        assert_eq!(s.margin_logw(), 0.0);
        assert_eq!(s.win_beta(1.0, 1.0), 0.0);
    }

    #[test]
    fn eb_grows_toward_mean_with_n() {
        let mut last = 0.0;
        for n in 1..50 {
            let v = eb_shrink(n, 6.0, 7.0);
            assert!(v > last);
            assert!(v < 6.0);
            last = v;
        }
        assert!((eb_shrink(10_000, 6.0, 7.0) - 6.0).abs() < 0.01);
    }

    #[test]
    fn beta_smoothing() {
        let s = H2hSummary {
            games: 3,
            margin_sum: 12.0,
            wins: 3,
        };
        assert!((s.win_beta(1.0, 1.0) - 0.8).abs() < 1e-12);
        assert!((s.margin_logw() - 4.0 * 4f64.ln()).abs() < 1e-12);
    }

    fn meeting(date: NaiveDate, season: i32) -> TeamGameRecord {
        TeamGameRecord {
            game_id: 1,
            team_id: 1,
            opponent_id: 2,
            season,
            game_date: date,
            venue: crate::records::Venue::Home,
            game_type: crate::records::GameType::Regular,
            complete: true,
            points: 100,
            opp_points: 95,
            fgm: 38,
            fga: 85,
            fg3m: 10,
            fg3a: 30,
            ftm: 14,
            fta: 18,
            oreb: 9,
            dreb: 33,
            opp_oreb: 10,
            opp_dreb: 32,
            assists: 22,
            steals: 7,
            blocks: 4,
            turnovers: 12,
            fouls: 19,
            pace: 98.0,
            rest_days: None,
            travel_km: 0.0,
            injured: vec![],
        }
    }

    #[test]
    fn day_windows_past_the_calendar_keep_everything() {
        let as_of = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let old = meeting(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(), 1990);
        let recent = meeting(NaiveDate::from_ymd_opt(2020, 2, 20).unwrap(), 2020);
        let all = vec![&old, &recent];

        assert_eq!(days_window_start(as_of, u32::MAX), None);
        assert_eq!(window_meetings(&all, Window::Days(4_000_000_000), 2020, as_of).len(), 2);
        assert_eq!(window_meetings(&all, Window::Days(u32::MAX), 2020, as_of).len(), 2);

        let week = window_meetings(&all, Window::Days(10), 2020, as_of);
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].game_date, recent.game_date);
    }
}
