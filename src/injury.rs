//! Pre-game injury impact of one team, derived from its resolved cohorts.

use crate::cohorts::Cohorts;
use crate::config::EPS;
use crate::feature_spec::Stat;
use crate::records::PlayerId;

/// Share of star mass above which the ratio is clipped.
pub const STAR_SHARE_CAP: f64 = 1.5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InjuryImpact {
    pub min_lost: f64,
    pub severity: f64,
    pub star_score_share: f64,
    pub top1_star_out: bool,
}

impl InjuryImpact {
    pub fn value(&self, stat: Stat) -> f64 {
        match stat {
            Stat::InjMinLost => self.min_lost,
            Stat::InjSeverity => self.severity,
            Stat::InjStarScoreShare => self.star_score_share,
            Stat::InjTop1StarOut => {
                if self.top1_star_out {
                    1.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

/// `min_lost / (usage_mpg + EPS)`
pub fn injury_severity(min_lost: f64, usage_mpg: f64) -> f64 {
    min_lost / (usage_mpg + EPS)
}

fn top3_star_mass(cohorts: &Cohorts, players: impl Iterator<Item = PlayerId>) -> f64 {
    let mut scores: Vec<f64> = players
        .map(|p| cohorts.usage_of(p).star_score().max(0.0))
        .collect();
    scores.sort_by(|a, b| b.total_cmp(a));
    scores.iter().take(3).sum()
}

pub fn injury_impact(cohorts: &Cohorts) -> InjuryImpact {
    let injured_usage = || {
        cohorts
            .usage_players
            .iter()
            .copied()
            .filter(|p| cohorts.injured.contains(p))
    };

    let min_lost: f64 = injured_usage().map(|p| cohorts.mpg(p)).sum();
    let usage_mpg: f64 = cohorts.usage_players.iter().map(|p| cohorts.mpg(*p)).sum();
    let severity = injury_severity(min_lost, usage_mpg);

    let lost_mass = top3_star_mass(cohorts, injured_usage());
    let total_mass = top3_star_mass(cohorts, cohorts.usage_players.iter().copied());
    let star_score_share = (lost_mass / (total_mass + EPS)).clamp(0.0, STAR_SHARE_CAP);

    let top1_star_out = cohorts
        .star
        .is_some_and(|star| cohorts.injured.contains(&star));

    InjuryImpact {
        min_lost,
        severity,
        star_score_share,
        top1_star_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohorts::PlayerUsage;

    fn cohorts(rows: &[(PlayerId, f64, f64)], injured: &[PlayerId]) -> Cohorts {
        let mut out = Cohorts::empty(1);
        for (p, mpg, per) in rows {
            out.roster.insert(*p);
            out.usage_players.insert(*p);
            out.usage.insert(
                *p,
                PlayerUsage {
                    games: 20,
                    minutes: mpg * 20.0,
                    mpg: *mpg,
                    per: *per,
                },
            );
        }
        out.injured = injured.iter().copied().collect();
        out.star = rows
            .iter()
            .max_by(|a, b| (a.1 * a.2).total_cmp(&(b.1 * b.2)))
            .map(|r| r.0);
        out
    }

    #[test]
    fn severity_matches_closed_form() {
        let s = injury_severity(20.0, 200.0);
        assert!((s - 0.10).abs() < EPS);
    }

    #[test]
    fn severity_from_cohorts() {
        let rows: Vec<_> = (1..=8).map(|p| (p, 25.0, 15.0)).collect();
        let out = injury_impact(&cohorts(&rows, &[3]));
        assert!((out.min_lost - 25.0).abs() < 1e-12);
        assert!((out.severity - 25.0 / 200.0).abs() < EPS);
    }

    #[test]
    fn no_players_is_all_zero() {
        let out = injury_impact(&Cohorts::empty(1));
        assert_eq!(out.min_lost, 0.0);
        assert_eq!(out.severity, 0.0);
        assert_eq!(out.star_score_share, 0.0);
        assert!(!out.top1_star_out);
    }

    #[test]
    fn star_out_and_share() {
        let rows = [(1, 36.0, 25.0), (2, 30.0, 15.0), (3, 28.0, 14.0), (4, 20.0, 12.0)];
        let out = injury_impact(&cohorts(&rows, &[1]));
        assert!(out.top1_star_out);
        let total = 36.0 * 25.0 + 30.0 * 15.0 + 28.0 * 14.0;
        assert!((out.star_score_share - 900.0 / (total + EPS)).abs() < 1e-9);
        assert_eq!(out.value(Stat::InjTop1StarOut), 1.0);

        let healthy = injury_impact(&cohorts(&rows, &[4]));
        assert!(!healthy.top1_star_out);
        assert!((healthy.star_score_share - 240.0 / (total + EPS)).abs() < 1e-12);
    }
}
