//! Feature keys of the form `stat|window|calc|side[|context]`.
//!
//! A key is parsed once, at configuration time, into closed enums. Anything the
//! registry does not know about is a [`ConfigError::Spec`]; nothing is defaulted.
//! Accepted keys are canonical: `spec.to_string()` reproduces the input exactly.

use std::fmt;
use std::str::FromStr;

use crate::cohorts::CohortKind;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatFamily {
    Team,
    Player,
    Injury,
    HeadToHead,
    Derived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    Margin,
    Points,
    PointsAllowed,
    Win,
    EfgPct,
    TsPct,
    TovPct,
    OrebPct,
    FtRate,
    ThreeRate,
    Pace,
    OffRtg,
    DefRtg,
    NetRtg,
    TravelKm,
    Per,
    PlayerPoints,
    PlayerRebounds,
    PlayerAssists,
    PlayerMinutes,
    InjMinLost,
    InjSeverity,
    InjStarScoreShare,
    InjTop1StarOut,
    MarginH2h,
    WinH2h,
    H2hGames,
    ExpPoints,
    PossEst,
    RestDays,
}

pub const ALL_STATS: [Stat; 30] = [
    Stat::Margin,
    Stat::Points,
    Stat::PointsAllowed,
    Stat::Win,
    Stat::EfgPct,
    Stat::TsPct,
    Stat::TovPct,
    Stat::OrebPct,
    Stat::FtRate,
    Stat::ThreeRate,
    Stat::Pace,
    Stat::OffRtg,
    Stat::DefRtg,
    Stat::NetRtg,
    Stat::TravelKm,
    Stat::Per,
    Stat::PlayerPoints,
    Stat::PlayerRebounds,
    Stat::PlayerAssists,
    Stat::PlayerMinutes,
    Stat::InjMinLost,
    Stat::InjSeverity,
    Stat::InjStarScoreShare,
    Stat::InjTop1StarOut,
    Stat::MarginH2h,
    Stat::WinH2h,
    Stat::H2hGames,
    Stat::ExpPoints,
    Stat::PossEst,
    Stat::RestDays,
];

impl Stat {
    pub fn token(&self) -> &'static str {
        match self {
            Stat::Margin => "margin",
            Stat::Points => "points",
            Stat::PointsAllowed => "points_allowed",
            Stat::Win => "win",
            Stat::EfgPct => "efg_pct",
            Stat::TsPct => "ts_pct",
            Stat::TovPct => "tov_pct",
            Stat::OrebPct => "oreb_pct",
            Stat::FtRate => "ft_rate",
            Stat::ThreeRate => "three_rate",
            Stat::Pace => "pace",
            Stat::OffRtg => "off_rtg",
            Stat::DefRtg => "def_rtg",
            Stat::NetRtg => "net_rtg",
            Stat::TravelKm => "travel_km",
            Stat::Per => "per",
            Stat::PlayerPoints => "player_points",
            Stat::PlayerRebounds => "player_rebounds",
            Stat::PlayerAssists => "player_assists",
            Stat::PlayerMinutes => "player_minutes",
            Stat::InjMinLost => "inj_min_lost",
            Stat::InjSeverity => "inj_severity",
            Stat::InjStarScoreShare => "inj_star_score_share",
            Stat::InjTop1StarOut => "inj_top1_star_out",
            Stat::MarginH2h => "margin_h2h",
            Stat::WinH2h => "win_h2h",
            Stat::H2hGames => "h2h_games",
            Stat::ExpPoints => "exp_points",
            Stat::PossEst => "poss_est",
            Stat::RestDays => "rest_days",
        }
    }

    pub fn from_token(raw: &str) -> Option<Self> {
        ALL_STATS.iter().copied().find(|s| s.token() == raw)
    }

    pub fn family(&self) -> StatFamily {
        match self {
            Stat::Margin
            | Stat::Points
            | Stat::PointsAllowed
            | Stat::Win
            | Stat::EfgPct
            | Stat::TsPct
            | Stat::TovPct
            | Stat::OrebPct
            | Stat::FtRate
            | Stat::ThreeRate
            | Stat::Pace
            | Stat::OffRtg
            | Stat::DefRtg
            | Stat::NetRtg
            | Stat::TravelKm => StatFamily::Team,
            Stat::Per
            | Stat::PlayerPoints
            | Stat::PlayerRebounds
            | Stat::PlayerAssists
            | Stat::PlayerMinutes => StatFamily::Player,
            Stat::InjMinLost
            | Stat::InjSeverity
            | Stat::InjStarScoreShare
            | Stat::InjTop1StarOut => StatFamily::Injury,
            Stat::MarginH2h | Stat::WinH2h | Stat::H2hGames => StatFamily::HeadToHead,
            Stat::ExpPoints | Stat::PossEst | Stat::RestDays => StatFamily::Derived,
        }
    }

    /// Whether a `home`/`away` side also restricts the window to games in that venue role.
    pub fn venue_sensitive(&self) -> bool {
        match self.family() {
            StatFamily::Team | StatFamily::Player => true,
            StatFamily::Derived => !matches!(self, Stat::RestDays),
            StatFamily::Injury | StatFamily::HeadToHead => false,
        }
    }

    /// Calc applied per window inside `blend` and `delta`.
    pub fn default_calc(&self) -> Calc {
        match self.family() {
            StatFamily::Player => Calc::WeightedMin,
            _ => Calc::Avg,
        }
    }

    fn allows(&self, calc: &Calc) -> bool {
        match self.family() {
            StatFamily::Team => matches!(
                calc,
                Calc::Raw
                    | Calc::Avg
                    | Calc::Std
                    | Calc::Eb
                    | Calc::Logw
                    | Calc::Blend(_)
                    | Calc::Delta(..)
            ),
            StatFamily::Player => matches!(
                calc,
                Calc::Avg
                    | Calc::WeightedMin
                    | Calc::WeightedMinRec { .. }
                    | Calc::TopAvg(_)
                    | Calc::TopWeightedMpg(_)
                    | Calc::TopSum(_)
                    | Calc::Blend(_)
                    | Calc::Delta(..)
            ),
            StatFamily::Injury => matches!(calc, Calc::Raw),
            StatFamily::HeadToHead => match self {
                Stat::MarginH2h => matches!(
                    calc,
                    Calc::Avg | Calc::Eb | Calc::Logw | Calc::Blend(_) | Calc::Delta(..)
                ),
                Stat::WinH2h => matches!(calc, Calc::Avg | Calc::Beta),
                _ => matches!(calc, Calc::Raw),
            },
            StatFamily::Derived => matches!(calc, Calc::Derived),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Season,
    Games(u32),
    Days(u32),
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Season => write!(f, "season"),
            Window::Games(n) => write!(f, "games_{n}"),
            Window::Days(n) => write!(f, "days_{n}"),
        }
    }
}

fn parse_window(raw: &str) -> Option<Window> {
    if raw == "season" {
        return Some(Window::Season);
    }
    let (kind, n) = raw.split_once('_')?;
    let n = parse_positive(n)?;
    match kind {
        "games" => Some(Window::Games(n)),
        "days" => Some(Window::Days(n)),
        _ => None,
    }
}

fn parse_positive(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u32>().ok().filter(|n| *n > 0)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Calc {
    Raw,
    Avg,
    Std,
    Eb,
    Logw,
    Beta,
    Derived,
    WeightedMin,
    WeightedMinRec { k: f64 },
    TopAvg(usize),
    TopWeightedMpg(usize),
    TopSum(usize),
    Blend(Vec<(Window, f64)>),
    Delta(Window, Window),
}

impl fmt::Display for Calc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Calc::Raw => write!(f, "raw"),
            Calc::Avg => write!(f, "avg"),
            Calc::Std => write!(f, "std"),
            Calc::Eb => write!(f, "eb"),
            Calc::Logw => write!(f, "logw"),
            Calc::Beta => write!(f, "beta"),
            Calc::Derived => write!(f, "derived"),
            Calc::WeightedMin => write!(f, "weighted_MIN"),
            Calc::WeightedMinRec { k } => write!(f, "weighted_MIN_REC({k})"),
            Calc::TopAvg(n) => write!(f, "top{n}_avg"),
            Calc::TopWeightedMpg(n) => write!(f, "top{n}_weighted_MPG"),
            Calc::TopSum(n) => write!(f, "top{n}_sum"),
            Calc::Blend(parts) => {
                write!(f, "blend:")?;
                for (idx, (window, weight)) in parts.iter().enumerate() {
                    if idx > 0 {
                        write!(f, "/")?;
                    }
                    write!(f, "{window}:{weight}")?;
                }
                Ok(())
            }
            Calc::Delta(a, b) => write!(f, "delta:{a}-{b}"),
        }
    }
}

fn parse_calc(raw: &str) -> Result<Calc, String> {
    match raw {
        "raw" => return Ok(Calc::Raw),
        "avg" => return Ok(Calc::Avg),
        "std" => return Ok(Calc::Std),
        "eb" => return Ok(Calc::Eb),
        "logw" => return Ok(Calc::Logw),
        "beta" => return Ok(Calc::Beta),
        "derived" => return Ok(Calc::Derived),
        "weighted_MIN" => return Ok(Calc::WeightedMin),
        _ => {}
    }

    if let Some(inner) = raw
        .strip_prefix("weighted_MIN_REC(")
        .and_then(|s| s.strip_suffix(')'))
    {
        let k = inner
            .parse::<f64>()
            .map_err(|_| format!("bad decay constant `{inner}`"))?;
        if !(k.is_finite() && k > 0.0) {
            return Err(format!("decay constant must be positive, got `{inner}`"));
        }
        return Ok(Calc::WeightedMinRec { k });
    }

    if let Some(rest) = raw.strip_prefix("blend:") {
        let mut parts = Vec::new();
        for item in rest.split('/') {
            let (w, weight) = item
                .split_once(':')
                .ok_or_else(|| format!("blend part `{item}` is not window:weight"))?;
            let window = parse_window(w).ok_or_else(|| format!("bad blend window `{w}`"))?;
            let weight = weight
                .parse::<f64>()
                .map_err(|_| format!("bad blend weight `{weight}`"))?;
            if !(weight.is_finite() && weight > 0.0) {
                return Err(format!("blend weight must be positive, got `{weight}`"));
            }
            parts.push((window, weight));
        }
        return Ok(Calc::Blend(parts));
    }

    if let Some(rest) = raw.strip_prefix("delta:") {
        let (a, b) = rest
            .split_once('-')
            .ok_or_else(|| format!("delta `{rest}` is not window_a-window_b"))?;
        let a = parse_window(a).ok_or_else(|| format!("bad delta window `{a}`"))?;
        let b = parse_window(b).ok_or_else(|| format!("bad delta window `{b}`"))?;
        return Ok(Calc::Delta(a, b));
    }

    if let Some(rest) = raw.strip_prefix("top") {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let n = parse_positive(&digits).ok_or_else(|| format!("bad top-N count in `{raw}`"))?;
        let n = n as usize;
        return match &rest[digits.len()..] {
            "_avg" => Ok(Calc::TopAvg(n)),
            "_weighted_MPG" => Ok(Calc::TopWeightedMpg(n)),
            "_sum" => Ok(Calc::TopSum(n)),
            other => Err(format!("unknown top-N method `{other}`")),
        };
    }

    Err(format!("unknown calc method `{raw}`"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Home,
    Away,
    Diff,
    /// Empty side token: the caller-supplied team over all venues.
    Team,
}

impl Side {
    pub fn token(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
            Side::Diff => "diff",
            Side::Team => "",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "home" => Some(Side::Home),
            "away" => Some(Side::Away),
            "diff" => Some(Side::Diff),
            "" => Some(Side::Team),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextFilter {
    Cohort(CohortKind),
    SameVenue,
}

impl ContextFilter {
    pub fn token(&self) -> &'static str {
        match self {
            ContextFilter::Cohort(kind) => kind.token(),
            ContextFilter::SameVenue => "same_venue",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        if raw == "same_venue" {
            return Some(ContextFilter::SameVenue);
        }
        CohortKind::from_token(raw).map(ContextFilter::Cohort)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpec {
    pub stat: Stat,
    pub window: Window,
    pub calc: Calc,
    pub side: Side,
    pub context: Option<ContextFilter>,
}

impl FeatureSpec {
    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn with_side(&self, side: Side) -> FeatureSpec {
        FeatureSpec {
            side,
            ..self.clone()
        }
    }

    pub fn with_window(&self, window: Window) -> FeatureSpec {
        FeatureSpec {
            window,
            ..self.clone()
        }
    }

    pub fn with_calc(&self, calc: Calc) -> FeatureSpec {
        FeatureSpec {
            calc,
            ..self.clone()
        }
    }

    /// Cohort a player stat is computed over; `roster` when unqualified.
    pub fn cohort(&self) -> CohortKind {
        match self.context {
            Some(ContextFilter::Cohort(kind)) => kind,
            _ => CohortKind::Roster,
        }
    }

    fn validate(&self, raw: &str) -> Result<(), ConfigError> {
        if !self.stat.allows(&self.calc) {
            return Err(ConfigError::spec(
                raw,
                format!(
                    "calc `{}` is not defined for stat `{}`",
                    self.calc,
                    self.stat.token()
                ),
            ));
        }
        match &self.calc {
            Calc::Blend(parts) => {
                let first = parts.first().map(|(w, _)| *w);
                if first != Some(self.window) {
                    return Err(ConfigError::spec(
                        raw,
                        "window field must equal the first blend window",
                    ));
                }
            }
            Calc::Delta(a, _) if *a != self.window => {
                return Err(ConfigError::spec(
                    raw,
                    "window field must equal the first delta window",
                ));
            }
            _ => {}
        }
        if self.stat.family() == StatFamily::Injury && self.window != Window::Season {
            return Err(ConfigError::spec(raw, "injury stats only support `season`"));
        }
        match (self.context, self.stat.family()) {
            (None, _) => {}
            (Some(ContextFilter::Cohort(_)), StatFamily::Player) => {}
            (Some(ContextFilter::SameVenue), StatFamily::HeadToHead) => {}
            (Some(ctx), _) => {
                return Err(ConfigError::spec(
                    raw,
                    format!(
                        "context `{}` does not apply to stat `{}`",
                        ctx.token(),
                        self.stat.token()
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for FeatureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.stat.token(),
            self.window,
            self.calc,
            self.side.token()
        )?;
        if let Some(ctx) = self.context {
            write!(f, "|{}", ctx.token())?;
        }
        Ok(())
    }
}

impl FromStr for FeatureSpec {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = raw.split('|').collect();
        if fields.len() != 4 && fields.len() != 5 {
            return Err(ConfigError::spec(
                raw,
                format!("expected 4 or 5 `|`-separated fields, got {}", fields.len()),
            ));
        }
        let stat = Stat::from_token(fields[0])
            .ok_or_else(|| ConfigError::spec(raw, format!("unknown stat `{}`", fields[0])))?;
        let window = parse_window(fields[1])
            .ok_or_else(|| ConfigError::spec(raw, format!("malformed window `{}`", fields[1])))?;
        let calc = parse_calc(fields[2]).map_err(|reason| ConfigError::spec(raw, reason))?;
        let side = Side::parse(fields[3])
            .ok_or_else(|| ConfigError::spec(raw, format!("unknown side `{}`", fields[3])))?;
        let context = match fields.get(4) {
            Some(token) => Some(ContextFilter::parse(token).ok_or_else(|| {
                ConfigError::spec(raw, format!("unknown context filter `{token}`"))
            })?),
            None => None,
        };

        let spec = FeatureSpec {
            stat,
            window,
            calc,
            side,
            context,
        };
        spec.validate(raw)?;

        let canonical = spec.to_string();
        if canonical != raw {
            return Err(ConfigError::spec(
                raw,
                format!("non-canonical form, expected `{canonical}`"),
            ));
        }
        Ok(spec)
    }
}
