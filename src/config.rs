// Typed per-league configuration (config/<league>.toml), loaded once at startup.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assembler::PREDICTION_COLUMNS;
use crate::base_model;
use crate::ensemble::StackingPlan;
use crate::error::ConfigError;
use crate::feature_spec::FeatureSpec;
use crate::records::GameType;
use crate::seasons::SeasonRange;

pub const MPG_THRESH: f64 = 10.0;
pub const GP_FLOOR: u32 = 10;
pub const GP_RATIO: f64 = 0.15;
pub const ROTATION_SIZE: usize = 10;
pub const EPS: f64 = 1e-6;
pub const DEFAULT_EB_K: f64 = 7.0;
pub const DEFAULT_META_C: f64 = 0.1;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub league: LeagueConfig,
    #[serde(default)]
    pub cohorts: CohortConfig,
    #[serde(default)]
    pub shrinkage: ShrinkageConfig,
    #[serde(default)]
    pub baselines: BaselineConfig,
    pub features: FeatureListConfig,
    #[serde(default)]
    pub base_models: Vec<BaseModelConfig>,
    pub ensemble: EnsembleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    #[serde(default = "default_excluded_game_types")]
    pub excluded_game_types: Vec<GameType>,
}

impl LeagueConfig {
    /// Upstream filter: rows of excluded game types or incomplete rows never enter history.
    pub fn admits(&self, game_type: GameType, complete: bool) -> bool {
        complete && !self.excluded_game_types.contains(&game_type)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CohortConfig {
    #[serde(default = "default_mpg_thresh")]
    pub mpg_thresh: f64,
    #[serde(default = "default_gp_floor")]
    pub gp_floor: u32,
    #[serde(default = "default_gp_ratio")]
    pub gp_ratio: f64,
    #[serde(default = "default_rotation_size")]
    pub rotation_size: usize,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            mpg_thresh: MPG_THRESH,
            gp_floor: GP_FLOOR,
            gp_ratio: GP_RATIO,
            rotation_size: ROTATION_SIZE,
        }
    }
}

impl CohortConfig {
    /// `max(GP_FLOOR, ceil(GP_RATIO * team_games_to_date))`
    pub fn gp_thresh(&self, team_games_to_date: usize) -> u32 {
        let scaled = (self.gp_ratio * team_games_to_date as f64).ceil() as u32;
        self.gp_floor.max(scaled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShrinkageConfig {
    #[serde(default = "default_eb_k")]
    pub eb_k: f64,
    #[serde(default = "default_beta_prior")]
    pub beta_alpha: f64,
    #[serde(default = "default_beta_prior")]
    pub beta_beta: f64,
}

impl Default for ShrinkageConfig {
    fn default() -> Self {
        Self {
            eb_k: DEFAULT_EB_K,
            beta_alpha: 1.0,
            beta_beta: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BaselineConfig {
    #[serde(default = "default_pace")]
    pub pace: f64,
    #[serde(default = "default_rest_cap")]
    pub rest_cap_days: u32,
    /// Points per 100 possessions assumed for a team with no games yet.
    #[serde(default = "default_off_rtg")]
    pub off_rtg: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            pace: default_pace(),
            rest_cap_days: default_rest_cap(),
            off_rtg: default_off_rtg(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureListConfig {
    pub specs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseModelConfig {
    pub id: String,
    pub features: Vec<String>,
    #[serde(default = "default_base_c")]
    pub c: f64,
    pub train_seasons: SeasonRange,
    pub calibration_seasons: SeasonRange,
    pub evaluation_seasons: SeasonRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    #[serde(default = "default_meta_c")]
    pub c: f64,
    /// Raw table columns fed to the meta-model next to base outputs (e.g. `pred_margin`).
    #[serde(default)]
    pub passthrough: Vec<String>,
    pub meta_seasons: SeasonRange,
    pub evaluation_seasons: SeasonRange,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl ModelConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        Self::from_toml_str(&raw, path)
    }

    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: ModelConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses every configured feature once. Any malformed key fails the whole config.
    pub fn feature_specs(&self) -> Result<Vec<FeatureSpec>, ConfigError> {
        self.features
            .specs
            .iter()
            .map(|raw| raw.parse::<FeatureSpec>())
            .collect()
    }

    pub fn stacking_plan(&self) -> StackingPlan {
        StackingPlan {
            meta_seasons: self.ensemble.meta_seasons,
            evaluation_seasons: self.ensemble.evaluation_seasons,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.league.name.trim().is_empty() {
            return Err(ConfigError::validation("league.name", "must not be empty"));
        }
        let c = &self.cohorts;
        if !(c.mpg_thresh.is_finite() && c.mpg_thresh >= 0.0) {
            return Err(ConfigError::validation("cohorts.mpg_thresh", "must be >= 0"));
        }
        if !(0.0..=1.0).contains(&c.gp_ratio) {
            return Err(ConfigError::validation("cohorts.gp_ratio", "must be in [0, 1]"));
        }
        if c.rotation_size == 0 {
            return Err(ConfigError::validation("cohorts.rotation_size", "must be >= 1"));
        }
        let s = &self.shrinkage;
        if !(5.0..=10.0).contains(&s.eb_k) {
            return Err(ConfigError::validation("shrinkage.eb_k", "must be in [5, 10]"));
        }
        if !(s.beta_alpha > 0.0 && s.beta_beta > 0.0) {
            return Err(ConfigError::validation(
                "shrinkage.beta_alpha/beta_beta",
                "must be > 0",
            ));
        }
        if !(self.baselines.pace.is_finite() && self.baselines.pace > 0.0) {
            return Err(ConfigError::validation("baselines.pace", "must be > 0"));
        }
        if !(self.baselines.off_rtg.is_finite() && self.baselines.off_rtg > 0.0) {
            return Err(ConfigError::validation("baselines.off_rtg", "must be > 0"));
        }

        let specs = self.feature_specs()?;
        let keys: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
        let known = |name: &str| keys.iter().any(|k| k == name) || PREDICTION_COLUMNS.contains(&name);

        for model in &self.base_models {
            if model.features.is_empty() {
                return Err(ConfigError::validation(
                    &format!("base_models.{}.features", model.id),
                    "must not be empty",
                ));
            }
            for feature in &model.features {
                if !known(feature) {
                    return Err(ConfigError::validation(
                        &format!("base_models.{}.features", model.id),
                        format!("`{feature}` is not a configured feature"),
                    ));
                }
            }
            if !(model.c.is_finite() && model.c > 0.0) {
                return Err(ConfigError::validation(
                    &format!("base_models.{}.c", model.id),
                    "must be > 0",
                ));
            }
            base_model::check_season_order(
                &model.id,
                model.train_seasons,
                model.calibration_seasons,
                model.evaluation_seasons,
            )?;
        }

        if !(self.ensemble.c.is_finite() && self.ensemble.c > 0.0) {
            return Err(ConfigError::validation("ensemble.c", "must be > 0"));
        }
        for name in &self.ensemble.passthrough {
            if !known(name) {
                return Err(ConfigError::validation(
                    "ensemble.passthrough",
                    format!("`{name}` is neither a configured feature nor a prediction column"),
                ));
            }
        }
        self.stacking_plan().validate(&self.base_models)?;
        Ok(())
    }
}

fn default_excluded_game_types() -> Vec<GameType> {
    vec![GameType::Preseason, GameType::AllStar]
}

fn default_mpg_thresh() -> f64 {
    MPG_THRESH
}

fn default_gp_floor() -> u32 {
    GP_FLOOR
}

fn default_gp_ratio() -> f64 {
    GP_RATIO
}

fn default_rotation_size() -> usize {
    ROTATION_SIZE
}

fn default_eb_k() -> f64 {
    DEFAULT_EB_K
}

fn default_beta_prior() -> f64 {
    1.0
}

fn default_pace() -> f64 {
    99.0
}

fn default_rest_cap() -> u32 {
    7
}

fn default_off_rtg() -> f64 {
    110.0
}

fn default_base_c() -> f64 {
    1.0
}

fn default_meta_c() -> f64 {
    DEFAULT_META_C
}
