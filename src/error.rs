use std::path::PathBuf;

use thiserror::Error;

use crate::seasons::SeasonRange;

/// Setup-time failures. These are never substituted with defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid feature spec `{spec}`: {reason}")]
    Spec { spec: String, reason: String },

    #[error("invalid season range {start}..={end}: start is after end")]
    InvertedSeasons { start: i32, end: i32 },

    #[error(
        "model `{model}`: calibration seasons {calibration} overlap or precede training seasons {train}"
    )]
    CalibrationOverlap {
        model: String,
        train: SeasonRange,
        calibration: SeasonRange,
    },

    #[error(
        "model `{model}`: evaluation seasons {evaluation} must be disjoint from and later than {other}"
    )]
    EvaluationOverlap {
        model: String,
        evaluation: SeasonRange,
        other: SeasonRange,
    },

    #[error("ensemble meta seasons {meta} must lie inside calibration seasons {calibration} of `{model}`")]
    MetaOutsideCalibration {
        model: String,
        meta: SeasonRange,
        calibration: SeasonRange,
    },

    #[error("validation error for field `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn spec(spec: &str, reason: impl Into<String>) -> Self {
        Self::Spec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("model `{model}`: no labelled rows in seasons {seasons}")]
    NoRows { model: String, seasons: SeasonRange },

    #[error("model `{model}`: column `{column}` is not in the training table")]
    MissingColumn { model: String, column: String },

    #[error("model `{model}`: expected {expected} inputs, got {got}")]
    InputWidth {
        model: String,
        expected: usize,
        got: usize,
    },
}
