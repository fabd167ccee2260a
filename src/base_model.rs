//! `UntrainedModel -> TrainedModel -> CalibratedModel -> ReadyModel`; each step
//! consumes the previous state.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assembler::{TableRow, TrainingTable};
use crate::calibration::{self, CalibrationBin, Metrics, PlattScaling};
use crate::config::BaseModelConfig;
use crate::error::{ConfigError, ModelError};
use crate::logistic::{self, LogisticFit, Standardizer};
use crate::records::GameId;
use crate::seasons::SeasonRange;

pub const MODEL_TYPE: &str = "logistic_regression";
const RELIABILITY_BINS: usize = 10;

/// Calibration strictly after training, evaluation strictly after calibration,
/// and no season shared between any two of them.
pub fn check_season_order(
    model: &str,
    train: SeasonRange,
    calibration: SeasonRange,
    evaluation: SeasonRange,
) -> Result<(), ConfigError> {
    train.validate()?;
    calibration.validate()?;
    evaluation.validate()?;
    if calibration.overlaps(&train) || !calibration.strictly_after(&train) {
        return Err(ConfigError::CalibrationOverlap {
            model: model.to_string(),
            train,
            calibration,
        });
    }
    for other in [train, calibration] {
        if evaluation.overlaps(&other) || !evaluation.strictly_after(&other) {
            return Err(ConfigError::EvaluationOverlap {
                model: model.to_string(),
                evaluation,
                other,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedBaseOutput {
    pub game_id: GameId,
    pub model_id: String,
    pub probability: f64,
    pub calibration_seasons: SeasonRange,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub train: Metrics,
    pub calibration: Metrics,
    pub evaluation: Metrics,
    #[serde(default)]
    pub evaluation_ece: f64,
    #[serde(default)]
    pub evaluation_bins: Vec<CalibrationBin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseModelRecord {
    pub model_type: String,
    pub id: String,
    pub features: Vec<String>,
    pub c: f64,
    pub train_seasons: SeasonRange,
    pub calibration_seasons: SeasonRange,
    pub evaluation_seasons: SeasonRange,
    pub standardizer: Standardizer,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub platt: PlattScaling,
    pub metrics: ModelMetrics,
}

#[derive(Debug, Clone)]
pub struct UntrainedModel {
    config: BaseModelConfig,
}

#[derive(Debug, Clone)]
pub struct TrainedModel {
    config: BaseModelConfig,
    columns: Vec<usize>,
    standardizer: Standardizer,
    fit: LogisticFit,
    metrics: ModelMetrics,
}

#[derive(Debug, Clone)]
pub struct CalibratedModel {
    trained: TrainedModel,
    platt: PlattScaling,
}

#[derive(Debug, Clone)]
pub struct ReadyModel {
    record: BaseModelRecord,
}

fn outcomes_as_targets(y: &[bool]) -> Vec<f64> {
    y.iter().map(|o| if *o { 1.0 } else { 0.0 }).collect()
}

impl UntrainedModel {
    pub fn new(config: BaseModelConfig) -> Result<Self, ConfigError> {
        check_season_order(
            &config.id,
            config.train_seasons,
            config.calibration_seasons,
            config.evaluation_seasons,
        )?;
        if config.features.is_empty() {
            return Err(ConfigError::validation(
                &format!("base_models.{}.features", config.id),
                "must not be empty",
            ));
        }
        Ok(Self { config })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn train(self, table: &TrainingTable) -> Result<TrainedModel, ModelError> {
        let columns = table.resolve(&self.config.id, &self.config.features)?;
        let data = table.select(&columns, self.config.train_seasons);
        if data.x.is_empty() {
            return Err(ModelError::NoRows {
                model: self.config.id.clone(),
                seasons: self.config.train_seasons,
            });
        }
        let standardizer = Standardizer::fit(&data.x);
        let x = standardizer.transform(&data.x);
        let fit = logistic::fit_logistic(&x, &outcomes_as_targets(&data.y), self.config.c);
        if !fit.converged {
            warn!(model = %self.config.id, iterations = fit.iterations, "base model fit did not converge");
        }
        let preds: Vec<f64> = x.iter().map(|r| fit.predict_proba(r)).collect();
        let metrics = ModelMetrics {
            train: calibration::evaluate_binary(&preds, &data.y),
            ..Default::default()
        };
        info!(
            model = %self.config.id,
            seasons = %self.config.train_seasons,
            rows = data.x.len(),
            log_loss = metrics.train.log_loss,
            "base model trained"
        );
        Ok(TrainedModel {
            config: self.config,
            columns,
            standardizer,
            fit,
            metrics,
        })
    }
}

impl TrainedModel {
    pub fn id(&self) -> &str {
        &self.config.id
    }

    fn raw(&self, inputs: &[f64]) -> f64 {
        self.fit.predict_proba(&self.standardizer.transform_row(inputs))
    }

    /// Fits the sigmoid map on the calibration seasons only.
    pub fn calibrate(mut self, table: &TrainingTable) -> Result<CalibratedModel, ModelError> {
        let data = table.select(&self.columns, self.config.calibration_seasons);
        if data.x.is_empty() {
            return Err(ModelError::NoRows {
                model: self.config.id.clone(),
                seasons: self.config.calibration_seasons,
            });
        }
        let raw: Vec<f64> = data.x.iter().map(|r| self.raw(r)).collect();
        let platt = PlattScaling::fit(&raw, &data.y);
        let calibrated: Vec<f64> = raw.iter().map(|p| platt.apply(*p)).collect();
        self.metrics.calibration = calibration::evaluate_binary(&calibrated, &data.y);
        info!(
            model = %self.config.id,
            seasons = %self.config.calibration_seasons,
            a = platt.a,
            b = platt.b,
            "base model calibrated"
        );
        Ok(CalibratedModel {
            trained: self,
            platt,
        })
    }
}

impl CalibratedModel {
    pub fn id(&self) -> &str {
        self.trained.id()
    }

    /// Records evaluation metrics and seals the model. An empty evaluation range
    /// is allowed but logged.
    pub fn finalize(self, table: &TrainingTable) -> ReadyModel {
        let CalibratedModel { trained, platt } = self;
        let data = table.select(&trained.columns, trained.config.evaluation_seasons);
        let mut metrics = trained.metrics.clone();
        if data.x.is_empty() {
            warn!(
                model = %trained.config.id,
                seasons = %trained.config.evaluation_seasons,
                "no labelled rows in evaluation seasons"
            );
        } else {
            let preds: Vec<f64> = data.x.iter().map(|r| platt.apply(trained.raw(r))).collect();
            metrics.evaluation = calibration::evaluate_binary(&preds, &data.y);
            metrics.evaluation_bins = calibration::calibration_bins(&preds, &data.y, RELIABILITY_BINS);
            metrics.evaluation_ece = calibration::expected_calibration_error(&metrics.evaluation_bins);
        }

        let cfg = trained.config;
        ReadyModel {
            record: BaseModelRecord {
                model_type: MODEL_TYPE.to_string(),
                id: cfg.id,
                features: cfg.features,
                c: cfg.c,
                train_seasons: cfg.train_seasons,
                calibration_seasons: cfg.calibration_seasons,
                evaluation_seasons: cfg.evaluation_seasons,
                standardizer: trained.standardizer,
                intercept: trained.fit.intercept,
                coefficients: trained.fit.coefficients,
                platt,
                metrics,
            },
        }
    }
}

impl ReadyModel {
    pub fn from_record(record: BaseModelRecord) -> Result<Self, ConfigError> {
        check_season_order(
            &record.id,
            record.train_seasons,
            record.calibration_seasons,
            record.evaluation_seasons,
        )?;
        let width = record.features.len();
        if record.coefficients.len() != width
            || record.standardizer.means.len() != width
            || record.standardizer.stds.len() != width
        {
            return Err(ConfigError::validation(
                &format!("base_models.{}", record.id),
                "coefficients do not match the feature list",
            ));
        }
        Ok(Self { record })
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn features(&self) -> &[String] {
        &self.record.features
    }

    pub fn calibration_seasons(&self) -> SeasonRange {
        self.record.calibration_seasons
    }

    pub fn train_seasons(&self) -> SeasonRange {
        self.record.train_seasons
    }

    pub fn record(&self) -> &BaseModelRecord {
        &self.record
    }

    /// Calibrated probability for inputs ordered like [`Self::features`].
    pub fn predict_calibrated(&self, game_id: GameId, inputs: &[f64]) -> Result<CalibratedBaseOutput, ModelError> {
        if inputs.len() != self.record.features.len() {
            return Err(ModelError::InputWidth {
                model: self.record.id.clone(),
                expected: self.record.features.len(),
                got: inputs.len(),
            });
        }
        let fit = LogisticFit {
            intercept: self.record.intercept,
            coefficients: self.record.coefficients.clone(),
            iterations: 0,
            converged: true,
        };
        let raw = fit.predict_proba(&self.record.standardizer.transform_row(inputs));
        Ok(CalibratedBaseOutput {
            game_id,
            model_id: self.record.id.clone(),
            probability: self.record.platt.apply(raw),
            calibration_seasons: self.record.calibration_seasons,
        })
    }

    pub fn predict_row(&self, table: &TrainingTable, row: &TableRow) -> Result<CalibratedBaseOutput, ModelError> {
        let columns = table.resolve(&self.record.id, &self.record.features)?;
        let inputs: Vec<f64> = columns.iter().map(|&i| row.values[i]).collect();
        self.predict_calibrated(row.game_id, &inputs)
    }
}

pub fn train_base_model(config: BaseModelConfig, table: &TrainingTable) -> Result<ReadyModel, ModelError> {
    let model = UntrainedModel::new(config)?;
    Ok(model.train(table)?.calibrate(table)?.finalize(table))
}
