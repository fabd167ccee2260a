//! Stacking: a regularised logistic meta-model over calibrated base outputs.

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assembler::{TableRow, TrainingTable};
use crate::base_model::{self, CalibratedBaseOutput, ReadyModel};
use crate::calibration::{self, CalibrationBin, Metrics};
use crate::config::{BaseModelConfig, ModelConfig};
use crate::error::{ConfigError, ModelError};
use crate::logistic::{self, Standardizer, sigmoid};
use crate::records::GameId;
use crate::seasons::SeasonRange;

pub const ENSEMBLE_ID: &str = "ensemble";
pub const MODEL_TYPE: &str = "stacked_logistic_regression";
const RELIABILITY_BINS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackingPlan {
    pub meta_seasons: SeasonRange,
    pub evaluation_seasons: SeasonRange,
}

impl StackingPlan {
    pub fn validate(&self, base_models: &[BaseModelConfig]) -> Result<(), ConfigError> {
        if base_models.is_empty() {
            return Err(ConfigError::validation(
                "base_models",
                "the ensemble needs at least one base model",
            ));
        }
        for model in base_models {
            self.check_base(&model.id, model.train_seasons, model.calibration_seasons)?;
        }
        Ok(())
    }

    /// Meta seasons inside the base model's calibration range; evaluation
    /// disjoint from and later than everything the base model or meta-model saw.
    pub fn check_base(
        &self,
        model: &str,
        train: SeasonRange,
        calibration: SeasonRange,
    ) -> Result<(), ConfigError> {
        self.meta_seasons.validate()?;
        self.evaluation_seasons.validate()?;
        if !calibration.covers(&self.meta_seasons) || self.meta_seasons.overlaps(&train) {
            return Err(ConfigError::MetaOutsideCalibration {
                model: model.to_string(),
                meta: self.meta_seasons,
                calibration,
            });
        }
        for other in [train, calibration, self.meta_seasons] {
            if self.evaluation_seasons.overlaps(&other) || !self.evaluation_seasons.strictly_after(&other) {
                return Err(ConfigError::EvaluationOverlap {
                    model: ENSEMBLE_ID.to_string(),
                    evaluation: self.evaluation_seasons,
                    other,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleCoefficients {
    pub run_id: String,
    /// Base model ids first, then passthrough columns.
    pub meta_columns: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl EnsembleCoefficients {
    pub fn decision(&self, meta: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(meta)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    /// `sigmoid(intercept + Σ coef_i · meta_i)`
    pub fn p_home(&self, meta: &[f64]) -> f64 {
        sigmoid(self.decision(meta))
    }

    pub fn weight(&self, column: &str) -> Option<f64> {
        self.meta_columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.coefficients[i])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseModelRef {
    pub id: String,
    pub calibration_seasons: SeasonRange,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMetrics {
    pub meta: Metrics,
    pub evaluation: Metrics,
    #[serde(default)]
    pub evaluation_ece: f64,
    #[serde(default)]
    pub evaluation_bins: Vec<CalibrationBin>,
    #[serde(default)]
    pub base_evaluation: Vec<(String, Metrics)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleRecord {
    pub model_type: String,
    pub base_models: Vec<BaseModelRef>,
    pub passthrough: Vec<String>,
    pub passthrough_scaler: Standardizer,
    pub c: f64,
    pub plan: StackingPlan,
    pub coefficients: EnsembleCoefficients,
    pub metrics: EnsembleMetrics,
}

/// Final probability for one game, with the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsemblePrediction {
    pub game_id: GameId,
    pub base_outputs: Vec<CalibratedBaseOutput>,
    pub meta_features: Vec<f64>,
    pub p_home: f64,
}

#[derive(Debug, Clone)]
pub struct EnsembleStacker {
    c: f64,
    passthrough: Vec<String>,
    plan: StackingPlan,
}

#[derive(Debug, Clone)]
pub struct EnsembleModel {
    base: Vec<ReadyModel>,
    record: EnsembleRecord,
}

fn meta_row(
    base: &[ReadyModel],
    passthrough_cols: &[usize],
    scaler: &Standardizer,
    table: &TrainingTable,
    row: &TableRow,
) -> Result<(Vec<CalibratedBaseOutput>, Vec<f64>), ModelError> {
    let outputs = base
        .iter()
        .map(|m| m.predict_row(table, row))
        .collect::<Result<Vec<_>, _>>()?;
    let raw_pass: Vec<f64> = passthrough_cols.iter().map(|&i| row.values[i]).collect();
    let mut meta: Vec<f64> = outputs.iter().map(|o| o.probability).collect();
    meta.extend(scaler.transform_row(&raw_pass));
    Ok((outputs, meta))
}

impl EnsembleStacker {
    pub fn new(c: f64, passthrough: Vec<String>, plan: StackingPlan) -> Self {
        Self { c, passthrough, plan }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.ensemble.c,
            config.ensemble.passthrough.clone(),
            config.stacking_plan(),
        )
    }

    /// Fits the meta-model on the plan's meta seasons only.
    pub fn fit(
        &self,
        base: Vec<ReadyModel>,
        table: &TrainingTable,
        run_id: impl Into<String>,
    ) -> Result<EnsembleModel, ModelError> {
        if base.is_empty() {
            return Err(ConfigError::validation("base_models", "the ensemble needs at least one base model").into());
        }
        for model in &base {
            self.plan
                .check_base(model.id(), model.train_seasons(), model.calibration_seasons())?;
        }
        let passthrough_cols = table.resolve(ENSEMBLE_ID, &self.passthrough)?;

        let labelled: Vec<&TableRow> = table
            .rows
            .iter()
            .filter(|r| r.is_trainable() && self.plan.meta_seasons.contains(r.season))
            .collect();
        if labelled.is_empty() {
            return Err(ModelError::NoRows {
                model: ENSEMBLE_ID.to_string(),
                seasons: self.plan.meta_seasons,
            });
        }

        let raw_pass: Vec<Vec<f64>> = labelled
            .iter()
            .map(|r| passthrough_cols.iter().map(|&i| r.values[i]).collect())
            .collect();
        let scaler = if passthrough_cols.is_empty() {
            Standardizer::identity(0)
        } else {
            Standardizer::fit(&raw_pass)
        };

        let mut x = Vec::with_capacity(labelled.len());
        let mut y = Vec::with_capacity(labelled.len());
        let mut outcomes = Vec::with_capacity(labelled.len());
        for row in &labelled {
            let (_, meta) = meta_row(&base, &passthrough_cols, &scaler, table, row)?;
            x.push(meta);
            let won = row.home_won.unwrap_or(false);
            outcomes.push(won);
            y.push(if won { 1.0 } else { 0.0 });
        }
        let fit = logistic::fit_logistic(&x, &y, self.c);
        if !fit.converged {
            warn!(iterations = fit.iterations, "meta-model fit did not converge");
        }

        let mut meta_columns: Vec<String> = base.iter().map(|m| m.id().to_string()).collect();
        meta_columns.extend(self.passthrough.iter().cloned());
        let coefficients = EnsembleCoefficients {
            run_id: run_id.into(),
            meta_columns,
            intercept: fit.intercept,
            coefficients: fit.coefficients.clone(),
        };
        let in_sample: Vec<f64> = x.iter().map(|r| coefficients.p_home(r)).collect();

        let record = EnsembleRecord {
            model_type: MODEL_TYPE.to_string(),
            base_models: base
                .iter()
                .map(|m| BaseModelRef {
                    id: m.id().to_string(),
                    calibration_seasons: m.calibration_seasons(),
                })
                .collect(),
            passthrough: self.passthrough.clone(),
            passthrough_scaler: scaler,
            c: self.c,
            plan: self.plan,
            coefficients,
            metrics: EnsembleMetrics {
                meta: calibration::evaluate_binary(&in_sample, &outcomes),
                ..Default::default()
            },
        };
        info!(
            run_id = %record.coefficients.run_id,
            seasons = %self.plan.meta_seasons,
            rows = labelled.len(),
            intercept = record.coefficients.intercept,
            "meta-model trained"
        );

        let mut model = EnsembleModel { base, record };
        model.evaluate(table)?;
        Ok(model)
    }
}

impl EnsembleModel {
    pub fn from_records(record: EnsembleRecord, base: Vec<ReadyModel>) -> Result<Self, ConfigError> {
        if record.base_models.len() != base.len()
            || record
                .base_models
                .iter()
                .zip(&base)
                .any(|(r, m)| r.id != m.id() || r.calibration_seasons != m.calibration_seasons())
        {
            return Err(ConfigError::validation(
                "ensemble.base_models",
                "base model records do not match the ensemble",
            ));
        }
        let width = base.len() + record.passthrough.len();
        if record.coefficients.coefficients.len() != width
            || record.coefficients.meta_columns.len() != width
            || record.passthrough_scaler.means.len() != record.passthrough.len()
        {
            return Err(ConfigError::validation(
                "ensemble.coefficients",
                "coefficient vector does not match the meta columns",
            ));
        }
        for model in &base {
            record
                .plan
                .check_base(model.id(), model.train_seasons(), model.calibration_seasons())?;
        }
        Ok(Self { base, record })
    }

    pub fn record(&self) -> &EnsembleRecord {
        &self.record
    }

    pub fn base_models(&self) -> &[ReadyModel] {
        &self.base
    }

    pub fn coefficients(&self) -> &EnsembleCoefficients {
        &self.record.coefficients
    }

    pub fn predict(&self, table: &TrainingTable, row: &TableRow) -> Result<EnsemblePrediction, ModelError> {
        let passthrough_cols = table.resolve(ENSEMBLE_ID, &self.record.passthrough)?;
        let (base_outputs, meta_features) = meta_row(
            &self.base,
            &passthrough_cols,
            &self.record.passthrough_scaler,
            table,
            row,
        )?;
        let p_home = self.record.coefficients.p_home(&meta_features);
        Ok(EnsemblePrediction {
            game_id: row.game_id,
            base_outputs,
            meta_features,
            p_home,
        })
    }

    /// Scores the ensemble and each base model on the evaluation seasons.
    fn evaluate(&mut self, table: &TrainingTable) -> Result<(), ModelError> {
        let seasons = self.record.plan.evaluation_seasons;
        let rows: Vec<&TableRow> = table
            .rows
            .iter()
            .filter(|r| r.is_trainable() && seasons.contains(r.season))
            .collect();
        if rows.is_empty() {
            warn!(seasons = %seasons, "no labelled rows in ensemble evaluation seasons");
            return Ok(());
        }

        let mut outcomes = Vec::with_capacity(rows.len());
        let mut ensemble = Vec::with_capacity(rows.len());
        let mut per_base = vec![Vec::with_capacity(rows.len()); self.base.len()];
        for row in &rows {
            let pred = self.predict(table, row)?;
            outcomes.push(row.home_won.unwrap_or(false));
            ensemble.push(pred.p_home);
            for (i, out) in pred.base_outputs.iter().enumerate() {
                per_base[i].push(out.probability);
            }
        }

        let metrics = &mut self.record.metrics;
        metrics.evaluation = calibration::evaluate_binary(&ensemble, &outcomes);
        metrics.evaluation_bins = calibration::calibration_bins(&ensemble, &outcomes, RELIABILITY_BINS);
        metrics.evaluation_ece = calibration::expected_calibration_error(&metrics.evaluation_bins);
        metrics.base_evaluation = self
            .base
            .iter()
            .zip(&per_base)
            .map(|(m, preds)| (m.id().to_string(), calibration::evaluate_binary(preds, &outcomes)))
            .collect();
        info!(
            seasons = %seasons,
            rows = rows.len(),
            log_loss = metrics.evaluation.log_loss,
            brier = metrics.evaluation.brier,
            accuracy = metrics.evaluation.accuracy,
            "ensemble evaluated"
        );
        Ok(())
    }
}

pub fn new_run_id() -> String {
    format!("stack-{}", Utc::now().format("%Y%m%dT%H%M%S"))
}

/// Trains every base model (in parallel; each one is sequential internally),
/// then the meta-model on their calibrated outputs.
pub fn train_stack(config: &ModelConfig, table: &TrainingTable, run_id: &str) -> Result<EnsembleModel, ModelError> {
    config.stacking_plan().validate(&config.base_models)?;
    let base = config
        .base_models
        .par_iter()
        .map(|cfg| base_model::train_base_model(cfg.clone(), table))
        .collect::<Result<Vec<_>, _>>()?;
    EnsembleStacker::from_config(config).fit(base, table, run_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(a: i32, b: i32) -> SeasonRange {
        SeasonRange::new(a, b).unwrap()
    }

    fn base(id: &str) -> BaseModelConfig {
        BaseModelConfig {
            id: id.into(),
            features: vec!["x".into()],
            c: 1.0,
            train_seasons: range(2012, 2016),
            calibration_seasons: range(2017, 2018),
            evaluation_seasons: range(2019, 2019),
        }
    }

    #[test]
    fn plan_accepts_meta_inside_calibration() {
        let plan = StackingPlan {
            meta_seasons: range(2017, 2018),
            evaluation_seasons: range(2019, 2019),
        };
        assert!(plan.validate(&[base("a"), base("b")]).is_ok());
    }

    #[test]
    fn plan_rejects_meta_touching_training() {
        let plan = StackingPlan {
            meta_seasons: range(2016, 2017),
            evaluation_seasons: range(2019, 2019),
        };
        assert!(matches!(
            plan.validate(&[base("a")]),
            Err(ConfigError::MetaOutsideCalibration { .. })
        ));
    }

    #[test]
    fn plan_rejects_evaluation_inside_meta() {
        let plan = StackingPlan {
            meta_seasons: range(2017, 2017),
            evaluation_seasons: range(2018, 2018),
        };
        assert!(matches!(
            plan.validate(&[base("a")]),
            Err(ConfigError::EvaluationOverlap { .. })
        ));
    }

    #[test]
    fn plan_requires_a_base_model() {
        let plan = StackingPlan {
            meta_seasons: range(2017, 2018),
            evaluation_seasons: range(2019, 2019),
        };
        assert!(plan.validate(&[]).is_err());
    }

    #[test]
    fn coefficients_follow_logistic_link() {
        let coefs = EnsembleCoefficients {
            run_id: "r".into(),
            meta_columns: vec!["a".into(), "b".into()],
            intercept: -1.0,
            coefficients: vec![1.0, 2.0],
        };
        assert!((coefs.p_home(&[0.5, 0.25]) - 0.5).abs() < 1e-12);
        assert_eq!(coefs.weight("b"), Some(2.0));
        assert_eq!(coefs.weight("c"), None);
    }
}
