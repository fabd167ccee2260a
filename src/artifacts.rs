// Model records on disk: one JSON file per base model plus the ensemble record.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::base_model::{BaseModelRecord, ReadyModel};
use crate::ensemble::{EnsembleModel, EnsembleRecord};

const ENSEMBLE_FILE: &str = "ensemble.json";

pub fn base_model_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("base_{id}.json"))
}

pub fn ensemble_path(dir: &Path) -> PathBuf {
    dir.join(ENSEMBLE_FILE)
}

/// Writes through a `.json.tmp` sibling so readers never see a half-written file.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value).context("serialize model record")?;
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

pub fn save_stack(dir: &Path, model: &EnsembleModel) -> Result<()> {
    for base in model.base_models() {
        save_json(&base_model_path(dir, base.id()), base.record())?;
    }
    save_json(&ensemble_path(dir), model.record())?;
    info!(
        dir = %dir.display(),
        run_id = %model.coefficients().run_id,
        base_models = model.base_models().len(),
        "saved model records"
    );
    Ok(())
}

/// Loads the ensemble record and every base model it references, re-validating
/// the season ranges on the way in.
pub fn load_stack(dir: &Path) -> Result<EnsembleModel> {
    let record: EnsembleRecord = load_json(&ensemble_path(dir))?;
    let mut base = Vec::with_capacity(record.base_models.len());
    for reference in &record.base_models {
        let raw: BaseModelRecord = load_json(&base_model_path(dir, &reference.id))?;
        let model = ReadyModel::from_record(raw)
            .with_context(|| format!("base model `{}` record is invalid", reference.id))?;
        base.push(model);
    }
    EnsembleModel::from_records(record, base).context("ensemble record is invalid")
}
