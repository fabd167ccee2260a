use std::path::Path;

use hoopcast::aggregator::Aggregator;
use hoopcast::artifacts;
use hoopcast::assembler::{self, TrainingTable};
use hoopcast::cohorts::Mode;
use hoopcast::config::ModelConfig;
use hoopcast::ensemble::{self, EnsembleStacker};
use hoopcast::error::ModelError;
use hoopcast::per::{LeagueAverageCache, PerScale};
use hoopcast::predict;
use hoopcast::records::Game;
use hoopcast::synthetic::SyntheticLeague;

const CONFIG: &str = r#"
[league]
name = "synthetic"

[features]
specs = [
    "margin|season|avg|diff",
    "margin|games_5|eb|diff",
    "net_rtg|season|raw|diff",
    "efg_pct|season|raw|diff",
    "tov_pct|season|raw|diff",
    "per|season|weighted_MIN|diff|rotation",
    "per|season|top3_sum|diff|rotation",
    "inj_severity|season|raw|diff",
    "rest_days|season|derived|diff",
    "margin_h2h|games_4|eb|home",
]

[[base_models]]
id = "form"
features = ["margin|season|avg|diff", "margin|games_5|eb|diff", "net_rtg|season|raw|diff"]
train_seasons = { start = 2015, end = 2016 }
calibration_seasons = { start = 2017, end = 2017 }
evaluation_seasons = { start = 2018, end = 2018 }

[[base_models]]
id = "shooting"
features = ["efg_pct|season|raw|diff", "tov_pct|season|raw|diff"]
train_seasons = { start = 2015, end = 2016 }
calibration_seasons = { start = 2017, end = 2017 }
evaluation_seasons = { start = 2018, end = 2018 }

[[base_models]]
id = "players"
features = [
    "per|season|weighted_MIN|diff|rotation",
    "per|season|top3_sum|diff|rotation",
    "inj_severity|season|raw|diff",
    "rest_days|season|derived|diff",
    "margin_h2h|games_4|eb|home",
    "pred_margin",
]
c = 0.5
train_seasons = { start = 2015, end = 2016 }
calibration_seasons = { start = 2017, end = 2017 }
evaluation_seasons = { start = 2018, end = 2018 }

[ensemble]
passthrough = ["pred_margin"]
meta_seasons = { start = 2017, end = 2017 }
evaluation_seasons = { start = 2018, end = 2018 }
"#;

fn config() -> ModelConfig {
    ModelConfig::from_toml_str(CONFIG, Path::new("pipeline.toml")).unwrap()
}

fn table_for(league: &SyntheticLeague, config: &ModelConfig) -> TrainingTable {
    let history = league.history(&config.league);
    let cache = LeagueAverageCache::new();
    let agg = Aggregator::new(&history, &cache, config);
    let specs = config.feature_specs().unwrap();
    let games: Vec<Game> = history.schedule().filter(|g| g.is_final()).cloned().collect();
    assembler::assemble_table(&agg, &specs, &games, Mode::Train).unwrap()
}

#[test]
fn synthetic_league_trains_and_predicts_end_to_end() {
    let config = config();
    assert_eq!(config.ensemble.c, 0.1);
    let league = SyntheticLeague::generate(101, 4, 8, 24);
    let table = table_for(&league, &config);
    assert_eq!(table.seasons(), vec![2015, 2016, 2017, 2018]);

    // The CSV form is what the operator binaries hand to each other.
    let mut buf = Vec::new();
    table.write_csv(&mut buf).unwrap();
    let table = TrainingTable::read_csv(buf.as_slice()).unwrap();

    let model = ensemble::train_stack(&config, &table, "pipeline-run").unwrap();
    assert_eq!(model.base_models().len(), 3);
    let coefs = model.coefficients();
    assert_eq!(coefs.run_id, "pipeline-run");
    assert_eq!(coefs.meta_columns, vec!["form", "shooting", "players", "pred_margin"]);
    assert_eq!(coefs.coefficients.len(), 4);

    for base in model.base_models() {
        let r = base.record();
        assert!(!r.calibration_seasons.overlaps(&r.train_seasons));
        assert!(r.calibration_seasons.covers(&model.record().plan.meta_seasons));
        assert!(r.metrics.train.samples > 0);
        assert!(r.metrics.calibration.samples > 0);
        assert!(r.metrics.evaluation.log_loss.is_finite());
    }
    let form = &model.base_models()[0].record().metrics.train;
    assert!(form.accuracy > 0.5);

    let eval = model.record().metrics.evaluation;
    let eval_rows = table
        .rows
        .iter()
        .filter(|r| r.season == 2018 && r.home_won.is_some())
        .count();
    assert_eq!(eval.samples, eval_rows);
    assert!(eval.log_loss.is_finite());
    assert_eq!(model.record().metrics.base_evaluation.len(), 3);

    // Records survive a save/load cycle and give identical predictions.
    let dir = std::env::temp_dir().join(format!("hoopcast-pipeline-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    artifacts::save_stack(&dir, &model).unwrap();
    let loaded = artifacts::load_stack(&dir).unwrap();
    assert_eq!(loaded.coefficients().meta_columns, coefs.meta_columns);
    assert_eq!(loaded.record().plan, model.record().plan);

    let history = league.history(&config.league);
    let cache = LeagueAverageCache::new();
    let upcoming = league.upcoming(1);
    assert!(!upcoming.is_empty());
    let slate = predict::predict_games(&history, &cache, &config, &model, &upcoming).unwrap();
    let again = predict::predict_games(&history, &cache, &config, &loaded, &upcoming).unwrap();
    assert_eq!(slate.len(), upcoming.len());
    for (a, b) in slate.iter().zip(&again) {
        assert!(a.prediction.p_home > 0.0 && a.prediction.p_home < 1.0);
        assert!((a.prediction.p_home - b.prediction.p_home).abs() < 1e-9);
        assert_eq!(a.prediction.base_outputs.len(), 3);
        assert_eq!(a.prediction.meta_features.len(), 4);
        for out in &a.prediction.base_outputs {
            assert_eq!(out.calibration_seasons, config.base_models[0].calibration_seasons);
            assert!((0.0..=1.0).contains(&out.probability));
        }
        assert!((a.p_away() + a.prediction.p_home - 1.0).abs() < 1e-12);
        assert_eq!(a.per_scale, PerScale::Normalized);
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_training_seasons_are_reported() {
    let config = config();
    // Only two seasons: calibration and evaluation ranges have no rows.
    let league = SyntheticLeague::generate(102, 2, 6, 12);
    let table = table_for(&league, &config);
    let err = ensemble::train_stack(&config, &table, "short").unwrap_err();
    assert!(matches!(err, ModelError::NoRows { ref seasons, .. } if seasons.start == 2017));
}

#[test]
fn stacker_needs_base_models() {
    let config = config();
    let league = SyntheticLeague::generate(103, 1, 4, 4);
    let table = table_for(&league, &config);
    assert!(EnsembleStacker::from_config(&config).fit(vec![], &table, "empty").is_err());
}
