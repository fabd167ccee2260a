use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use hoopcast::aggregator::Aggregator;
use hoopcast::assembler::{assemble_game, assemble_games};
use hoopcast::cohorts::Mode;
use hoopcast::config::ModelConfig;
use hoopcast::feature_spec::FeatureSpec;
use hoopcast::per::LeagueAverageCache;
use hoopcast::records::Game;
use hoopcast::synthetic::SyntheticLeague;

const CONFIG: &str = include_str!("../config/nba.toml");

fn bundled_config() -> ModelConfig {
    ModelConfig::from_toml_str(CONFIG, std::path::Path::new("config/nba.toml")).unwrap()
}

fn bench_spec_parse(c: &mut Criterion) {
    let config = bundled_config();
    c.bench_function("feature_spec_parse", |b| {
        b.iter(|| {
            for raw in &config.features.specs {
                let spec: FeatureSpec = black_box(raw.as_str()).parse().unwrap();
                black_box(spec);
            }
        })
    });
}

fn bench_single_game(c: &mut Criterion) {
    let config = bundled_config();
    let specs = config.feature_specs().unwrap();
    let league = SyntheticLeague::generate(5, 2, 10, 40);
    let history = league.history(&config.league);
    let cache = LeagueAverageCache::new();
    let agg = Aggregator::new(&history, &cache, &config);
    let game: Game = history.schedule().last().cloned().unwrap();
    // Warm the season PER cache so the loop measures assembly.
    black_box(assemble_game(&agg, &specs, &game, Mode::Train));

    c.bench_function("assemble_single_game", |b| {
        b.iter(|| {
            let v = assemble_game(&agg, &specs, black_box(&game), Mode::Train);
            black_box(v.len());
        })
    });
}

fn bench_slate(c: &mut Criterion) {
    let config = bundled_config();
    let specs = config.feature_specs().unwrap();
    let league = SyntheticLeague::generate(6, 2, 10, 40);
    let history = league.history(&config.league);
    let cache = LeagueAverageCache::new();
    let agg = Aggregator::new(&history, &cache, &config);
    let slate = league.upcoming(3);
    black_box(assemble_games(&agg, &specs, &slate, Mode::Predict));

    c.bench_function("assemble_upcoming_slate", |b| {
        b.iter(|| {
            let rows = assemble_games(&agg, &specs, black_box(&slate), Mode::Predict);
            black_box(rows.len());
        })
    });
}

criterion_group!(benches, bench_spec_parse, bench_single_game, bench_slate);
criterion_main!(benches);
