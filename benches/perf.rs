use std::collections::HashMap;

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use gridiron_edge::evaluation::{EvalRow, evaluate};
use gridiron_edge::play::{GameMeta, Play};
use gridiron_edge::schema::StatSchema;
use gridiron_edge::stats::{DerivedRow, StatEngine};
use gridiron_edge::storage;
use gridiron_edge::synthetic::{SynthConfig, generate_season};
use gridiron_edge::trends::build_trends;

fn synthetic_weeks(weeks: u32) -> Vec<(u32, Vec<Play>, HashMap<String, GameMeta>)> {
    generate_season(SynthConfig {
        season: 2023,
        weeks,
        seed: 19,
    })
    .into_iter()
    .map(|w| (w.week, w.plays, storage::index_meta(w.games)))
    .collect()
}

fn bench_stat_engine_week(c: &mut Criterion) {
    let schema = StatSchema::builtin().unwrap();
    let weeks = synthetic_weeks(1);
    let (week, plays, meta) = &weeks[0];
    c.bench_function("stat_engine_week", |b| {
        b.iter(|| {
            let mut engine = StatEngine::from_schema(&schema);
            let rows = engine.compute_week(black_box(plays), 2023, *week, meta);
            black_box(rows.len());
        })
    });
}

fn bench_fixture_week_parse(c: &mut Criterion) {
    c.bench_function("fixture_week_parse", |b| {
        b.iter(|| {
            let rows: Vec<Play> = serde_json::from_str(black_box(PBP_JSON)).unwrap();
            black_box(rows.iter().filter(|p| p.is_snap()).count());
        })
    });
}

fn bench_trend_season(c: &mut Criterion) {
    let schema = StatSchema::builtin().unwrap();
    let mut engine = StatEngine::from_schema(&schema);
    let mut metas = Vec::new();
    let derived: Vec<(u32, Vec<DerivedRow>)> = synthetic_weeks(17)
        .into_iter()
        .map(|(week, plays, meta)| {
            let rows = engine.compute_week(&plays, 2023, week, &meta);
            metas.extend(meta.into_values());
            (week, rows)
        })
        .collect();
    c.bench_function("trend_season", |b| {
        b.iter(|| {
            let built = build_trends(2023, black_box(&derived), &metas);
            black_box(built.len());
        })
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let rows: Vec<EvalRow> = (0..512)
        .map(|idx| {
            let spread = f64::from(idx % 29) * 0.5 - 7.0;
            EvalRow {
                game_id: format!("g{idx}"),
                predicted_margin: spread + f64::from(idx % 7) - 3.0,
                actual_margin: f64::from(idx % 41) - 20.0,
                spread: Some(spread),
                weekday: None,
            }
        })
        .collect();
    c.bench_function("evaluate_512", |b| {
        b.iter(|| {
            let metrics = evaluate(black_box(&rows)).unwrap();
            black_box(metrics.accuracy);
        })
    });
}

criterion_group!(
    perf,
    bench_stat_engine_week,
    bench_fixture_week_parse,
    bench_trend_season,
    bench_evaluate
);
criterion_main!(perf);

static PBP_JSON: &str = include_str!("../tests/fixtures/pbp_week1.json");
