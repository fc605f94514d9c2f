use std::fs;
use std::path::Path;

use gridiron_edge::collate::MatchupRow;
use gridiron_edge::config::PipelineConfig;
use gridiron_edge::evaluation::Prediction;
use gridiron_edge::history::{MetricsHistory, MetricsRecord};
use gridiron_edge::pipeline;
use gridiron_edge::scenario::{FULL_RUN, Scenario};
use gridiron_edge::schema::StatSchema;
use gridiron_edge::stats::DerivedRow;
use gridiron_edge::storage::{self, DataLayout};
use gridiron_edge::synthetic::{self, SynthConfig};
use gridiron_edge::trends::TrendRow;

fn config(root: &Path) -> PipelineConfig {
    let root = root.to_string_lossy().to_string();
    PipelineConfig::from_lookup(
        |key| match key {
            "OUTPUT_DIR" => Some(root.clone()),
            "CURRENT_SEASON" => Some("2023".into()),
            "HISTORICAL_START_SEASON" => Some("2021".into()),
            "HISTORICAL_END_SEASON" => Some("2022".into()),
            "EVAL_RUN_ID" => Some("it".into()),
            _ => None,
        },
        2026,
    )
}

fn seed(layout: &DataLayout, seasons: &[u32], weeks: u32) {
    for season in seasons {
        synthetic::write_season(
            layout,
            SynthConfig {
                season: *season,
                weeks,
                seed: 3,
            },
        )
        .expect("synthetic season");
    }
}

#[test]
fn full_run_produces_every_artifact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = config(dir.path());
    let layout = cfg.layout();
    seed(&layout, &[2021, 2022, 2023], 5);

    Scenario::new(cfg, None)
        .expect("scenario")
        .run(&FULL_RUN)
        .expect("full run");

    let derived: Vec<DerivedRow> =
        storage::read_json(&layout.derived_dir(2023).join("01.json")).expect("derived week");
    assert_eq!(derived.len(), 8);
    let trends: Vec<TrendRow> =
        storage::read_json(&layout.trends_dir(2023).join("03.json")).expect("trend week");
    assert!(trends.iter().all(|t| t.games_played == 2));

    assert!(layout.collated_historical("csv").exists());
    let current: Vec<MatchupRow> =
        storage::read_json(&layout.collated_current_dir().join("02.json")).expect("current week");
    assert_eq!(current.len(), 4);
    assert!(layout.collated_current_dir().join("02.csv").exists());

    let predictions: Vec<Prediction> =
        storage::read_json(&layout.predictions_path("json")).expect("predictions");
    assert!(!predictions.is_empty());
    assert!(predictions.iter().all(|p| p.predicted_margin.is_finite()));
    assert!(layout.predictions_path("csv").exists());

    let training = std::fs::read_to_string(layout.model_runs_dir().join("training_data.csv"))
        .expect("training data csv");
    let mut lines = training.lines();
    assert_eq!(
        lines.next(),
        Some("game_id,season,week,betting_spread_line,margin,favorite_covers")
    );
    assert!(lines.count() > 0);
    assert!(layout.model_runs_dir().join("training_metrics.json").exists());

    let snapshot: MetricsRecord = storage::read_json(&layout.metrics_path()).expect("metrics snapshot");
    assert_eq!(snapshot.run_id, "eval@it");
    assert_eq!(snapshot.metrics.errors.samples, predictions.len());
    assert_eq!(snapshot.model_hash.len(), 12);

    let runs = MetricsHistory::new(layout.history_dir()).load().expect("history");
    assert_eq!(runs.len(), 2);
    assert!(runs[0].run_id.starts_with("train@"));
    assert_eq!(runs[1].run_id, "eval@it");
}

#[test]
fn derive_is_repeatable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());
    seed(&layout, &[2023], 2);
    let schema = StatSchema::builtin().expect("schema");

    let rows = pipeline::derive_season(&layout, &schema, 2023).expect("first derive");
    assert_eq!(rows, 16);
    let path = layout.derived_dir(2023).join("02.json");
    let first = fs::read_to_string(&path).expect("derived file");
    pipeline::derive_season(&layout, &schema, 2023).expect("second derive");
    assert_eq!(fs::read_to_string(&path).expect("derived file"), first);
    assert!(!layout.derived_dir(2023).join("02.json.tmp").exists());
}

#[test]
fn missing_inputs_are_a_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());
    let schema = StatSchema::builtin().expect("schema");
    assert_eq!(pipeline::derive_season(&layout, &schema, 2019).expect("derive"), 0);
    assert_eq!(pipeline::build_season_trends(&layout, 2019).expect("trends"), 0);
    assert!(!layout.derived_dir(2019).exists());
}

#[test]
fn collate_requires_game_metadata() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());
    seed(&layout, &[2023], 2);
    let schema = StatSchema::builtin().expect("schema");
    pipeline::derive_season(&layout, &schema, 2023).expect("derive");
    fs::remove_file(layout.meta_dir(2023).join("02.json")).expect("remove meta");

    let err = pipeline::collate_season(&layout, 2023).unwrap_err();
    assert!(err.to_string().contains("game metadata"));
}

#[test]
fn evaluate_without_predictions_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = config(dir.path());
    let err = pipeline::evaluate_predictions(&cfg.layout(), &cfg).unwrap_err();
    assert!(err.to_string().contains("predictions not found"));
    assert!(!cfg.layout().metrics_path().exists());
}
