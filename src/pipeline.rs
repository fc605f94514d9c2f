//! Filesystem stages: each reads its inputs completely, computes, and only
//! then writes, so a failing stage leaves no partial output behind.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::collate::{self, MatchupRow};
use crate::config::PipelineConfig;
use crate::evaluation::{self, EvalRow, Metrics, Prediction};
use crate::history::{self, MetricsHistory, MetricsRecord};
use crate::model::{self, LinearMarginModel, TrainingExample, TrainingReport};
use crate::play::{GameMeta, Play};
use crate::schema::StatSchema;
use crate::stats::{DerivedRow, StatEngine};
use crate::storage::{self, DataLayout, WeekFile};
use crate::trends::{self, TrendRow};

fn week_number(file: &WeekFile, plays: &[Play]) -> u32 {
    file.week
        .or_else(|| plays.iter().find_map(|p| p.week))
        .unwrap_or(0)
}

fn output_name(file: &WeekFile) -> String {
    format!("{}.json", file.token)
}

/// Play-by-play → derived per-team rows for every week of `season`.
/// Weeks are computed in parallel; nothing is written until all succeed.
pub fn derive_season(layout: &DataLayout, schema: &StatSchema, season: u32) -> Result<usize> {
    let pbp_dir = layout.pbp_dir(season);
    let files = storage::list_week_files(&pbp_dir, "json")?;
    if files.is_empty() {
        info!("no play-by-play files in {}; nothing to derive", pbp_dir.display());
        return Ok(0);
    }

    let metas = storage::load_meta_season(layout, season)?;
    if metas.is_empty() {
        warn!(
            "no game metadata for {season}; results fields will stay at 0 and opponents come from plays"
        );
    }
    let meta = storage::index_meta(metas);

    let weeks: Vec<(WeekFile, Vec<Play>)> = files
        .into_iter()
        .map(|file| {
            let plays = storage::load_plays(&file.path)?;
            Ok((file, plays))
        })
        .collect::<Result<_>>()?;

    let derived: Vec<(WeekFile, Vec<DerivedRow>)> = weeks
        .into_par_iter()
        .map(|(file, plays)| {
            let week = week_number(&file, &plays);
            let mut engine = StatEngine::from_schema(schema);
            let rows = engine.compute_week(&plays, season, week, &meta);
            debug!("{season} week {week}: {} plays → {} rows", plays.len(), rows.len());
            (file, rows)
        })
        .collect();

    let out_dir = layout.derived_dir(season);
    let mut total = 0;
    for (file, rows) in &derived {
        let path = out_dir.join(output_name(file));
        storage::write_json_atomic(&path, rows)?;
        total += rows.len();
    }
    info!(
        "derived {total} team-game rows across {} weeks of {season} into {}",
        derived.len(),
        out_dir.display()
    );
    Ok(total)
}

pub fn load_derived_weeks(layout: &DataLayout, season: u32) -> Result<Vec<(WeekFile, Vec<DerivedRow>)>> {
    storage::list_week_files(&layout.derived_dir(season), "json")?
        .into_iter()
        .map(|file| {
            let rows: Vec<DerivedRow> = storage::read_json(&file.path)?;
            Ok((file, rows))
        })
        .collect()
}

/// Derived rows → point-in-time trend rows, one full-replacement file per week.
pub fn build_season_trends(layout: &DataLayout, season: u32) -> Result<usize> {
    let weeks = load_derived_weeks(layout, season)?;
    if weeks.is_empty() {
        info!("no derived files for {season}; nothing to trend");
        return Ok(0);
    }
    let metas = storage::load_meta_season(layout, season)?;
    if metas.is_empty() {
        warn!("no game metadata for {season}; trend rows carry no opponent adjustment");
    }

    let ordered: Vec<(u32, Vec<DerivedRow>)> = weeks
        .iter()
        .map(|(file, rows)| {
            let week = file
                .week
                .or_else(|| rows.first().map(|r| r.week))
                .unwrap_or(0);
            (week, rows.clone())
        })
        .collect();
    let built = trends::build_trends(season, &ordered, &metas);

    let out_dir = layout.trends_dir(season);
    let mut total = 0;
    for ((file, _), (_, rows)) in weeks.iter().zip(&built) {
        storage::write_json_atomic(&out_dir.join(output_name(file)), rows)?;
        total += rows.len();
    }
    info!("wrote {total} trend rows for {season} into {}", out_dir.display());
    Ok(total)
}

/// Matchup rows for every derived week of `season`, paired with the week's
/// file token. Game metadata is required for every derived week.
pub fn collate_season(layout: &DataLayout, season: u32) -> Result<Vec<(WeekFile, Vec<MatchupRow>)>> {
    let mut out = Vec::new();
    for (file, derived) in load_derived_weeks(layout, season)? {
        let meta_path = layout.meta_dir(season).join(output_name(&file));
        if !meta_path.exists() {
            bail!(
                "game metadata for {season} week {} not found at {}",
                file.token,
                meta_path.display()
            );
        }
        let metas = storage::load_meta_file(&meta_path)?;
        let trend_path = layout.trends_dir(season).join(output_name(&file));
        let trend_rows: Vec<TrendRow> = if trend_path.exists() {
            storage::read_json(&trend_path)?
        } else {
            Vec::new()
        };
        let rows = collate::collate_week(&metas, &derived, &trend_rows);
        debug!("{season} week {}: {} matchups", file.token, rows.len());
        out.push((file, rows));
    }
    Ok(out)
}

pub fn collate_historical(layout: &DataLayout, seasons: impl IntoIterator<Item = u32>) -> Result<usize> {
    let mut all = Vec::new();
    for season in seasons {
        for (_, rows) in collate_season(layout, season)? {
            all.extend(rows);
        }
    }
    if all.is_empty() {
        info!("no historical matchups to collate");
        return Ok(0);
    }
    collate::write_csv(&layout.collated_historical("csv"), &all)?;
    storage::write_json_atomic(&layout.collated_historical("json"), &all)?;
    info!(
        "collated {} historical matchups into {}",
        all.len(),
        layout.collated_historical("csv").display()
    );
    Ok(all.len())
}

pub fn collate_current(layout: &DataLayout, season: u32) -> Result<usize> {
    let weeks = collate_season(layout, season)?;
    if weeks.is_empty() {
        info!("no derived weeks for current season {season}; nothing to collate");
        return Ok(0);
    }
    let dir = layout.collated_current_dir();
    let mut total = 0;
    for (file, rows) in &weeks {
        if rows.is_empty() {
            continue;
        }
        collate::write_csv(&dir.join(format!("{}.csv", file.token)), rows)?;
        storage::write_json_atomic(&dir.join(output_name(file)), rows)?;
        total += rows.len();
    }
    info!("collated {total} current-season matchups into {}", dir.display());
    Ok(total)
}

pub fn train_model(layout: &DataLayout, config: &PipelineConfig) -> Result<TrainingReport> {
    let trained = model::train(&layout.collated_historical("csv"), config.ridge)?;
    let model_path = layout.model_path();
    trained.model.save(&model_path)?;
    storage::write_json_atomic(
        &layout.model_runs_dir().join("training_metrics.json"),
        &trained.report,
    )?;
    write_training_data(
        &layout.model_runs_dir().join("training_data.csv"),
        &trained.train,
    )?;

    let rows = model::eval_rows(&trained.model, &trained.train);
    let metrics = evaluation::evaluate(&rows)?;
    let record = MetricsRecord::new(
        history::run_id("train", config.train_run_id.as_deref()),
        history::model_hash(&model_path),
        metrics,
    );
    MetricsHistory::new(layout.history_dir()).append(&record)?;
    info!(
        "model saved to {} (train mae {:.3}, rmse {:.3})",
        model_path.display(),
        trained.report.train.mae,
        trained.report.train.rmse
    );
    Ok(trained.report)
}

/// The balanced training set the model was fitted on, one row per game.
fn write_training_data(path: &Path, examples: &[TrainingExample]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "game_id",
            "season",
            "week",
            "betting_spread_line",
            "margin",
            "favorite_covers",
        ])
        .context("encode training data header")?;
    for e in examples {
        writer
            .write_record([
                e.game_id.clone(),
                e.season.to_string(),
                e.week.to_string(),
                e.spread.to_string(),
                e.margin.to_string(),
                u8::from(e.favorite_covers).to_string(),
            ])
            .context("encode training data row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("finish training data csv: {e}"))?;
    let text = String::from_utf8(bytes).context("training data csv is not utf-8")?;
    storage::write_text_atomic(path, &text)?;
    debug!("wrote {} training rows to {}", examples.len(), path.display());
    Ok(())
}

pub fn predict(layout: &DataLayout, week: Option<u32>) -> Result<Vec<Prediction>> {
    let model = LinearMarginModel::load(&layout.model_path())?;
    let files = model::current_week_files(&layout.collated_current_dir(), week)?;
    let rows = model::load_inference_rows(&files, &model)?;
    let predictions = model::predict_rows(&model, &rows);

    storage::write_json_atomic(&layout.predictions_path("json"), &predictions)?;
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["game_id", "guess", "predicted_margin"])
        .context("encode predictions header")?;
    for p in &predictions {
        let margin = format!("{:.2}", p.predicted_margin);
        writer
            .write_record([
                p.game_id.as_str(),
                p.guess.as_deref().unwrap_or(""),
                margin.as_str(),
            ])
            .context("encode prediction row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("finish predictions csv: {e}"))?;
    let text = String::from_utf8(bytes).context("predictions csv is not utf-8")?;
    storage::write_text_atomic(&layout.predictions_path("csv"), &text)?;
    info!(
        "wrote {} predictions to {}",
        predictions.len(),
        layout.predictions_path("json").display()
    );
    Ok(predictions)
}

/// Predictions joined to final scores and spreads by game id. Unresolvable
/// predictions are skipped with a warning.
pub fn join_predictions(predictions: &[Prediction], meta: &HashMap<String, GameMeta>) -> Vec<EvalRow> {
    let mut rows = Vec::with_capacity(predictions.len());
    for prediction in predictions {
        let Some(game) = meta.get(&prediction.game_id) else {
            warn!("prediction for unknown game {}; skipped", prediction.game_id);
            continue;
        };
        let Some(row) = EvalRow::from_meta(prediction, game) else {
            warn!("game {} has no final score yet; skipped", prediction.game_id);
            continue;
        };
        rows.push(row);
    }
    rows
}

pub fn evaluate_predictions(layout: &DataLayout, config: &PipelineConfig) -> Result<Metrics> {
    let predictions_path = layout.predictions_path("json");
    if !predictions_path.exists() {
        bail!("predictions not found at {}", predictions_path.display());
    }
    let predictions: Vec<Prediction> = storage::read_json(&predictions_path)?;
    let season = config.current_season;
    let metas = storage::load_meta_season(layout, season)?;
    if metas.is_empty() {
        bail!(
            "game metadata for {season} not found under {}",
            layout.meta_dir(season).display()
        );
    }
    let rows = join_predictions(&predictions, &storage::index_meta(metas));
    let metrics = evaluation::evaluate(&rows)
        .with_context(|| format!("evaluate {}", predictions_path.display()))?;

    let record = MetricsRecord::new(
        history::run_id("eval", config.eval_run_id.as_deref()),
        history::model_hash(&layout.model_path()),
        metrics.clone(),
    );
    storage::write_json_atomic(&layout.metrics_path(), &record)?;
    MetricsHistory::new(layout.history_dir()).append(&record)?;
    info!(
        "evaluated {} games: accuracy {} over {} with a spread, mae {:.3}",
        metrics.errors.samples,
        history::format_value(metrics.accuracy),
        metrics.accuracy_samples,
        metrics.errors.mae
    );
    Ok(metrics)
}
