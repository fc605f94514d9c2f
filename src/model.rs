use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::evaluation::{ErrorMetrics, EvalRow, Prediction, error_metrics};

pub const ID_COLUMN: &str = "meta_game_id";
pub const SEASON_COLUMN: &str = "meta_season";
pub const WEEK_COLUMN: &str = "meta_week";
pub const SPREAD_COLUMN: &str = "betting_spread_line";
pub const TARGET_COLUMN: &str = "results_result";
const HOME_COLUMN: &str = "meta_home_team";
const AWAY_COLUMN: &str = "meta_away_team";

const EXCLUDED_COLUMNS: [&str; 2] = ["betting_favorite", "betting_underdog"];
const EXCLUDED_PREFIXES: [&str; 2] = ["meta_", "results_"];
const PIVOT_EPS: f64 = 1e-9;

pub trait MarginModel {
    /// Home-perspective margin; features the model does not know are ignored
    /// and missing ones read as 0.
    fn predict(&self, features: &HashMap<String, f64>) -> f64;

    fn feature_names(&self) -> &[String];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearMarginModel {
    #[serde(rename = "type")]
    pub kind: String,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub mean_target: f64,
    pub training_samples: usize,
    pub feature_names: Vec<String>,
    pub target_column: String,
    #[serde(default)]
    pub ridge: f64,
    #[serde(default)]
    pub note: String,
}

impl MarginModel for LinearMarginModel {
    fn predict(&self, features: &HashMap<String, f64>) -> f64 {
        self.intercept
            + self
                .feature_names
                .iter()
                .zip(&self.coefficients)
                .map(|(name, coef)| coef * features.get(name).copied().unwrap_or(0.0))
                .sum::<f64>()
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

impl LinearMarginModel {
    pub fn load(path: &Path) -> Result<Self> {
        crate::storage::read_json(path)
            .with_context(|| format!("load margin model {} (train it first)", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::storage::write_json_atomic(path, self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub game_id: String,
    pub season: u32,
    pub week: u32,
    pub features: HashMap<String, f64>,
    pub margin: f64,
    pub spread: f64,
    pub favorite_covers: bool,
}

pub fn is_feature_column(name: &str) -> bool {
    !EXCLUDED_COLUMNS.contains(&name) && !EXCLUDED_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn parse_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Header-keyed records of a CSV file.
pub fn read_csv_records(path: &Path) -> Result<Vec<HashMap<String, String>>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("read row of {}", path.display()))?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

pub fn extract_features(row: &HashMap<String, String>) -> HashMap<String, f64> {
    row.iter()
        .filter(|(k, _)| is_feature_column(k))
        .filter_map(|(k, v)| parse_numeric(v).map(|x| (k.clone(), x)))
        .collect()
}

/// Training examples plus the ordered feature name list. Rows without a
/// numeric target, season or week are skipped.
pub fn load_training_rows(path: &Path) -> Result<(Vec<TrainingExample>, Vec<String>)> {
    if !path.exists() {
        bail!("training data not found at {}", path.display());
    }
    let records = read_csv_records(path)?;
    let mut examples = Vec::new();
    let mut names = BTreeSet::new();
    for row in &records {
        let num = |col: &str| row.get(col).and_then(|v| parse_numeric(v));
        let (Some(margin), Some(season), Some(week)) =
            (num(TARGET_COLUMN), num(SEASON_COLUMN), num(WEEK_COLUMN))
        else {
            continue;
        };
        let features = extract_features(row);
        if features.is_empty() {
            continue;
        }
        names.extend(features.keys().cloned());
        let spread = num(SPREAD_COLUMN).unwrap_or(0.0);
        examples.push(TrainingExample {
            game_id: row.get(ID_COLUMN).cloned().unwrap_or_default(),
            season: season as u32,
            week: week as u32,
            features,
            margin,
            spread,
            favorite_covers: margin - spread >= 0.0,
        });
    }
    if examples.is_empty() {
        bail!("no usable training rows in {}", path.display());
    }
    Ok((examples, names.into_iter().collect()))
}

/// Latest season held out; a single-season set holds out its latest week.
pub fn split_train_validation(
    examples: &[TrainingExample],
) -> (Vec<TrainingExample>, Vec<TrainingExample>) {
    let Some(latest_season) = examples.iter().map(|e| e.season).max() else {
        return (Vec::new(), Vec::new());
    };
    let (mut validation, mut train): (Vec<_>, Vec<_>) = examples
        .iter()
        .cloned()
        .partition(|e| e.season == latest_season);
    if train.is_empty() {
        let latest_week = examples.iter().map(|e| e.week).max().unwrap_or(0);
        (validation, train) = examples
            .iter()
            .cloned()
            .partition(|e| e.week == latest_week);
    }
    if train.is_empty() {
        train = examples.to_vec();
        validation.clear();
    }
    (train, validation)
}

/// Equal numbers of favorite-cover and underdog-cover rows, input order kept
/// within each class. One-sided sets pass through unchanged.
pub fn balance_by_cover(examples: &[TrainingExample]) -> Vec<TrainingExample> {
    let (fav, dog): (Vec<&TrainingExample>, Vec<&TrainingExample>) =
        examples.iter().partition(|e| e.favorite_covers);
    if fav.is_empty() || dog.is_empty() {
        return examples.to_vec();
    }
    let n = fav.len().min(dog.len());
    fav.into_iter()
        .take(n)
        .chain(dog.into_iter().take(n))
        .cloned()
        .collect()
}

/// Partial-pivot Gaussian elimination. A near-zero pivot means the system is
/// singular and yields all zeros.
pub fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for i in 0..n {
        let pivot = (i..n)
            .max_by(|&x, &y| a[x][i].abs().total_cmp(&a[y][i].abs()))
            .unwrap_or(i);
        if a[pivot][i].abs() < PIVOT_EPS {
            return vec![0.0; n];
        }
        a.swap(i, pivot);
        b.swap(i, pivot);

        let p = a[i][i];
        for v in a[i][i..].iter_mut() {
            *v /= p;
        }
        b[i] /= p;

        for r in i + 1..n {
            let factor = a[r][i];
            if factor.abs() < 1e-12 {
                continue;
            }
            for c in i..n {
                let delta = factor * a[i][c];
                a[r][c] -= delta;
            }
            let delta = factor * b[i];
            b[r] -= delta;
        }
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let tail: f64 = (i + 1..n).map(|j| a[i][j] * x[j]).sum();
        x[i] = b[i] - tail;
    }
    x
}

/// Feature names that actually vary across `examples`; constant columns only
/// make the normal equations singular.
pub fn varying_features(examples: &[TrainingExample], names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|name| {
            let mut values = examples
                .iter()
                .map(|e| e.features.get(name.as_str()).copied().unwrap_or(0.0));
            let Some(first) = values.next() else {
                return false;
            };
            values.any(|v| v != first)
        })
        .cloned()
        .collect()
}

/// Least squares on the normal equations. A positive `ridge` adds an L2
/// penalty on every non-intercept coefficient; `ridge = 0` is plain OLS.
pub fn fit_linear(examples: &[TrainingExample], names: &[String], ridge: f64) -> LinearMarginModel {
    let n = examples.len();
    let d = names.len();
    let mean_target = if n == 0 {
        0.0
    } else {
        examples.iter().map(|e| e.margin).sum::<f64>() / n as f64
    };

    let mut xtx = vec![vec![0.0; d + 1]; d + 1];
    let mut xty = vec![0.0; d + 1];
    for example in examples {
        let row: Vec<f64> = std::iter::once(1.0)
            .chain(
                names
                    .iter()
                    .map(|name| example.features.get(name).copied().unwrap_or(0.0)),
            )
            .collect();
        for i in 0..=d {
            xty[i] += row[i] * example.margin;
            for j in 0..=d {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for (i, row) in xtx.iter_mut().enumerate().skip(1) {
        row[i] += ridge;
    }

    let beta = if n == 0 {
        vec![0.0; d + 1]
    } else {
        solve_linear_system(xtx, xty)
    };
    LinearMarginModel {
        kind: "linear_regression".to_string(),
        intercept: beta[0],
        coefficients: beta[1..].to_vec(),
        mean_target,
        training_samples: n,
        feature_names: names.to_vec(),
        target_column: TARGET_COLUMN.to_string(),
        ridge,
        note: if ridge > 0.0 {
            format!("Ridge-regularised (lambda {ridge}) linear fit on collated historical matchups.")
        } else {
            "Ordinary least squares fit on collated historical matchups.".to_string()
        },
    }
}

pub fn eval_rows(model: &dyn MarginModel, examples: &[TrainingExample]) -> Vec<EvalRow> {
    examples
        .iter()
        .map(|e| EvalRow {
            game_id: e.game_id.clone(),
            predicted_margin: model.predict(&e.features),
            actual_margin: e.margin,
            spread: Some(e.spread),
            weekday: None,
        })
        .collect()
}

pub fn score(model: &dyn MarginModel, examples: &[TrainingExample]) -> Result<ErrorMetrics> {
    let pairs: Vec<(f64, f64)> = examples
        .iter()
        .map(|e| (model.predict(&e.features), e.margin))
        .collect();
    error_metrics(&pairs)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub train: ErrorMetrics,
    pub validation: Option<ErrorMetrics>,
    pub feature_count: usize,
    pub dropped_constant_features: usize,
}

pub struct TrainedModel {
    pub model: LinearMarginModel,
    pub train: Vec<TrainingExample>,
    pub validation: Vec<TrainingExample>,
    pub report: TrainingReport,
}

pub fn train(path: &Path, ridge: f64) -> Result<TrainedModel> {
    let (examples, names) = load_training_rows(path)?;
    let (train, validation) = split_train_validation(&examples);
    let train = balance_by_cover(&train);
    let kept = varying_features(&train, &names);
    info!(
        "training on {} balanced rows ({} held out), {} of {} features vary",
        train.len(),
        validation.len(),
        kept.len(),
        names.len()
    );
    let model = fit_linear(&train, &kept, ridge);
    debug!("intercept {:.4}, mean target {:.4}", model.intercept, model.mean_target);

    let report = TrainingReport {
        train: score(&model, &train)?,
        validation: if validation.is_empty() {
            None
        } else {
            Some(score(&model, &validation)?)
        },
        feature_count: kept.len(),
        dropped_constant_features: names.len() - kept.len(),
    };
    Ok(TrainedModel {
        model,
        train,
        validation,
        report,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRow {
    pub game_id: String,
    pub home_team: String,
    pub away_team: String,
    pub spread: Option<f64>,
    pub features: HashMap<String, f64>,
}

/// `collated/current/*.csv`, optionally restricted to one numeric week file.
pub fn current_week_files(dir: &Path, week: Option<u32>) -> Result<Vec<PathBuf>> {
    let files = crate::storage::list_week_files(dir, "csv")?;
    let files: Vec<PathBuf> = files
        .into_iter()
        .filter(|f| week.is_none() || f.week == week)
        .map(|f| f.path)
        .collect();
    if files.is_empty() {
        match week {
            Some(w) => bail!("no collated current CSVs in {} for week {w}", dir.display()),
            None => bail!("no collated current CSVs in {}", dir.display()),
        }
    }
    Ok(files)
}

/// Rows whose model feature vector is entirely zero carry no signal and are
/// skipped.
pub fn load_inference_rows(files: &[PathBuf], model: &dyn MarginModel) -> Result<Vec<InferenceRow>> {
    let mut rows = Vec::new();
    for path in files {
        for record in read_csv_records(path)? {
            let features = extract_features(&record);
            let informative = model
                .feature_names()
                .iter()
                .any(|name| features.get(name).is_some_and(|v| *v != 0.0));
            if !informative {
                continue;
            }
            let text = |col: &str| record.get(col).cloned().unwrap_or_default();
            rows.push(InferenceRow {
                game_id: text(ID_COLUMN),
                home_team: text(HOME_COLUMN),
                away_team: text(AWAY_COLUMN),
                spread: record.get(SPREAD_COLUMN).and_then(|v| parse_numeric(v)),
                features,
            });
        }
    }
    if rows.is_empty() {
        bail!("no inference rows with usable features");
    }
    Ok(rows)
}

/// The `guess` is the side expected to beat the spread.
pub fn predict_rows(model: &dyn MarginModel, rows: &[InferenceRow]) -> Vec<Prediction> {
    rows.iter()
        .map(|row| {
            let predicted_margin = model.predict(&row.features);
            let edge = predicted_margin - row.spread.unwrap_or(0.0);
            let guess = if edge >= 0.0 {
                &row.home_team
            } else {
                &row.away_team
            };
            Prediction {
                game_id: row.game_id.clone(),
                guess: (!guess.is_empty()).then(|| guess.clone()),
                predicted_margin,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::config::DEFAULT_RIDGE;
    use super::{
        MarginModel, TrainingExample, balance_by_cover, fit_linear, is_feature_column,
        solve_linear_system, split_train_validation, varying_features,
    };
    use std::collections::HashMap;

    fn example(season: u32, week: u32, x: f64, margin: f64, spread: f64) -> TrainingExample {
        TrainingExample {
            game_id: format!("{season}_{week}"),
            season,
            week,
            features: HashMap::from([
                ("x".to_string(), x),
                ("flat".to_string(), 1.0),
            ]),
            margin,
            spread,
            favorite_covers: margin - spread >= 0.0,
        }
    }

    #[test]
    fn feature_columns_skip_ids_and_targets() {
        assert!(is_feature_column("teamStats_favorite_off_plays"));
        assert!(is_feature_column("betting_spread_line"));
        assert!(!is_feature_column("betting_favorite"));
        assert!(!is_feature_column("meta_week"));
        assert!(!is_feature_column("results_result"));
    }

    #[test]
    fn singular_system_yields_zeros() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert_eq!(solve_linear_system(a, vec![1.0, 2.0]), vec![0.0, 0.0]);
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve_linear_system(a, vec![3.0, 5.0]);
        assert!((x[0] - 0.8).abs() < 1e-9);
        assert!((x[1] - 1.4).abs() < 1e-9);
    }

    #[test]
    fn ols_recovers_exact_line() {
        let rows: Vec<TrainingExample> = (0..6)
            .map(|i| example(2023, 1, i as f64, 2.0 * i as f64 + 1.0, 0.0))
            .collect();
        let names = varying_features(&rows, &["flat".to_string(), "x".to_string()]);
        assert_eq!(names, vec!["x".to_string()]);
        let model = fit_linear(&rows, &names, 0.0);
        assert!((model.intercept - 1.0).abs() < 1e-9);
        assert!((model.coefficients[0] - 2.0).abs() < 1e-9);
        let query = HashMap::from([("x".to_string(), 10.0)]);
        assert!((model.predict(&query) - 21.0).abs() < 1e-9);
    }

    #[test]
    fn default_fit_is_unpenalised() {
        let rows: Vec<TrainingExample> = [1.0, 2.0, 3.0]
            .iter()
            .map(|x| example(2023, 1, *x, 10.0 * x, 0.0))
            .collect();
        let names = vec!["x".to_string()];
        let model = fit_linear(&rows, &names, DEFAULT_RIDGE);
        assert!((model.coefficients[0] - 10.0).abs() < 1e-9);
        assert!(model.intercept.abs() < 1e-9);

        let shrunk = fit_linear(&rows, &names, 1.0);
        assert!(shrunk.coefficients[0] < 10.0);
    }

    #[test]
    fn split_holds_out_latest_season_then_week() {
        let rows = vec![example(2022, 1, 0.0, 1.0, 0.0), example(2023, 1, 0.0, 1.0, 0.0)];
        let (train, val) = split_train_validation(&rows);
        assert_eq!((train.len(), val.len()), (1, 1));
        assert_eq!(val[0].season, 2023);

        let rows = vec![example(2023, 1, 0.0, 1.0, 0.0), example(2023, 2, 0.0, 1.0, 0.0)];
        let (train, val) = split_train_validation(&rows);
        assert_eq!(val[0].week, 2);
        assert_eq!(train[0].week, 1);

        let rows = vec![example(2023, 1, 0.0, 1.0, 0.0)];
        let (train, val) = split_train_validation(&rows);
        assert_eq!((train.len(), val.len()), (1, 0));
    }

    #[test]
    fn balancing_keeps_order_within_class() {
        let rows = vec![
            example(2023, 1, 0.0, 7.0, 3.0),
            example(2023, 2, 0.0, 3.0, 3.0),
            example(2023, 3, 0.0, -1.0, 3.0),
            example(2023, 4, 0.0, 10.0, 3.0),
        ];
        let balanced = balance_by_cover(&rows);
        let weeks: Vec<u32> = balanced.iter().map(|e| e.week).collect();
        assert_eq!(weeks, vec![1, 3]);
    }
}
