use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize};

use crate::play::GameMeta;

pub const BUCKET_NAMES: [&str; 20] = [
    "favorite_predicted_cover",
    "underdog_predicted_cover",
    "favorite_is_home",
    "favorite_is_away",
    "thursday",
    "monday",
    "favorite_blowout",
    "upset",
    "within_3_of_vegas",
    "spread_0_5",
    "spread_1_5",
    "spread_2_5",
    "spread_3_5",
    "spread_4_5",
    "spread_5_5",
    "spread_6_5",
    "spread_7_5",
    "spread_8_5",
    "spread_9_5",
    "spread_10_5_plus",
];

const BLOWOUT_MARGIN: f64 = 7.0;
const UPSET_MARGIN: f64 = -3.0;
const VEGAS_WINDOW: f64 = 3.0;

/// `null` and non-numeric values read as NaN instead of failing the file.
pub(crate) fn nan_tolerant<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(crate::play::coerce_f64(&v).unwrap_or(f64::NAN))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub game_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guess: Option<String>,
    #[serde(deserialize_with = "nan_tolerant")]
    pub predicted_margin: f64,
}

/// One scored game: margins are home-perspective, the spread is positive when
/// the home team is favoured.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalRow {
    pub game_id: String,
    pub predicted_margin: f64,
    pub actual_margin: f64,
    pub spread: Option<f64>,
    pub weekday: Option<Weekday>,
}

impl EvalRow {
    pub fn from_meta(prediction: &Prediction, meta: &GameMeta) -> Option<Self> {
        let actual_margin = meta.home_margin()?;
        Some(Self {
            game_id: prediction.game_id.clone(),
            predicted_margin: prediction.predicted_margin,
            actual_margin,
            spread: meta.spread_line,
            weekday: game_weekday(meta),
        })
    }

    pub fn favorite_is_home(&self) -> bool {
        self.spread.is_none_or(|s| s >= 0.0)
    }

    fn favorite_sign(&self) -> f64 {
        if self.favorite_is_home() { 1.0 } else { -1.0 }
    }

    pub fn favorite_margin(&self) -> f64 {
        self.favorite_sign() * self.actual_margin
    }

    pub fn cover_correct(&self) -> Option<bool> {
        let spread = self.spread?;
        Some(cover_correct(self.predicted_margin, self.actual_margin, spread))
    }
}

/// Weekday from the metadata label, falling back to the game date.
pub fn game_weekday(meta: &GameMeta) -> Option<Weekday> {
    if let Some(label) = meta.weekday.as_deref()
        && let Ok(day) = label.trim().parse::<Weekday>()
    {
        return Some(day);
    }
    let date = NaiveDate::parse_from_str(meta.gameday.as_deref()?.trim(), "%Y-%m-%d").ok()?;
    Some(date.weekday())
}

/// Prediction and outcome land on the same side of the spread. A push on
/// either side counts as correct.
pub fn cover_correct(predicted: f64, actual: f64, spread: f64) -> bool {
    let pred_edge = predicted - spread;
    let actual_edge = actual - spread;
    if pred_edge == 0.0 || actual_edge == 0.0 {
        return true;
    }
    (pred_edge > 0.0) == (actual_edge > 0.0)
}

/// Bucket by `floor(|spread|)`; anything from 10.0 up lands in `spread_10_5_plus`.
pub fn spread_bucket(spread: f64) -> &'static str {
    let idx = spread.abs().floor();
    if idx >= 10.0 {
        return "spread_10_5_plus";
    }
    BUCKET_NAMES[9 + idx as usize]
}

/// Every bucket the row belongs to. Buckets overlap.
pub fn buckets_for(row: &EvalRow) -> Vec<&'static str> {
    let Some(spread) = row.spread else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(6);
    let predicted_fav_edge = row.favorite_sign() * (row.predicted_margin - spread);
    if predicted_fav_edge >= 0.0 {
        out.push("favorite_predicted_cover");
    } else {
        out.push("underdog_predicted_cover");
    }
    if row.favorite_is_home() {
        out.push("favorite_is_home");
    } else {
        out.push("favorite_is_away");
    }
    match row.weekday {
        Some(Weekday::Thu) => out.push("thursday"),
        Some(Weekday::Mon) => out.push("monday"),
        _ => {}
    }
    let fav_margin = row.favorite_margin();
    if fav_margin > BLOWOUT_MARGIN {
        out.push("favorite_blowout");
    }
    if fav_margin < UPSET_MARGIN {
        out.push("upset");
    }
    if (row.actual_margin - spread).abs() <= VEGAS_WINDOW {
        out.push("within_3_of_vegas");
    }
    out.push(spread_bucket(spread));
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketTally {
    pub correct: usize,
    pub total: usize,
}

impl BucketTally {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return f64::NAN;
        }
        self.correct as f64 / self.total as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub samples: usize,
    #[serde(deserialize_with = "nan_tolerant")]
    pub mae: f64,
    #[serde(deserialize_with = "nan_tolerant")]
    pub rmse: f64,
    #[serde(deserialize_with = "nan_tolerant")]
    pub bias: f64,
    #[serde(deserialize_with = "nan_tolerant")]
    pub r2: f64,
    #[serde(deserialize_with = "nan_tolerant")]
    pub mean_actual: f64,
    #[serde(deserialize_with = "nan_tolerant")]
    pub baseline_mae: f64,
    #[serde(deserialize_with = "nan_tolerant")]
    pub baseline_rmse: f64,
}

/// Global regression error over (predicted, actual) pairs. The baseline always
/// predicts the mean actual margin.
pub fn error_metrics(pairs: &[(f64, f64)]) -> Result<ErrorMetrics> {
    if pairs.is_empty() {
        bail!("no rows to evaluate");
    }
    let n = pairs.len() as f64;
    let mean_actual = pairs.iter().map(|(_, a)| a).sum::<f64>() / n;

    let mut abs_err = 0.0;
    let mut sq_err = 0.0;
    let mut bias = 0.0;
    let mut base_abs = 0.0;
    let mut ss_tot = 0.0;
    for (pred, actual) in pairs {
        let err = pred - actual;
        abs_err += err.abs();
        sq_err += err * err;
        bias += err;
        let dev = actual - mean_actual;
        base_abs += dev.abs();
        ss_tot += dev * dev;
    }
    let r2 = if ss_tot == 0.0 {
        f64::NAN
    } else {
        1.0 - sq_err / ss_tot
    };
    Ok(ErrorMetrics {
        samples: pairs.len(),
        mae: abs_err / n,
        rmse: (sq_err / n).sqrt(),
        bias: bias / n,
        r2,
        mean_actual,
        baseline_mae: base_abs / n,
        baseline_rmse: (ss_tot / n).sqrt(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(flatten)]
    pub errors: ErrorMetrics,
    #[serde(deserialize_with = "nan_tolerant")]
    pub accuracy: f64,
    pub accuracy_samples: usize,
    pub buckets: BTreeMap<String, BucketTally>,
}

impl Metrics {
    pub fn bucket(&self, name: &str) -> BucketTally {
        self.buckets.get(name).copied().unwrap_or_default()
    }
}

pub fn evaluate(rows: &[EvalRow]) -> Result<Metrics> {
    let pairs: Vec<(f64, f64)> = rows
        .iter()
        .filter(|r| r.predicted_margin.is_finite() && r.actual_margin.is_finite())
        .map(|r| (r.predicted_margin, r.actual_margin))
        .collect();
    let errors = error_metrics(&pairs)?;

    let mut buckets: BTreeMap<String, BucketTally> = BUCKET_NAMES
        .iter()
        .map(|name| (name.to_string(), BucketTally::default()))
        .collect();
    let mut correct = 0usize;
    let mut scored = 0usize;
    for row in rows {
        if !row.predicted_margin.is_finite() || !row.actual_margin.is_finite() {
            continue;
        }
        let Some(hit) = row.cover_correct() else {
            continue;
        };
        scored += 1;
        if hit {
            correct += 1;
        }
        for name in buckets_for(row) {
            let tally = buckets.entry(name.to_string()).or_default();
            tally.total += 1;
            if hit {
                tally.correct += 1;
            }
        }
    }
    let accuracy = if scored == 0 {
        f64::NAN
    } else {
        correct as f64 / scored as f64
    };

    Ok(Metrics {
        errors,
        accuracy,
        accuracy_samples: scored,
        buckets,
    })
}

#[cfg(test)]
mod tests {
    use super::{EvalRow, buckets_for, cover_correct, evaluate, spread_bucket};
    use chrono::Weekday;

    fn row(pred: f64, actual: f64, spread: Option<f64>) -> EvalRow {
        EvalRow {
            game_id: "g".into(),
            predicted_margin: pred,
            actual_margin: actual,
            spread,
            weekday: None,
        }
    }

    #[test]
    fn pushes_count_as_correct() {
        assert!(cover_correct(3.0, 3.0, 3.0));
        assert!(cover_correct(5.0, 3.0, 3.0));
        assert!(!cover_correct(10.0, -2.0, 3.0));
        assert!(cover_correct(-4.0, -10.0, 3.0));
    }

    #[test]
    fn spread_buckets_use_floor_of_absolute_value() {
        assert_eq!(spread_bucket(0.0), "spread_0_5");
        assert_eq!(spread_bucket(-2.5), "spread_2_5");
        assert_eq!(spread_bucket(9.99), "spread_9_5");
        assert_eq!(spread_bucket(10.0), "spread_10_5_plus");
        assert_eq!(spread_bucket(-14.0), "spread_10_5_plus");
    }

    #[test]
    fn away_favorite_flips_favorite_margin() {
        let mut r = row(-6.0, -10.0, Some(-3.0));
        r.weekday = Some(Weekday::Mon);
        let buckets = buckets_for(&r);
        assert!(buckets.contains(&"favorite_is_away"));
        assert!(buckets.contains(&"favorite_predicted_cover"));
        assert!(buckets.contains(&"favorite_blowout"));
        assert!(buckets.contains(&"monday"));
        assert!(buckets.contains(&"spread_3_5"));
        assert!(!buckets.contains(&"within_3_of_vegas"));
    }

    #[test]
    fn rows_without_spread_only_count_globally() {
        let rows = vec![row(3.0, 3.0, Some(3.0)), row(1.0, 5.0, None)];
        let metrics = evaluate(&rows).expect("metrics");
        assert_eq!(metrics.errors.samples, 2);
        assert_eq!(metrics.accuracy_samples, 1);
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.errors.mae, 2.0);
        assert_eq!(metrics.errors.bias, -2.0);
        assert_eq!(metrics.bucket("favorite_is_home").total, 1);
    }

    #[test]
    fn constant_actuals_give_nan_r2() {
        let metrics = evaluate(&[row(1.0, 4.0, None), row(2.0, 4.0, None)]).expect("metrics");
        assert!(metrics.errors.r2.is_nan());
        assert!(metrics.accuracy.is_nan());
        assert_eq!(metrics.errors.baseline_mae, 0.0);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(evaluate(&[]).is_err());
    }
}
