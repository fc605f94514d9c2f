use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::evaluation::{BUCKET_NAMES, Metrics};

pub const HISTORY_JSONL: &str = "metrics_history.jsonl";
pub const HISTORY_CSV: &str = "metrics_history.csv";
const HASH_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub run_id: String,
    pub timestamp: String,
    pub model_hash: String,
    pub metrics: Metrics,
}

impl MetricsRecord {
    pub fn new(run_id: String, model_hash: String, metrics: Metrics) -> Self {
        Self {
            run_id,
            timestamp: now_timestamp(),
            model_hash,
            metrics,
        }
    }
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `<prefix>@<explicit id>`, or `<prefix>@<timestamp>` when none is configured.
pub fn run_id(prefix: &str, explicit: Option<&str>) -> String {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => format!("{prefix}@{id}"),
        None => format!("{prefix}@{}", now_timestamp()),
    }
}

/// Short content hash of the model artifact; `missing` when there is none.
pub fn model_hash(path: &Path) -> String {
    let Ok(bytes) = fs::read(path) else {
        return "missing".to_string();
    };
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = format!("{:x}", hasher.finalize());
    digest[..HASH_LEN].to_string()
}

pub fn format_value(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.4}")
    } else {
        "NaN".to_string()
    }
}

pub fn csv_header() -> Vec<String> {
    let mut header: Vec<String> = [
        "run_id",
        "timestamp",
        "model_hash",
        "samples",
        "accuracy",
        "accuracy_samples",
        "mae",
        "rmse",
        "bias",
        "r2",
        "mean_actual",
        "baseline_mae",
        "baseline_rmse",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(BUCKET_NAMES.iter().map(|b| format!("{b}_accuracy")));
    header
}

pub fn csv_row(record: &MetricsRecord) -> Vec<String> {
    let m = &record.metrics;
    let e = &m.errors;
    let mut row = vec![
        record.run_id.clone(),
        record.timestamp.clone(),
        record.model_hash.clone(),
        e.samples.to_string(),
        format_value(m.accuracy),
        m.accuracy_samples.to_string(),
        format_value(e.mae),
        format_value(e.rmse),
        format_value(e.bias),
        format_value(e.r2),
        format_value(e.mean_actual),
        format_value(e.baseline_mae),
        format_value(e.baseline_rmse),
    ];
    row.extend(
        BUCKET_NAMES
            .iter()
            .map(|b| format_value(m.bucket(b).accuracy())),
    );
    row
}

/// Append-only run log: one JSON line and one CSV row per run. Existing lines
/// are never rewritten; the CSV header goes in only when the file is new.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    dir: PathBuf,
}

impl MetricsHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn jsonl_path(&self) -> PathBuf {
        self.dir.join(HISTORY_JSONL)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.dir.join(HISTORY_CSV)
    }

    pub fn append(&self, record: &MetricsRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create history dir {}", self.dir.display()))?;

        let jsonl = self.jsonl_path();
        let line = serde_json::to_string(record).context("serialize metrics record")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&jsonl)
            .with_context(|| format!("open {}", jsonl.display()))?;
        writeln!(file, "{line}").with_context(|| format!("append {}", jsonl.display()))?;

        let csv_path = self.csv_path();
        let fresh = !csv_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("open {}", csv_path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer
                .write_record(csv_header())
                .with_context(|| format!("write header {}", csv_path.display()))?;
        }
        writer
            .write_record(csv_row(record))
            .with_context(|| format!("append {}", csv_path.display()))?;
        writer
            .flush()
            .with_context(|| format!("flush {}", csv_path.display()))?;
        Ok(())
    }

    /// Every recorded run, oldest first. Unparseable lines are skipped.
    pub fn load(&self) -> Result<Vec<MetricsRecord>> {
        let path = self.jsonl_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}
