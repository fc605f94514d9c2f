use std::env;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use chrono::{Datelike, Local};
use log::warn;

use crate::storage::DataLayout;

pub const DEFAULT_OUTPUT_DIR: &str = "data";
pub const DEFAULT_HISTORICAL_START: u32 = 2016;
pub const DEFAULT_HISTORICAL_END: u32 = 2024;
pub const DEFAULT_RIDGE: f64 = 0.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub current_season: u32,
    pub historical_start: u32,
    pub historical_end: u32,
    pub stat_schema_path: Option<PathBuf>,
    pub eval_run_id: Option<String>,
    pub train_run_id: Option<String>,
    pub fetch_cmd: Option<String>,
    pub ridge: f64,
}

/// Loads `.env.local` then `.env`; already-set variables win.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok(), Local::now().year() as u32)
    }

    /// Resolves every setting through `lookup`; `clock_year` backs the current
    /// season when nothing sets it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, clock_year: u32) -> Self {
        let opt = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let year = |key: &str, default: u32| {
            opt(key)
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(default)
        };

        let mut historical_start = year("HISTORICAL_START_SEASON", DEFAULT_HISTORICAL_START);
        let mut historical_end = year("HISTORICAL_END_SEASON", DEFAULT_HISTORICAL_END);
        if historical_start > historical_end {
            warn!(
                "HISTORICAL_START_SEASON {historical_start} is after HISTORICAL_END_SEASON {historical_end}; swapping"
            );
            std::mem::swap(&mut historical_start, &mut historical_end);
        }

        Self {
            output_dir: opt("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            current_season: year("CURRENT_SEASON", clock_year),
            historical_start,
            historical_end,
            stat_schema_path: opt("STAT_SCHEMA_PATH").map(PathBuf::from),
            eval_run_id: opt("EVAL_RUN_ID"),
            train_run_id: opt("TRAIN_RUN_ID"),
            fetch_cmd: opt("FETCH_CMD"),
            ridge: opt("MODEL_RIDGE")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|r| r.is_finite() && *r >= 0.0)
                .unwrap_or(DEFAULT_RIDGE),
        }
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.output_dir)
    }

    pub fn historical_seasons(&self) -> RangeInclusive<u32> {
        self.historical_start..=self.historical_end
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineConfig;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn config(vars: &[(&str, &str)]) -> PipelineConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|k| vars.get(k).cloned(), 2026)
    }

    #[test]
    fn defaults_follow_clock_year() {
        let cfg = config(&[]);
        assert_eq!(cfg.output_dir, PathBuf::from("data"));
        assert_eq!(cfg.current_season, 2026);
        assert_eq!((cfg.historical_start, cfg.historical_end), (2016, 2024));
        assert!(cfg.fetch_cmd.is_none());
        assert_eq!(cfg.ridge, 0.0);
    }

    #[test]
    fn ridge_is_opt_in() {
        assert_eq!(config(&[("MODEL_RIDGE", "2.5")]).ridge, 2.5);
        assert_eq!(config(&[("MODEL_RIDGE", "-1")]).ridge, 0.0);
        assert_eq!(config(&[("MODEL_RIDGE", "lots")]).ridge, 0.0);
    }

    #[test]
    fn reversed_history_range_is_swapped() {
        let cfg = config(&[
            ("HISTORICAL_START_SEASON", "2023"),
            ("HISTORICAL_END_SEASON", "2019"),
            ("CURRENT_SEASON", "2024"),
            ("EVAL_RUN_ID", "  "),
        ]);
        assert_eq!((cfg.historical_start, cfg.historical_end), (2019, 2023));
        assert_eq!(cfg.current_season, 2024);
        assert!(cfg.eval_run_id.is_none());
        assert_eq!(cfg.historical_seasons().count(), 5);
    }
}
