use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::play::{GameMeta, Play};

/// On-disk layout under the data root.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pbp_dir(&self, season: u32) -> PathBuf {
        self.root.join("pbp_data").join(season.to_string())
    }

    pub fn meta_dir(&self, season: u32) -> PathBuf {
        self.root.join("game_meta").join(season.to_string())
    }

    pub fn derived_dir(&self, season: u32) -> PathBuf {
        self.root.join("derived").join(season.to_string())
    }

    pub fn trends_dir(&self, season: u32) -> PathBuf {
        self.root.join("trends").join(season.to_string())
    }

    pub fn collated_current_dir(&self) -> PathBuf {
        self.root.join("collated").join("current")
    }

    pub fn collated_historical(&self, ext: &str) -> PathBuf {
        self.root.join("collated").join(format!("historical.{ext}"))
    }

    pub fn model_runs_dir(&self) -> PathBuf {
        self.root.join("model_runs")
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_runs_dir().join("margin_model.json")
    }

    pub fn predictions_path(&self, ext: &str) -> PathBuf {
        self.model_runs_dir().join(format!("predictions.{ext}"))
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.model_runs_dir().join("metrics.json")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.model_runs_dir().join("history")
    }
}

pub fn week_file_name(week: u32) -> String {
    format!("{week:02}.json")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekFile {
    pub token: String,
    pub week: Option<u32>,
    pub path: PathBuf,
}

/// `*.<ext>` files in `dir`, numeric week tokens first in numeric order, then
/// anything else lexically. A missing directory yields an empty list.
pub fn list_week_files(dir: &Path, ext: &str) -> Result<Vec<WeekFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries =
        fs::read_dir(dir).with_context(|| format!("list week files in {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        let Some(token) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        let week = token.parse::<u32>().ok();
        files.push(WeekFile { token, week, path });
    }
    sort_week_files(&mut files);
    Ok(files)
}

pub fn sort_week_files(files: &mut [WeekFile]) {
    files.sort_by(|a, b| match (a.week, b.week) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.token.cmp(&b.token)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.token.cmp(&b.token),
    });
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

pub fn write_text_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!("{e}.tmp"))
        .unwrap_or_else(|| "tmp".to_string());
    let tmp = path.with_extension(ext);
    fs::write(&tmp, contents).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    write_text_atomic(path, &json)
}

/// Loads one week of plays, dropping administrative rows before they reach
/// any calculator.
pub fn load_plays(path: &Path) -> Result<Vec<Play>> {
    let raw: Vec<Value> = read_json(path)?;
    let total = raw.len();
    let plays: Vec<Play> = raw
        .into_iter()
        .filter_map(|v| serde_json::from_value::<Play>(v).ok())
        .filter(Play::is_snap)
        .collect();
    debug!(
        "{}: kept {} of {} rows as snaps",
        path.display(),
        plays.len(),
        total
    );
    Ok(plays)
}

pub fn load_meta_file(path: &Path) -> Result<Vec<GameMeta>> {
    let raw: Vec<Value> = read_json(path)?;
    let mut metas = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<GameMeta>(value) {
            Ok(meta) if !meta.game_id.is_empty() => metas.push(meta),
            Ok(_) => warn!("{}: game metadata row without game_id", path.display()),
            Err(err) => warn!("{}: skipping game metadata row: {err}", path.display()),
        }
    }
    Ok(metas)
}

/// Every metadata row of a season in week order; empty when the season has no
/// metadata directory.
pub fn load_meta_season(layout: &DataLayout, season: u32) -> Result<Vec<GameMeta>> {
    let mut metas = Vec::new();
    for file in list_week_files(&layout.meta_dir(season), "json")? {
        metas.extend(load_meta_file(&file.path)?);
    }
    Ok(metas)
}

pub fn index_meta(metas: impl IntoIterator<Item = GameMeta>) -> HashMap<String, GameMeta> {
    metas
        .into_iter()
        .map(|meta| (meta.game_id.clone(), meta))
        .collect()
}

/// Seasons present as numeric subdirectories of `dir`, ascending.
pub fn list_seasons(dir: &Path) -> Result<Vec<u32>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut seasons = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("list seasons in {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(season) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) {
            seasons.push(season);
        }
    }
    seasons.sort_unstable();
    Ok(seasons)
}

#[cfg(test)]
mod tests {
    use super::{WeekFile, load_meta_file, sort_week_files, week_file_name, write_json_atomic, read_json};
    use std::path::PathBuf;

    fn wf(token: &str) -> WeekFile {
        WeekFile {
            token: token.to_string(),
            week: token.parse().ok(),
            path: PathBuf::from(format!("{token}.json")),
        }
    }

    #[test]
    fn numeric_weeks_sort_before_lexical_tokens() {
        let mut files = vec![wf("10"), wf("post"), wf("2"), wf("01"), wf("bye")];
        sort_week_files(&mut files);
        let tokens: Vec<&str> = files.iter().map(|f| f.token.as_str()).collect();
        assert_eq!(tokens, vec!["01", "2", "10", "bye", "post"]);
        assert_eq!(week_file_name(3), "03.json");
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("05.json");
        write_json_atomic(&path, &vec![1, 2, 3]).expect("write");
        let back: Vec<i32> = read_json(&path).expect("read");
        assert_eq!(back, vec![1, 2, 3]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn meta_rows_with_numeric_ids_are_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("01.json");
        let rows = serde_json::json!([
            {"game_id": 2023010100, "home_team": "NYJ", "away_team": null},
            {"game_id": null, "home_team": "KC", "away_team": "DET"},
            {"game_id": "2023_01_DET_KC", "home_team": "KC", "away_team": "DET"},
        ]);
        write_json_atomic(&path, &rows).expect("write");
        let metas = load_meta_file(&path).expect("load");
        let ids: Vec<&str> = metas.iter().map(|m| m.game_id.as_str()).collect();
        assert_eq!(ids, vec!["2023010100", "2023_01_DET_KC"]);
    }
}
