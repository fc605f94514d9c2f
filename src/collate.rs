use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::play::GameMeta;
use crate::stats::{DerivedRow, StatMap};
use crate::storage::write_text_atomic;
use crate::trends::{TrendBlocks, TrendRow};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupMeta {
    pub game_id: String,
    pub season: Option<u32>,
    pub week: Option<u32>,
    pub game_type: Option<String>,
    pub gameday: Option<String>,
    pub weekday: Option<String>,
    pub gametime: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub location: Option<String>,
    pub stadium: Option<String>,
    pub roof: Option<String>,
    pub surface: Option<String>,
    pub temp: Option<f64>,
    pub wind: Option<f64>,
    pub div_game: Option<f64>,
    pub home_rest: Option<f64>,
    pub away_rest: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Betting {
    pub spread_line: Option<f64>,
    pub total_line: Option<f64>,
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
    pub home_spread_odds: Option<f64>,
    pub away_spread_odds: Option<f64>,
    pub over_odds: Option<f64>,
    pub under_odds: Option<f64>,
    pub favorite: String,
    pub underdog: String,
    pub favorite_is_home: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupResults {
    pub home_score: Option<f64>,
    pub away_score: Option<f64>,
    pub result: Option<f64>,
    pub total: Option<f64>,
    pub overtime: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sides<T> {
    pub favorite: T,
    pub underdog: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupRow {
    pub meta: MatchupMeta,
    pub betting: Betting,
    pub results: MatchupResults,
    #[serde(rename = "teamStats")]
    pub team_stats: Sides<StatMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trends: Option<Sides<TrendBlocks>>,
}

/// (favorite, underdog, favorite is home). A positive spread favours the
/// home team; zero or no spread also defaults to the home team.
pub fn resolve_favorite(meta: &GameMeta) -> (String, String, bool) {
    let home = meta.home_team.clone();
    let away = meta.away_team.clone();
    match meta.spread_line {
        Some(spread) if spread < 0.0 => (away, home, false),
        _ => (home, away, true),
    }
}

fn by_role<T>(favorite_is_home: bool, home: T, away: T) -> (T, T) {
    if favorite_is_home { (home, away) } else { (away, home) }
}

pub fn build_matchup(
    meta: &GameMeta,
    home: &DerivedRow,
    away: &DerivedRow,
    trends: Option<(&TrendRow, &TrendRow)>,
) -> MatchupRow {
    let (favorite, underdog, favorite_is_home) = resolve_favorite(meta);

    let (fav_stats, dog_stats) = by_role(favorite_is_home, &home.stats, &away.stats);
    let trends = trends.map(|(h, a)| {
        let (fav, dog) = by_role(favorite_is_home, &h.trend, &a.trend);
        Sides {
            favorite: fav.clone(),
            underdog: dog.clone(),
        }
    });

    MatchupRow {
        meta: MatchupMeta {
            game_id: meta.game_id.clone(),
            season: meta.season,
            week: meta.week,
            game_type: meta.game_type.clone(),
            gameday: meta.gameday.clone(),
            weekday: meta.weekday.clone(),
            gametime: meta.gametime.clone(),
            home_team: meta.home_team.clone(),
            away_team: meta.away_team.clone(),
            location: meta.location.clone(),
            stadium: meta.stadium.clone(),
            roof: meta.roof.clone(),
            surface: meta.surface.clone(),
            temp: meta.temp,
            wind: meta.wind,
            div_game: meta.div_game,
            home_rest: meta.home_rest,
            away_rest: meta.away_rest,
        },
        betting: Betting {
            spread_line: meta.spread_line,
            total_line: meta.total_line,
            home_moneyline: meta.home_moneyline,
            away_moneyline: meta.away_moneyline,
            home_spread_odds: meta.home_spread_odds,
            away_spread_odds: meta.away_spread_odds,
            over_odds: meta.over_odds,
            under_odds: meta.under_odds,
            favorite,
            underdog,
            favorite_is_home,
        },
        results: MatchupResults {
            home_score: meta.home_points(),
            away_score: meta.away_points(),
            result: meta.home_margin(),
            total: meta
                .results
                .total
                .or_else(|| Some(meta.home_points()? + meta.away_points()?)),
            overtime: meta.results.overtime,
        },
        team_stats: Sides {
            favorite: fav_stats.clone(),
            underdog: dog_stats.clone(),
        },
        trends,
    }
}

/// Joins one week's games to their two derived rows and, when present, their
/// trend rows. Games missing either team's derived row are skipped.
pub fn collate_week(
    metas: &[GameMeta],
    derived: &[DerivedRow],
    trends: &[TrendRow],
) -> Vec<MatchupRow> {
    let derived_by_key: HashMap<(&str, &str), &DerivedRow> = derived
        .iter()
        .map(|r| ((r.game_id.as_str(), r.team.as_str()), r))
        .collect();
    let trend_by_key: HashMap<(&str, &str), &TrendRow> = trends
        .iter()
        .map(|r| ((r.game_id.as_str(), r.team.as_str()), r))
        .collect();

    let mut rows = Vec::with_capacity(metas.len());
    for meta in metas {
        let id = meta.game_id.as_str();
        let home_key = (id, meta.home_team.as_str());
        let away_key = (id, meta.away_team.as_str());
        let (Some(home), Some(away)) = (derived_by_key.get(&home_key), derived_by_key.get(&away_key))
        else {
            warn!(
                "game {id}: missing derived stats for {} or {}; skipped",
                meta.home_team, meta.away_team
            );
            continue;
        };
        let trend_pair = match (trend_by_key.get(&home_key), trend_by_key.get(&away_key)) {
            (Some(h), Some(a)) => Some((*h, *a)),
            _ => None,
        };
        rows.push(build_matchup(meta, home, away, trend_pair));
    }
    rows
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}_{key}")
                };
                flatten_into(&name, child, out);
            }
        }
        Value::Null => {
            out.insert(prefix.to_string(), String::new());
        }
        Value::Bool(b) => {
            out.insert(prefix.to_string(), if *b { "1" } else { "0" }.to_string());
        }
        Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(&format!("{prefix}_{i}"), child, out);
            }
        }
    }
}

/// Nested matchup → `_`-joined flat columns.
pub fn flatten_row(row: &MatchupRow) -> Result<BTreeMap<String, String>> {
    let value = serde_json::to_value(row).context("serialize matchup row")?;
    let mut out = BTreeMap::new();
    flatten_into("", &value, &mut out);
    Ok(out)
}

pub fn column_order<'a>(columns: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut all: Vec<String> = columns.into_iter().cloned().collect();
    all.sort();
    all.dedup();
    let (results, rest): (Vec<String>, Vec<String>) =
        all.into_iter().partition(|c| c.starts_with("results_"));
    rest.into_iter().chain(results).collect()
}

/// Header plus rows over the union of every row's columns; absent cells are
/// empty.
pub fn to_table(rows: &[MatchupRow]) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let flat: Vec<BTreeMap<String, String>> =
        rows.iter().map(flatten_row).collect::<Result<_>>()?;
    let header = column_order(flat.iter().flat_map(|r| r.keys()));
    let body: Vec<Vec<String>> = flat
        .iter()
        .map(|r| {
            header
                .iter()
                .map(|c| r.get(c).cloned().unwrap_or_default())
                .collect()
        })
        .collect();
    Ok((header, body))
}

pub fn write_csv(path: &Path, rows: &[MatchupRow]) -> Result<()> {
    let (header, body) = to_table(rows)?;
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&header)
        .with_context(|| format!("encode header for {}", path.display()))?;
    for record in &body {
        writer
            .write_record(record)
            .with_context(|| format!("encode row for {}", path.display()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("finish csv for {}: {e}", path.display()))?;
    let text = String::from_utf8(bytes).context("collated csv is not utf-8")?;
    write_text_atomic(path, &text)
}
