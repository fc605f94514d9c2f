use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::play::GameMeta;
use crate::stats::{DerivedRow, StatMap};

pub const LAST_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub week: u32,
    pub game_id: String,
    pub stats: StatMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendBlocks {
    pub season: StatMap,
    pub last5: StatMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    pub season: u32,
    pub week: u32,
    pub game_id: String,
    pub team: String,
    pub games_played: usize,
    pub trend: TrendBlocks,
}

/// Per-field mean over `entries`. Non-finite values are excluded field by
/// field, so one bad value does not blank the whole column.
pub fn average_stats<'a>(entries: impl IntoIterator<Item = &'a StatMap>) -> StatMap {
    let mut sums: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for stats in entries {
        for (key, value) in stats {
            if !value.is_finite() {
                continue;
            }
            let slot = sums.entry(key.as_str()).or_insert((0.0, 0.0));
            slot.0 += value;
            slot.1 += 1.0;
        }
    }
    sums.into_iter()
        .map(|(key, (sum, n))| (key.to_string(), sum / n))
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
struct OpponentStrength {
    off_epa: f64,
    def_epa: f64,
    win_pct: f64,
}

/// Season-to-date and last-N trend features, one week at a time.
///
/// Weeks must be fed in ascending order. A week's rows only enter history
/// after every trend row for that week has been produced, so no row ever sees
/// its own game or anything later.
#[derive(Debug, Default)]
pub struct TrendBuilder {
    season: u32,
    history: HashMap<String, Vec<HistoryEntry>>,
    games: HashMap<String, (String, String)>,
}

impl TrendBuilder {
    pub fn new(season: u32) -> Self {
        Self {
            season,
            ..Self::default()
        }
    }

    pub fn register_games<'a>(&mut self, metas: impl IntoIterator<Item = &'a GameMeta>) {
        for meta in metas {
            if meta.game_id.is_empty() {
                continue;
            }
            self.games.insert(
                meta.game_id.clone(),
                (meta.home_team.clone(), meta.away_team.clone()),
            );
        }
    }

    pub fn history(&self, team: &str) -> &[HistoryEntry] {
        self.history.get(team).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn process_week(&mut self, week: u32, rows: &[DerivedRow]) -> Vec<TrendRow> {
        let trends: Vec<TrendRow> = rows.iter().map(|row| self.trend_for(week, row)).collect();
        for row in rows {
            self.history
                .entry(row.team.clone())
                .or_default()
                .push(HistoryEntry {
                    week,
                    game_id: row.game_id.clone(),
                    stats: row.stats.clone(),
                });
        }
        trends
    }

    fn prior(&self, team: &str, week: u32) -> Vec<&HistoryEntry> {
        self.history(team).iter().filter(|e| e.week < week).collect()
    }

    fn trend_for(&self, week: u32, row: &DerivedRow) -> TrendRow {
        let prior = self.prior(&row.team, week);
        let recent = &prior[prior.len().saturating_sub(LAST_N)..];

        let mut season = average_stats(prior.iter().map(|e| &e.stats));
        let mut last5 = average_stats(recent.iter().map(|e| &e.stats));
        if let Some(strength) = self.opponent_strength(&row.team, &prior) {
            overlay(&mut season, strength);
        }
        if let Some(strength) = self.opponent_strength(&row.team, recent) {
            overlay(&mut last5, strength);
        }

        TrendRow {
            season: self.season,
            week,
            game_id: row.game_id.clone(),
            team: row.team.clone(),
            games_played: prior.len(),
            trend: TrendBlocks { season, last5 },
        }
    }

    fn opponent_of(&self, game_id: &str, team: &str) -> Option<&str> {
        let (home, away) = self.games.get(game_id)?;
        if home == team {
            Some(away)
        } else if away == team {
            Some(home)
        } else {
            None
        }
    }

    /// Average strength of the opponents behind `games`, each measured only on
    /// what that opponent had played before meeting `team`.
    fn opponent_strength(&self, team: &str, games: &[&HistoryEntry]) -> Option<OpponentStrength> {
        let mut total = OpponentStrength::default();
        let mut n = 0.0;
        for game in games {
            let Some(opponent) = self.opponent_of(&game.game_id, team) else {
                continue;
            };
            let before = self.prior(opponent, game.week);
            if before.is_empty() {
                continue;
            }
            let avg = average_stats(before.iter().map(|e| &e.stats));
            let get = |k: &str| avg.get(k).copied().unwrap_or(0.0);
            total.off_epa += get("off_epa_per_play");
            total.def_epa += get("def_epa_per_play");
            total.win_pct += get("win");
            n += 1.0;
        }
        if n == 0.0 {
            return None;
        }
        Some(OpponentStrength {
            off_epa: total.off_epa / n,
            def_epa: total.def_epa / n,
            win_pct: total.win_pct / n,
        })
    }
}

fn overlay(block: &mut StatMap, strength: OpponentStrength) {
    let off = block.get("off_epa_per_play").copied().unwrap_or(0.0);
    let def = block.get("def_epa_per_play").copied().unwrap_or(0.0);
    block.insert("opp_avg_off_epa_per_play".into(), strength.off_epa);
    block.insert("opp_avg_def_epa_per_play".into(), strength.def_epa);
    block.insert("sos_epa".into(), strength.off_epa - strength.def_epa);
    block.insert("sos_win_pct".into(), strength.win_pct);
    block.insert("adj_off_epa_per_play".into(), off - strength.def_epa);
    block.insert("adj_def_epa_per_play".into(), def - strength.off_epa);
}

/// Runs a whole season's weeks through a fresh builder. `weeks` must already
/// be in chronological order.
pub fn build_trends(
    season: u32,
    weeks: &[(u32, Vec<DerivedRow>)],
    metas: &[GameMeta],
) -> Vec<(u32, Vec<TrendRow>)> {
    let mut builder = TrendBuilder::new(season);
    builder.register_games(metas);
    weeks
        .iter()
        .map(|(week, rows)| (*week, builder.process_week(*week, rows)))
        .collect()
}
