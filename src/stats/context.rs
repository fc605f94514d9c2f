use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::play::GameMeta;

/// Keys with this prefix are scratch values: always writable, never emitted.
pub const PRIVATE_PREFIX: &str = "__";

pub type StatMap = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamGame {
    pub game_id: String,
    pub team: String,
}

impl TeamGame {
    pub fn new(game_id: &str, team: &str) -> Self {
        Self {
            game_id: game_id.to_string(),
            team: team.to_string(),
        }
    }
}

pub fn is_private_key(key: &str) -> bool {
    key.starts_with(PRIVATE_PREFIX)
}

#[derive(Debug, Clone)]
pub struct StatContext {
    pub season: u32,
    pub week: u32,
    pub key: TeamGame,
    pub opponent: Option<String>,
    pub meta: Option<GameMeta>,
    stats: StatMap,
    allowed: Option<Arc<HashSet<String>>>,
}

impl StatContext {
    pub fn new(
        season: u32,
        week: u32,
        key: TeamGame,
        meta: Option<GameMeta>,
        allowed: Option<Arc<HashSet<String>>>,
    ) -> Self {
        let opponent = meta
            .as_ref()
            .and_then(|m| m.opponent_of(&key.team))
            .map(str::to_string);
        Self {
            season,
            week,
            key,
            opponent,
            meta,
            stats: StatMap::new(),
            allowed,
        }
    }

    pub fn game_id(&self) -> &str {
        &self.key.game_id
    }

    pub fn team(&self) -> &str {
        &self.key.team
    }

    pub fn is_writable(&self, key: &str) -> bool {
        if is_private_key(key) {
            return true;
        }
        match &self.allowed {
            Some(allowed) => allowed.contains(key),
            None => true,
        }
    }

    /// Returns false when the allow-list dropped the write.
    pub fn set(&mut self, key: &str, value: f64) -> bool {
        if !self.is_writable(key) {
            return false;
        }
        let value = if value.is_finite() { value } else { 0.0 };
        self.stats.insert(key.to_string(), value);
        true
    }

    pub fn add(&mut self, key: &str, delta: f64) -> bool {
        let current = self.get(key);
        self.set(key, current + delta)
    }

    /// Missing keys read as 0 so calculators tolerate any list order.
    pub fn get(&self, key: &str) -> f64 {
        self.stats.get(key).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.stats.contains_key(key)
    }

    pub fn public_stats(&self) -> StatMap {
        self.stats
            .iter()
            .filter(|(k, _)| !is_private_key(k))
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn into_public_stats(self) -> StatMap {
        self.stats
            .into_iter()
            .filter(|(k, _)| !is_private_key(k))
            .collect()
    }
}
