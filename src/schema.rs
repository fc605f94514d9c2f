use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static BUILTIN_SCHEMA_JSON: &str = include_str!("../config/stat_schema.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatGroup {
    pub name: String,
    pub fields: Vec<String>,
    // Per-field scaffold values; absent fields scaffold to 0.
    #[serde(default)]
    pub defaults: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSchema {
    #[serde(default)]
    pub version: u32,
    pub groups: Vec<StatGroup>,
}

impl StatSchema {
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_SCHEMA_JSON).context("parse built-in stat schema")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read stat schema {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parse stat schema {}", path.display()))
    }

    /// Built-in schema unless an override path is configured.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let schema: StatSchema = serde_json::from_str(raw).context("invalid stat schema json")?;
        let mut seen = HashSet::new();
        for group in &schema.groups {
            if group.name.trim().is_empty() {
                return Err(anyhow!("stat schema group with empty name"));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(anyhow!("duplicate stat schema group {}", group.name));
            }
        }
        Ok(schema)
    }

    pub fn group(&self, name: &str) -> Option<&StatGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn allowed_keys(&self) -> HashSet<String> {
        self.groups
            .iter()
            .flat_map(|g| g.fields.iter().cloned())
            .collect()
    }

    /// Every declared field, in declaration order, without duplicates.
    pub fn fields(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.groups
            .iter()
            .flat_map(|g| g.fields.iter())
            .filter(|f| seen.insert(f.as_str()))
            .map(String::as_str)
            .collect()
    }
}

pub type FillFn = fn(&StatGroup, &str) -> f64;

pub fn zero_fill(_group: &StatGroup, _field: &str) -> f64 {
    0.0
}

pub fn declared_default_fill(group: &StatGroup, field: &str) -> f64 {
    group.defaults.get(field).copied().unwrap_or(0.0)
}

/// Group name → scaffold fill, with a fallback for groups nobody registered.
#[derive(Clone)]
pub struct ScaffoldRegistry {
    fills: HashMap<String, FillFn>,
    fallback: FillFn,
}

impl ScaffoldRegistry {
    pub fn new(fallback: FillFn) -> Self {
        Self {
            fills: HashMap::new(),
            fallback,
        }
    }

    pub fn register(&mut self, group: &str, fill: FillFn) {
        self.fills.insert(group.to_string(), fill);
    }

    pub fn fill_for(&self, group: &str) -> FillFn {
        self.fills.get(group).copied().unwrap_or(self.fallback)
    }

    pub fn is_registered(&self, group: &str) -> bool {
        self.fills.contains_key(group)
    }
}

static DEFAULT_SCAFFOLDS: Lazy<ScaffoldRegistry> = Lazy::new(|| {
    let mut registry = ScaffoldRegistry::new(declared_default_fill);
    // Counting groups never carry declared defaults.
    for group in [
        "offense_basic",
        "defense_basic",
        "turnovers",
        "results",
        "special_teams",
    ] {
        registry.register(group, zero_fill);
    }
    registry
});

pub fn default_scaffolds() -> &'static ScaffoldRegistry {
    &DEFAULT_SCAFFOLDS
}

#[cfg(test)]
mod tests {
    use super::{StatGroup, StatSchema, default_scaffolds};
    use std::collections::BTreeMap;

    #[test]
    fn builtin_schema_parses_and_has_unique_fields() {
        let schema = StatSchema::builtin().expect("built-in schema");
        assert!(schema.group("epa").is_some());
        assert!(schema.group("special_teams").is_some());
        let fields = schema.fields();
        assert_eq!(fields.len(), schema.allowed_keys().len());
        assert!(fields.contains(&"turnover_margin"));
    }

    #[test]
    fn duplicate_groups_are_rejected() {
        let raw = r#"{"groups":[{"name":"a","fields":[]},{"name":"a","fields":["x"]}]}"#;
        assert!(StatSchema::from_json(raw).is_err());
    }

    #[test]
    fn unknown_groups_fall_back_to_declared_defaults() {
        let group = StatGroup {
            name: "kicking_extras".to_string(),
            fields: vec!["long_fg".to_string(), "fg_pct".to_string()],
            defaults: BTreeMap::from([("fg_pct".to_string(), 0.5)]),
        };
        let registry = default_scaffolds();
        assert!(!registry.is_registered("kicking_extras"));
        let fill = registry.fill_for(&group.name);
        assert_eq!(fill(&group, "fg_pct"), 0.5);
        assert_eq!(fill(&group, "long_fg"), 0.0);
    }
}
