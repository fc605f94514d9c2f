//! Per-(game, team) stat derivation from a week of plays.
//!
//! Calculators implement [`StatCalculator`]; the engine owns their order.
//! `init` runs the first time a (game, team) pair is seen, `accumulate` runs
//! for every play on both the offense's and the defense's context, and
//! `finalize` runs once per context after the last play.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::play::{GameMeta, Play};
use crate::schema::{StatSchema, default_scaffolds};

pub mod advanced;
pub mod basic;
pub mod context;
pub mod efficiency;
pub mod epa;
pub mod pace;
pub mod results;
pub mod scaffold;
pub mod schedule;
pub mod situational;
pub mod turnovers;

pub use context::{PRIVATE_PREFIX, StatContext, StatMap, TeamGame};

pub trait StatCalculator: Send {
    fn name(&self) -> &str;

    /// Schema groups whose fields this calculator writes.
    fn groups(&self) -> &[&'static str] {
        &[]
    }

    fn init(&mut self, _ctx: &mut StatContext) {}

    fn accumulate(&mut self, _play: &Play, _ctx: &mut StatContext) {}

    fn finalize(&mut self, _ctx: &mut StatContext) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRow {
    pub season: u32,
    pub week: u32,
    pub game_id: String,
    pub team: String,
    #[serde(default)]
    pub opponent: Option<String>,
    pub stats: StatMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Offense,
    Defense,
}

impl Side {
    pub fn prefix(self) -> &'static str {
        match self {
            Side::Offense => "off",
            Side::Defense => "def",
        }
    }

    pub fn key(self, suffix: &str) -> String {
        format!("{}_{}", self.prefix(), suffix)
    }

    /// Does `team` play this side of `play`?
    pub fn involves(self, play: &Play, team: &str) -> bool {
        match self {
            Side::Offense => play.is_offense(team),
            Side::Defense => play.is_defense(team),
        }
    }

    /// The side `team` plays on `play`, if any.
    pub fn of(play: &Play, team: &str) -> Option<Side> {
        if play.is_offense(team) {
            Some(Side::Offense)
        } else if play.is_defense(team) {
            Some(Side::Defense)
        } else {
            None
        }
    }
}

/// Typed running state for one calculator, one slot per (game, team).
#[derive(Debug)]
pub struct Scratch<T> {
    slots: HashMap<TeamGame, T>,
}

impl<T> Default for Scratch<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<T: Default> Scratch<T> {
    pub fn slot(&mut self, ctx: &StatContext) -> &mut T {
        self.slots.entry(ctx.key.clone()).or_default()
    }

    pub fn take(&mut self, ctx: &StatContext) -> T {
        self.slots.remove(&ctx.key).unwrap_or_default()
    }
}

pub fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 || !den.is_finite() || !num.is_finite() {
        return 0.0;
    }
    num / den
}

pub(crate) fn seed_zeros(ctx: &mut StatContext, keys: impl IntoIterator<Item = String>) {
    for key in keys {
        ctx.set(&key, 0.0);
    }
}

pub(crate) fn side_keys(side: Side, suffixes: &[&str]) -> Vec<String> {
    suffixes.iter().map(|s| side.key(s)).collect()
}

/// Core calculators in evaluation order. Schedule adjustment reads EPA per
/// play, so it stays after the EPA calculator.
pub fn core_calculators() -> Vec<Box<dyn StatCalculator>> {
    vec![
        Box::new(basic::BasicCalculator::new(Side::Offense)),
        Box::new(efficiency::EfficiencyCalculator::new(Side::Offense)),
        Box::new(basic::BasicCalculator::new(Side::Defense)),
        Box::new(efficiency::EfficiencyCalculator::new(Side::Defense)),
        Box::new(epa::EpaCalculator::default()),
        Box::new(turnovers::TurnoverCalculator::default()),
        Box::new(advanced::PassingCalculator::default()),
        Box::new(advanced::RushingCalculator::default()),
        Box::new(situational::SituationalCalculator::default()),
        Box::new(pace::PaceCalculator::default()),
        Box::new(schedule::ScheduleAdjustmentCalculator),
        Box::new(results::ResultsCalculator),
    ]
}

/// Core list plus one scaffold per schema group the core list leaves uncovered.
pub fn default_calculators(schema: &StatSchema) -> Vec<Box<dyn StatCalculator>> {
    let mut calculators = core_calculators();
    let covered: HashSet<&str> = calculators
        .iter()
        .flat_map(|c| c.groups().iter().copied())
        .collect();
    let registry = default_scaffolds();
    let scaffolds: Vec<Box<dyn StatCalculator>> = schema
        .groups
        .iter()
        .filter(|g| !covered.contains(g.name.as_str()))
        .map(|g| {
            Box::new(scaffold::ScaffoldCalculator::new(
                g.clone(),
                registry.fill_for(&g.name),
            )) as Box<dyn StatCalculator>
        })
        .collect();
    calculators.extend(scaffolds);
    calculators
}

pub struct StatEngine {
    calculators: Vec<Box<dyn StatCalculator>>,
    allowed: Option<Arc<HashSet<String>>>,
}

impl StatEngine {
    pub fn new(calculators: Vec<Box<dyn StatCalculator>>) -> Self {
        Self {
            calculators,
            allowed: None,
        }
    }

    /// Default calculator list with the schema's fields as the allow-list.
    pub fn from_schema(schema: &StatSchema) -> Self {
        Self {
            calculators: default_calculators(schema),
            allowed: Some(Arc::new(schema.allowed_keys())),
        }
    }

    pub fn calculator_names(&self) -> Vec<&str> {
        self.calculators.iter().map(|c| c.name()).collect()
    }

    pub fn compute_week(
        &mut self,
        plays: &[Play],
        season: u32,
        week: u32,
        meta: &HashMap<String, GameMeta>,
    ) -> Vec<DerivedRow> {
        run_week(
            &mut self.calculators,
            self.allowed.clone(),
            plays,
            season,
            week,
            meta,
        )
    }
}

pub fn compute_team_stats_for_week(
    plays: &[Play],
    season: u32,
    week: u32,
    meta: &HashMap<String, GameMeta>,
    calculators: &mut [Box<dyn StatCalculator>],
) -> Vec<DerivedRow> {
    run_week(calculators, None, plays, season, week, meta)
}

fn run_week(
    calculators: &mut [Box<dyn StatCalculator>],
    allowed: Option<Arc<HashSet<String>>>,
    plays: &[Play],
    season: u32,
    week: u32,
    meta: &HashMap<String, GameMeta>,
) -> Vec<DerivedRow> {
    let mut contexts: Vec<StatContext> = Vec::new();
    let mut index: HashMap<TeamGame, usize> = HashMap::new();

    for play in plays {
        let Some(game_id) = play.game_id.as_deref() else {
            continue;
        };
        let mut targets = [None, None];
        for (slot, (team, other)) in [
            (play.posteam.as_deref(), play.defteam.as_deref()),
            (play.defteam.as_deref(), play.posteam.as_deref()),
        ]
        .into_iter()
        .enumerate()
        {
            let Some(team) = team else {
                continue;
            };
            if slot == 1 && play.posteam.as_deref() == Some(team) {
                continue;
            }
            let key = TeamGame::new(game_id, team);
            let idx = match index.get(&key) {
                Some(idx) => *idx,
                None => {
                    let mut ctx = StatContext::new(
                        season,
                        week,
                        key.clone(),
                        meta.get(game_id).cloned(),
                        allowed.clone(),
                    );
                    if ctx.opponent.is_none() {
                        ctx.opponent = other.map(str::to_string);
                    }
                    for calc in calculators.iter_mut() {
                        calc.init(&mut ctx);
                    }
                    contexts.push(ctx);
                    index.insert(key, contexts.len() - 1);
                    contexts.len() - 1
                }
            };
            targets[slot] = Some(idx);
        }

        for idx in targets.into_iter().flatten() {
            let ctx = &mut contexts[idx];
            for calc in calculators.iter_mut() {
                calc.accumulate(play, ctx);
            }
        }
    }

    for ctx in &mut contexts {
        for calc in calculators.iter_mut() {
            calc.finalize(ctx);
        }
    }

    contexts
        .into_iter()
        .map(|ctx| DerivedRow {
            season,
            week,
            game_id: ctx.key.game_id.clone(),
            team: ctx.key.team.clone(),
            opponent: ctx.opponent.clone(),
            stats: ctx.into_public_stats(),
        })
        .collect()
}
