use crate::play::Play;

use super::{Scratch, StatCalculator, StatContext, safe_div, seed_zeros};

const EXPLOSIVE_PASS_YARDS: f64 = 20.0;
const EXPLOSIVE_RUN_YARDS: f64 = 10.0;

const PASSING_FIELDS: &[&str] = &[
    "off_dropbacks",
    "off_air_yards",
    "off_air_yards_per_att",
    "off_yac",
    "off_yac_per_completion",
    "off_cpoe",
    "off_deep_pass_att",
    "off_deep_pass_rate",
    "off_explosive_passes",
    "off_explosive_pass_rate",
    "off_sack_rate",
    "off_scramble_rate",
];

const RUSHING_FIELDS: &[&str] = &[
    "off_explosive_runs",
    "off_explosive_run_rate",
    "off_stuffed_runs",
    "off_stuff_rate",
    "off_rush_first_down_rate",
];

#[derive(Debug, Default, Clone, Copy)]
struct PassingTally {
    dropbacks: f64,
    attempts: f64,
    completions: f64,
    air_yards: f64,
    yac: f64,
    cpoe_sum: f64,
    cpoe_n: f64,
    deep: f64,
    explosive: f64,
    sacks: f64,
    scrambles: f64,
}

#[derive(Default)]
pub struct PassingCalculator {
    scratch: Scratch<PassingTally>,
}

impl StatCalculator for PassingCalculator {
    fn name(&self) -> &str {
        "advanced_passing"
    }

    fn groups(&self) -> &[&'static str] {
        &["advanced_passing"]
    }

    fn init(&mut self, ctx: &mut StatContext) {
        seed_zeros(ctx, PASSING_FIELDS.iter().map(|f| f.to_string()));
    }

    fn accumulate(&mut self, play: &Play, ctx: &mut StatContext) {
        if !play.is_offense(ctx.team()) {
            return;
        }
        let tally = self.scratch.slot(ctx);
        if play.is_dropback() {
            tally.dropbacks += 1.0;
            if play.is_sack() {
                tally.sacks += 1.0;
            }
            if play.is_scramble() {
                tally.scrambles += 1.0;
            }
        }
        if !play.is_pass_attempt() {
            return;
        }
        tally.attempts += 1.0;
        if let Some(air) = play.air_yards {
            tally.air_yards += air;
        }
        if play.is_deep_pass() {
            tally.deep += 1.0;
        }
        if let Some(cpoe) = play.cpoe {
            tally.cpoe_sum += cpoe;
            tally.cpoe_n += 1.0;
        }
        if play.is_complete() {
            tally.completions += 1.0;
            tally.yac += play.yards_after_catch.unwrap_or(0.0);
            if play.yards() >= EXPLOSIVE_PASS_YARDS {
                tally.explosive += 1.0;
            }
        }
    }

    fn finalize(&mut self, ctx: &mut StatContext) {
        let t = self.scratch.take(ctx);
        ctx.set("off_dropbacks", t.dropbacks);
        ctx.set("off_air_yards", t.air_yards);
        ctx.set("off_air_yards_per_att", safe_div(t.air_yards, t.attempts));
        ctx.set("off_yac", t.yac);
        ctx.set("off_yac_per_completion", safe_div(t.yac, t.completions));
        ctx.set("off_cpoe", safe_div(t.cpoe_sum, t.cpoe_n));
        ctx.set("off_deep_pass_att", t.deep);
        ctx.set("off_deep_pass_rate", safe_div(t.deep, t.attempts));
        ctx.set("off_explosive_passes", t.explosive);
        ctx.set("off_explosive_pass_rate", safe_div(t.explosive, t.attempts));
        ctx.set("off_sack_rate", safe_div(t.sacks, t.dropbacks));
        ctx.set("off_scramble_rate", safe_div(t.scrambles, t.dropbacks));
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RushingTally {
    attempts: f64,
    explosive: f64,
    stuffed: f64,
    first_downs: f64,
}

#[derive(Default)]
pub struct RushingCalculator {
    scratch: Scratch<RushingTally>,
}

impl StatCalculator for RushingCalculator {
    fn name(&self) -> &str {
        "advanced_rushing"
    }

    fn groups(&self) -> &[&'static str] {
        &["advanced_rushing"]
    }

    fn init(&mut self, ctx: &mut StatContext) {
        seed_zeros(ctx, RUSHING_FIELDS.iter().map(|f| f.to_string()));
    }

    fn accumulate(&mut self, play: &Play, ctx: &mut StatContext) {
        if !play.is_offense(ctx.team()) || play.is_sack() || !play.is_rush_attempt() {
            return;
        }
        let Some(yards) = play.yards_gained else {
            return;
        };
        let tally = self.scratch.slot(ctx);
        tally.attempts += 1.0;
        if yards >= EXPLOSIVE_RUN_YARDS {
            tally.explosive += 1.0;
        }
        if yards <= 0.0 {
            tally.stuffed += 1.0;
        }
        if play.is_first_down_rush() {
            tally.first_downs += 1.0;
        }
    }

    fn finalize(&mut self, ctx: &mut StatContext) {
        let t = self.scratch.take(ctx);
        ctx.set("off_explosive_runs", t.explosive);
        ctx.set("off_explosive_run_rate", safe_div(t.explosive, t.attempts));
        ctx.set("off_stuffed_runs", t.stuffed);
        ctx.set("off_stuff_rate", safe_div(t.stuffed, t.attempts));
        ctx.set("off_rush_first_down_rate", safe_div(t.first_downs, t.attempts));
    }
}

#[cfg(test)]
mod tests {
    use super::{PassingCalculator, RushingCalculator};
    use crate::play::Play;
    use crate::stats::{StatCalculator, compute_team_stats_for_week};
    use std::collections::HashMap;

    fn play(kind: &str, yards: f64) -> Play {
        Play {
            game_id: Some("g1".into()),
            posteam: Some("MIA".into()),
            defteam: Some("NE".into()),
            play_type: Some(kind.into()),
            yards_gained: Some(yards),
            ..Play::default()
        }
    }

    #[test]
    fn passing_rates_use_attempts_and_dropbacks() {
        let mut deep = play("pass", 35.0);
        deep.complete_pass = Some(1.0);
        deep.air_yards = Some(30.0);
        deep.yards_after_catch = Some(5.0);
        deep.cpoe = Some(12.0);
        let mut short = play("pass", 0.0);
        short.air_yards = Some(4.0);
        short.cpoe = Some(-4.0);
        let mut sack = play("pass", -6.0);
        sack.sack = Some(1.0);

        let mut calcs: Vec<Box<dyn StatCalculator>> = vec![Box::new(PassingCalculator::default())];
        let rows =
            compute_team_stats_for_week(&[deep, short, sack], 2024, 1, &HashMap::new(), &mut calcs);
        let mia = &rows[0].stats;
        assert_eq!(mia["off_dropbacks"], 3.0);
        assert_eq!(mia["off_air_yards_per_att"], 17.0);
        assert_eq!(mia["off_deep_pass_rate"], 0.5);
        assert_eq!(mia["off_explosive_passes"], 1.0);
        assert_eq!(mia["off_cpoe"], 4.0);
        assert!((mia["off_sack_rate"] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(rows[1].stats["off_dropbacks"], 0.0);
    }

    #[test]
    fn rushing_thresholds_are_inclusive() {
        let runs = vec![play("run", 10.0), play("run", 0.0), play("run", 4.0), play("run", -2.0)];
        let mut calcs: Vec<Box<dyn StatCalculator>> = vec![Box::new(RushingCalculator::default())];
        let rows = compute_team_stats_for_week(&runs, 2024, 1, &HashMap::new(), &mut calcs);
        let mia = &rows[0].stats;
        assert_eq!(mia["off_explosive_runs"], 1.0);
        assert_eq!(mia["off_stuffed_runs"], 2.0);
        assert_eq!(mia["off_stuff_rate"], 0.5);
        assert_eq!(mia["off_rush_first_down_rate"], 0.0);
    }
}
