use crate::play::Play;

use super::{Scratch, Side, StatCalculator, StatContext, safe_div, seed_zeros, side_keys};

const FIELDS: &[&str] = &[
    "epa_plays",
    "epa_total",
    "epa_per_play",
    "rush_epa_per_play",
    "pass_epa_per_play",
    "success_rate",
    "rush_success_rate",
    "pass_success_rate",
];

#[derive(Debug, Default, Clone, Copy)]
struct Split {
    plays: f64,
    epa: f64,
    successes: f64,
}

impl Split {
    fn record(&mut self, epa: f64, success: bool) {
        self.plays += 1.0;
        self.epa += epa;
        if success {
            self.successes += 1.0;
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct EpaSide {
    all: Split,
    rush: Split,
    pass: Split,
}

#[derive(Debug, Default, Clone, Copy)]
struct EpaTally {
    offense: EpaSide,
    defense: EpaSide,
}

/// EPA and success rate for both roles. Plays without a finite EPA value are
/// left out of every denominator.
#[derive(Default)]
pub struct EpaCalculator {
    scratch: Scratch<EpaTally>,
}

impl StatCalculator for EpaCalculator {
    fn name(&self) -> &str {
        "epa"
    }

    fn groups(&self) -> &[&'static str] {
        &["epa"]
    }

    fn init(&mut self, ctx: &mut StatContext) {
        seed_zeros(ctx, side_keys(Side::Offense, FIELDS));
        seed_zeros(ctx, side_keys(Side::Defense, FIELDS));
    }

    fn accumulate(&mut self, play: &Play, ctx: &mut StatContext) {
        let Some(side) = Side::of(play, ctx.team()) else {
            return;
        };
        let Some(epa) = play.epa else {
            return;
        };
        if !play.is_scrimmage() {
            return;
        }
        let tally = self.scratch.slot(ctx);
        let bucket = match side {
            Side::Offense => &mut tally.offense,
            Side::Defense => &mut tally.defense,
        };
        let success = play.is_success();
        bucket.all.record(epa, success);
        if play.is_pass() {
            bucket.pass.record(epa, success);
        } else if play.is_rush() {
            bucket.rush.record(epa, success);
        }
    }

    fn finalize(&mut self, ctx: &mut StatContext) {
        let t = self.scratch.take(ctx);
        for (side, s) in [(Side::Offense, t.offense), (Side::Defense, t.defense)] {
            let values = [
                ("epa_plays", s.all.plays),
                ("epa_total", s.all.epa),
                ("epa_per_play", safe_div(s.all.epa, s.all.plays)),
                ("rush_epa_per_play", safe_div(s.rush.epa, s.rush.plays)),
                ("pass_epa_per_play", safe_div(s.pass.epa, s.pass.plays)),
                ("success_rate", safe_div(s.all.successes, s.all.plays)),
                ("rush_success_rate", safe_div(s.rush.successes, s.rush.plays)),
                ("pass_success_rate", safe_div(s.pass.successes, s.pass.plays)),
            ];
            for (suffix, value) in values {
                ctx.set(&side.key(suffix), value);
            }
        }
    }
}
