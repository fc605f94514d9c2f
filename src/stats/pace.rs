use crate::play::Play;

use super::{Scratch, StatCalculator, StatContext, safe_div, seed_zeros};

const FIELDS: &[&str] = &[
    "off_seconds_per_play",
    "off_no_huddle_rate",
    "off_shotgun_rate",
    "off_pass_rate",
    "off_early_down_pass_rate",
    "off_pass_oe",
];

#[derive(Debug, Default, Clone, Copy)]
struct PaceTally {
    plays: f64,
    no_huddle: f64,
    shotgun: f64,
    passes: f64,
    early_downs: f64,
    early_down_passes: f64,
    pass_oe_sum: f64,
    pass_oe_n: f64,
    elapsed: f64,
    intervals: f64,
    // (drive id, game clock) of the previous offensive snap.
    last_snap: Option<(i64, f64)>,
}

/// Offensive tempo and play-calling tendencies.
#[derive(Default)]
pub struct PaceCalculator {
    scratch: Scratch<PaceTally>,
}

impl StatCalculator for PaceCalculator {
    fn name(&self) -> &str {
        "pace"
    }

    fn groups(&self) -> &[&'static str] {
        &["pace"]
    }

    fn init(&mut self, ctx: &mut StatContext) {
        seed_zeros(ctx, FIELDS.iter().map(|f| f.to_string()));
    }

    fn accumulate(&mut self, play: &Play, ctx: &mut StatContext) {
        if !play.is_offense(ctx.team()) || !play.is_scrimmage() {
            return;
        }
        let tally = self.scratch.slot(ctx);
        tally.plays += 1.0;
        if play.is_no_huddle() {
            tally.no_huddle += 1.0;
        }
        if play.is_shotgun() {
            tally.shotgun += 1.0;
        }
        let passing = play.is_dropback();
        if passing {
            tally.passes += 1.0;
        }
        if matches!(play.down(), Some(1 | 2)) {
            tally.early_downs += 1.0;
            if passing {
                tally.early_down_passes += 1.0;
            }
        }
        if let Some(oe) = play.pass_oe {
            tally.pass_oe_sum += oe;
            tally.pass_oe_n += 1.0;
        }

        if let (Some(drive), Some(clock)) = (play.drive_id(), play.game_seconds_remaining) {
            if let Some((last_drive, last_clock)) = tally.last_snap
                && last_drive == drive
                && last_clock > clock
            {
                tally.elapsed += last_clock - clock;
                tally.intervals += 1.0;
            }
            tally.last_snap = Some((drive, clock));
        }
    }

    fn finalize(&mut self, ctx: &mut StatContext) {
        let t = self.scratch.take(ctx);
        ctx.set("off_seconds_per_play", safe_div(t.elapsed, t.intervals));
        ctx.set("off_no_huddle_rate", safe_div(t.no_huddle, t.plays));
        ctx.set("off_shotgun_rate", safe_div(t.shotgun, t.plays));
        ctx.set("off_pass_rate", safe_div(t.passes, t.plays));
        ctx.set(
            "off_early_down_pass_rate",
            safe_div(t.early_down_passes, t.early_downs),
        );
        ctx.set("off_pass_oe", safe_div(t.pass_oe_sum, t.pass_oe_n));
    }
}
