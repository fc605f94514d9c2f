use crate::play::Play;

use super::{Scratch, Side, StatCalculator, StatContext, safe_div, seed_zeros, side_keys};

const TWO_MINUTE_SECONDS: f64 = 120.0;
const CLOSE_GAME_POINTS: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leverage {
    LateDown,
    TwoMinute,
    CloseGame,
}

impl Leverage {
    const ALL: [Leverage; 3] = [Leverage::LateDown, Leverage::TwoMinute, Leverage::CloseGame];

    fn label(self) -> &'static str {
        match self {
            Leverage::LateDown => "late_down",
            Leverage::TwoMinute => "two_minute",
            Leverage::CloseGame => "close_game",
        }
    }

    fn applies(self, play: &Play) -> bool {
        match self {
            Leverage::LateDown => matches!(play.down(), Some(3 | 4)),
            Leverage::TwoMinute => play
                .half_seconds_remaining
                .is_some_and(|s| s <= TWO_MINUTE_SECONDS),
            Leverage::CloseGame => play
                .score_differential()
                .is_some_and(|d| d.abs() <= CLOSE_GAME_POINTS),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    plays: f64,
    epa: f64,
}

// Indexed by [side][leverage].
#[derive(Debug, Default, Clone, Copy)]
struct SituationalTally {
    buckets: [[Bucket; 3]; 2],
}

/// High-leverage EPA splits: late downs, the last two minutes of a half and
/// one-score game states.
#[derive(Default)]
pub struct SituationalCalculator {
    scratch: Scratch<SituationalTally>,
}

fn side_index(side: Side) -> usize {
    match side {
        Side::Offense => 0,
        Side::Defense => 1,
    }
}

impl StatCalculator for SituationalCalculator {
    fn name(&self) -> &str {
        "situational"
    }

    fn groups(&self) -> &[&'static str] {
        &["situational"]
    }

    fn init(&mut self, ctx: &mut StatContext) {
        for side in [Side::Offense, Side::Defense] {
            for lev in Leverage::ALL {
                let label = lev.label();
                let plays = format!("{label}_plays");
                let rate = format!("{label}_epa_per_play");
                seed_zeros(ctx, side_keys(side, &[plays.as_str(), rate.as_str()]));
            }
        }
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
        for (i, lev) in Leverage::ALL.into_iter().enumerate() {
            if lev.applies(play) {
                let bucket = &mut tally.buckets[side_index(side)][i];
                bucket.plays += 1.0;
                bucket.epa += epa;
            }
        }
    }

    fn finalize(&mut self, ctx: &mut StatContext) {
        let t = self.scratch.take(ctx);
        for side in [Side::Offense, Side::Defense] {
            for (i, lev) in Leverage::ALL.into_iter().enumerate() {
                let bucket = t.buckets[side_index(side)][i];
                let label = lev.label();
                ctx.set(&side.key(&format!("{label}_plays")), bucket.plays);
                ctx.set(
                    &side.key(&format!("{label}_epa_per_play")),
                    safe_div(bucket.epa, bucket.plays),
                );
            }
        }
    }
}
