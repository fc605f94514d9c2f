use super::{StatCalculator, StatContext};

/// Opponent-strength adjustment at the single-game level.
///
/// A per-game context carries no season-wide view of the opponent, so the
/// adjusted values equal the raw EPA per play and the opponent averages stay
/// at 0. Trend rows apply the real opponent adjustment from prior weeks.
pub struct ScheduleAdjustmentCalculator;

impl StatCalculator for ScheduleAdjustmentCalculator {
    fn name(&self) -> &str {
        "schedule_adjustment"
    }

    fn groups(&self) -> &[&'static str] {
        &["schedule_adjustment"]
    }

    fn finalize(&mut self, ctx: &mut StatContext) {
        let off = ctx.get("off_epa_per_play");
        let def = ctx.get("def_epa_per_play");
        ctx.set("opp_avg_off_epa_per_play", 0.0);
        ctx.set("opp_avg_def_epa_per_play", 0.0);
        ctx.set("adj_off_epa_per_play", off);
        ctx.set("adj_def_epa_per_play", def);
    }
}
