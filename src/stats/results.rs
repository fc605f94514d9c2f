use super::{StatCalculator, StatContext};

const ONE_SCORE_MARGIN: f64 = 8.0;

const FIELDS: &[&str] = &[
    "points_for",
    "points_against",
    "margin",
    "win",
    "loss",
    "tie",
    "one_score_game",
    "one_score_win",
    "one_score_win_rate",
];

/// Final-score attribution. Reads only game metadata; games without a
/// recorded score keep every field at 0.
pub struct ResultsCalculator;

impl StatCalculator for ResultsCalculator {
    fn name(&self) -> &str {
        "results"
    }

    fn groups(&self) -> &[&'static str] {
        &["results"]
    }

    fn init(&mut self, ctx: &mut StatContext) {
        for field in FIELDS {
            ctx.set(field, 0.0);
        }
    }

    fn finalize(&mut self, ctx: &mut StatContext) {
        let Some((points_for, points_against)) = ctx
            .meta
            .as_ref()
            .and_then(|meta| meta.points_for(ctx.team()))
        else {
            return;
        };
        let margin = points_for - points_against;
        let one_score = margin.abs() <= ONE_SCORE_MARGIN;
        let one_score_win = one_score && margin > 0.0;
        let flag = |b: bool| if b { 1.0 } else { 0.0 };

        ctx.set("points_for", points_for);
        ctx.set("points_against", points_against);
        ctx.set("margin", margin);
        ctx.set("win", flag(margin > 0.0));
        ctx.set("loss", flag(margin < 0.0));
        ctx.set("tie", flag(margin == 0.0));
        ctx.set("one_score_game", flag(one_score));
        ctx.set("one_score_win", flag(one_score_win));
        ctx.set("one_score_win_rate", flag(one_score_win));
    }
}
