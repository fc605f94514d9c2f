use crate::play::Play;

use super::{Scratch, StatCalculator, StatContext, seed_zeros};

const FIELDS: &[&str] = &[
    "interceptions_thrown",
    "fumbles_lost",
    "turnovers_off",
    "interceptions_made",
    "fumbles_recovered",
    "takeaways",
    "turnover_margin",
    "penalties",
    "penalty_yards",
    "opp_penalties",
    "opp_penalty_yards",
];

#[derive(Debug, Default, Clone, Copy)]
struct TurnoverTally {
    interceptions_thrown: f64,
    fumbles_lost: f64,
    interceptions_made: f64,
    fumbles_recovered: f64,
    penalties: f64,
    penalty_yards: f64,
    opp_penalties: f64,
    opp_penalty_yards: f64,
}

#[derive(Default)]
pub struct TurnoverCalculator {
    scratch: Scratch<TurnoverTally>,
}

impl StatCalculator for TurnoverCalculator {
    fn name(&self) -> &str {
        "turnovers"
    }

    fn groups(&self) -> &[&'static str] {
        &["turnovers"]
    }

    fn init(&mut self, ctx: &mut StatContext) {
        seed_zeros(ctx, FIELDS.iter().map(|f| f.to_string()));
    }

    fn accumulate(&mut self, play: &Play, ctx: &mut StatContext) {
        let team = ctx.team().to_string();
        let on_offense = play.is_offense(&team);
        let on_defense = play.is_defense(&team);
        if !on_offense && !on_defense {
            return;
        }
        let tally = self.scratch.slot(ctx);

        if on_offense {
            if play.is_interception() {
                tally.interceptions_thrown += 1.0;
            }
            if play.is_fumble_lost() {
                tally.fumbles_lost += 1.0;
            }
        } else {
            if play.is_interception() {
                tally.interceptions_made += 1.0;
            }
            if play.is_fumble_lost() {
                tally.fumbles_recovered += 1.0;
            }
        }

        if play.is_penalty()
            && let Some(flagged) = play.penalty_team.as_deref()
        {
            let yards = play.penalty_yards.unwrap_or(0.0);
            if flagged == team {
                tally.penalties += 1.0;
                tally.penalty_yards += yards;
            } else {
                tally.opp_penalties += 1.0;
                tally.opp_penalty_yards += yards;
            }
        }
    }

    fn finalize(&mut self, ctx: &mut StatContext) {
        let t = self.scratch.take(ctx);
        let turnovers = t.interceptions_thrown + t.fumbles_lost;
        let takeaways = t.interceptions_made + t.fumbles_recovered;
        ctx.set("interceptions_thrown", t.interceptions_thrown);
        ctx.set("fumbles_lost", t.fumbles_lost);
        ctx.set("turnovers_off", turnovers);
        ctx.set("interceptions_made", t.interceptions_made);
        ctx.set("fumbles_recovered", t.fumbles_recovered);
        ctx.set("takeaways", takeaways);
        ctx.set("turnover_margin", takeaways - turnovers);
        ctx.set("penalties", t.penalties);
        ctx.set("penalty_yards", t.penalty_yards);
        ctx.set("opp_penalties", t.opp_penalties);
        ctx.set("opp_penalty_yards", t.opp_penalty_yards);
    }
}

#[cfg(test)]
mod tests {
    use super::TurnoverCalculator;
    use crate::play::Play;
    use crate::stats::{StatCalculator, compute_team_stats_for_week};
    use std::collections::HashMap;

    fn play(off: &str, def: &str) -> Play {
        Play {
            game_id: Some("g1".into()),
            posteam: Some(off.into()),
            defteam: Some(def.into()),
            play_type: Some("pass".into()),
            ..Play::default()
        }
    }

    #[test]
    fn margin_is_takeaways_minus_giveaways() {
        let mut pick = play("GB", "CHI");
        pick.interception = Some(1.0);
        let mut lost = play("GB", "CHI");
        lost.fumble = Some(1.0);
        lost.fumble_recovery_1_team = Some("CHI".into());
        let mut kept = play("GB", "CHI");
        kept.fumble = Some(1.0);
        let mut strip = play("CHI", "GB");
        strip.fumble = Some(1.0);
        strip.fumble_recovery_1_team = Some("GB".into());
        let mut flag = play("CHI", "GB");
        flag.penalty = Some(1.0);
        flag.penalty_team = Some("GB".into());
        flag.penalty_yards = Some(15.0);

        let mut calcs: Vec<Box<dyn StatCalculator>> = vec![Box::new(TurnoverCalculator::default())];
        let rows = compute_team_stats_for_week(
            &[pick, lost, kept, strip, flag],
            2024,
            1,
            &HashMap::new(),
            &mut calcs,
        );
        for row in &rows {
            assert_eq!(
                row.stats["turnover_margin"],
                row.stats["takeaways"] - row.stats["turnovers_off"]
            );
        }
        let gb = &rows[0].stats;
        assert_eq!(gb["turnovers_off"], 2.0);
        assert_eq!(gb["takeaways"], 1.0);
        assert_eq!(gb["turnover_margin"], -1.0);
        assert_eq!(gb["penalty_yards"], 15.0);
        let chi = &rows[1].stats;
        assert_eq!(chi["turnover_margin"], 1.0);
        assert_eq!(chi["opp_penalties"], 1.0);
    }
}
