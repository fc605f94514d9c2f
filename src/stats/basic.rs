use crate::play::Play;

use super::{Scratch, Side, StatCalculator, StatContext, safe_div, seed_zeros, side_keys};

const FIELDS: &[&str] = &[
    "plays",
    "yards",
    "yards_per_play",
    "rush_att",
    "rush_yards",
    "rush_ypc",
    "pass_att",
    "completions",
    "pass_yards",
    "comp_pct",
    "sacks",
    "sack_yards",
    "first_downs",
    "first_downs_rush",
    "first_downs_pass",
    "first_downs_penalty",
    "touchdowns",
    "pass_td",
    "rush_td",
    "fumbles",
];

#[derive(Debug, Default, Clone)]
struct BasicTally {
    plays: f64,
    yards: f64,
    rush_att: f64,
    rush_yards: f64,
    pass_att: f64,
    completions: f64,
    pass_yards: f64,
    sacks: f64,
    sack_yards: f64,
    first_downs: f64,
    first_downs_rush: f64,
    first_downs_pass: f64,
    first_downs_penalty: f64,
    touchdowns: f64,
    pass_td: f64,
    rush_td: f64,
    fumbles: f64,
}

/// Box-score counts for one side of the ball. The defense variant records
/// what the opponent's offense did against this team.
pub struct BasicCalculator {
    side: Side,
    name: String,
    scratch: Scratch<BasicTally>,
}

impl BasicCalculator {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            name: format!("{}_basic", side.prefix()),
            scratch: Scratch::default(),
        }
    }
}

impl StatCalculator for BasicCalculator {
    fn name(&self) -> &str {
        &self.name
    }

    fn groups(&self) -> &[&'static str] {
        match self.side {
            Side::Offense => &["offense_basic"],
            Side::Defense => &["defense_basic"],
        }
    }

    fn init(&mut self, ctx: &mut StatContext) {
        seed_zeros(ctx, side_keys(self.side, FIELDS));
    }

    fn accumulate(&mut self, play: &Play, ctx: &mut StatContext) {
        if !self.side.involves(play, ctx.team()) {
            return;
        }
        let tally = self.scratch.slot(ctx);
        let offense = play.posteam.as_deref();
        let scored_by_offense = play.is_touchdown() && play.td_team.as_deref() == offense;

        if play.is_scrimmage() {
            tally.plays += 1.0;
            tally.yards += play.yards();
        }
        if play.is_sack() {
            tally.sacks += 1.0;
            tally.sack_yards += -play.yards_gained.unwrap_or(0.0).min(0.0);
        } else if play.is_rush_attempt() {
            tally.rush_att += 1.0;
            tally.rush_yards += play.yards();
        } else if play.is_pass_attempt() {
            tally.pass_att += 1.0;
            if play.is_complete() {
                tally.completions += 1.0;
                tally.pass_yards += play.yards();
            }
        }

        if play.is_first_down() {
            tally.first_downs += 1.0;
        }
        if play.is_first_down_rush() {
            tally.first_downs_rush += 1.0;
        }
        if play.is_first_down_pass() {
            tally.first_downs_pass += 1.0;
        }
        if play.is_first_down_penalty() {
            tally.first_downs_penalty += 1.0;
        }

        if scored_by_offense {
            tally.touchdowns += 1.0;
            if play.is_pass_touchdown() {
                tally.pass_td += 1.0;
            }
            if play.is_rush_touchdown() {
                tally.rush_td += 1.0;
            }
        }
        if play.is_fumble() {
            tally.fumbles += 1.0;
        }
    }

    fn finalize(&mut self, ctx: &mut StatContext) {
        let t = self.scratch.take(ctx);
        let side = self.side;
        let values = [
            ("plays", t.plays),
            ("yards", t.yards),
            ("yards_per_play", safe_div(t.yards, t.plays)),
            ("rush_att", t.rush_att),
            ("rush_yards", t.rush_yards),
            ("rush_ypc", safe_div(t.rush_yards, t.rush_att)),
            ("pass_att", t.pass_att),
            ("completions", t.completions),
            ("pass_yards", t.pass_yards),
            ("comp_pct", safe_div(t.completions, t.pass_att)),
            ("sacks", t.sacks),
            ("sack_yards", t.sack_yards),
            ("first_downs", t.first_downs),
            ("first_downs_rush", t.first_downs_rush),
            ("first_downs_pass", t.first_downs_pass),
            ("first_downs_penalty", t.first_downs_penalty),
            ("touchdowns", t.touchdowns),
            ("pass_td", t.pass_td),
            ("rush_td", t.rush_td),
            ("fumbles", t.fumbles),
        ];
        for (suffix, value) in values {
            ctx.set(&side.key(suffix), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BasicCalculator;
    use crate::play::Play;
    use crate::stats::{Side, StatCalculator, compute_team_stats_for_week};
    use std::collections::HashMap;

    fn snap(play_type: &str, yards: f64) -> Play {
        Play {
            game_id: Some("g1".into()),
            posteam: Some("KC".into()),
            defteam: Some("BUF".into()),
            play_type: Some(play_type.into()),
            yards_gained: Some(yards),
            ..Play::default()
        }
    }

    #[test]
    fn mirrors_offense_into_opponent_defense() {
        let mut pass = snap("pass", 12.0);
        pass.pass_attempt = Some(1.0);
        pass.complete_pass = Some(1.0);
        let mut sack = snap("pass", -7.0);
        sack.sack = Some(1.0);
        let mut td = snap("run", 3.0);
        td.touchdown = Some(1.0);
        td.rush_touchdown = Some(1.0);
        td.td_team = Some("KC".into());

        let mut calcs: Vec<Box<dyn StatCalculator>> = vec![
            Box::new(BasicCalculator::new(Side::Offense)),
            Box::new(BasicCalculator::new(Side::Defense)),
        ];
        let rows = compute_team_stats_for_week(&[pass, sack, td], 2024, 1, &HashMap::new(), &mut calcs);
        let kc = &rows[0].stats;
        let buf = &rows[1].stats;

        assert_eq!(kc["off_plays"], 3.0);
        assert_eq!(kc["off_yards"], 8.0);
        assert_eq!(kc["off_sack_yards"], 7.0);
        assert_eq!(kc["off_comp_pct"], 1.0);
        assert_eq!(kc["off_rush_td"], 1.0);
        assert_eq!(kc["def_plays"], 0.0);
        assert_eq!(kc["def_yards_per_play"], 0.0);

        assert_eq!(buf["def_plays"], 3.0);
        assert_eq!(buf["def_sacks"], 1.0);
        assert_eq!(buf["def_touchdowns"], 1.0);
        assert_eq!(buf["off_rush_ypc"], 0.0);
    }
}
