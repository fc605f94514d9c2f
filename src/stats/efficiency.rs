use std::collections::{BTreeMap, HashSet};

use log::warn;

use crate::play::Play;

use super::{Scratch, Side, StatCalculator, StatContext, safe_div, seed_zeros, side_keys};

const FIELDS: &[&str] = &[
    "third_down_att",
    "third_down_conv",
    "third_down_pct",
    "fourth_down_att",
    "fourth_down_conv",
    "fourth_down_pct",
    "red_zone_trips",
    "red_zone_td",
    "red_zone_td_pct",
    "drives",
    "drive_td",
    "drive_fg",
    "drive_punt",
    "drive_turnover",
    "drive_safety",
    "three_and_outs",
    "three_and_out_pct",
    "drive_score_pct",
    "plays_per_drive",
    "first_downs_per_drive",
];

const RED_ZONE_YARDLINE: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    Touchdown,
    FieldGoal,
    Punt,
    Turnover,
    Safety,
}

impl DriveOutcome {
    /// Drive result labels as exported upstream. Turnovers on downs and
    /// defensive scores both end the drive with the ball changing hands.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "touchdown" => Some(Self::Touchdown),
            "field goal" => Some(Self::FieldGoal),
            "punt" => Some(Self::Punt),
            "turnover" | "turnover on downs" | "opp touchdown" => Some(Self::Turnover),
            "safety" => Some(Self::Safety),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct DriveTally {
    plays: f64,
    first_downs: f64,
    rollup_plays: Option<f64>,
    rollup_first_downs: Option<f64>,
    result: Option<String>,
}

impl DriveTally {
    fn play_count(&self) -> f64 {
        self.rollup_plays.unwrap_or(self.plays)
    }

    fn first_down_count(&self) -> f64 {
        self.rollup_first_downs.unwrap_or(self.first_downs)
    }
}

#[derive(Debug, Default, Clone)]
struct EfficiencyTally {
    third_att: f64,
    third_conv: f64,
    fourth_att: f64,
    fourth_conv: f64,
    red_zone_drives: HashSet<i64>,
    red_zone_td_drives: HashSet<i64>,
    // Ordered so finalize walks drives in drive-number order.
    drives: BTreeMap<i64, DriveTally>,
}

pub struct EfficiencyCalculator {
    side: Side,
    name: String,
    scratch: Scratch<EfficiencyTally>,
    warned_labels: HashSet<String>,
}

impl EfficiencyCalculator {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            name: format!("{}_efficiency", side.prefix()),
            scratch: Scratch::default(),
            warned_labels: HashSet::new(),
        }
    }
}

impl StatCalculator for EfficiencyCalculator {
    fn name(&self) -> &str {
        &self.name
    }

    fn groups(&self) -> &[&'static str] {
        match self.side {
            Side::Offense => &["offense_efficiency"],
            Side::Defense => &["defense_efficiency"],
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

        if let Some(converted) = play.third_down_attempt() {
            tally.third_att += 1.0;
            if converted {
                tally.third_conv += 1.0;
            }
        }
        if let Some(converted) = play.fourth_down_attempt() {
            tally.fourth_att += 1.0;
            if converted {
                tally.fourth_conv += 1.0;
            }
        }

        let Some(drive_id) = play.drive_id() else {
            return;
        };

        if play.down() == Some(1)
            && play.yardline_100.is_some_and(|y| y <= RED_ZONE_YARDLINE)
        {
            tally.red_zone_drives.insert(drive_id);
        }
        if play.is_touchdown()
            && play.td_team.is_some()
            && play.td_team == play.posteam
            && tally.red_zone_drives.contains(&drive_id)
        {
            tally.red_zone_td_drives.insert(drive_id);
        }

        let drive = tally.drives.entry(drive_id).or_default();
        if play.is_scrimmage() {
            drive.plays += 1.0;
        }
        if play.is_first_down() {
            drive.first_downs += 1.0;
        }
        if let Some(count) = play.drive_play_count {
            drive.rollup_plays = Some(count);
        }
        if let Some(count) = play.drive_first_downs {
            drive.rollup_first_downs = Some(count);
        }
        if let Some(label) = play.fixed_drive_result.as_deref() {
            drive.result = Some(label.to_string());
        }
    }

    fn finalize(&mut self, ctx: &mut StatContext) {
        let t = self.scratch.take(ctx);

        let mut drives = 0.0;
        let mut td = 0.0;
        let mut fg = 0.0;
        let mut punt = 0.0;
        let mut turnover = 0.0;
        let mut safety = 0.0;
        let mut three_and_outs = 0.0;
        let mut plays = 0.0;
        let mut first_downs = 0.0;

        for drive in t.drives.values() {
            drives += 1.0;
            plays += drive.play_count();
            first_downs += drive.first_down_count();
            let Some(label) = drive.result.as_deref() else {
                continue;
            };
            match DriveOutcome::from_label(label) {
                Some(DriveOutcome::Touchdown) => td += 1.0,
                Some(DriveOutcome::FieldGoal) => fg += 1.0,
                Some(DriveOutcome::Punt) => {
                    punt += 1.0;
                    // A punt drive with no first downs is a three-and-out, whatever its play count.
                    if drive.first_down_count() == 0.0 {
                        three_and_outs += 1.0;
                    }
                }
                Some(DriveOutcome::Turnover) => turnover += 1.0,
                Some(DriveOutcome::Safety) => safety += 1.0,
                None => {
                    if self.warned_labels.insert(label.to_string()) {
                        warn!("unknown drive result label {label:?}; drive left unclassified");
                    }
                }
            }
        }

        let red_zone_trips = t.red_zone_drives.len() as f64;
        let red_zone_td = t.red_zone_td_drives.len() as f64;
        let side = self.side;
        let values = [
            ("third_down_att", t.third_att),
            ("third_down_conv", t.third_conv),
            ("third_down_pct", safe_div(t.third_conv, t.third_att)),
            ("fourth_down_att", t.fourth_att),
            ("fourth_down_conv", t.fourth_conv),
            ("fourth_down_pct", safe_div(t.fourth_conv, t.fourth_att)),
            ("red_zone_trips", red_zone_trips),
            ("red_zone_td", red_zone_td),
            ("red_zone_td_pct", safe_div(red_zone_td, red_zone_trips)),
            ("drives", drives),
            ("drive_td", td),
            ("drive_fg", fg),
            ("drive_punt", punt),
            ("drive_turnover", turnover),
            ("drive_safety", safety),
            ("three_and_outs", three_and_outs),
            ("three_and_out_pct", safe_div(three_and_outs, drives)),
            ("drive_score_pct", safe_div(td + fg, drives)),
            ("plays_per_drive", safe_div(plays, drives)),
            ("first_downs_per_drive", safe_div(first_downs, drives)),
        ];
        for (suffix, value) in values {
            ctx.set(&side.key(suffix), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DriveOutcome, EfficiencyCalculator};
    use crate::play::Play;
    use crate::stats::{Side, StatCalculator, compute_team_stats_for_week};
    use std::collections::HashMap;

    fn drive_play(drive: f64, down: f64, yardline: f64) -> Play {
        Play {
            game_id: Some("g1".into()),
            posteam: Some("SF".into()),
            defteam: Some("SEA".into()),
            play_type: Some("run".into()),
            fixed_drive: Some(drive),
            down: Some(down),
            yardline_100: Some(yardline),
            ..Play::default()
        }
    }

    #[test]
    fn red_zone_trips_count_once_per_drive() {
        let mut td = drive_play(1.0, 1.0, 5.0);
        td.touchdown = Some(1.0);
        td.td_team = Some("SF".into());
        td.fixed_drive_result = Some("Touchdown".into());
        let plays = vec![
            drive_play(1.0, 1.0, 18.0),
            drive_play(1.0, 2.0, 12.0),
            drive_play(1.0, 1.0, 9.0),
            td,
            drive_play(2.0, 1.0, 40.0),
        ];
        let mut calcs: Vec<Box<dyn StatCalculator>> = vec![
            Box::new(EfficiencyCalculator::new(Side::Offense)),
            Box::new(EfficiencyCalculator::new(Side::Defense)),
        ];
        let rows = compute_team_stats_for_week(&plays, 2024, 1, &HashMap::new(), &mut calcs);
        let sf = &rows[0].stats;
        assert_eq!(sf["off_red_zone_trips"], 1.0);
        assert_eq!(sf["off_red_zone_td"], 1.0);
        assert_eq!(sf["off_red_zone_td_pct"], 1.0);
        assert_eq!(sf["off_drives"], 2.0);
        assert_eq!(sf["off_drive_td"], 1.0);
        assert_eq!(sf["off_drive_score_pct"], 0.5);

        let sea = &rows[1].stats;
        assert_eq!(sea["def_red_zone_trips"], 1.0);
        assert_eq!(sea["off_third_down_pct"], 0.0);
    }

    #[test]
    fn punt_without_first_down_is_three_and_out() {
        let mut first = drive_play(3.0, 1.0, 75.0);
        first.drive_first_downs = Some(0.0);
        let mut last = drive_play(3.0, 4.0, 72.0);
        last.fixed_drive_result = Some("Punt".into());
        last.third_down_failed = Some(0.0);
        let mut calcs: Vec<Box<dyn StatCalculator>> =
            vec![Box::new(EfficiencyCalculator::new(Side::Offense))];
        let rows =
            compute_team_stats_for_week(&[first, last], 2024, 1, &HashMap::new(), &mut calcs);
        assert_eq!(rows[0].stats["off_three_and_outs"], 1.0);
        assert_eq!(rows[0].stats["off_three_and_out_pct"], 1.0);
        assert_eq!(rows[0].stats["off_plays_per_drive"], 2.0);
    }

    #[test]
    fn drive_labels_cover_upstream_vocabulary() {
        assert_eq!(
            DriveOutcome::from_label("Turnover on downs"),
            Some(DriveOutcome::Turnover)
        );
        assert_eq!(
            DriveOutcome::from_label("Opp touchdown"),
            Some(DriveOutcome::Turnover)
        );
        assert_eq!(DriveOutcome::from_label("End of half"), None);
    }
}
