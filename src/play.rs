use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Coerce a loosely typed JSON value into a finite number.
///
/// Upstream PBP exports mix floats, integers, booleans, numeric strings and
/// nulls for the same column; anything that is not a finite number becomes
/// `None` and is skipped by calculators.
pub fn coerce_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|x| x.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|x| x.is_finite())
        }
        _ => None,
    }
}

pub fn coerce_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(coerce_f64(&v))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(coerce_string(&v))
}

fn lenient_required_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(coerce_string(&v).unwrap_or_default())
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(coerce_f64(&v)
        .filter(|x| *x >= 0.0 && x.fract() == 0.0)
        .map(|x| x as u32))
}

fn flag(v: Option<f64>) -> bool {
    v.is_some_and(|x| x != 0.0)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Play {
    #[serde(deserialize_with = "lenient_u32")]
    pub season: Option<u32>,
    #[serde(deserialize_with = "lenient_u32")]
    pub week: Option<u32>,
    #[serde(deserialize_with = "lenient_string")]
    pub game_id: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub play_id: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub posteam: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub defteam: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub play_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub play_type_nfl: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub quarter_end: Option<f64>,

    #[serde(deserialize_with = "lenient_f64")]
    pub down: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub ydstogo: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub yardline_100: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub yards_gained: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub half_seconds_remaining: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub game_seconds_remaining: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub posteam_score: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub defteam_score: Option<f64>,

    #[serde(deserialize_with = "lenient_f64")]
    pub drive: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub fixed_drive: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub fixed_drive_result: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub drive_play_count: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub drive_first_downs: Option<f64>,

    #[serde(deserialize_with = "lenient_f64")]
    pub epa: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub success: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub cpoe: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub pass_oe: Option<f64>,

    #[serde(deserialize_with = "lenient_f64")]
    pub rush: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub pass: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub rush_attempt: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub pass_attempt: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub sack: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub qb_dropback: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub qb_scramble: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub shotgun: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub no_huddle: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub complete_pass: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub incomplete_pass: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub air_yards: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub yards_after_catch: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub pass_length: Option<String>,

    #[serde(deserialize_with = "lenient_f64")]
    pub first_down: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub first_down_rush: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub first_down_pass: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub first_down_penalty: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub third_down_converted: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub third_down_failed: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub fourth_down_converted: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub fourth_down_failed: Option<f64>,

    #[serde(deserialize_with = "lenient_f64")]
    pub touchdown: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub pass_touchdown: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub rush_touchdown: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub td_team: Option<String>,

    #[serde(deserialize_with = "lenient_f64")]
    pub interception: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub fumble: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub fumble_recovery_1_team: Option<String>,

    #[serde(deserialize_with = "lenient_f64")]
    pub penalty: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub penalty_team: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub penalty_yards: Option<f64>,
}

impl Play {
    /// Rows without an offense, quarter-end markers and rows without a play
    /// type are administrative and never reach calculators.
    pub fn is_snap(&self) -> bool {
        self.game_id.is_some()
            && self.posteam.is_some()
            && self.play_type.is_some()
            && !flag(self.quarter_end)
    }

    pub fn is_offense(&self, team: &str) -> bool {
        self.posteam.as_deref() == Some(team)
    }

    pub fn is_defense(&self, team: &str) -> bool {
        self.defteam.as_deref() == Some(team)
    }

    pub fn is_sack(&self) -> bool {
        if self.sack.is_some() {
            return flag(self.sack);
        }
        self.play_type_nfl
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("sack"))
    }

    pub fn is_rush(&self) -> bool {
        if self.rush.is_some() {
            return flag(self.rush);
        }
        self.play_type.as_deref() == Some("run")
    }

    /// Dropbacks count as pass plays, sacks included.
    pub fn is_pass(&self) -> bool {
        if self.pass.is_some() {
            return flag(self.pass);
        }
        self.play_type.as_deref() == Some("pass")
    }

    pub fn is_scrimmage(&self) -> bool {
        self.is_rush() || self.is_pass()
    }

    /// Pass attempts exclude sacks.
    pub fn is_pass_attempt(&self) -> bool {
        if self.pass_attempt.is_some() {
            return flag(self.pass_attempt) && !self.is_sack();
        }
        self.is_pass() && !self.is_sack() && !flag(self.qb_scramble)
    }

    pub fn is_rush_attempt(&self) -> bool {
        if self.rush_attempt.is_some() {
            return flag(self.rush_attempt);
        }
        self.is_rush()
    }

    pub fn is_dropback(&self) -> bool {
        if self.qb_dropback.is_some() {
            return flag(self.qb_dropback);
        }
        self.is_pass()
    }

    pub fn is_complete(&self) -> bool {
        flag(self.complete_pass)
    }

    pub fn is_scramble(&self) -> bool {
        flag(self.qb_scramble)
    }

    pub fn is_shotgun(&self) -> bool {
        flag(self.shotgun)
    }

    pub fn is_no_huddle(&self) -> bool {
        flag(self.no_huddle)
    }

    pub fn is_touchdown(&self) -> bool {
        flag(self.touchdown)
    }

    pub fn is_interception(&self) -> bool {
        flag(self.interception)
    }

    pub fn is_fumble(&self) -> bool {
        flag(self.fumble)
    }

    /// A fumble is lost only when a recovering team is recorded and it is not
    /// the offense; no recorded recovery counts as retained.
    pub fn is_fumble_lost(&self) -> bool {
        if !self.is_fumble() {
            return false;
        }
        match (&self.fumble_recovery_1_team, &self.posteam) {
            (Some(recovered_by), Some(offense)) => recovered_by != offense,
            _ => false,
        }
    }

    pub fn is_penalty(&self) -> bool {
        flag(self.penalty)
    }

    pub fn is_success(&self) -> bool {
        flag(self.success)
    }

    pub fn is_first_down(&self) -> bool {
        if self.first_down.is_some() {
            return flag(self.first_down);
        }
        flag(self.first_down_rush) || flag(self.first_down_pass) || flag(self.first_down_penalty)
    }

    pub fn is_first_down_rush(&self) -> bool {
        flag(self.first_down_rush)
    }

    pub fn is_first_down_pass(&self) -> bool {
        flag(self.first_down_pass)
    }

    pub fn is_first_down_penalty(&self) -> bool {
        flag(self.first_down_penalty)
    }

    pub fn third_down_attempt(&self) -> Option<bool> {
        down_attempt(self.third_down_converted, self.third_down_failed)
    }

    pub fn fourth_down_attempt(&self) -> Option<bool> {
        down_attempt(self.fourth_down_converted, self.fourth_down_failed)
    }

    pub fn is_pass_touchdown(&self) -> bool {
        flag(self.pass_touchdown)
    }

    pub fn is_rush_touchdown(&self) -> bool {
        flag(self.rush_touchdown)
    }

    /// Drive identifier; the fixed (per-game renumbered) drive wins when present.
    pub fn drive_id(&self) -> Option<i64> {
        self.fixed_drive.or(self.drive).map(|d| d as i64)
    }

    pub fn down(&self) -> Option<u8> {
        self.down
            .filter(|d| (1.0..=4.0).contains(d))
            .map(|d| d as u8)
    }

    pub fn score_differential(&self) -> Option<f64> {
        Some(self.posteam_score? - self.defteam_score?)
    }

    pub fn yards(&self) -> f64 {
        self.yards_gained.unwrap_or(0.0)
    }

    pub fn is_deep_pass(&self) -> bool {
        if let Some(length) = self.pass_length.as_deref() {
            return length.eq_ignore_ascii_case("deep");
        }
        self.air_yards.is_some_and(|a| a >= 20.0)
    }
}

/// Converted / failed flags to "was this an attempt, and did it convert".
fn down_attempt(converted: Option<f64>, failed: Option<f64>) -> Option<bool> {
    if flag(converted) {
        Some(true)
    } else if flag(failed) {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameResults {
    #[serde(deserialize_with = "lenient_f64")]
    pub home_score: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub away_score: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub overtime: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub result: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameMeta {
    #[serde(deserialize_with = "lenient_required_string")]
    pub game_id: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub season: Option<u32>,
    #[serde(deserialize_with = "lenient_u32")]
    pub week: Option<u32>,
    #[serde(deserialize_with = "lenient_string")]
    pub game_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub gameday: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub weekday: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub gametime: Option<String>,
    #[serde(deserialize_with = "lenient_required_string")]
    pub home_team: String,
    #[serde(deserialize_with = "lenient_required_string")]
    pub away_team: String,
    #[serde(deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub stadium: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub roof: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub surface: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub temp: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub wind: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub div_game: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub home_rest: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub away_rest: Option<f64>,

    #[serde(deserialize_with = "lenient_f64")]
    pub spread_line: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub total_line: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub home_moneyline: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub away_moneyline: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub home_spread_odds: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub away_spread_odds: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub over_odds: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub under_odds: Option<f64>,

    pub results: GameResults,
    // Some exports keep scores at the top level instead of under `results`.
    #[serde(deserialize_with = "lenient_f64", skip_serializing)]
    pub home_score: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing)]
    pub away_score: Option<f64>,
}

impl GameMeta {
    pub fn home_points(&self) -> Option<f64> {
        self.results.home_score.or(self.home_score)
    }

    pub fn away_points(&self) -> Option<f64> {
        self.results.away_score.or(self.away_score)
    }

    /// Home-perspective final margin.
    pub fn home_margin(&self) -> Option<f64> {
        if let Some(result) = self.results.result {
            return Some(result);
        }
        Some(self.home_points()? - self.away_points()?)
    }

    pub fn opponent_of(&self, team: &str) -> Option<&str> {
        if team.is_empty() {
            return None;
        }
        let other = if self.home_team == team {
            &self.away_team
        } else if self.away_team == team {
            &self.home_team
        } else {
            return None;
        };
        (!other.is_empty()).then_some(other.as_str())
    }

    /// (points for, points against) from `team`'s perspective.
    pub fn points_for(&self, team: &str) -> Option<(f64, f64)> {
        let home = self.home_points()?;
        let away = self.away_points()?;
        if self.home_team == team {
            Some((home, away))
        } else if self.away_team == team {
            Some((away, home))
        } else {
            None
        }
    }
}
