use std::collections::HashMap;

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::play::{GameMeta, GameResults, Play};
use crate::storage::{self, DataLayout};

const TEAMS: [&str; 8] = ["ARI", "BAL", "CHI", "DAL", "GB", "KC", "NE", "SF"];
const GAME_SECONDS: f64 = 3600.0;
const HALF_SECONDS: f64 = 1800.0;
const MAX_DRIVES: i64 = 26;

#[derive(Debug, Clone, Copy)]
pub struct SynthConfig {
    pub season: u32,
    pub weeks: u32,
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            season: 2023,
            weeks: 6,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthWeek {
    pub week: u32,
    pub plays: Vec<Play>,
    pub games: Vec<GameMeta>,
}

#[derive(Debug, Clone, Copy)]
struct TeamRating {
    offense: f64,
    defense: f64,
}

/// Deterministic fake season: the same config always yields the same plays.
pub fn generate_season(cfg: SynthConfig) -> Vec<SynthWeek> {
    let mut rng = StdRng::seed_from_u64(cfg.seed ^ u64::from(cfg.season));
    let ratings: HashMap<&str, TeamRating> = TEAMS
        .iter()
        .map(|t| {
            (
                *t,
                TeamRating {
                    offense: rng.gen_range(-0.12..0.12),
                    defense: rng.gen_range(-0.12..0.12),
                },
            )
        })
        .collect();

    (1..=cfg.weeks)
        .map(|week| {
            let mut plays = Vec::new();
            let mut games = Vec::new();
            for (slot, (home, away)) in pairings(week).into_iter().enumerate() {
                let (game_plays, meta) =
                    simulate_game(&mut rng, cfg.season, week, slot, home, away, &ratings);
                plays.extend(game_plays);
                games.push(meta);
            }
            SynthWeek { week, plays, games }
        })
        .collect()
}

/// Circle-method round robin over the fixed team list.
fn pairings(week: u32) -> Vec<(&'static str, &'static str)> {
    let n = TEAMS.len();
    let mut order: Vec<&'static str> = TEAMS.to_vec();
    let rotate = (week as usize - 1) % (n - 1);
    order[1..].rotate_right(rotate);
    (0..n / 2)
        .map(|i| {
            let a = order[i];
            let b = order[n - 1 - i];
            if (week as usize + i) % 2 == 0 { (a, b) } else { (b, a) }
        })
        .collect()
}

fn kickoff_date(season: u32, week: u32) -> Option<NaiveDate> {
    // First Thursday after Labor Day.
    let sept = NaiveDate::from_ymd_opt(season as i32, 9, 1)?;
    let offset = (7 - i64::from(sept.weekday().num_days_from_monday())) % 7;
    let labor_day = sept + Duration::days(offset);
    Some(labor_day + Duration::days(3 + 7 * (i64::from(week) - 1)))
}

fn game_day(season: u32, week: u32, slot: usize) -> (Option<String>, Option<String>) {
    let Some(thursday) = kickoff_date(season, week) else {
        return (None, None);
    };
    let date = match slot {
        0 => thursday,
        3 => thursday + Duration::days(4),
        _ => thursday + Duration::days(3),
    };
    (
        Some(date.format("%Y-%m-%d").to_string()),
        Some(weekday_name(date.weekday()).to_string()),
    )
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

struct GameState {
    game_id: String,
    season: u32,
    week: u32,
    clock: f64,
    scores: HashMap<&'static str, f64>,
    play_id: f64,
}

impl GameState {
    fn score(&self, team: &str) -> f64 {
        self.scores.get(team).copied().unwrap_or(0.0)
    }
}

fn simulate_game(
    rng: &mut StdRng,
    season: u32,
    week: u32,
    slot: usize,
    home: &'static str,
    away: &'static str,
    ratings: &HashMap<&str, TeamRating>,
) -> (Vec<Play>, GameMeta) {
    let game_id = format!("{season}_{week:02}_{away}_{home}");
    let mut state = GameState {
        game_id: game_id.clone(),
        season,
        week,
        clock: GAME_SECONDS,
        scores: HashMap::from([(home, 0.0), (away, 0.0)]),
        play_id: 0.0,
    };
    let rating = |t: &str| {
        ratings.get(t).copied().unwrap_or(TeamRating {
            offense: 0.0,
            defense: 0.0,
        })
    };

    let mut plays = Vec::new();
    let mut offense = if rng.gen_bool(0.5) { home } else { away };
    let mut start = 75.0;
    let mut drive = 1;
    let mut second_half_started = false;
    while state.clock > 0.0 && drive <= MAX_DRIVES {
        if !second_half_started && state.clock <= HALF_SECONDS {
            second_half_started = true;
            start = 75.0;
        }
        let defense = if offense == home { away } else { home };
        let home_edge = if offense == home { 0.03 } else { -0.03 };
        let edge = rating(offense).offense - rating(defense).defense + home_edge;
        let (drive_plays, next_start) =
            simulate_drive(rng, &mut state, offense, defense, drive, start, edge);
        plays.extend(drive_plays);
        offense = defense;
        start = next_start;
        drive += 1;
    }

    let home_score = state.score(home);
    let away_score = state.score(away);
    let strength_gap = (rating(home).offense - rating(home).defense)
        - (rating(away).offense - rating(away).defense);
    let spread = ((strength_gap * 40.0 + 1.5) * 2.0).round() / 2.0;
    let (gameday, weekday) = game_day(season, week, slot);
    let meta = GameMeta {
        game_id,
        season: Some(season),
        week: Some(week),
        game_type: Some("REG".to_string()),
        gameday,
        weekday,
        gametime: Some("13:00".to_string()),
        home_team: home.to_string(),
        away_team: away.to_string(),
        location: Some("Home".to_string()),
        roof: Some("outdoors".to_string()),
        spread_line: Some(spread),
        total_line: Some(44.5),
        home_moneyline: Some(if spread >= 0.0 { -150.0 } else { 130.0 }),
        away_moneyline: Some(if spread >= 0.0 { 130.0 } else { -150.0 }),
        results: GameResults {
            home_score: Some(home_score),
            away_score: Some(away_score),
            overtime: Some(0.0),
            result: Some(home_score - away_score),
            total: Some(home_score + away_score),
        },
        ..GameMeta::default()
    };
    (plays, meta)
}

/// Plays one possession. Returns the plays and the next offense's starting
/// yard line (distance from the end zone it attacks).
fn simulate_drive(
    rng: &mut StdRng,
    state: &mut GameState,
    offense: &'static str,
    defense: &'static str,
    drive: i64,
    start: f64,
    edge: f64,
) -> (Vec<Play>, f64) {
    let mut plays: Vec<Play> = Vec::new();
    let mut yardline = start;
    let mut down = 1.0;
    let mut to_go = 10.0_f64.min(yardline);
    let mut first_downs = 0.0;

    let result: &str;
    let next_start: f64;
    loop {
        if down >= 4.0 {
            let mut kick = base_play(state, offense, defense, drive, down, to_go, yardline);
            if yardline <= 35.0 {
                kick.play_type = Some("field_goal".to_string());
                *state.scores.entry(offense).or_insert(0.0) += 3.0;
                result = "Field goal";
                next_start = 75.0;
            } else {
                kick.play_type = Some("punt".to_string());
                result = "Punt";
                next_start = (100.0 - (yardline - 42.0)).clamp(60.0, 95.0);
            }
            state.clock -= 6.0;
            plays.push(kick);
            break;
        }

        let mut play = base_play(state, offense, defense, drive, down, to_go, yardline);
        let passing = rng.gen_bool(0.56);
        let shift = edge * 10.0;
        let mut yards: f64;
        let mut turnover = false;
        if passing {
            play.play_type = Some("pass".to_string());
            play.pass = Some(1.0);
            play.qb_dropback = Some(1.0);
            play.shotgun = Some(if rng.gen_bool(0.7) { 1.0 } else { 0.0 });
            let roll: f64 = rng.gen_range(0.0..1.0);
            if roll < 0.07 {
                play.sack = Some(1.0);
                yards = -f64::from(rng.gen_range(3..=9_i32));
            } else if roll < 0.095 {
                play.pass_attempt = Some(1.0);
                play.interception = Some(1.0);
                play.air_yards = Some(f64::from(rng.gen_range(5..=30_i32)));
                yards = 0.0;
                turnover = true;
            } else if roll < 0.43 - edge {
                play.pass_attempt = Some(1.0);
                play.incomplete_pass = Some(1.0);
                play.air_yards = Some(f64::from(rng.gen_range(1..=35_i32)));
                yards = 0.0;
            } else {
                play.pass_attempt = Some(1.0);
                play.complete_pass = Some(1.0);
                let air = if rng.gen_bool(0.12) {
                    f64::from(rng.gen_range(20..=45_i32))
                } else {
                    f64::from(rng.gen_range(0..=14_i32))
                };
                let yac = f64::from(rng.gen_range(0..=9_i32));
                play.air_yards = Some(air);
                play.yards_after_catch = Some(yac);
                let length = if air >= 20.0 { "deep" } else { "short" };
                play.pass_length = Some(length.to_string());
                yards = (air + yac + shift).round();
            }
            play.cpoe = Some(rng.gen_range(-20.0..20.0));
        } else {
            play.play_type = Some("run".to_string());
            play.rush = Some(1.0);
            play.rush_attempt = Some(1.0);
            yards = if rng.gen_bool(0.07) {
                f64::from(rng.gen_range(10..=35_i32))
            } else {
                f64::from(rng.gen_range(-3..=8_i32))
            };
            yards = (yards + shift).round();
        }
        if !turnover && rng.gen_bool(0.012) {
            play.fumble = Some(1.0);
            if rng.gen_bool(0.5) {
                play.fumble_recovery_1_team = Some(defense.to_string());
                turnover = true;
            } else {
                play.fumble_recovery_1_team = Some(offense.to_string());
            }
        }
        if rng.gen_bool(0.04) {
            play.penalty = Some(1.0);
            let flagged = if rng.gen_bool(0.5) { offense } else { defense };
            play.penalty_team = Some(flagged.to_string());
            play.penalty_yards = Some(if rng.gen_bool(0.7) { 5.0 } else { 10.0 });
        }
        play.no_huddle = Some(if state.clock % HALF_SECONDS < 120.0 { 1.0 } else { 0.0 });
        play.pass_oe = Some(if passing { rng.gen_range(-5.0..25.0) } else { rng.gen_range(-25.0..5.0) });

        yards = yards.min(yardline);
        let touchdown = !turnover && yards >= yardline;
        let converted = !turnover && yards >= to_go;
        play.yards_gained = Some(yards);

        let mut epa = (yards - 4.0) * 0.11 + edge;
        if touchdown {
            epa += 2.0;
        }
        if turnover {
            epa -= 3.5;
        }
        play.epa = Some(epa);
        play.success = Some(if epa > 0.0 { 1.0 } else { 0.0 });

        if down == 3.0 {
            if converted {
                play.third_down_converted = Some(1.0);
            } else {
                play.third_down_failed = Some(1.0);
            }
        }
        if converted && !touchdown {
            first_downs += 1.0;
            play.first_down = Some(1.0);
            if passing {
                play.first_down_pass = Some(1.0);
            } else {
                play.first_down_rush = Some(1.0);
            }
        }

        state.clock -= f64::from(rng.gen_range(24..=42_i32));
        if touchdown {
            play.touchdown = Some(1.0);
            play.td_team = Some(offense.to_string());
            if passing {
                play.pass_touchdown = Some(1.0);
            } else {
                play.rush_touchdown = Some(1.0);
            }
            *state.scores.entry(offense).or_insert(0.0) += 7.0;
            plays.push(play);
            result = "Touchdown";
            next_start = 75.0;
            break;
        }
        plays.push(play);
        if turnover {
            result = "Turnover";
            next_start = (100.0 - (yardline - yards)).clamp(1.0, 99.0);
            break;
        }

        yardline = (yardline - yards).min(99.0);
        if converted {
            down = 1.0;
            to_go = 10.0_f64.min(yardline);
        } else {
            down += 1.0;
            to_go -= yards;
        }
    }

    let count = plays.len() as f64;
    for play in &mut plays {
        play.fixed_drive_result = Some(result.to_string());
        play.drive_play_count = Some(count);
        play.drive_first_downs = Some(first_downs);
    }
    (plays, next_start)
}

fn base_play(
    state: &mut GameState,
    offense: &'static str,
    defense: &'static str,
    drive: i64,
    down: f64,
    to_go: f64,
    yardline: f64,
) -> Play {
    state.play_id += 1.0;
    let clock = state.clock.max(0.0);
    let half_remaining = if clock > HALF_SECONDS {
        clock - HALF_SECONDS
    } else {
        clock
    };
    Play {
        season: Some(state.season),
        week: Some(state.week),
        game_id: Some(state.game_id.clone()),
        play_id: Some(state.play_id),
        posteam: Some(offense.to_string()),
        defteam: Some(defense.to_string()),
        down: Some(down),
        ydstogo: Some(to_go),
        yardline_100: Some(yardline),
        game_seconds_remaining: Some(clock),
        half_seconds_remaining: Some(half_remaining),
        posteam_score: Some(state.score(offense)),
        defteam_score: Some(state.score(defense)),
        drive: Some(drive as f64),
        fixed_drive: Some(drive as f64),
        ..Play::default()
    }
}

/// Writes a generated season in the on-disk play-by-play and metadata layout.
pub fn write_season(layout: &DataLayout, cfg: SynthConfig) -> Result<usize> {
    let weeks = generate_season(cfg);
    let mut plays = 0;
    for week in &weeks {
        let name = storage::week_file_name(week.week);
        storage::write_json_atomic(&layout.pbp_dir(cfg.season).join(&name), &week.plays)?;
        storage::write_json_atomic(&layout.meta_dir(cfg.season).join(&name), &week.games)?;
        plays += week.plays.len();
    }
    info!(
        "generated {} weeks ({plays} plays) of synthetic {} data under {}",
        weeks.len(),
        cfg.season,
        layout.root().display()
    );
    Ok(plays)
}

#[cfg(test)]
mod tests {
    use super::{SynthConfig, TEAMS, generate_season, pairings};
    use std::collections::HashSet;

    #[test]
    fn every_team_plays_once_per_week() {
        for week in 1..=7 {
            let teams: HashSet<&str> = pairings(week)
                .into_iter()
                .flat_map(|(h, a)| [h, a])
                .collect();
            assert_eq!(teams.len(), TEAMS.len());
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let cfg = SynthConfig {
            season: 2022,
            weeks: 2,
            seed: 11,
        };
        let a = generate_season(cfg);
        let b = generate_season(cfg);
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].plays.len(), b[1].plays.len());
        assert_eq!(a[0].games[0].results.result, b[0].games[0].results.result);
        assert!(a[0].plays.iter().all(|p| p.is_snap()));
        assert_eq!(a[0].games.len(), TEAMS.len() / 2);
    }
}
