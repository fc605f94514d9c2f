use gridiron_edge::play::GameMeta;
use gridiron_edge::stats::{DerivedRow, StatMap};
use gridiron_edge::trends::{LAST_N, TrendBuilder, TrendRow, build_trends};

fn derived(week: u32, game_id: &str, team: &str, opponent: &str, stats: &[(&str, f64)]) -> DerivedRow {
    DerivedRow {
        season: 2023,
        week,
        game_id: game_id.to_string(),
        team: team.to_string(),
        opponent: Some(opponent.to_string()),
        stats: stats
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<StatMap>(),
    }
}

fn game(game_id: &str, home: &str, away: &str) -> GameMeta {
    GameMeta {
        game_id: game_id.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        ..GameMeta::default()
    }
}

fn row_for<'a>(rows: &'a [TrendRow], team: &str) -> &'a TrendRow {
    rows.iter().find(|r| r.team == team).expect("trend row")
}

#[test]
fn second_week_sees_only_first_week() {
    let weeks = vec![
        (1, vec![derived(1, "g1", "X", "Y", &[("off_epa_per_play", 0.2)])]),
        (2, vec![derived(2, "g2", "X", "Z", &[("off_epa_per_play", 0.4)])]),
    ];
    let built = build_trends(2023, &weeks, &[]);
    let week2 = &built[1].1;
    let x = row_for(week2, "X");
    assert_eq!(x.games_played, 1);
    assert!((x.trend.season["off_epa_per_play"] - 0.2).abs() < 1e-12);
    assert!((x.trend.last5["off_epa_per_play"] - 0.2).abs() < 1e-12);

    let week1 = row_for(&built[0].1, "X");
    assert_eq!(week1.games_played, 0);
    assert!(week1.trend.season.is_empty());
    assert!(week1.trend.last5.is_empty());
}

#[test]
fn season_average_uses_strictly_prior_games() {
    let weeks: Vec<(u32, Vec<DerivedRow>)> = [0.1, 0.2, 0.3, 0.9]
        .iter()
        .enumerate()
        .map(|(i, epa)| {
            let week = i as u32 + 1;
            (
                week,
                vec![derived(week, &format!("g{week}"), "X", "Y", &[("off_epa_per_play", *epa)])],
            )
        })
        .collect();
    let built = build_trends(2023, &weeks, &[]);
    let x = row_for(&built[2].1, "X");
    assert_eq!(x.games_played, 2);
    assert!((x.trend.season["off_epa_per_play"] - 0.15).abs() < 1e-12);
    let x = row_for(&built[3].1, "X");
    assert_eq!(x.games_played, 3);
    assert!((x.trend.season["off_epa_per_play"] - 0.2).abs() < 1e-12);
}

#[test]
fn last5_window_slides() {
    let mut builder = TrendBuilder::new(2023);
    for week in 1..=7u32 {
        builder.process_week(
            week,
            &[derived(week, &format!("g{week}"), "X", "Y", &[("points_for", f64::from(week))])],
        );
    }
    let rows = builder.process_week(8, &[derived(8, "g8", "X", "Y", &[("points_for", 99.0)])]);
    let x = row_for(&rows, "X");
    assert_eq!(x.games_played, 7);
    assert_eq!(builder.history("X").len(), 8);
    // season: mean of 1..=7, last5: mean of 3..=7
    assert!((x.trend.season["points_for"] - 4.0).abs() < 1e-12);
    assert!((x.trend.last5["points_for"] - 5.0).abs() < 1e-12);
    assert_eq!(LAST_N, 5);
}

#[test]
fn non_finite_values_are_skipped_per_field() {
    let weeks = vec![
        (1, vec![derived(1, "g1", "X", "Y", &[("a", f64::NAN), ("b", 1.0)])]),
        (2, vec![derived(2, "g2", "X", "Y", &[("a", 2.0), ("b", 3.0)])]),
        (3, vec![derived(3, "g3", "X", "Y", &[("a", 0.0), ("b", 0.0)])]),
    ];
    let built = build_trends(2023, &weeks, &[]);
    let x = row_for(&built[2].1, "X");
    assert_eq!(x.trend.season["a"], 2.0);
    assert_eq!(x.trend.season["b"], 2.0);
}

#[test]
fn opponent_strength_uses_what_the_opponent_had_before() {
    // Week 1: Y beats Z. Week 2: X plays Y. Week 3: X's trend measures Y on week 1 only.
    let metas = vec![game("w1", "Y", "Z"), game("w2", "X", "Y"), game("w3", "X", "Z")];
    let weeks = vec![
        (
            1,
            vec![
                derived(1, "w1", "Y", "Z", &[("off_epa_per_play", 0.3), ("def_epa_per_play", -0.1), ("win", 1.0)]),
                derived(1, "w1", "Z", "Y", &[("off_epa_per_play", 0.1), ("def_epa_per_play", 0.3), ("win", 0.0)]),
            ],
        ),
        (
            2,
            vec![
                derived(2, "w2", "X", "Y", &[("off_epa_per_play", 0.2), ("def_epa_per_play", 0.0), ("win", 1.0)]),
                derived(2, "w2", "Y", "X", &[("off_epa_per_play", 0.9), ("def_epa_per_play", 0.2), ("win", 0.0)]),
            ],
        ),
        (
            3,
            vec![
                derived(3, "w3", "X", "Z", &[("off_epa_per_play", 0.0), ("def_epa_per_play", 0.0), ("win", 0.0)]),
                derived(3, "w3", "Z", "X", &[("off_epa_per_play", 0.0), ("def_epa_per_play", 0.0), ("win", 1.0)]),
            ],
        ),
    ];
    let built = build_trends(2023, &weeks, &metas);
    let x = row_for(&built[2].1, "X");
    let season = &x.trend.season;
    assert!((season["opp_avg_off_epa_per_play"] - 0.3).abs() < 1e-12);
    assert!((season["opp_avg_def_epa_per_play"] + 0.1).abs() < 1e-12);
    assert!((season["sos_epa"] - 0.4).abs() < 1e-12);
    assert!((season["sos_win_pct"] - 1.0).abs() < 1e-12);
    assert!((season["adj_off_epa_per_play"] - 0.3).abs() < 1e-12);
    assert!((season["adj_def_epa_per_play"] + 0.3).abs() < 1e-12);

    // Without metadata there is no overlay at all.
    let bare = build_trends(2023, &weeks, &[]);
    assert!(!row_for(&bare[2].1, "X").trend.season.contains_key("sos_epa"));
}

#[test]
fn trend_rows_nest_blocks_in_json() {
    let weeks = vec![
        (1, vec![derived(1, "g1", "X", "Y", &[("margin", 3.0)])]),
        (2, vec![derived(2, "g2", "X", "Y", &[("margin", 5.0)])]),
    ];
    let built = build_trends(2023, &weeks, &[]);
    let value = serde_json::to_value(&built[1].1[0]).expect("serialize");
    assert_eq!(value["trend"]["season"]["margin"], 3.0);
    assert_eq!(value["trend"]["last5"]["margin"], 3.0);
    assert_eq!(value["games_played"], 1);
}

#[test]
fn current_and_later_weeks_do_not_leak_into_a_trend() {
    let metas = vec![game("w1", "X", "Y"), game("w2", "Y", "X"), game("w3", "X", "Y")];
    let season = |w2: f64, w3: f64| -> Vec<(u32, Vec<DerivedRow>)> {
        vec![
            (
                1,
                vec![
                    derived(1, "w1", "X", "Y", &[("off_epa_per_play", 0.1), ("def_epa_per_play", 0.2), ("win", 0.0)]),
                    derived(1, "w1", "Y", "X", &[("off_epa_per_play", 0.2), ("def_epa_per_play", 0.1), ("win", 1.0)]),
                ],
            ),
            (
                2,
                vec![
                    derived(2, "w2", "X", "Y", &[("off_epa_per_play", w2), ("def_epa_per_play", -w2), ("win", 1.0)]),
                    derived(2, "w2", "Y", "X", &[("off_epa_per_play", -w2), ("def_epa_per_play", w2), ("win", 0.0)]),
                ],
            ),
            (
                3,
                vec![
                    derived(3, "w3", "X", "Y", &[("off_epa_per_play", w3), ("points_for", 40.0)]),
                    derived(3, "w3", "Y", "X", &[("off_epa_per_play", -w3), ("points_for", 3.0)]),
                ],
            ),
        ]
    };

    let week2_json = |weeks: Vec<(u32, Vec<DerivedRow>)>| {
        let built = build_trends(2023, &weeks, &metas);
        serde_json::to_string(&built[1].1).expect("serialize")
    };
    let before = week2_json(season(0.3, 0.5));
    let after = week2_json(season(-4.0, 9.0));
    assert_eq!(before, after);

    let built = build_trends(2023, &season(0.3, 0.5), &metas);
    let x = row_for(&built[1].1, "X");
    assert_eq!(x.games_played, 1);
    assert!((x.trend.season["off_epa_per_play"] - 0.1).abs() < 1e-12);
}
