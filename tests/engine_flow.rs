//! End-to-end flow over one binary question: raw forecasts in as JSON (the
//! shape the API layer hands over), consensus history out, scores out,
//! leaderboard out.

use chrono::{DateTime, TimeZone, Utc};

use forecast_engine::{
    build_aggregation_history, build_leaderboard, calculate_movement, score_question,
    AggregationMethod, Forecast, LeaderboardConfig, LeaderboardScoreType, MovementDirection,
    Question, QuestionType, RecencyWeighted, Resolution, ScoreSubject, ScoreType,
    SynthesisOptions, UserAttributes,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
}

fn question() -> Question {
    Question {
        id: 10,
        question_type: QuestionType::Binary,
        range_min: None,
        range_max: None,
        zero_point: None,
        open_lower_bound: false,
        open_upper_bound: false,
        options: vec![],
        option_spans: vec![],
        inbound_outcome_count: None,
        open_time: Some(ts(1)),
        scheduled_close_time: Some(ts(21)),
        actual_close_time: Some(ts(21)),
        spot_scoring_time: Some(ts(21)),
        resolution: Some(Resolution::Value("yes".into())),
        question_weight: 1.0,
    }
}

fn forecasts() -> Vec<Forecast> {
    serde_json::from_str(
        r#"[
            {"author_id": 1, "question_id": 10, "start_time": "2024-03-01T12:00:00Z",
             "end_time": null, "values": {"binary": 0.9}},
            {"author_id": 2, "question_id": 10, "start_time": "2024-03-02T12:00:00Z",
             "end_time": null, "values": {"binary": 0.5}},
            {"author_id": 3, "question_id": 10, "start_time": "2024-03-03T12:00:00Z",
             "end_time": null, "values": {"binary": 0.5}}
        ]"#,
    )
    .expect("fixture parses")
}

#[test]
fn forecasts_flow_through_to_a_ranked_leaderboard() {
    init_tracing();
    let question = question();
    let forecasts = forecasts();

    let history = build_aggregation_history(
        &question,
        &forecasts,
        AggregationMethod::RecencyWeighted,
        &RecencyWeighted,
        None,
        &SynthesisOptions { include_stats: true, include_histogram: false },
    );
    assert_eq!(history.len(), 3, "one snapshot per submission knot");
    assert_eq!(history.last().unwrap().forecaster_count, 3);

    let scores = score_question(
        &question,
        &forecasts,
        question.resolution.as_ref().unwrap(),
        &[ScoreType::Peer],
    )
    .unwrap();

    let users: Vec<UserAttributes> = (1..=3)
        .map(|id| UserAttributes {
            id,
            is_bot: false,
            is_pro: false,
            has_medal: false,
            joined_at: None,
        })
        .collect();
    let config = LeaderboardConfig {
        score_type: LeaderboardScoreType::PeerGlobal,
        project_id: None,
        leaderboard_id: None,
        window_start: None,
        window_end: None,
        finalize_time: None,
        prize_pool: None,
        minimum_prize_percent: 0.0,
        include_bots: false,
        user_list: None,
    };
    let entries = build_leaderboard(
        &config,
        std::slice::from_ref(&question),
        &scores,
        &users,
        &[],
        &[],
        ts(25),
        false,
    );

    let top = entries.iter().find(|e| e.rank == 1).unwrap();
    assert_eq!(
        top.subject,
        ScoreSubject::User(1),
        "the confident correct forecaster leads"
    );
    assert!(top.score > 0.0);
}

#[test]
fn consensus_movement_tracks_the_crowd_shift() {
    let question = question();
    let forecasts = forecasts();
    let history = build_aggregation_history(
        &question,
        &forecasts,
        AggregationMethod::Unweighted,
        &forecast_engine::Unweighted,
        None,
        &SynthesisOptions::default(),
    );
    // 0.9 alone, then the 0.5s drag the median down.
    let movement = calculate_movement(
        &history[0],
        history.last().unwrap(),
        question.shape(),
    );
    assert_eq!(movement.direction, MovementDirection::Down);
    assert!(movement.magnitude > 0.0);
}
