use hyper::StatusCode;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::macros::date;

use crate::helpers::{spawn_app, steady_weather, TestApp, BASELINE};

async fn register(test_app: &TestApp, user_id: &str, display_name: &str) {
    let (status, _) = test_app
        .post(
            "/api/v1/players",
            json!({ "user_id": user_id, "display_name": display_name }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

fn bet(round_id: &str, user_id: &str, predicted_max: f64, predicted_min: f64) -> Value {
    json!({
        "round_id": round_id,
        "user_id": user_id,
        "display_name": format!("{} display", user_id),
        "predicted_max": predicted_max,
        "predicted_min": predicted_min,
    })
}

/// Rounds laid out from Sunday 2026-10-18, the first two open for bets
async fn scheduled_app(pool: SqlitePool) -> (TestApp, Vec<Value>) {
    let test_app = spawn_app(pool, steady_weather());
    test_app.state.scheduler.tick_at(date!(2026 - 10 - 18)).await;
    let (status, rounds) = test_app.get("/api/v1/rounds").await;
    assert_eq!(status, StatusCode::OK);
    let rounds = rounds.as_array().unwrap().clone();
    (test_app, rounds)
}

#[sqlx::test(migrations = "./migrations")]
async fn health_check_works(pool: SqlitePool) {
    let test_app = spawn_app(pool, steady_weather());

    let (status, _) = test_app.get("/api/v1/health_check").await;

    assert_eq!(status, StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
async fn players_register_and_read(pool: SqlitePool) {
    let test_app = spawn_app(pool, steady_weather());
    register(&test_app, "user-1", "Quiet Otter").await;
    register(&test_app, "user-1", "Loud Otter").await;

    let (status, player) = test_app.get("/api/v1/players/user-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(player["display_name"], "Loud Otter");
    assert_eq!(player["credits"], 0);

    let (status, body) = test_app.get("/api/v1/players/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "user_not_found");
}

#[sqlx::test(migrations = "./migrations")]
async fn tick_endpoint_reports_summary(pool: SqlitePool) {
    let test_app = spawn_app(pool, steady_weather());

    let (status, summary) = test_app.post("/api/v1/scheduler/tick", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["created"], 13);
    assert_eq!(summary["failed_steps"], json!([]));

    let (_, summary) = test_app.post("/api/v1/scheduler/tick", json!({})).await;
    assert_eq!(summary["created"], 0);

    let (status, rounds) = test_app.get("/api/v1/rounds").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rounds.as_array().unwrap().len(), 13);
}

#[sqlx::test(migrations = "./migrations")]
async fn rounds_filter_by_status(pool: SqlitePool) {
    let (test_app, rounds) = scheduled_app(pool).await;
    assert_eq!(rounds[0]["target_date"], "2026-10-25");
    assert_eq!(rounds[0]["status"], "active");
    assert_eq!(rounds[0]["accepting_bets"], true);
    assert_eq!(rounds[0]["baseline"]["max"], BASELINE.max);

    let (status, active) = test_app.get("/api/v1/rounds?status=active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active.as_array().unwrap().len(), 2);

    let (status, dormant) = test_app.get("/api/v1/rounds?status=dormant").await;
    assert_eq!(status, StatusCode::OK);
    let dormant = dormant.as_array().unwrap();
    assert_eq!(dormant.len(), 11);
    assert!(dormant.iter().all(|r| r["baseline"].is_null()));

    let (status, body) = test_app.get("/api/v1/rounds?status=finished").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");

    let round_id = rounds[3]["id"].as_str().unwrap();
    let (status, round) = test_app.get(&format!("/api/v1/rounds/{}", round_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(round["id"], round_id);

    let (status, body) = test_app.get("/api/v1/rounds/2026-10-25-atlantis").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "round_not_found");
}

#[sqlx::test(migrations = "./migrations")]
async fn settled_round_without_outcome_is_left_out(pool: SqlitePool) {
    let test_app = spawn_app(pool.clone(), steady_weather());
    test_app.state.scheduler.tick_at(date!(2026 - 10 - 18)).await;
    sqlx::query(
        "INSERT INTO rounds (id, target_date, location_name, location_country, latitude,
            longitude, status, created_at, updated_at)
         VALUES ('2026-10-11-delft', '2026-10-11', 'Delft', 'NL', 52.0, 5.0, 'settled',
            '2026-09-20T06:00:00Z', '2026-10-12T06:00:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let (status, rounds) = test_app.get("/api/v1/rounds").await;
    assert_eq!(status, StatusCode::OK);
    let rounds = rounds.as_array().unwrap();
    assert_eq!(rounds.len(), 13);
    assert_eq!(rounds[0]["target_date"], "2026-10-25");

    let (status, settled) = test_app.get("/api/v1/rounds?status=settled").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled, Value::Array(vec![]));
}

#[sqlx::test(migrations = "./migrations")]
async fn bet_submission_rejections(pool: SqlitePool) {
    let (test_app, rounds) = scheduled_app(pool).await;
    register(&test_app, "user-1", "Quiet Otter").await;
    let open_round = rounds[0]["id"].as_str().unwrap();
    let dormant_round = rounds[5]["id"].as_str().unwrap();

    let (status, body) = test_app
        .post("/api/v1/bets", bet(open_round, "user-1", BASELINE.max, 3.0))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "prediction_matches_baseline");

    let (status, body) = test_app
        .post("/api/v1/bets", bet(dormant_round, "user-1", 20.0, 3.0))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "round_not_open");

    let (status, body) = test_app
        .post("/api/v1/bets", bet(open_round, "stranger", 20.0, 3.0))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "user_not_found");

    let (status, body) = test_app
        .post("/api/v1/bets", bet("2026-10-25-atlantis", "user-1", 20.0, 3.0))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "round_not_found");

    let mut blank_name = bet(open_round, "user-1", 20.0, 3.0);
    blank_name["display_name"] = json!("   ");
    let (status, body) = test_app.post("/api/v1/bets", blank_name).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");

    let (_, bets) = test_app
        .get(&format!("/api/v1/rounds/{}/bets", open_round))
        .await;
    assert_eq!(bets, json!([]));
}

#[sqlx::test(migrations = "./migrations")]
async fn resubmitting_replaces_the_bet(pool: SqlitePool) {
    let (test_app, rounds) = scheduled_app(pool).await;
    register(&test_app, "user-1", "Quiet Otter").await;
    let round_id = rounds[0]["id"].as_str().unwrap();

    let (status, first) = test_app
        .post("/api/v1/bets", bet(round_id, "user-1", 17.0, 5.0))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["predicted_max"], 17.0);

    let (status, _) = test_app
        .post("/api/v1/bets", bet(round_id, "user-1", 18.5, 4.0))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, bets) = test_app
        .get(&format!("/api/v1/rounds/{}/bets", round_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    let bets = bets.as_array().unwrap();
    assert_eq!(bets.len(), 1);
    assert_eq!(bets[0]["predicted_max"], 18.5);
    assert_eq!(bets[0]["predicted_min"], 4.0);
    assert!(bets[0]["rank"].is_null());
}

#[sqlx::test(migrations = "./migrations")]
async fn settled_round_shows_up_in_rankings(pool: SqlitePool) {
    let (test_app, rounds) = scheduled_app(pool).await;
    let round_id = rounds[0]["id"].as_str().unwrap().to_string();
    register(&test_app, "near", "Near Heron").await;
    register(&test_app, "far", "Far Heron").await;

    for (user_id, predicted_max) in [("far", 19.0), ("near", 16.0)] {
        let (status, _) = test_app
            .post("/api/v1/bets", bet(&round_id, user_id, predicted_max, BASELINE.min))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // Lock on Monday, settle the day after the target date
    let summary = test_app.state.scheduler.tick_at(date!(2026 - 10 - 19)).await;
    assert_eq!(summary.locked, 1);
    let (status, body) = test_app
        .post("/api/v1/bets", bet(&round_id, "near", 17.0, BASELINE.min))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "round_not_open");

    let summary = test_app.state.scheduler.tick_at(date!(2026 - 10 - 26)).await;
    assert_eq!(summary.settled, 1);

    let (_, round) = test_app.get(&format!("/api/v1/rounds/{}", round_id)).await;
    assert_eq!(round["status"], "settled");
    assert_eq!(round["outcome"]["pot"], 2);
    assert_eq!(round["outcome"]["winner_count"], 2);

    let (status, ranking) = test_app
        .get(&format!("/api/v1/rounds/{}/ranking", round_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ranking[0]["user_id"], "near");
    assert_eq!(ranking[0]["rank"], 1);
    assert_eq!(ranking[0]["points"], 10);
    assert_eq!(ranking[0]["prize"], 2);
    assert_eq!(ranking[1]["user_id"], "far");
    assert_eq!(ranking[1]["points"], 9);
    assert_eq!(ranking[1]["prize"], 1);

    let (status, board) = test_app.get("/api/v1/leaderboard/2026_10?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["scope"], "2026_10");
    assert_eq!(board["entries"][0]["user_id"], "near");
    assert_eq!(board["entries"][0]["score"], 10);
    assert_eq!(board["entries"][1]["score"], 9);

    let (_, quarter) = test_app.get("/api/v1/leaderboard/2026_Q4").await;
    assert_eq!(quarter["entries"].as_array().unwrap().len(), 2);
    let (_, other_month) = test_app.get("/api/v1/leaderboard/2026_11").await;
    assert_eq!(other_month["entries"], json!([]));

    let (_, player) = test_app.get("/api/v1/players/near").await;
    assert_eq!(player["credits"], 2);
    assert_eq!(player["wins"], 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn unknown_leaderboard_scope_is_rejected(pool: SqlitePool) {
    let test_app = spawn_app(pool, steady_weather());

    let (status, body) = test_app.get("/api/v1/leaderboard/weekly").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");

    let (status, board) = test_app.get("/api/v1/leaderboard/all_time").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["entries"], json!([]));
}
