use axum::http::StatusCode;
use propledger::api::{self, AppState};
use propledger::chain::MockChain;
use propledger::config::{GapConfig, ScorePolicy, SubscriberConfig};
use propledger::decoder::program_data_line;
use propledger::ingest::{GapReconciler, LiveSubscriber, Pipeline};
use propledger::{init_db, Catalog, Decoder, RawTransaction, Repository, TxSignature, UnixSecs};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    state: AppState,
    mock: MockChain,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");

    let mock = MockChain::new();
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(Repository::new(pool)),
        Arc::new(Catalog::builtin()),
        Decoder::program_data(),
        ScorePolicy::default(),
    ));
    let subscriber = Arc::new(LiveSubscriber::new(
        Arc::new(mock.clone()),
        Arc::new(mock.clone()),
        pipeline.clone(),
        "program".to_string(),
        SubscriberConfig::default(),
    ));
    let reconciler = Arc::new(GapReconciler::new(
        Arc::new(mock.clone()),
        pipeline.clone(),
        "program".to_string(),
        GapConfig {
            backfill_delay: std::time::Duration::ZERO,
            ..GapConfig::default()
        },
    ));
    let state = AppState::new(pipeline, subscriber, reconciler);
    let app = api::create_router(state.clone());

    TestApp {
        app,
        state,
        mock,
        _temp: temp_dir,
    }
}

fn tx(sig: &str, at: i64, event: &str, body: Value) -> RawTransaction {
    RawTransaction::confirmed(
        TxSignature::new(sig),
        at as u64,
        UnixSecs::new(at),
        vec![program_data_line(event, &body)],
    )
}

async fn seed(app: &TestApp) {
    let history = [
        tx(
            "s1",
            100,
            "PropertyBoughtEvent",
            json!({"player": "alice", "propertyId": 0, "slots": 2, "totalCost": 3000}),
        ),
        tx(
            "s2",
            110,
            "PropertyBoughtEvent",
            json!({"player": "bob", "propertyId": 0, "slots": 1, "totalCost": 1500}),
        ),
        tx(
            "s3",
            120,
            "StealSuccessEvent",
            json!({"attacker": "bob", "target": "alice", "propertyId": 0, "stealCost": 100}),
        ),
        tx(
            "s4",
            130,
            "RewardsClaimedEvent",
            json!({"player": "alice", "amount": 500}),
        ),
    ];
    for raw in &history {
        app.state.pipeline.ingest(raw).await.unwrap();
    }
}

async fn request(app: axum::Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_health_and_ready() {
    let test_app = setup_test_app().await;
    let (status, body) = request(test_app.app.clone(), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = request(test_app.app, "GET", "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["subscriber"], "disconnected");
}

#[tokio::test]
async fn test_player_endpoints() {
    let test_app = setup_test_app().await;
    seed(&test_app).await;

    let (status, body) = request(test_app.app.clone(), "GET", "/v1/players/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wallet"], "alice");
    assert_eq!(body["totalActions"], 2);
    assert_eq!(body["timesStolen"], 1);
    assert_eq!(body["totalSlotsOwned"], 1);
    assert_eq!(body["totalEarned"], 500);

    let (status, body) =
        request(test_app.app.clone(), "GET", "/v1/players/alice/ownership").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalSlots"], 1);
    assert_eq!(body["holdings"][0]["propertyId"], 0);

    let (status, body) =
        request(test_app.app.clone(), "GET", "/v1/players/alice/actions?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    let actions = body.as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["kind"], "claim");

    let (status, body) =
        request(test_app.app.clone(), "GET", "/v1/players/bob/steal-cooldowns").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["propertyId"], 0);

    let (status, body) = request(test_app.app, "GET", "/v1/players/alice/cooldowns").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["setId"], 0);
}

#[tokio::test]
async fn test_unknown_player_is_zeroed() {
    let test_app = setup_test_app().await;
    let (status, body) = request(test_app.app, "GET", "/v1/players/nobody").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalActions"], 0);
    assert_eq!(body["leaderboardScore"], 0);
}

#[tokio::test]
async fn test_action_listings() {
    let test_app = setup_test_app().await;
    seed(&test_app).await;

    let (status, body) =
        request(test_app.app.clone(), "GET", "/v1/actions/recent?kind=buy").await;
    assert_eq!(status, StatusCode::OK);
    let actions = body.as_array().unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0]["transactionId"], "s2");

    let (status, body) =
        request(test_app.app.clone(), "GET", "/v1/properties/0/actions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (status, _) = request(test_app.app.clone(), "GET", "/v1/properties/99/actions").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) =
        request(test_app.app.clone(), "GET", "/v1/actions/recent?kind=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("bogus"));

    let (status, _) = request(test_app.app, "GET", "/v1/actions/recent?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_leaderboard() {
    let test_app = setup_test_app().await;
    seed(&test_app).await;

    let (status, body) =
        request(test_app.app.clone(), "GET", "/v1/leaderboard?type=combat").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["rank"], 1);
    assert_eq!(entries[0]["wallet"], "bob");
    assert_eq!(entries[1]["wallet"], "alice");

    let (status, body) = request(test_app.app.clone(), "GET", "/v1/leaderboard?limit=1&offset=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["rank"], 2);

    let (status, _) = request(test_app.app.clone(), "GET", "/v1/leaderboard?type=luck").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(test_app.app, "GET", "/v1/leaderboard/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalPlayers"], 2);
    assert_eq!(body["totalActions"], 4);
    assert_eq!(body["totalSteals"], 1);
}

#[tokio::test]
async fn test_property_stats() {
    let test_app = setup_test_app().await;
    seed(&test_app).await;

    let (status, body) = request(test_app.app.clone(), "GET", "/v1/properties/0/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["propertyId"], 0);
    assert_eq!(body["owners"], 2);
    assert_eq!(body["totalSlots"], 3);

    let (status, body) = request(test_app.app.clone(), "GET", "/v1/properties/stats").await;
    assert_eq!(status, StatusCode::OK);
    let all = body.as_array().unwrap();
    assert!(all.len() > 1);
    assert_eq!(all[1]["owners"], 0);

    let (status, _) = request(test_app.app, "GET", "/v1/properties/99/stats").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_player_ranks() {
    let test_app = setup_test_app().await;
    seed(&test_app).await;

    let (status, body) =
        request(test_app.app.clone(), "GET", "/v1/leaderboard/ranks/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wallet"], "alice");
    assert_eq!(body["ranks"]["wealth"], 1);
    assert_eq!(body["ranks"]["combat"], 2);

    let (status, body) = request(test_app.app.clone(), "GET", "/v1/leaderboard/ranks/bob").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ranks"]["combat"], 1);

    let (status, _) = request(test_app.app, "GET", "/v1/leaderboard/ranks/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gap_check_and_stats() {
    let test_app = setup_test_app().await;
    test_app.mock.add_transaction(tx(
        "g1",
        100,
        "RewardsClaimedEvent",
        json!({"player": "carol", "amount": 5}),
    ));

    let (status, body) =
        request(test_app.app.clone(), "POST", "/v1/ingestion/gap-check").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["gapsFound"], 1);
    assert_eq!(body["backfilled"], 1);

    let (status, body) = request(test_app.app, "GET", "/v1/ingestion/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalChecks"], 1);
    assert_eq!(body["totalBackfilled"], 1);
    assert_eq!(body["connected"], false);
    assert!(body["lastGapCheck"].is_number());
}

#[tokio::test]
async fn test_gap_check_failure_is_server_error() {
    let test_app = setup_test_app().await;
    test_app.mock.set_fail_signature_listing(true);

    let (status, body) = request(test_app.app, "POST", "/v1/ingestion/gap-check").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn test_admin_rebuild_and_recalculate() {
    let test_app = setup_test_app().await;
    seed(&test_app).await;
    let (_, before) = request(test_app.app.clone(), "GET", "/v1/players/bob").await;

    let (status, body) = request(test_app.app.clone(), "POST", "/v1/admin/rebuild").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["actions"], 4);
    assert_eq!(body["players"], 2);

    let (status, body) =
        request(test_app.app.clone(), "POST", "/v1/admin/recalculate-scores").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 2);
    assert_eq!(body["failed"], 0);

    let (_, after) = request(test_app.app, "GET", "/v1/players/bob").await;
    assert_eq!(before, after);
}
