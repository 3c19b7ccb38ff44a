#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, http::StatusCode, test, web};
use assert_json_diff::{assert_json_eq, assert_json_include};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePool;
use tokio_util::sync::CancellationToken;

use psjudge::config::{JudgeConfig, Language, MilliSecond, Settings, ToolchainConfig};
use psjudge::database as db;
use psjudge::progress::ProgressBoard;
use psjudge::queue::JobQueue;
use psjudge::routes::{configure, json_error_handler};
use psjudge::worker::worker;

const SHELL_AB: &str = "read a b\necho $((a + b))";

// Everything the server shares, backed by a throwaway database
struct TestState {
    _dir: tempfile::TempDir,
    settings: Arc<Settings>,
    db_pool: Arc<SqlitePool>,
    queue: Arc<JobQueue>,
    board: Arc<ProgressBoard>,
    shutdown: CancellationToken,
}

impl TestState {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_pool = db::init_db(dir.path().join("test.sqlite3")).await.unwrap();

        let mut toolchains = ToolchainConfig::default();
        toolchains.set(Language::Python, "/bin/sh");
        let judge = JudgeConfig {
            time_limit: MilliSecond(2_000),
            compile_time_limit: MilliSecond(5_000),
        };

        Self {
            _dir: dir,
            settings: Arc::new(Settings::new(toolchains, judge)),
            db_pool: Arc::new(db_pool),
            queue: Arc::new(JobQueue::new()),
            board: Arc::new(ProgressBoard::new()),
            shutdown: CancellationToken::new(),
        }
    }

    fn spawn_worker(&self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(worker(
            self.settings.clone(),
            self.db_pool.clone(),
            self.queue.clone(),
            self.board.clone(),
            self.shutdown.child_token(),
        ))
    }
}

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from($state.settings.clone()))
                .app_data(web::Data::from($state.db_pool.clone()))
                .app_data(web::Data::from($state.queue.clone()))
                .app_data(web::Data::from($state.board.clone()))
                .app_data(web::Data::new($state.shutdown.clone()))
                .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                .configure(configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_get_settings() {
    let state = TestState::new().await;
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/settings").to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    assert_json_eq!(
        resp,
        json!({ "cpp": "g++", "python": "/bin/sh", "java": "javac" })
    );
}

#[actix_web::test]
async fn test_put_settings_is_applied_and_stored() {
    let state = TestState::new().await;
    let app = init_app!(state);

    let body = json!({ "cpp": "/opt/gcc/bin/g++", "python": "/usr/bin/python3", "java": "/opt/jdk/bin/javac" });
    let req = test::TestRequest::put()
        .uri("/settings")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/settings").to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_json_eq!(resp, body);

    let stored = db::load_toolchains(state.db_pool.clone()).await.unwrap().unwrap();
    assert_eq!(stored.get(Language::Java), "/opt/jdk/bin/javac");
}

#[actix_web::test]
async fn test_put_settings_rejects_blank_path() {
    let state = TestState::new().await;
    let app = init_app!(state);

    let req = test::TestRequest::put()
        .uri("/settings")
        .set_json(json!({ "cpp": "g++", "python": "  ", "java": "javac" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_json_include!(
        actual: body,
        expected: json!({ "reason": "ERR_INVALID_ARGUMENT", "code": 1 })
    );

    // Nothing changed
    assert_eq!(state.settings.toolchains().get(Language::Python), "/bin/sh");
    assert_eq!(db::load_toolchains(state.db_pool.clone()).await.unwrap(), None);
}

#[actix_web::test]
async fn test_malformed_body_is_bad_request() {
    let state = TestState::new().await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/run")
        .insert_header(("content-type", "application/json"))
        .set_payload("{ not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_INVALID_ARGUMENT");
}

#[actix_web::test]
async fn test_run_single_program() {
    let state = TestState::new().await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/run")
        .set_json(json!({ "language": "python", "code": SHELL_AB, "input": "10 20" }))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    assert_json_eq!(
        resp,
        json!({
            "success": true,
            "stdout": "30\n",
            "stderr": "",
            "code": 0,
            "timed_out": false
        })
    );
}

#[actix_web::test]
async fn test_run_unsupported_language() {
    let state = TestState::new().await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/run")
        .set_json(json!({ "language": "cobol", "code": "DISPLAY 'HI'." }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Unsupported language: cobol");
}

#[actix_web::test]
async fn test_blocking_judge_end_to_end() {
    let state = TestState::new().await;
    let _worker = state.spawn_worker();
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/judge?blocking=true")
        .set_json(json!({
            "language": "python",
            "sourceCode": SHELL_AB,
            "testCases": [
                { "id": 1, "input": "10 20", "expectedOutput": "30" },
                { "id": 2, "input": "2 2", "expectedOutput": "5" }
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_json_include!(
        actual: body,
        expected: json!({
            "status": "Finished",
            "testCases": [
                { "id": 1, "status": "correct", "actualOutput": "30\n" },
                { "id": 2, "status": "wrong", "actualOutput": "4\n" }
            ]
        })
    );

    // The board and the stored session follow the finished run
    let req = test::TestRequest::get().uri("/judge").to_request();
    let snapshot: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(snapshot["runId"], body["runId"]);
    assert_eq!(snapshot["testCases"], body["testCases"]);

    let req = test::TestRequest::get().uri("/session").to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(session["testCases"], body["testCases"]);
    // Verdicts are stored with the code that produced them
    assert_eq!(session["language"], "python");
    assert_eq!(session["codes"]["python"], SHELL_AB);

    state.shutdown.cancel();
}

#[actix_web::test]
async fn test_blocking_judge_without_toolchain() {
    let state = TestState::new().await;
    let mut toolchains = state.settings.toolchains();
    toolchains.set(Language::Python, "");
    state.settings.set_toolchains(toolchains);
    let _worker = state.spawn_worker();
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/judge?blocking=true")
        .set_json(json!({
            "language": "python",
            "sourceCode": SHELL_AB,
            "testCases": [{ "id": 1, "input": "10 20", "expectedOutput": "30" }]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "No toolchain configured for python");

    // The accepted run does not linger as waiting on the board
    let req = test::TestRequest::get().uri("/judge").to_request();
    let snapshot: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(snapshot["status"], "Finished");
    assert_eq!(snapshot["testCases"][0]["status"], "error");

    state.shutdown.cancel();
}

#[actix_web::test]
async fn test_background_judge_is_polled() {
    let state = TestState::new().await;
    let _worker = state.spawn_worker();
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/judge")
        .set_json(json!({
            "language": "py",
            "sourceCode": SHELL_AB,
            "testCases": [{ "id": 1, "input": "1 2", "expectedOutput": "3" }]
        }))
        .to_request();
    let accepted: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(accepted["status"], "Running");
    assert_eq!(accepted["testCases"][0]["status"], "waiting");

    let mut snapshot = Value::Null;
    for _ in 0..100 {
        let req = test::TestRequest::get().uri("/judge").to_request();
        snapshot = test::call_and_read_body_json(&app, req).await;
        if snapshot["runId"] == accepted["runId"] && snapshot["status"] == "Finished" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(snapshot["status"], "Finished");
    assert_eq!(snapshot["testCases"][0]["status"], "correct");

    state.shutdown.cancel();
}

#[actix_web::test]
async fn test_judge_rejects_unknown_language() {
    let state = TestState::new().await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/judge?blocking=true")
        .set_json(json!({
            "language": "brainfuck",
            "sourceCode": "+++",
            "testCases": []
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_cancel_unknown_run() {
    let state = TestState::new().await;
    let app = init_app!(state);

    let req = test::TestRequest::delete().uri("/judge/42").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_cancel_queued_run() {
    // No worker: the run stays queued until it is removed
    let state = TestState::new().await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/judge")
        .set_json(json!({
            "language": "python",
            "sourceCode": SHELL_AB,
            "testCases": [{ "id": 1, "input": "1 2", "expectedOutput": "3" }]
        }))
        .to_request();
    let accepted: Value = test::call_and_read_body_json(&app, req).await;
    let run_id = accepted["runId"].as_u64().unwrap();

    let req = test::TestRequest::delete()
        .uri(&format!("/judge/{run_id}"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/judge").to_request();
    let snapshot: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(snapshot["runId"], run_id);
    assert_eq!(snapshot["status"], "Finished");
    assert_eq!(snapshot["testCases"][0]["actualOutput"], "Error: Run cancelled");

    let req = test::TestRequest::delete()
        .uri(&format!("/judge/{run_id}"))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[actix_web::test]
async fn test_accepted_run_replaces_previous_snapshot() {
    // No worker, so only the route itself can have published
    let state = TestState::new().await;
    let mut old = psjudge::judge::TestCase::seed();
    old.status = psjudge::judge::CaseStatus::Correct;
    state.board.publish(100, &[old]);
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/judge")
        .set_json(json!({
            "language": "python",
            "sourceCode": SHELL_AB,
            "testCases": [{ "id": 1, "input": "1 2", "expectedOutput": "3", "status": "correct" }]
        }))
        .to_request();
    let accepted: Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::get().uri("/judge").to_request();
    let snapshot: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(snapshot["runId"], accepted["runId"]);
    assert_eq!(snapshot["status"], "Running");
    assert_eq!(snapshot["testCases"][0]["status"], "waiting");
}

#[actix_web::test]
async fn test_timestamp_case_ids_are_accepted() {
    let state = TestState::new().await;
    let _worker = state.spawn_worker();
    let app = init_app!(state);

    let session = json!({
        "language": "python",
        "codes": { "python": SHELL_AB },
        "testCases": [{ "id": 1734567890123_u64, "input": "4 5", "expectedOutput": "9" }]
    });
    let req = test::TestRequest::put()
        .uri("/session")
        .set_json(&session)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/judge?blocking=true")
        .set_json(json!({
            "language": "python",
            "sourceCode": SHELL_AB,
            "testCases": session["testCases"]
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["testCases"][0]["id"], 1734567890123_u64);
    assert_eq!(body["testCases"][0]["status"], "correct");

    let req = test::TestRequest::get().uri("/session").to_request();
    let stored: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stored["testCases"][0]["id"], 1734567890123_u64);

    state.shutdown.cancel();
}

#[actix_web::test]
async fn test_session_defaults_and_updates() {
    let state = TestState::new().await;
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/session").to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(session["language"], "cpp");
    assert_json_eq!(
        session["testCases"],
        json!([{
            "id": 1,
            "input": "10 20",
            "expectedOutput": "30",
            "actualOutput": "",
            "status": "idle"
        }])
    );
    assert!(
        session["codes"]["java"]
            .as_str()
            .unwrap()
            .contains("public class Main")
    );

    let updated = json!({
        "language": "python",
        "codes": { "python": "print(1)" },
        "testCases": []
    });
    let req = test::TestRequest::put()
        .uri("/session")
        .set_json(&updated)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/session").to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(session["language"], "python");
    assert_eq!(session["codes"]["python"], "print(1)");
    // Languages missing from the stored session get their template back
    assert!(session["codes"]["cpp"].as_str().unwrap().contains("#include"));
}

#[actix_web::test]
async fn test_internal_exit_requests_shutdown() {
    let state = TestState::new().await;
    let app = init_app!(state);

    let req = test::TestRequest::post().uri("/internal/exit").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(state.shutdown.is_cancelled());
}
