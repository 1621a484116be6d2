//! Collection runner end-to-end behaviour

mod common;

use std::time::Duration;
use uuid::Uuid;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use courier_service::error::Error;
use courier_service::identity::CallerIdentity;
use courier_service::model::{AuthType, HttpMethod, RunResult, RunStatus};
use courier_service::pagination::PageParams;
use courier_service::runner::StartRunRequest;
use courier_service::state::AppState;

fn start_request(collection_id: Uuid) -> StartRunRequest {
    StartRunRequest {
        collection_id,
        environment_id: None,
        iteration_count: 1,
        delay_between_requests_ms: 0,
        data_filename: None,
        data_content: None,
        save_to_history: false,
    }
}

async fn wait_terminal(state: &AppState, run_id: Uuid, identity: &CallerIdentity) -> RunResult {
    for _ in 0..600 {
        let run = state.runner.get(run_id, identity).await.unwrap();
        if run.status.is_terminal() {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("run {run_id} did not reach a terminal state");
}

#[tokio::test]
async fn test_run_executes_every_request_per_iteration_with_assertions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let state = common::state();
    let identity = common::identity();

    let collection = common::collection(identity.team_id, "smoke");
    state.repos.collections.save(collection.clone()).await.unwrap();
    let folder = common::folder(collection.id, None, "root", 0);
    state.repos.folders.save(folder.clone()).await.unwrap();

    for (i, name) in ["list", "detail", "search"].iter().enumerate() {
        let mut request = common::request(
            folder.id,
            name,
            HttpMethod::Get,
            &format!("{}/{}", server.uri(), name),
        );
        request.sort_order = i as i32;
        request.scripts = vec![common::post_response_script(
            "pm.test(\"200\", || pm.expect(pm.response.code).to.equal(200));",
        )];
        state.repos.requests.save(request).await.unwrap();
    }

    let run = state
        .runner
        .start(
            StartRunRequest {
                iteration_count: 2,
                ..start_request(collection.id)
            },
            identity.clone(),
        )
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Pending);

    let finished = wait_terminal(&state, run.id, &identity).await;
    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.total_requests, 6);
    assert_eq!(finished.passed_requests, 6);
    assert_eq!(finished.failed_requests, 0);
    assert_eq!(finished.total_assertions, 6);
    assert_eq!(finished.passed_assertions, 6);
    assert_eq!(finished.failed_assertions, 0);
    assert!(finished.completed_at.is_some());

    let iterations = state
        .runner
        .iterations(run.id, &identity, PageParams::default())
        .await
        .unwrap();
    assert_eq!(iterations.total, 6);
    assert!(iterations.items.iter().all(|i| i.passed));
    // Strictly sequential and deterministic: sort order within iteration
    let names: Vec<&str> = iterations.items[..3]
        .iter()
        .map(|i| i.request_name.as_str())
        .collect();
    assert_eq!(names, vec!["list", "detail", "search"]);
}

#[tokio::test]
async fn test_inherited_auth_reaches_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("Authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let state = common::state();
    let identity = common::identity();

    let mut collection = common::collection(identity.team_id, "auth");
    collection.auth_type = Some(AuthType::BearerToken);
    collection.auth_config = Some(serde_json::json!({"token": "abc"}));
    state.repos.collections.save(collection.clone()).await.unwrap();

    let mut folder = common::folder(collection.id, None, "root", 0);
    folder.auth_type = common::inherit_auth();
    state.repos.folders.save(folder.clone()).await.unwrap();

    let mut request = common::request(
        folder.id,
        "secure",
        HttpMethod::Get,
        &format!("{}/secure", server.uri()),
    );
    request.auth_type = common::inherit_auth();
    state.repos.requests.save(request).await.unwrap();

    let run = state
        .runner
        .start(start_request(collection.id), identity.clone())
        .await
        .unwrap();
    let finished = wait_terminal(&state, run.id, &identity).await;
    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.passed_requests, 1);
}

#[tokio::test]
async fn test_cancellation_stops_between_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let state = common::state();
    let identity = common::identity();

    let collection = common::collection(identity.team_id, "cancel-me");
    state.repos.collections.save(collection.clone()).await.unwrap();
    let folder = common::folder(collection.id, None, "root", 0);
    state.repos.folders.save(folder.clone()).await.unwrap();
    let request = common::request(
        folder.id,
        "ping",
        HttpMethod::Get,
        &format!("{}/ping", server.uri()),
    );
    state.repos.requests.save(request).await.unwrap();

    let run = state
        .runner
        .start(
            StartRunRequest {
                iteration_count: 10,
                delay_between_requests_ms: 1_000,
                ..start_request(collection.id)
            },
            identity.clone(),
        )
        .await
        .unwrap();

    // Let three iterations land, then cancel during the inter-request sleep
    loop {
        let current = state.runner.get(run.id, &identity).await.unwrap();
        if current.total_requests >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    state.runner.cancel(run.id, &identity).await.unwrap();

    let finished = wait_terminal(&state, run.id, &identity).await;
    assert_eq!(finished.status, RunStatus::Cancelled);
    assert!(finished.completed_at.is_some());
    assert_eq!(finished.total_requests, 3);

    let iterations = state
        .runner
        .iterations(run.id, &identity, PageParams::default())
        .await
        .unwrap();
    assert_eq!(iterations.total, 3);
}

#[tokio::test]
async fn test_data_file_rows_drive_iterations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/alice"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/bob"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let state = common::state();
    let identity = common::identity();

    let collection = common::collection(identity.team_id, "data-driven");
    state.repos.collections.save(collection.clone()).await.unwrap();
    let folder = common::folder(collection.id, None, "root", 0);
    state.repos.folders.save(folder.clone()).await.unwrap();
    let request = common::request(
        folder.id,
        "user",
        HttpMethod::Get,
        &format!("{}/users/{{{{name}}}}", server.uri()),
    );
    state.repos.requests.save(request).await.unwrap();

    let run = state
        .runner
        .start(
            StartRunRequest {
                iteration_count: 2,
                data_filename: Some("users.csv".to_string()),
                data_content: Some("name\nalice\nbob\n".to_string()),
                ..start_request(collection.id)
            },
            identity.clone(),
        )
        .await
        .unwrap();

    let finished = wait_terminal(&state, run.id, &identity).await;
    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.passed_requests, 2);
    assert_eq!(finished.data_filename.as_deref(), Some("users.csv"));
}

#[tokio::test]
async fn test_locals_set_by_scripts_flow_to_later_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/seed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/from-script"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let state = common::state();
    let identity = common::identity();

    let collection = common::collection(identity.team_id, "chained");
    state.repos.collections.save(collection.clone()).await.unwrap();
    let folder = common::folder(collection.id, None, "root", 0);
    state.repos.folders.save(folder.clone()).await.unwrap();

    let mut first = common::request(
        folder.id,
        "seed",
        HttpMethod::Get,
        &format!("{}/seed", server.uri()),
    );
    first.sort_order = 0;
    first.scripts = vec![common::pre_request_script(
        "pm.variables.set(\"nextPath\", \"from-script\");",
    )];
    state.repos.requests.save(first).await.unwrap();

    let mut second = common::request(
        folder.id,
        "follow",
        HttpMethod::Get,
        &format!("{}/{{{{nextPath}}}}", server.uri()),
    );
    second.sort_order = 1;
    state.repos.requests.save(second).await.unwrap();

    let run = state
        .runner
        .start(start_request(collection.id), identity.clone())
        .await
        .unwrap();
    let finished = wait_terminal(&state, run.id, &identity).await;
    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.passed_requests, 2);
}

#[tokio::test]
async fn test_script_error_fails_the_request_but_not_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let state = common::state();
    let identity = common::identity();

    let collection = common::collection(identity.team_id, "flaky-scripts");
    state.repos.collections.save(collection.clone()).await.unwrap();
    let folder = common::folder(collection.id, None, "root", 0);
    state.repos.folders.save(folder.clone()).await.unwrap();

    let mut broken = common::request(
        folder.id,
        "broken",
        HttpMethod::Get,
        &format!("{}/a", server.uri()),
    );
    broken.sort_order = 0;
    broken.scripts = vec![common::post_response_script("no_such_function();")];
    state.repos.requests.save(broken).await.unwrap();

    let mut fine = common::request(
        folder.id,
        "fine",
        HttpMethod::Get,
        &format!("{}/b", server.uri()),
    );
    fine.sort_order = 1;
    state.repos.requests.save(fine).await.unwrap();

    let run = state
        .runner
        .start(start_request(collection.id), identity.clone())
        .await
        .unwrap();
    let finished = wait_terminal(&state, run.id, &identity).await;

    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.total_requests, 2);
    assert_eq!(finished.failed_requests, 1);
    assert_eq!(finished.passed_requests, 1);

    let iterations = state
        .runner
        .iterations(run.id, &identity, PageParams::default())
        .await
        .unwrap();
    let broken_record = iterations
        .items
        .iter()
        .find(|i| i.request_name == "broken")
        .unwrap();
    assert!(!broken_record.passed);
    assert!(broken_record.error.is_some());
}

#[tokio::test]
async fn test_iteration_count_bounds_are_validated() {
    let state = common::state();
    let identity = common::identity();
    let collection = common::collection(identity.team_id, "bounds");
    state.repos.collections.save(collection.clone()).await.unwrap();

    for count in [0, 1_001] {
        let err = state
            .runner
            .start(
                StartRunRequest {
                    iteration_count: count,
                    ..start_request(collection.id)
                },
                identity.clone(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "count {count}");
    }

    let err = state
        .runner
        .start(
            StartRunRequest {
                delay_between_requests_ms: 60_001,
                ..start_request(collection.id)
            },
            identity.clone(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_foreign_team_collection_is_forbidden() {
    let state = common::state();
    let identity = common::identity();
    let foreign = common::collection(Uuid::new_v4(), "not-yours");
    state.repos.collections.save(foreign.clone()).await.unwrap();

    let err = state
        .runner
        .start(start_request(foreign.id), identity)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
}

#[tokio::test]
async fn test_startup_sweep_fails_orphaned_runs() {
    let state = common::state();
    let identity = common::identity();

    let mut orphan = RunResult::pending(
        identity.team_id,
        Uuid::new_v4(),
        None,
        5,
        0,
        None,
        identity.user_id,
    );
    orphan.status = RunStatus::Running;
    orphan.started_at = Some(chrono::Utc::now() - chrono::Duration::hours(3));
    state.repos.runs.create(orphan.clone()).await.unwrap();

    let swept = state.runner.sweep_orphans().await.unwrap();
    assert_eq!(swept, 1);

    let failed = state.runner.get(orphan.id, &identity).await.unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert!(failed.orphaned);
    assert!(failed.completed_at.is_some());

    // A second sweep finds nothing
    assert_eq!(state.runner.sweep_orphans().await.unwrap(), 0);
}
