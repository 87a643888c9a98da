//! CI endpoint tests over the fake GitHub gateway

use axum::http::{Method, StatusCode};
use chrono::Duration;
use sea_orm::EntityTrait;

mod common;
use common::{build_test_app, signed_in_user};

use deploygate::models::prelude::*;
use deploygate::services::deployment;
use deploygate::services::tunnel::TunnelAction;

#[tokio::test]
async fn test_latest_user_run_finds_newest_match() {
    let app = build_test_app().await;
    let (_, cookie) = signed_in_user(&app, "ada").await;
    app.ci.add_run(10, 1, "completed", &["deploy-ada"]);
    app.ci.add_run(11, 2, "in_progress", &["deploy-bob"]);
    app.ci.add_run(12, 3, "in_progress", &["build", "deploy-ada"]);

    let (status, _, body) = app
        .send(Method::GET, "/git/latest-user-run?logicalUsername=ada", Some(&cookie), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["runId"], 12);
    assert_eq!(body["jobName"], "deploy-ada");
    assert_eq!(body["status"], "in_progress");
}

#[tokio::test]
async fn test_latest_user_run_not_found() {
    let app = build_test_app().await;
    let (_, cookie) = signed_in_user(&app, "ada").await;
    app.ci.add_run(10, 1, "completed", &["deploy-bob"]);

    let (status, _, _) = app
        .send(Method::GET, "/git/latest-user-run?logicalUsername=carol", Some(&cookie), None)
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_latest_user_run_requires_param() {
    let app = build_test_app().await;
    let (_, cookie) = signed_in_user(&app, "ada").await;

    for uri in ["/git/latest-user-run", "/git/latest-user-run?logicalUsername=%20"] {
        let (status, _, _) = app.send(Method::GET, uri, Some(&cookie), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[tokio::test]
async fn test_in_progress_run_attaches_to_active_deployment() {
    let app = build_test_app().await;
    let (user, cookie) = signed_in_user(&app, "ada").await;
    deployment::record_start(app.db(), user.id, 2, app.clock_now()).await.unwrap();
    app.ci.add_run(50, 5, "in_progress", &["deploy-ada"]);

    let (status, _, _) = app
        .send(Method::GET, "/git/latest-user-run?logicalUsername=ada", Some(&cookie), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let stored = User::find_by_id(user.id).one(app.db()).await.unwrap().unwrap();
    assert_eq!(stored.active_run_id, Some(50));
}

#[tokio::test]
async fn test_new_start_takes_the_next_run() {
    let app = build_test_app().await;
    let (user, cookie) = signed_in_user(&app, "ada").await;
    deployment::record_start(app.db(), user.id, 1, app.clock_now()).await.unwrap();
    app.ci.add_run(50, 5, "in_progress", &["deploy-ada"]);

    app.send(Method::GET, "/git/latest-user-run?logicalUsername=ada", Some(&cookie), None)
        .await;
    let stored = User::find_by_id(user.id).one(app.db()).await.unwrap().unwrap();
    assert_eq!(stored.active_run_id, Some(50));

    let (status, _, _) = app
        .send(
            Method::POST,
            "/deploy/action",
            Some(&cookie),
            Some(serde_json::json!({"action": "start", "formNumber": 4})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let stored = User::find_by_id(user.id).one(app.db()).await.unwrap().unwrap();
    assert_eq!(stored.active_form_number, Some(4));
    assert!(stored.active_run_id.is_none());

    app.ci.add_run(51, 6, "in_progress", &["deploy-ada"]);
    let (status, _, body) = app
        .send(Method::GET, "/git/latest-user-run?logicalUsername=ada", Some(&cookie), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["runId"], 51);

    let stored = User::find_by_id(user.id).one(app.db()).await.unwrap().unwrap();
    assert_eq!(stored.active_run_id, Some(51));
}

#[tokio::test]
async fn test_latest_user_run_over_stale_deployment() {
    let app = build_test_app().await;
    let (user, cookie) = signed_in_user(&app, "ada").await;
    deployment::record_start(app.db(), user.id, 2, app.clock_now()).await.unwrap();
    app.ci.add_run(50, 5, "in_progress", &["deploy-ada"]);
    app.clock.advance(Duration::minutes(61));

    let (status, _, body) = app
        .send(Method::GET, "/git/latest-user-run?logicalUsername=ada", Some(&cookie), None)
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["autoUndeployed"], true);
    let calls = app.tunnel.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].action, TunnelAction::Stop);

    let stored = User::find_by_id(user.id).one(app.db()).await.unwrap().unwrap();
    assert!(stored.deploy_timestamp.is_none());
    assert!(stored.active_run_id.is_none());
}

#[tokio::test]
async fn test_completed_run_is_not_attached() {
    let app = build_test_app().await;
    let (user, cookie) = signed_in_user(&app, "ada").await;
    deployment::record_start(app.db(), user.id, 2, app.clock_now()).await.unwrap();
    app.ci.add_run(50, 5, "completed", &["deploy-ada"]);

    app.send(Method::GET, "/git/latest-user-run?logicalUsername=ada", Some(&cookie), None)
        .await;

    let stored = User::find_by_id(user.id).one(app.db()).await.unwrap().unwrap();
    assert!(stored.active_run_id.is_none());
}

#[tokio::test]
async fn test_run_is_not_attached_without_deployment() {
    let app = build_test_app().await;
    let (user, cookie) = signed_in_user(&app, "ada").await;
    app.ci.add_run(50, 5, "queued", &["deploy-ada"]);

    app.send(Method::GET, "/git/latest-user-run?logicalUsername=ada", Some(&cookie), None)
        .await;

    let stored = User::find_by_id(user.id).one(app.db()).await.unwrap().unwrap();
    assert!(stored.active_run_id.is_none());
}

#[tokio::test]
async fn test_workflow_dispatch_sends_username() {
    let app = build_test_app().await;
    let (_, cookie) = signed_in_user(&app, "ada").await;

    let (status, _, body) = app
        .send(
            Method::POST,
            "/git/workflow-dispatch",
            Some(&cookie),
            Some(serde_json::json!({"username": "ada"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Workflow dispatched");
    assert_eq!(
        app.ci.dispatched.lock().clone(),
        vec![serde_json::json!({"username": "ada"})]
    );
}

#[tokio::test]
async fn test_workflow_dispatch_rejects_empty_username() {
    let app = build_test_app().await;
    let (_, cookie) = signed_in_user(&app, "ada").await;

    let (status, _, _) = app
        .send(
            Method::POST,
            "/git/workflow-dispatch",
            Some(&cookie),
            Some(serde_json::json!({"username": "  "})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.ci.dispatched.lock().is_empty());
}

#[tokio::test]
async fn test_list_runs() {
    let app = build_test_app().await;
    let (_, cookie) = signed_in_user(&app, "ada").await;
    app.ci.add_run(1, 1, "completed", &[]);
    app.ci.add_run(2, 2, "queued", &[]);

    let (status, _, body) = app.send(Method::GET, "/git/runs", Some(&cookie), None).await;

    assert_eq!(status, StatusCode::OK);
    let runs = body.as_array().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0]["id"], 2);
}

#[tokio::test]
async fn test_git_routes_require_session() {
    let app = build_test_app().await;

    for (method, uri) in [
        (Method::GET, "/git/latest-user-run?logicalUsername=ada"),
        (Method::GET, "/git/runs"),
    ] {
        let (status, _, _) = app.send(method, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
    }
}
