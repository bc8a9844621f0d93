use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;

use crate::pipeline::domain::ApplicationStatus;
use crate::pipeline::repository::{ApplyQueue, SubmissionError};
use crate::pipeline::router::pipeline_router;

fn get(path: &str) -> Request<Body> {
    Request::get(path).body(Body::empty()).expect("request")
}

fn post(path: &str) -> Request<Body> {
    Request::post(path).body(Body::empty()).expect("request")
}

#[tokio::test]
async fn status_route_reports_an_idle_pipeline() {
    let harness = harness(permissive_policy());
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(get("/api/v1/pipeline/batch/status"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["phase"], "idle");
    assert_eq!(payload["processed"], 0);
}

#[tokio::test]
async fn start_route_conflicts_while_a_run_is_live() {
    let harness = gated_harness(permissive_policy(), fast_settings());
    harness
        .queue
        .enqueue(vec![queued("job-a", "Globex", 75.0)])
        .expect("enqueue");
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .clone()
        .oneshot(post("/api/v1/pipeline/batch/start"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let processor = harness.processor.clone();
    wait_for("run to pick up the job", || {
        processor.status().current_job.is_some()
    })
    .await;

    let response = router
        .clone()
        .oneshot(post("/api/v1/pipeline/batch/start"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .oneshot(post("/api/v1/pipeline/batch/stop"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    harness.gate.add_permits(1);
    let processor = harness.processor.clone();
    wait_for("run to finish", || processor.status().phase == "idle").await;
}

#[tokio::test]
async fn stop_route_conflicts_when_nothing_is_running() {
    let harness = harness(permissive_policy());
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(post("/api/v1/pipeline/batch/stop"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn policy_routes_read_and_update_the_config() {
    let harness = harness(permissive_policy());
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .clone()
        .oneshot(
            Request::put("/api/v1/pipeline/policy")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "kill_switch": true, "daily_limit": 5 }).to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kill_switch"], true);
    assert_eq!(payload["daily_limit"], 5);
    // Untouched fields survive the partial update.
    assert_eq!(payload["min_match_score"], 0.0);

    let response = router
        .oneshot(get("/api/v1/pipeline/policy"))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    assert_eq!(payload["kill_switch"], true);
}

#[tokio::test]
async fn queue_routes_list_reorder_and_remove() {
    let harness = harness(permissive_policy());
    harness
        .queue
        .enqueue(vec![
            queued("job-a", "Globex", 75.0),
            queued("job-b", "Hooli", 70.0),
        ])
        .expect("enqueue");
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .clone()
        .oneshot(get("/api/v1/pipeline/queue"))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    assert_eq!(payload["queue"].as_array().map(Vec::len), Some(2));

    let response = router
        .clone()
        .oneshot(
            Request::post("/api/v1/pipeline/queue/reorder")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "job_ids": ["job-b", "job-a"] }).to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["queue"][0]["job"]["id"], "job-b");

    let response = router
        .clone()
        .oneshot(
            Request::delete("/api/v1/pipeline/queue/job-a")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::delete("/api/v1/pipeline/queue/job-a")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reorder_route_rejects_unknown_jobs() {
    let harness = harness(permissive_policy());
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(
            Request::post("/api/v1/pipeline/queue/reorder")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "job_ids": ["job-9"] }).to_string()))
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn application_routes_expose_views_audit_and_retry() {
    let harness = harness(permissive_policy());
    harness
        .sink
        .push_outcome(Err(SubmissionError::Timeout));
    harness
        .queue
        .enqueue(vec![queued("job-a", "Globex", 75.0)])
        .expect("enqueue");
    harness
        .processor
        .run_until_idle()
        .await
        .expect("run completes");
    let application = application_for_job(&harness.repository, "job-a");
    assert_eq!(application.status, ApplicationStatus::Failed);

    let router = pipeline_router(harness.processor.clone());

    let response = router
        .clone()
        .oneshot(get("/api/v1/pipeline/applications?status=failed"))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    assert_eq!(payload["applications"].as_array().map(Vec::len), Some(1));

    let response = router
        .clone()
        .oneshot(get("/api/v1/pipeline/applications/summary"))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    assert_eq!(payload["failed_count"], 1);

    let path = format!("/api/v1/pipeline/applications/{}/audit", application.id.0);
    let response = router
        .clone()
        .oneshot(get(&path))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert!(!payload["events"].as_array().expect("events").is_empty());

    let path = format!("/api/v1/pipeline/applications/{}/retry", application.id.0);
    let response = router
        .clone()
        .oneshot(post(&path))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "queued");

    // A second retry finds the application back in `queued`.
    let response = router
        .oneshot(post(&path))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_application_routes_return_not_found() {
    let harness = harness(permissive_policy());
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .clone()
        .oneshot(get("/api/v1/pipeline/applications/app-none"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(get("/api/v1/pipeline/applications/app-none/audit"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
