use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicationId, JobId};
use super::policy::PolicyUpdate;
use super::processor::{BatchProcessor, PipelineError};
use super::repository::{
    ApplicationRepository, ApplyQueue, FactStore, QueueError, RepositoryError, SubmissionSink,
};
use super::tracker::ApplicationFilter;

/// Router builder exposing the pipeline's control surface.
pub fn pipeline_router<Q, R, S, F>(processor: Arc<BatchProcessor<Q, R, S, F>>) -> Router
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    Router::new()
        .route("/api/v1/pipeline/batch/start", post(start_batch::<Q, R, S, F>))
        .route("/api/v1/pipeline/batch/stop", post(stop_batch::<Q, R, S, F>))
        .route("/api/v1/pipeline/batch/status", get(batch_status::<Q, R, S, F>))
        .route("/api/v1/pipeline/queue", get(queue_entries::<Q, R, S, F>))
        .route(
            "/api/v1/pipeline/queue/reorder",
            post(reorder_queue::<Q, R, S, F>),
        )
        .route(
            "/api/v1/pipeline/queue/:job_id",
            delete(remove_queued::<Q, R, S, F>),
        )
        .route("/api/v1/pipeline/policy", get(show_policy::<Q, R, S, F>))
        .route("/api/v1/pipeline/policy", put(update_policy::<Q, R, S, F>))
        .route(
            "/api/v1/pipeline/applications",
            get(list_applications::<Q, R, S, F>),
        )
        .route(
            "/api/v1/pipeline/applications/summary",
            get(tracker_summary::<Q, R, S, F>),
        )
        .route(
            "/api/v1/pipeline/applications/:application_id",
            get(show_application::<Q, R, S, F>),
        )
        .route(
            "/api/v1/pipeline/applications/:application_id/retry",
            post(retry_application::<Q, R, S, F>),
        )
        .route(
            "/api/v1/pipeline/applications/:application_id/audit",
            get(audit_trail::<Q, R, S, F>),
        )
        .with_state(processor)
}

fn error_response(err: PipelineError) -> Response {
    let status = match &err {
        PipelineError::AlreadyRunning
        | PipelineError::NotRunning
        | PipelineError::NotRetryable(_) => StatusCode::CONFLICT,
        PipelineError::ApplicationNotFound
        | PipelineError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        PipelineError::Queue(QueueError::UnknownJob(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Transition(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, axum::Json(json!({ "error": err.to_string() }))).into_response()
}

async fn start_batch<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    match processor.start() {
        Ok(()) => (
            StatusCode::ACCEPTED,
            axum::Json(json!({ "status": "started" })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn stop_batch<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    match processor.stop() {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(json!({ "status": "stopping" })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn batch_status<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    axum::Json(processor.status()).into_response()
}

async fn queue_entries<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    match processor.queue().list() {
        Ok(entries) => axum::Json(json!({ "queue": entries })).into_response(),
        Err(err) => error_response(PipelineError::Queue(err)),
    }
}

#[derive(Debug, Deserialize)]
struct ReorderRequest {
    job_ids: Vec<JobId>,
}

async fn reorder_queue<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
    axum::Json(request): axum::Json<ReorderRequest>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    match processor.queue().reorder(&request.job_ids) {
        Ok(entries) => axum::Json(json!({ "queue": entries })).into_response(),
        Err(err) => error_response(PipelineError::Queue(err)),
    }
}

async fn remove_queued<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
    Path(job_id): Path<String>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    match processor.queue().remove(&JobId(job_id.clone())) {
        Ok(true) => axum::Json(json!({ "removed": job_id })).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "error": format!("job '{job_id}' is not in the queue") })),
        )
            .into_response(),
        Err(err) => error_response(PipelineError::Queue(err)),
    }
}

async fn show_policy<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    axum::Json(processor.policy()).into_response()
}

async fn update_policy<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
    axum::Json(update): axum::Json<PolicyUpdate>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    axum::Json(processor.update_policy(update)).into_response()
}

async fn list_applications<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
    Query(filter): Query<ApplicationFilter>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    match processor.applications(&filter) {
        Ok(views) => axum::Json(json!({ "applications": views })).into_response(),
        Err(err) => error_response(err),
    }
}

async fn tracker_summary<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    match processor.tracker_summary() {
        Ok(summary) => axum::Json(summary).into_response(),
        Err(err) => error_response(err),
    }
}

async fn show_application<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
    Path(application_id): Path<String>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    match processor.application(&ApplicationId(application_id)) {
        Ok(application) => axum::Json(application).into_response(),
        Err(err) => error_response(err),
    }
}

async fn retry_application<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
    Path(application_id): Path<String>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    match processor.retry(&ApplicationId(application_id)) {
        Ok(view) => (StatusCode::ACCEPTED, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn audit_trail<Q, R, S, F>(
    State(processor): State<Arc<BatchProcessor<Q, R, S, F>>>,
    Path(application_id): Path<String>,
) -> Response
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    match processor.audit_trail(&ApplicationId(application_id)) {
        Ok(events) => axum::Json(json!({ "events": events })).into_response(),
        Err(err) => error_response(err),
    }
}
