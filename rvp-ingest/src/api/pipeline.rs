//! Pipeline control handlers
//!
//! POST /pipeline/start, POST /pipeline/stop, GET /pipeline/status,
//! GET /pipeline/results, failure retry/dismiss, PUT /pipeline/merge

use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiResult,
    models::{PageId, ScoredRecord},
    pipeline::{FailureRecord, PipelineStatus},
    AppState,
};

/// POST /pipeline/start request
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    /// Days of history to keep; configured default when absent
    #[serde(default)]
    pub duration_in_days: Option<u32>,
    /// Worker count; configured default when absent
    #[serde(default)]
    pub concurrency: Option<usize>,
}

/// POST /pipeline/start response
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub run_id: Uuid,
    pub duration_in_days: u32,
    pub concurrency: usize,
}

/// POST /pipeline/stop response
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub run_id: Option<Uuid>,
    pub stopping: bool,
}

/// PUT /pipeline/merge request
#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub merge: bool,
}

/// PUT /pipeline/merge response
#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub merge: bool,
}

/// GET /pipeline/results response
#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub total: usize,
    pub records: Vec<ScoredRecord>,
}

/// POST /pipeline/start
///
/// Launches the workers in the background and returns immediately.
pub async fn start_pipeline(
    State(state): State<AppState>,
    body: Option<Json<StartRequest>>,
) -> ApiResult<Json<StartResponse>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let config = state.controller.config();
    let duration_in_days = request
        .duration_in_days
        .unwrap_or(config.default_duration_days);
    let concurrency = request.concurrency.unwrap_or(config.concurrency);

    let run_id = match state
        .controller
        .start(duration_in_days, Some(concurrency))
        .await
    {
        Ok(run_id) => run_id,
        Err(e) => {
            state.record_error(&e).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        run_id = %run_id,
        duration_in_days,
        concurrency,
        "Pipeline run started via API"
    );

    Ok(Json(StartResponse {
        run_id,
        duration_in_days,
        concurrency,
    }))
}

/// POST /pipeline/stop
pub async fn stop_pipeline(State(state): State<AppState>) -> ApiResult<Json<StopResponse>> {
    state.controller.stop().await?;
    let run_id = state
        .controller
        .run_state()
        .await
        .map(|run| run.run_id());

    Ok(Json(StopResponse {
        run_id,
        stopping: true,
    }))
}

/// GET /pipeline/status
pub async fn get_status(State(state): State<AppState>) -> Json<PipelineStatus> {
    Json(state.controller.status().await)
}

/// GET /pipeline/results
pub async fn get_results(State(state): State<AppState>) -> Json<ResultsResponse> {
    let records = state.controller.results().await;
    Json(ResultsResponse {
        total: records.len(),
        records,
    })
}

/// POST /pipeline/failures/:page/retry
pub async fn retry_failure(
    State(state): State<AppState>,
    Path(page): Path<u64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.controller.retry_page(PageId::new(page)).await?;
    Ok(Json(serde_json::json!({ "page": page, "retrying": true })))
}

/// DELETE /pipeline/failures/:page
pub async fn dismiss_failure(
    State(state): State<AppState>,
    Path(page): Path<u64>,
) -> ApiResult<Json<FailureRecord>> {
    let record = state.controller.dismiss_failure(PageId::new(page)).await?;
    Ok(Json(record))
}

/// PUT /pipeline/merge
pub async fn set_merge(
    State(state): State<AppState>,
    Json(request): Json<MergeRequest>,
) -> Json<MergeResponse> {
    state.controller.set_merge_preference(request.merge).await;
    Json(MergeResponse {
        merge: state.controller.merge_preference(),
    })
}

/// Build pipeline control routes
pub fn pipeline_routes() -> Router<AppState> {
    Router::new()
        .route("/pipeline/start", post(start_pipeline))
        .route("/pipeline/stop", post(stop_pipeline))
        .route("/pipeline/status", get(get_status))
        .route("/pipeline/results", get(get_results))
        .route("/pipeline/failures/:page/retry", post(retry_failure))
        .route("/pipeline/failures/:page", delete(dismiss_failure))
        .route("/pipeline/merge", put(set_merge))
}
