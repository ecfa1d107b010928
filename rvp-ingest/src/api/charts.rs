//! Chart artifact endpoint

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

/// GET /charts
///
/// Latest rendered SVG, 404 until the first render.
pub async fn get_charts(State(state): State<AppState>) -> ApiResult<Response> {
    let svg = state
        .controller
        .latest_chart()
        .await
        .ok_or_else(|| ApiError::NotFound("No charts rendered yet".to_string()))?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

pub fn chart_routes() -> Router<AppState> {
    Router::new().route("/charts", get(get_charts))
}
