use axum::{
    extract::{Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::chart::{generate_chart, ChartConfig, ChartSummary, FindingChart, OutputMode};
use crate::error::ChartError;
use crate::normalize::ScaleConvention;
use crate::server::api::*;
use crate::server::state::AppState;

pub async fn generate_chart_json(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChartQuery>,
) -> Result<Json<ChartSummary>, AppError> {
    let chart = run_chart(state, &query, OutputMode::JsonSummary).await?;
    Ok(Json(chart.summary()))
}

pub async fn generate_chart_png(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChartQuery>,
) -> Result<impl IntoResponse, AppError> {
    let chart = run_chart(state, &query, OutputMode::AnnotatedRaster).await?;
    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "image/png"),
            (CONTENT_DISPOSITION, "attachment; filename=\"chart.png\""),
        ],
        chart.png,
    ))
}

/// Build the chart on the blocking pool; downloads and pixel work never run
/// on the async executor
async fn run_chart(
    state: Arc<AppState>,
    query: &ChartQuery,
    mode: OutputMode,
) -> Result<FindingChart, AppError> {
    let request = query
        .to_request()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut config: ChartConfig = state.chart_config.clone();
    config.mode = mode;
    if let Some(invert) = query.invert {
        config.scale = if invert {
            ScaleConvention::Inverted
        } else {
            ScaleConvention::Standard
        };
    }

    let chart = tokio::task::spawn_blocking(move || {
        generate_chart(&request, state.source.as_ref(), &config)
    })
    .await
    .map_err(|e| AppError::Internal(ChartError::Processing(e.to_string())))??;
    Ok(chart)
}

pub enum AppError {
    BadRequest(String),
    Internal(ChartError),
}

impl From<ChartError> for AppError {
    fn from(err: ChartError) -> Self {
        AppError::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => {
                tracing::warn!("Rejected chart request: {}", msg);
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new("Invalid request")),
                )
                    .into_response()
            }
            AppError::Internal(err) => {
                // Details stay in the log
                tracing::error!("Chart generation failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Internal server error")),
                )
                    .into_response()
            }
        }
    }
}
