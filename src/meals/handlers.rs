use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use time::{Date, OffsetDateTime, Time};
use tracing::instrument;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

use super::dto::{
    parse_date, DayReportQuery, DeleteMealQuery, DeleteMealResponse, PhotoAnalysisRequest,
    RangeReportQuery, TextAnalysisRequest,
};
use super::services::{self, AnalysisResult, PeriodReport};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analyses/text", post(analyze_text))
        .route("/analyses/photo", post(analyze_photo))
        .route("/reports/day", get(day_report))
        .route("/reports/range", get(range_report))
        .route("/meals/:id", delete(delete_meal))
}

#[instrument(skip(state, body), fields(user_id = %body.user_id))]
async fn analyze_text(
    State(state): State<AppState>,
    Json(body): Json<TextAnalysisRequest>,
) -> Result<(StatusCode, Json<AnalysisResult>), AppError> {
    let eaten_at = body.at.unwrap_or_else(OffsetDateTime::now_utc);
    let result =
        services::run_text_analysis(&state, body.user_id, &body.description, eaten_at).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[instrument(skip(state, body), fields(user_id = %body.user_id))]
async fn analyze_photo(
    State(state): State<AppState>,
    Json(body): Json<PhotoAnalysisRequest>,
) -> Result<(StatusCode, Json<AnalysisResult>), AppError> {
    let eaten_at = body.at.unwrap_or_else(OffsetDateTime::now_utc);
    let result = services::run_photo_analysis(&state, body.user_id, &body.image, eaten_at).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

fn day_bounds(date: Date) -> (OffsetDateTime, OffsetDateTime) {
    let start = date.with_time(Time::MIDNIGHT).assume_utc();
    (start, start + time::Duration::days(1))
}

#[instrument(skip(state))]
async fn day_report(
    State(state): State<AppState>,
    Query(q): Query<DayReportQuery>,
) -> Result<Json<PeriodReport>, AppError> {
    let (start, end) = day_bounds(parse_date(&q.date)?);
    let report = services::report_for_range(&state.db, q.user_id, start, end).await?;
    Ok(Json(report))
}

#[instrument(skip(state))]
async fn range_report(
    State(state): State<AppState>,
    Query(q): Query<RangeReportQuery>,
) -> Result<Json<PeriodReport>, AppError> {
    let (start, _) = day_bounds(parse_date(&q.start)?);
    let (_, end) = day_bounds(parse_date(&q.end)?);
    if end <= start {
        return Err(AppError::BadRequest("end date is before start date".into()));
    }
    let report = services::report_for_range(&state.db, q.user_id, start, end).await?;
    Ok(Json(report))
}

#[instrument(skip(state))]
async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<DeleteMealQuery>,
) -> Result<Json<DeleteMealResponse>, AppError> {
    let deleted = super::repo::delete_owned(&state.db, id, q.user_id).await?;
    Ok(Json(DeleteMealResponse { deleted }))
}
