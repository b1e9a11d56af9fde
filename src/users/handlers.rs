use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::entitlements::settings::LedgerSettings;
use crate::error::AppError;
use crate::state::AppState;

use super::dto::{RegisterUserRequest, UserResponse};
use super::repo::{self, ProfileUpdate};
use super::services;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/profile", put(update_profile))
}

#[instrument(skip(state))]
async fn register_user(
    State(state): State<AppState>,
    Json(body): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let settings = LedgerSettings::load(&state.db).await?;
    let user = repo::find_or_create(&state.db, &body.external_id, settings.free_analyses_count)
        .await?;
    Ok((StatusCode::OK, Json(user.into())))
}

#[instrument(skip(state))]
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let user = repo::find_by_id(&state.db, id)
        .await?
        .ok_or(AppError::UserNotFound)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<UserResponse>, AppError> {
    let user = services::update_profile(&state.db, id, body)
        .await?
        .ok_or(AppError::UserNotFound)?;
    Ok(Json(user.into()))
}
