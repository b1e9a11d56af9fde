use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::instrument;

use crate::entitlements::repo::{Payment, Promo};
use crate::entitlements::{repo as entitlements_repo, services as entitlements_services, settings};
use crate::error::AppError;
use crate::state::AppState;

use super::services::{self, ServiceStats, TopUser};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/top-users", get(list_top_users))
        .route("/payments", get(list_payments))
        .route("/promos", post(create_promo).get(list_promos))
        .route("/promos/:code/deactivate", post(deactivate_promo))
        .route("/promos/:code", delete(delete_promo))
        .route("/settings", get(get_settings))
        .route("/settings/:key", put(set_setting))
}

#[derive(Debug, Deserialize)]
struct Limit {
    #[serde(default = "default_limit")]
    limit: i64,
}
fn default_limit() -> i64 {
    10
}

#[instrument(skip(state))]
async fn stats(State(state): State<AppState>) -> Result<Json<ServiceStats>, AppError> {
    let stats = services::service_stats(&state.db, OffsetDateTime::now_utc()).await?;
    Ok(Json(stats))
}

#[instrument(skip(state))]
async fn list_top_users(
    State(state): State<AppState>,
    Query(q): Query<Limit>,
) -> Result<Json<Vec<TopUser>>, AppError> {
    let users = services::top_users(&state.db, OffsetDateTime::now_utc(), q.limit).await?;
    Ok(Json(users))
}

#[instrument(skip(state))]
async fn list_payments(
    State(state): State<AppState>,
    Query(q): Query<Limit>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let payments = entitlements_repo::recent_payments(&state.db, q.limit).await?;
    Ok(Json(payments))
}

#[derive(Debug, Deserialize)]
struct CreatePromoRequest {
    code: Option<String>,
    analyses_count: i32,
    max_uses: Option<i32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    expires_at: Option<OffsetDateTime>,
}

#[instrument(skip(state))]
async fn create_promo(
    State(state): State<AppState>,
    Json(body): Json<CreatePromoRequest>,
) -> Result<(StatusCode, Json<Promo>), AppError> {
    if body.analyses_count <= 0 {
        return Err(AppError::BadRequest(
            "analyses_count must be positive".into(),
        ));
    }
    let promo = entitlements_services::create_promo(
        &state.db,
        body.code,
        body.analyses_count,
        body.max_uses,
        body.expires_at,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(promo)))
}

#[instrument(skip(state))]
async fn list_promos(State(state): State<AppState>) -> Result<Json<Vec<Promo>>, AppError> {
    let promos = entitlements_repo::list_promos(&state.db).await?;
    Ok(Json(promos))
}

#[derive(Debug, Serialize)]
struct PromoChanged {
    changed: bool,
}

#[instrument(skip(state))]
async fn deactivate_promo(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<PromoChanged>, AppError> {
    let changed =
        entitlements_repo::deactivate_promo(&state.db, &code.trim().to_uppercase()).await?;
    Ok(Json(PromoChanged { changed }))
}

#[instrument(skip(state))]
async fn delete_promo(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<PromoChanged>, AppError> {
    let changed = entitlements_repo::delete_promo(&state.db, &code.trim().to_uppercase()).await?;
    Ok(Json(PromoChanged { changed }))
}

#[instrument(skip(state))]
async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<settings::LedgerSettings>, AppError> {
    let settings = settings::LedgerSettings::load(&state.db).await?;
    Ok(Json(settings))
}

#[derive(Debug, Deserialize)]
struct SetSettingRequest {
    value: String,
}

#[instrument(skip(state))]
async fn set_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SetSettingRequest>,
) -> Result<StatusCode, AppError> {
    if !settings::KNOWN_KEYS.contains(&key.as_str()) {
        return Err(AppError::BadRequest(format!("unknown setting key: {key}")));
    }
    settings::set(&state.db, &key, &body.value).await?;
    Ok(StatusCode::NO_CONTENT)
}
