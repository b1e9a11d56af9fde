use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

use super::dto::{ConfirmPaymentRequest, RedeemPromoRequest, SubscriptionActivatedResponse};
use super::services::{self, PromoRedemption, SubscriptionInfo};
use super::settings::LedgerSettings;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/promos/redeem", post(redeem_promo))
        .route("/subscription/confirm", post(confirm_payment))
        .route("/subscription/:user_id", get(subscription_info))
}

/// Rejections are expected outcomes, so this is a 200 either way and the body
/// carries the verdict.
#[instrument(skip(state))]
async fn redeem_promo(
    State(state): State<AppState>,
    Json(body): Json<RedeemPromoRequest>,
) -> Result<Json<PromoRedemption>, AppError> {
    let now = OffsetDateTime::now_utc();
    let result = services::redeem_promo(&state.db, body.user_id, &body.code, now).await?;
    Ok(Json(result))
}

/// Called once the payment gateway has confirmed a charge. The subscription
/// duration comes from settings, not from the caller.
#[instrument(skip(state))]
async fn confirm_payment(
    State(state): State<AppState>,
    Json(body): Json<ConfirmPaymentRequest>,
) -> Result<Json<SubscriptionActivatedResponse>, AppError> {
    let now = OffsetDateTime::now_utc();
    let settings = LedgerSettings::load(&state.db).await?;
    let subscription_expires_at = services::activate_subscription(
        &state.db,
        body.user_id,
        &body.payment_ref,
        body.stars,
        settings.subscription_months,
        now,
    )
    .await?;
    Ok(Json(SubscriptionActivatedResponse {
        subscription_expires_at,
        months: settings.subscription_months,
    }))
}

#[instrument(skip(state))]
async fn subscription_info(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SubscriptionInfo>, AppError> {
    let now = OffsetDateTime::now_utc();
    let info = services::subscription_info(&state.db, user_id, now)
        .await?
        .ok_or(AppError::UserNotFound)?;
    Ok(Json(info))
}
