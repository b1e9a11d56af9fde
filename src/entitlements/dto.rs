use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RedeemPromoRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub user_id: Uuid,
    pub payment_ref: String,
    pub stars: i32,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionActivatedResponse {
    pub subscription_expires_at: OffsetDateTime,
    pub months: i32,
}
