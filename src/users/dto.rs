use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::User;

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub external_id: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub external_id: String,
    pub subscription_expires_at: Option<OffsetDateTime>,
    pub bonus_credits: i32,
    pub free_credits: i32,
    pub total_analyses_used: i32,
    pub daily_calories: Option<i32>,
    pub created_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            external_id: u.external_id,
            subscription_expires_at: u.subscription_expires_at,
            bonus_credits: u.bonus_credits,
            free_credits: u.free_credits,
            total_analyses_used: u.total_analyses_used,
            daily_calories: u.daily_calories,
            created_at: u.created_at,
        }
    }
}
