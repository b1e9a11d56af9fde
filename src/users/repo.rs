use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gender", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activity_level", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "goal_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalType {
    LoseWeight,
    Maintain,
    GainWeight,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub subscription_expires_at: Option<OffsetDateTime>,
    pub bonus_credits: i32,
    pub free_credits: i32,
    pub total_analyses_used: i32,
    pub age: Option<i32>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub gender: Option<Gender>,
    pub activity_level: Option<ActivityLevel>,
    pub goal: Option<GoalType>,
    pub daily_calories: Option<i32>,
    pub created_at: OffsetDateTime,
}

const USER_COLUMNS: &str = "id, external_id, subscription_expires_at, bonus_credits, free_credits, \
     total_analyses_used, age, height_cm, weight_kg, gender, activity_level, goal, \
     daily_calories, created_at";

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn find_by_external_id(db: &PgPool, external_id: &str) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE external_id = $1"
    ))
    .bind(external_id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Creates the user if the external id is new, granting the configured free
/// credits. A concurrent create of the same id loses the insert and reads the
/// winner's row back.
pub async fn find_or_create(
    db: &PgPool,
    external_id: &str,
    free_credits_grant: i32,
) -> anyhow::Result<User> {
    if let Some(user) = find_by_external_id(db, external_id).await? {
        return Ok(user);
    }

    let inserted = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (external_id, free_credits)
         VALUES ($1, $2)
         ON CONFLICT (external_id) DO NOTHING
         RETURNING {USER_COLUMNS}"
    ))
    .bind(external_id)
    .bind(free_credits_grant)
    .fetch_optional(db)
    .await?;

    match inserted {
        Some(user) => Ok(user),
        None => find_by_external_id(db, external_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {external_id} vanished during find_or_create")),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub age: Option<i32>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub gender: Option<Gender>,
    pub activity_level: Option<ActivityLevel>,
    pub goal: Option<GoalType>,
}

pub async fn update_profile(
    db: &PgPool,
    id: Uuid,
    profile: &ProfileUpdate,
    daily_calories: Option<i32>,
) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users
         SET age = COALESCE($2, age),
             height_cm = COALESCE($3, height_cm),
             weight_kg = COALESCE($4, weight_kg),
             gender = COALESCE($5, gender),
             activity_level = COALESCE($6, activity_level),
             goal = COALESCE($7, goal),
             daily_calories = $8
         WHERE id = $1
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(profile.age)
    .bind(profile.height_cm)
    .bind(profile.weight_kg)
    .bind(profile.gender)
    .bind(profile.activity_level)
    .bind(profile.goal)
    .bind(daily_calories)
    .fetch_optional(db)
    .await?;
    Ok(user)
}
