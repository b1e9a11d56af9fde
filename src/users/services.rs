use sqlx::PgPool;
use uuid::Uuid;

use super::repo::{self, ActivityLevel, Gender, GoalType, ProfileUpdate, User};

/// Daily-calorie goal from a complete profile, Mifflin-St Jeor. Returns None
/// while any field is still missing.
pub fn calculate_daily_calories(
    age: Option<i32>,
    height_cm: Option<f64>,
    weight_kg: Option<f64>,
    gender: Option<Gender>,
    activity_level: Option<ActivityLevel>,
    goal: Option<GoalType>,
) -> Option<i32> {
    let (age, height_cm, weight_kg) = (age?, height_cm?, weight_kg?);
    let (gender, activity_level, goal) = (gender?, activity_level?, goal?);

    let bmr = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age)
        + match gender {
            Gender::Male => 5.0,
            Gender::Female => -161.0,
            Gender::Other => -78.0,
        };

    let tdee = bmr
        * match activity_level {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::VeryActive => 1.9,
        };

    let daily = match goal {
        GoalType::LoseWeight => tdee - 500.0,
        GoalType::GainWeight => tdee + 300.0,
        GoalType::Maintain => tdee,
    };

    Some(daily.round() as i32)
}

/// Merges the update into the stored profile and recomputes the goal from the
/// merged values, so a partial update still yields a consistent daily target.
pub async fn update_profile(
    db: &PgPool,
    user_id: Uuid,
    update: ProfileUpdate,
) -> anyhow::Result<Option<User>> {
    let Some(current) = repo::find_by_id(db, user_id).await? else {
        return Ok(None);
    };

    let daily_calories = calculate_daily_calories(
        update.age.or(current.age),
        update.height_cm.or(current.height_cm),
        update.weight_kg.or(current.weight_kg),
        update.gender.or(current.gender),
        update.activity_level.or(current.activity_level),
        update.goal.or(current.goal),
    );

    repo::update_profile(db, user_id, &update, daily_calories).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_profile_has_no_goal() {
        assert_eq!(
            calculate_daily_calories(Some(30), Some(180.0), None, None, None, None),
            None
        );
    }

    #[test]
    fn male_moderate_maintain() {
        // BMR = 10*80 + 6.25*180 - 5*30 + 5 = 1780; TDEE = 1780 * 1.55 = 2759
        let calories = calculate_daily_calories(
            Some(30),
            Some(180.0),
            Some(80.0),
            Some(Gender::Male),
            Some(ActivityLevel::Moderate),
            Some(GoalType::Maintain),
        );
        assert_eq!(calories, Some(2759));
    }

    #[test]
    fn female_sedentary_lose_weight_applies_deficit() {
        // BMR = 10*60 + 6.25*165 - 5*25 - 161 = 1345.25; TDEE = 1614.3; -500
        let calories = calculate_daily_calories(
            Some(25),
            Some(165.0),
            Some(60.0),
            Some(Gender::Female),
            Some(ActivityLevel::Sedentary),
            Some(GoalType::LoseWeight),
        );
        assert_eq!(calories, Some(1114));
    }

    #[test]
    fn gain_weight_applies_surplus() {
        let maintain = calculate_daily_calories(
            Some(40),
            Some(175.0),
            Some(70.0),
            Some(Gender::Other),
            Some(ActivityLevel::VeryActive),
            Some(GoalType::Maintain),
        )
        .unwrap();
        let gain = calculate_daily_calories(
            Some(40),
            Some(175.0),
            Some(70.0),
            Some(Gender::Other),
            Some(ActivityLevel::VeryActive),
            Some(GoalType::GainWeight),
        )
        .unwrap();
        assert_eq!(gain - maintain, 300);
    }
}
