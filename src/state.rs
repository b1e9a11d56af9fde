use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::ai::{MealEstimator, OpenAiEstimator};
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub estimator: Arc<dyn MealEstimator>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let estimator =
            Arc::new(OpenAiEstimator::new(config.openai.clone())?) as Arc<dyn MealEstimator>;

        Ok(Self {
            db,
            config,
            estimator,
        })
    }

    pub fn from_parts(
        db: PgPool,
        config: Arc<AppConfig>,
        estimator: Arc<dyn MealEstimator>,
    ) -> Self {
        Self {
            db,
            config,
            estimator,
        }
    }
}
