use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub openai: OpenAiConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let openai = OpenAiConfig {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            text_model: std::env::var("OPENAI_MODEL_TEXT")
                .unwrap_or_else(|_| "gpt-4o-mini".into()),
            vision_model: std::env::var("OPENAI_MODEL_VISION")
                .unwrap_or_else(|_| "gpt-4o".into()),
        };
        Ok(Self {
            database_url,
            openai,
        })
    }
}
