pub mod normalize;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::OpenAiConfig;

const TEXT_SYSTEM_PROMPT: &str = r#"You are a nutrition assistant. Return ONLY valid JSON with "items" array.
Each item must have: name, grams, calories, protein, fat, carbs.
Example: {"items":[{"name":"Egg","grams":50,"calories":78,"protein":6,"fat":5,"carbs":0.6}]}"#;

const VISION_PROMPT: &str = r#"Analyze this food image. Return ONLY valid JSON.
Format: {"mealType":"SNACK","items":[{"name":"Apple","grams":180,"calories":95,"protein":0.5,"fat":0.3,"carbs":25}]}
mealType must be: BREAKFAST, LUNCH, DINNER, or SNACK"#;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Model-transport collaborator. The core only ever sees the raw response text;
/// normalization of that text happens in [`normalize`].
#[async_trait]
pub trait MealEstimator: Send + Sync {
    async fn analyze_text(&self, description: &str) -> anyhow::Result<String>;
    /// `image` is a data URI or a fetchable URL.
    async fn analyze_image(&self, image: &str) -> anyhow::Result<String>;
}

/// Client for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiEstimator {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiEstimator {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, config })
    }

    async fn complete(&self, request: &ChatRequest) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "model endpoint returned an error");
            anyhow::bail!("model endpoint returned {status}");
        }

        let parsed: ChatResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("model response has no choices"))?;

        if let Some(refusal) = choice.message.refusal {
            error!(%refusal, "model refused to analyze");
            anyhow::bail!("model refused to analyze: {refusal}");
        }
        let content = choice.message.content.ok_or_else(|| {
            error!(finish_reason = ?choice.finish_reason, "model response has no content");
            anyhow::anyhow!("model response has no content")
        })?;

        debug!(chars = content.len(), "raw model response received");
        Ok(content)
    }
}

#[async_trait]
impl MealEstimator for OpenAiEstimator {
    async fn analyze_text(&self, description: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: self.config.text_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(TEXT_SYSTEM_PROMPT.into()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Text(format!("Parse this meal: {description}")),
                },
            ],
            temperature: Some(0.3),
            max_tokens: None,
        };
        self.complete(&request).await
    }

    async fn analyze_image(&self, image: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: self.config.vision_model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: VISION_PROMPT.into(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image.into() },
                    },
                ]),
            }],
            temperature: None,
            max_tokens: Some(500),
        };
        self.complete(&request).await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_request_serializes_to_plain_content() {
        let request = ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Text("Parse this meal: two eggs".into()),
            }],
            temperature: Some(0.3),
            max_tokens: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["content"], "Parse this meal: two eggs");
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn vision_request_serializes_tagged_content_parts() {
        let request = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: VISION_PROMPT.into(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "data:image/jpeg;base64,AAAA".into(),
                        },
                    },
                ]),
            }],
            temperature: None,
            max_tokens: Some(500),
        };
        let value = serde_json::to_value(&request).unwrap();
        let parts = &value["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn response_with_refusal_decodes() {
        let raw = r#"{"choices":[{"message":{"content":null,"refusal":"cannot help"},"finish_reason":"stop"}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.refusal.as_deref(),
            Some("cannot help")
        );
    }
}
