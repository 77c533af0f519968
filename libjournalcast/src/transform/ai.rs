//! OpenAI-compatible chat completions client (OpenRouter by default)

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{secret_from_env, AiConfig, AI_KEY_ENV};
use crate::error::{Result, ServiceError};
use crate::transform::TextTransformer;

const POLISH_PROMPT: &str = "You are a witty tech blogger. Polish the diary into an engaging social media post. Use emojis, first-person perspective, and casual language. Keep it under 280 characters per chunk if possible.";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

fn summarize_prompt(target_chars: usize) -> String {
    format!(
        "You are a professional content editor. Please summarize the following content to approximately {}-{} characters while keeping the core ideas and emotions. Use first-person perspective, engaging language suitable for social media. Important: Keep the content in its original language, do not translate. Only output the summarized content without any title or additional explanation.",
        target_chars.saturating_sub(50),
        target_chars + 50
    )
}

pub struct AiTransformer {
    client: Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
}

impl AiTransformer {
    pub fn new(base_url: &str, model: &str, api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        }
    }

    /// Build from `[ai]` with the key from `OPENROUTER_API_KEY`
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let api_key = secret_from_env(AI_KEY_ENV)?;
        Ok(Self::new(&config.base_url, &config.model, api_key))
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
        };

        debug!(model = %self.model, chars = user.chars().count(), "Requesting completion");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(ServiceError::from)?;

        let status = response.status();
        let body = response.text().await.map_err(ServiceError::from)?;
        if !status.is_success() {
            return Err(ServiceError::Api {
                service: "chat completions".to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ServiceError::Decode(e.to_string()))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl TextTransformer for AiTransformer {
    async fn polish(&self, text: &str) -> Result<String> {
        self.complete(POLISH_PROMPT, text).await
    }

    async fn summarize(&self, text: &str, target_chars: usize) -> Result<String> {
        self.complete(&summarize_prompt(target_chars), text).await
    }
}
