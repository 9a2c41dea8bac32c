//! Client for OpenAI-compatible chat-completion APIs (Groq, OpenAI, vLLM,
//! Ollama).

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, LanguageModel, ModelError};

pub struct OpenAiCompatModel {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatModel {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ModelError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;
        Ok(Self::with_client(client, base_url, model, api_key))
    }

    /// Share an existing HTTP client (connection pool) across models.
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            model: model.into(),
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut http = self.client.post(self.chat_completions_url()).json(&body);
        if let Some(key) = &self.api_key {
            http = http.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = http
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .ok_or(ModelError::NoChoices)?
            .message
            .content
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ModelError::EmptyContent);
        }
        Ok(content)
    }
}
