//! Language-model access: the [`LanguageModel`] trait, an
//! OpenAI-compatible HTTP client, and the primary/fallback [`ModelChain`].

pub mod chain;
pub mod openai;

use std::time::Duration;

use async_trait::async_trait;

pub use chain::{ChainBudget, ModelChain, ModelReply, Tier};
pub use openai::OpenAiCompatModel;

/// One prompt-in, text-out request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    /// Token ceiling for the completion.
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.2,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Why a single model invocation failed.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("response contained no choices")]
    NoChoices,

    #[error("response content was empty")]
    EmptyContent,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A text-generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, used in logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError>;
}

// Compile-time assertion: LanguageModel must be usable as `dyn LanguageModel`.
const _: () = {
    fn _assert_object_safe(_: &dyn LanguageModel) {}
};
