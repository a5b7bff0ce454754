//! services/api/src/adapters/text_llm.rs
//!
//! This module contains the adapter for the text-completion LLM.
//! It implements the `TextCompletionService` port from the `core` crate against any
//! OpenAI-compatible chat endpoint (Gemini's, by default).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use creation_core::ports::{PortError, PortResult, TextCompletionService};
use tracing::debug;

const TEMPERATURE: f32 = 0.7;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextCompletionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTextAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTextAdapter {
    /// Creates a new `OpenAiTextAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `TextCompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextCompletionService for OpenAiTextAdapter {
    /// Sends the prompt as a single user turn and returns the first choice's text.
    #[allow(deprecated)]
    async fn complete(&self, prompt: &str, max_tokens: u32) -> PortResult<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(TEMPERATURE)
            .max_tokens(max_tokens)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        debug!(model = %self.model, usage = ?response.usage, "Text completion returned");

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Text completion returned no content.".to_string())
            })
    }
}
