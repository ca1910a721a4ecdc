//! OpenAI chat-completions client behind the [`LanguageModel`] seam.
use anyhow::anyhow;
use async_openai::{
    config::OpenAIConfig,
    types::{ChatCompletionRequestMessage, ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use tracing::debug;

use handbook_core::config::{LlmSettings, OPENAI_API_KEY_VAR};
use handbook_core::error::{Error, Result};
use handbook_core::traits::LanguageModel;

pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiModel {
    pub fn new(api_key: String, api_base: Option<String>, model: String, temperature: f32) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }
        Self { client: Client::with_config(config), model, temperature }
    }

    /// Build from settings, reading the key from `OPENAI_API_KEY`.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let key = std::env::var(OPENAI_API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig(format!("{OPENAI_API_KEY_VAR} is not set")))?;
        Ok(Self::new(key, settings.api_base.clone(), settings.model.clone(), settings.temperature))
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn model_id(&self) -> &str { &self.model }

    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(vec![ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(
                prompt.to_string(),
            ))])
            .build()
            .map_err(|e| anyhow!("Failed to build request: {}", e))?;

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending chat completion");
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| anyhow!("OpenAI API error: {}", e))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No response from OpenAI"))
    }
}
