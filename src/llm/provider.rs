use crate::error::{AssistantError, Result};
use crate::llm::client::{GeminiClient, OpenAiCompatibleClient};
use async_trait::async_trait;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Ollama,
    Groq,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
            Self::Groq => "groq",
        }
    }

    pub fn from_tag(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" | "gpt" => Some(Self::OpenAi),
            "gemini" | "google" => Some(Self::Gemini),
            "ollama" => Some(Self::Ollama),
            "groq" => Some(Self::Groq),
            _ => None,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::Ollama => "http://localhost:11434/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
        }
    }

    pub fn requires_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Whether the chat endpoint enforces `response_format: json_object`.
    /// Elsewhere JSON mode is a prompt instruction only.
    pub fn native_json(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Groq)
    }
}

/// A persisted provider configuration record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: None,
            model: model.into(),
            base_url: None,
            enabled: true,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// Reads `LLM_PROVIDER`, `LLM_API_KEY`, `LLM_MODEL` and `LLM_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let provider = var("LLM_PROVIDER")
            .ok_or_else(|| AssistantError::ProviderUnavailable("LLM_PROVIDER is not set".into()))?;
        let kind = ProviderKind::from_tag(&provider).ok_or_else(|| {
            AssistantError::ProviderUnavailable(format!("Unknown provider '{}'", provider))
        })?;
        let model = var("LLM_MODEL")
            .ok_or_else(|| AssistantError::ProviderUnavailable("LLM_MODEL is not set".into()))?;
        let config = Self {
            provider: kind,
            api_key: var("LLM_API_KEY"),
            model,
            base_url: var("LLM_BASE_URL"),
            enabled: true,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(AssistantError::ProviderUnavailable(format!(
                "No model configured for {}",
                self.provider.as_str()
            )));
        }
        let has_key = self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if self.provider.requires_key() && !has_key {
            return Err(AssistantError::ProviderUnavailable(format!(
                "Missing API key for {}",
                self.provider.as_str()
            )));
        }
        Ok(())
    }
}

/// The single enabled record; none or several is a configuration error.
pub fn select_enabled(configs: &[ProviderConfig]) -> Result<&ProviderConfig> {
    let mut enabled = configs.iter().filter(|c| c.enabled);
    match (enabled.next(), enabled.next()) {
        (Some(config), None) => Ok(config),
        (None, _) => Err(AssistantError::ProviderUnavailable(
            "No enabled provider configuration".into(),
        )),
        (Some(_), Some(_)) => Err(AssistantError::ProviderUnavailable(
            "More than one provider configuration is enabled".into(),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub json_mode: bool,
    pub temperature: f32,
    pub max_tokens: u32,
    pub deadline: Option<Duration>,
}

impl CompletionOptions {
    pub fn planning() -> Self {
        Self {
            json_mode: true,
            temperature: 0.3,
            max_tokens: 800,
            deadline: None,
        }
    }

    pub fn narration() -> Self {
        Self {
            json_mode: false,
            temperature: 0.7,
            max_tokens: 1500,
            deadline: None,
        }
    }

    pub fn report() -> Self {
        Self {
            json_mode: true,
            temperature: 0.7,
            max_tokens: 4000,
            deadline: None,
        }
    }

    pub fn extraction() -> Self {
        Self {
            json_mode: true,
            temperature: 0.3,
            max_tokens: 8000,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// One-shot chat completion over any backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String>;
}

/// Runs one completion under the optional deadline. Empty answers count as
/// an unavailable provider.
pub async fn complete(
    provider: &dyn LlmProvider,
    system: &str,
    user: &str,
    options: &CompletionOptions,
) -> Result<String> {
    debug!(
        "Calling {} (json_mode={}, temperature={}, max_tokens={})",
        provider.name(),
        options.json_mode,
        options.temperature,
        options.max_tokens
    );
    let call = provider.complete(system, user, options);
    let text = match options.deadline {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            warn!("{} did not answer within {:?}", provider.name(), limit);
            AssistantError::Deadline
        })??,
        None => call.await?,
    };
    if text.trim().is_empty() {
        return Err(AssistantError::ProviderUnavailable(format!(
            "{} returned an empty response",
            provider.name()
        )));
    }
    Ok(text)
}

pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    config.validate()?;
    Ok(match config.provider {
        ProviderKind::Gemini => Arc::new(GeminiClient::from_config(config)),
        ProviderKind::OpenAi | ProviderKind::Ollama | ProviderKind::Groq => {
            Arc::new(OpenAiCompatibleClient::from_config(config))
        }
    })
}
