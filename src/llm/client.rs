use crate::error::{AssistantError, Result};
use crate::llm::provider::{CompletionOptions, LlmProvider, ProviderConfig, ProviderKind};
use crate::llm::types::*;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;

const JSON_ONLY_INSTRUCTION: &str =
    "Responda somente com um objeto JSON válido, sem texto antes ou depois e sem blocos de código.";

fn transport_error(provider: &str, err: reqwest::Error) -> AssistantError {
    if err.is_timeout() {
        AssistantError::Deadline
    } else {
        AssistantError::ProviderUnavailable(format!("{} request failed: {}", provider, err))
    }
}

async fn read_error_body(provider: &str, res: reqwest::Response) -> AssistantError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    AssistantError::ProviderUnavailable(format!(
        "{} API error (status {}): {}",
        provider,
        status,
        body.chars().take(500).collect::<String>()
    ))
}

/// Chat-completions client shared by OpenAI, Groq and Ollama.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    kind: ProviderKind,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            kind: config.provider,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        let native_json = options.json_mode && self.kind.native_json();
        let system = if options.json_mode && !native_json {
            format!("{}\n\n{}", system, JSON_ONLY_INSTRUCTION)
        } else {
            system.to_string()
        };

        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: native_json.then(ResponseFormat::json_object),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(deadline) = options.deadline {
            request = request.timeout(deadline);
        }

        let res = request
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e))?;
        if !res.status().is_success() {
            return Err(read_error_body(self.name(), res).await);
        }

        let body: ChatCompletionResponse = res
            .json()
            .await
            .map_err(|e| transport_error(self.name(), e))?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                AssistantError::ProviderUnavailable(format!("{} returned no choices", self.name()))
            })?;
        debug!("{} answered with {} characters", self.name(), text.len());
        Ok(text)
    }
}

/// Gemini `generateContent`. System and user prompts travel as one user
/// turn; JSON mode is carried by the prompt.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            base_url: config.base_url(),
        }
    }

    pub fn combined_prompt(system: &str, user: &str, json_mode: bool) -> String {
        let mut prompt = format!("{}\n\n{}", system.trim(), user.trim());
        if json_mode {
            prompt.push_str("\n\n");
            prompt.push_str(JSON_ONLY_INSTRUCTION);
        }
        prompt
    }
}

#[async_trait]
impl LlmProvider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(Self::combined_prompt(system, user, options.json_mode)),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            },
        };

        let mut request = self.client.post(&url).json(&payload);
        if let Some(deadline) = options.deadline {
            request = request.timeout(deadline);
        }

        let res = request
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e))?;
        if !res.status().is_success() {
            return Err(read_error_body(self.name(), res).await);
        }

        let body: GenerateContentResponse = res
            .json()
            .await
            .map_err(|e| transport_error(self.name(), e))?;
        body.text().ok_or_else(|| {
            AssistantError::ProviderUnavailable("gemini returned no candidates".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_prompt_combines_turns() {
        let prompt = GeminiClient::combined_prompt("Sistema", "Pergunta", true);
        assert!(prompt.starts_with("Sistema\n\nPergunta"));
        assert!(prompt.ends_with(JSON_ONLY_INSTRUCTION));
        assert!(!GeminiClient::combined_prompt("a", "b", false).contains("JSON"));
    }

    #[test]
    fn test_clients_take_config_base_url() {
        let groq = ProviderConfig::new(ProviderKind::Groq, "llama").with_api_key("k");
        let client = OpenAiCompatibleClient::from_config(&groq);
        assert_eq!(client.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(client.name(), "groq");
    }
}
