use std::time::Duration;

use bloodwork_core::json::extract_json_block;
use rig::client::{CompletionClient, Nothing};
use rig::completion::Prompt;
use rig::providers::ollama;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::prelude::*;

#[derive(Debug, Clone, clap::Args)]
pub struct LlmOptions {
    /// Ollama base URL
    #[clap(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    /// Model to use; repeat to add fallbacks, tried in order
    #[clap(
        long = "model",
        env = "BLOODWORK_MODELS",
        value_delimiter = ',',
        default_value = "qwen2.5:7b-instruct"
    )]
    pub models: Vec<String>,

    /// Seconds before a model call is abandoned
    #[clap(long, env = "BLOODWORK_LLM_TIMEOUT", default_value = "90")]
    pub llm_timeout: u64,

    /// Run heuristics only; never call a model
    #[clap(long)]
    pub no_llm: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("model {model} timed out after {timeout:?}")]
    Timeout { model: String, timeout: Duration },

    #[error("model {model} returned unusable output: {reason}")]
    Schema { model: String, reason: String },

    #[error("request to model {model} failed: {reason}")]
    Request { model: String, reason: String },

    #[error("no model produced a usable answer ({0})")]
    Exhausted(String),
}

/// Body of a non-streaming Ollama chat call with structured output.
pub fn chat_request_body(
    model: &str,
    preamble: &str,
    prompt: &str,
    schema: &serde_json::Value,
    max_tokens: u32,
) -> serde_json::Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": preamble },
            { "role": "user", "content": prompt }
        ],
        "format": schema,
        "stream": false,
        "options": {
            "num_predict": max_tokens,
            "temperature": 0
        }
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

fn create_client(ollama_url: &str) -> Result<ollama::Client> {
    ollama::Client::builder()
        .api_key(Nothing)
        .base_url(ollama_url)
        .build()
        .map_err(|e| eyre!("Failed to create Ollama client: {}", e))
}

/// Model calls with per-call timeouts, a structured-then-text retry on each
/// model, and fallback across models.
pub struct LlmClient {
    http: reqwest::Client,
    ollama: ollama::Client,
    ollama_url: String,
    models: Vec<String>,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(ollama_url: &str, models: Vec<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            ollama: create_client(ollama_url)?,
            ollama_url: ollama_url.trim_end_matches('/').to_string(),
            models,
            timeout,
        })
    }

    /// `None` when model calls are disabled.
    pub fn from_options(options: &LlmOptions) -> Result<Option<Self>> {
        let models: Vec<String> = options
            .models
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if options.no_llm || models.is_empty() {
            log::info!("Model calls disabled; using heuristics only");
            return Ok(None);
        }
        Self::new(
            &options.ollama_url,
            models,
            Duration::from_secs(options.llm_timeout),
        )
        .map(Some)
    }

    /// Ask each model in turn for a `T`.
    ///
    /// A timeout moves on to the next model. Any other failure retries the
    /// same model in text mode, where the JSON is cut out of the raw reply.
    pub async fn generate<T: DeserializeOwned>(
        &self,
        preamble: &str,
        prompt: &str,
        schema: &serde_json::Value,
        max_tokens: u32,
    ) -> std::result::Result<T, LlmError> {
        let mut last_error = None;

        for model in &self.models {
            match self
                .structured(model, preamble, prompt, schema, max_tokens)
                .await
            {
                Ok(value) => return Ok(value),
                Err(e @ LlmError::Timeout { .. }) => {
                    log::warn!("{}", e);
                    last_error = Some(e);
                    continue;
                }
                Err(e) => log::debug!("{}; retrying in text mode", e),
            }

            match self.text(model, preamble, prompt, max_tokens).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    log::warn!("{}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(LlmError::Exhausted(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no models configured".to_string()),
        ))
    }

    async fn structured<T: DeserializeOwned>(
        &self,
        model: &str,
        preamble: &str,
        prompt: &str,
        schema: &serde_json::Value,
        max_tokens: u32,
    ) -> std::result::Result<T, LlmError> {
        let url = f!("{}/api/chat", self.ollama_url);
        let body = chat_request_body(model, preamble, prompt, schema, max_tokens);
        let request_error = |e: reqwest::Error| LlmError::Request {
            model: model.to_string(),
            reason: e.to_string(),
        };

        let call = async {
            let response = self.http.post(&url).json(&body).send().await?;
            response.error_for_status()?.json::<ChatResponse>().await
        };
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| LlmError::Timeout {
                model: model.to_string(),
                timeout: self.timeout,
            })?
            .map_err(request_error)?;

        serde_json::from_str(&response.message.content).map_err(|e| LlmError::Schema {
            model: model.to_string(),
            reason: e.to_string(),
        })
    }

    async fn text<T: DeserializeOwned>(
        &self,
        model: &str,
        preamble: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> std::result::Result<T, LlmError> {
        // Ollama reads the budget from `options.num_predict`.
        let agent = self
            .ollama
            .agent(model)
            .preamble(preamble)
            .temperature(0.0)
            .max_tokens(u64::from(max_tokens))
            .additional_params(json!({ "num_predict": max_tokens }))
            .build();
        let prompt = prompt.to_string();

        let raw = tokio::time::timeout(self.timeout, async { agent.prompt(&prompt).await })
            .await
            .map_err(|_| LlmError::Timeout {
                model: model.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|e| LlmError::Request {
                model: model.to_string(),
                reason: e.to_string(),
            })?;

        let schema_error = |reason: String| LlmError::Schema {
            model: model.to_string(),
            reason,
        };
        let block = extract_json_block(&raw).map_err(|e| schema_error(e.to_string()))?;
        serde_json::from_str(block).map_err(|e| schema_error(e.to_string()))
    }
}
