//! LLM completion boundary.
//!
//! One request = {system instruction, user text, sampling parameters};
//! one response = completion text. Transport failures, non-2xx statuses and
//! malformed bodies are `DigestError::Provider`; an empty completion is a
//! successful call returning an empty string.
//!
//! Retry policy: transient failures get `max_retries` further attempts
//! before the error propagates and aborts the chunk's request.

use std::time::Duration;

use serde::Deserialize;

use crate::config::DigestConfig;
use crate::{DigestError, DigestResult};

/// The single external reducer the engine depends on.
pub trait ChatProvider: Send + Sync {
    /// Turn one bounded request into one completion.
    fn complete(&self, system: &str, user: &str) -> DigestResult<String>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiChat {
    url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiChat {
    pub fn from_config(config: &DigestConfig) -> DigestResult<Self> {
        let api_key = config.effective_api_key().ok_or_else(|| {
            DigestError::Provider(
                "No API key: set GITDIGEST_API_KEY or api_key in config.json".to_string(),
            )
        })?;
        Ok(Self {
            url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_completion_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        })
    }

    fn execute(&self, system: &str, user: &str) -> DigestResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "top_p": 1,
            "stream": false,
        });

        let mut response = ureq::post(&self.url)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .config()
            .timeout_global(Some(self.timeout))
            .build()
            .send(serde_json::to_vec(&body)?.as_slice())
            .map_err(|e| DigestError::Provider(format!("Chat request failed: {}", e)))?;

        let parsed: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| DigestError::Provider(format!("Malformed chat response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DigestError::Provider("Chat response has no choices".to_string()))?;

        // An empty completion is a valid (if useless) answer, not a failure.
        Ok(choice.message.content.unwrap_or_default())
    }
}

impl ChatProvider for OpenAiChat {
    fn complete(&self, system: &str, user: &str) -> DigestResult<String> {
        tracing::debug!(
            model = %self.model,
            system_len = system.len(),
            user_len = user.len(),
            "Chat call starting"
        );
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            match self.execute(system, user) {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    tracing::warn!(
                        "Chat attempt {}/{} failed: {}",
                        attempt + 1,
                        self.max_retries + 1,
                        e
                    );
                    last_err = Some(e);
                }
            }
        }

        tracing::error!(model = %self.model, "Chat call: all retries exhausted");
        Err(last_err.unwrap_or_else(|| DigestError::Provider("All retries failed".into())))
    }
}
