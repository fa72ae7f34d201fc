//! Engine configuration, persisted as `.gitdigest/config.json` inside the
//! analyzed repository. Missing file or missing fields fall back to
//! defaults; the API key can always be overridden by environment variable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COMPLETION_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOKEN_CEILING, CONFIG_FILE,
    PROVIDER_MAX_RETRIES, PROVIDER_TIMEOUT_SECS,
};

/// Env var consulted before the persisted key.
pub const API_KEY_ENV: &str = "GITDIGEST_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub api_url: String,
    /// Bearer token. Prefer the GITDIGEST_API_KEY env var over persisting it.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    /// Completion budget per request (the prompt budget is `token_ceiling`).
    pub max_completion_tokens: u32,
    /// Hard per-request token ceiling (preamble + payload).
    pub token_ceiling: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Run independent leaf-reduce calls of one pass in parallel.
    pub parallel_leaves: bool,
    /// Path to a HuggingFace tokenizer.json for exact counting; the
    /// calibrated heuristic is used when absent.
    pub tokenizer_file: Option<PathBuf>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_completion_tokens: DEFAULT_COMPLETION_TOKENS,
            token_ceiling: DEFAULT_TOKEN_CEILING,
            timeout_secs: PROVIDER_TIMEOUT_SECS,
            max_retries: PROVIDER_MAX_RETRIES,
            parallel_leaves: false,
            tokenizer_file: None,
        }
    }
}

impl DigestConfig {
    /// Load from `{store_dir}/config.json`, or defaults if absent/corrupted.
    pub fn load(store_dir: &Path) -> Self {
        let path = store_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(error = %e, path = %path.display(), "Bad config.json, using defaults");
                Self::default()
            }),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Unreadable config.json, using defaults");
                Self::default()
            }
        }
    }

    /// Save to `{store_dir}/config.json`. Creates the directory if needed.
    pub fn save(&self, store_dir: &Path) {
        if let Err(e) = std::fs::create_dir_all(store_dir) {
            tracing::warn!(error = %e, "Failed to create store dir for config");
            return;
        }
        let path = store_dir.join(CONFIG_FILE);
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    tracing::warn!(error = %e, "Failed to write config.json");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize config"),
        }
    }

    /// Effective API key: env var first, then the persisted value.
    pub fn effective_api_key(&self) -> Option<String> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Some(key),
            _ => self.api_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DigestConfig::load(dir.path());
        assert_eq!(cfg.token_ceiling, DEFAULT_TOKEN_CEILING);
        assert_eq!(cfg.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = DigestConfig::default();
        cfg.model = "gpt-4o-mini".to_string();
        cfg.token_ceiling = 8_000;
        cfg.save(dir.path());

        let loaded = DigestConfig::load(dir.path());
        assert_eq!(loaded.model, "gpt-4o-mini");
        assert_eq!(loaded.token_ceiling, 8_000);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"model":"local-llama"}"#,
        )
        .unwrap();

        let loaded = DigestConfig::load(dir.path());
        assert_eq!(loaded.model, "local-llama");
        assert_eq!(loaded.timeout_secs, PROVIDER_TIMEOUT_SECS);
    }
}
