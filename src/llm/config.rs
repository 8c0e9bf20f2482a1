//! LLM configuration parsed from environment variables.

use super::types::LlmError;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-preview-06-06";
pub const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LLM_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Rotating free-tier keys are read from `GEMINI_API_KEY_1` through this index.
pub const MAX_ROTATING_KEYS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    /// Keys rotated on failure for text generation.
    pub api_keys: Vec<String>,
    /// Billing-enabled key used for image prompts and Imagen.
    pub paying_key: Option<String>,
    pub model: String,
    pub image_model: String,
    pub base_url: String,
    pub timeouts: LlmTimeouts,
}

impl LlmConfig {
    /// Build typed LLM config from environment variables.
    ///
    /// - `GEMINI_API_KEY_1` .. `GEMINI_API_KEY_4`: rotating text keys
    /// - `GEMINI_API_KEY_PAYING`: image pipeline key
    /// - `GEMINI_MODEL`: default `gemini-2.5-flash`
    /// - `GEMINI_IMAGE_MODEL`: default `imagen-4.0-generate-preview-06-06`
    /// - `GEMINI_BASE_URL`: default Generative Language API v1beta
    /// - `LLM_REQUEST_TIMEOUT_SECS` / `LLM_CONNECT_TIMEOUT_SECS`
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::NoApiKeys`] when neither rotating nor paying keys exist,
    /// or [`LlmError::ConfigParse`] for malformed timeouts.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`LlmConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let api_keys: Vec<String> = (1..=MAX_ROTATING_KEYS)
            .filter_map(|i| non_empty(&format!("GEMINI_API_KEY_{i}")))
            .collect();
        let paying_key = non_empty("GEMINI_API_KEY_PAYING");
        if api_keys.is_empty() && paying_key.is_none() {
            return Err(LlmError::NoApiKeys);
        }

        let model = non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_owned());
        let image_model = non_empty("GEMINI_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_owned());
        let base_url = non_empty("GEMINI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let timeouts = LlmTimeouts {
            request_secs: parse_secs(non_empty("LLM_REQUEST_TIMEOUT_SECS"), DEFAULT_LLM_REQUEST_TIMEOUT_SECS)?,
            connect_secs: parse_secs(non_empty("LLM_CONNECT_TIMEOUT_SECS"), DEFAULT_LLM_CONNECT_TIMEOUT_SECS)?,
        };

        Ok(Self { api_keys, paying_key, model, image_model, base_url, timeouts })
    }
}

fn parse_secs(raw: Option<String>, default: u64) -> Result<u64, LlmError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| LlmError::ConfigParse(format!("invalid timeout seconds: {v}"))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
