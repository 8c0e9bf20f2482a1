//! LLM: Gemini text and image generation behind provider-neutral traits.
//!
//! DESIGN
//! ======
//! Two clients are built from one [`LlmConfig`]: a text client over the
//! rotating free-tier keys, and an imaging client over the paying key (used
//! for prompt optimisation and Imagen). Either may be absent; routes that
//! need a missing client answer 503.
//!
//! Key rotation is sequential: a call tries the active key, and on failure
//! the shared cursor advances and the next key is tried, at most once per key.

pub mod config;
pub mod gemini;
pub mod keys;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

use tracing::{info, warn};

pub use config::LlmConfig;
pub use gemini::GeminiClient;
pub use keys::KeyRing;
pub use types::{ImageModel, LlmError, TextModel};

// =============================================================================
// CLIENT CONSTRUCTION
// =============================================================================

/// Gemini clients available to the process.
pub struct GeminiClients {
    /// Rotating-key client for annotations, analysis and streaming.
    pub text: Option<GeminiClient>,
    /// Paying-key client for image prompts and Imagen.
    pub imaging: Option<GeminiClient>,
}

impl GeminiClients {
    /// Build clients from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if no key is configured or an HTTP client fails to build.
    pub fn from_env() -> Result<Self, LlmError> {
        let config = LlmConfig::from_env()?;
        Self::from_config(&config)
    }

    /// Build clients from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client fails to build.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let text = if config.api_keys.is_empty() {
            None
        } else {
            Some(GeminiClient::new(
                KeyRing::new(config.api_keys.clone()),
                &config.base_url,
                &config.model,
                &config.image_model,
                config.timeouts,
            )?)
        };
        let imaging = match &config.paying_key {
            Some(key) => Some(GeminiClient::new(
                KeyRing::new(vec![key.clone()]),
                &config.base_url,
                &config.model,
                &config.image_model,
                config.timeouts,
            )?),
            None => None,
        };
        info!(
            rotating_keys = config.api_keys.len(),
            imaging = imaging.is_some(),
            model = %config.model,
            "gemini clients configured"
        );
        Ok(Self { text, imaging })
    }
}

// =============================================================================
// ROTATION
// =============================================================================

/// Generate with `llm`, rotating through its keys until one succeeds.
///
/// Each key is tried at most once, starting from the active key. A failed key
/// leaves the cursor on the next one so later callers skip it too.
///
/// # Errors
///
/// Returns [`LlmError::NoApiKeys`] when the client has no keys, or
/// [`LlmError::AllKeysFailed`] carrying the last failure.
pub async fn generate_with_rotation(llm: &dyn TextModel, model: &str, prompt: &str) -> Result<String, LlmError> {
    let attempts = llm.key_count();
    if attempts == 0 {
        return Err(LlmError::NoApiKeys);
    }

    let mut last_error = None;
    for attempt in 0..attempts {
        let key_index = llm.active_key_index();
        match llm.generate(model, prompt).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                warn!(
                    key_index,
                    attempt,
                    quota = e.is_quota_error(),
                    retryable = e.retryable(),
                    error = %e,
                    "gemini key failed"
                );
                let next = llm.rotate_key();
                if attempt + 1 < attempts {
                    info!(next_key_index = next, "rotating to next gemini key");
                }
                last_error = Some(e);
            }
        }
    }

    Err(LlmError::AllKeysFailed(
        last_error.map(|e| e.to_string()).unwrap_or_default(),
    ))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
