//! LLM types: provider-neutral traits and errors.
//!
//! Route handlers and services only ever see [`TextModel`] and
//! [`ImageModel`]; the Gemini HTTP client is one implementation and test
//! mocks are another.

use std::pin::Pin;

use futures::Stream;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// No provider key is configured for this client.
    #[error("no API keys configured")]
    NoApiKeys,

    /// The HTTP request to the provider failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The provider returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The provider response body could not be deserialized.
    #[error("API response parse failed: {0}")]
    ApiParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// Every configured key was tried and failed.
    #[error("All API keys have hit quota limits or failed: {0}")]
    AllKeysFailed(String),
}

impl LlmError {
    /// True for quota/rate-limit failures (HTTP 429 or a quota message).
    #[must_use]
    pub fn is_quota_error(&self) -> bool {
        match self {
            Self::ApiResponse { status: 429, .. } => true,
            Self::ApiResponse { body, .. } => {
                let lower = body.to_ascii_lowercase();
                lower.contains("quota") || lower.contains("limit")
            }
            _ => false,
        }
    }

    /// True when retrying with another key could plausibly succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::ApiRequest(_) | Self::ApiResponse { status: 403 | 429 | 500..=599, .. })
    }
}

/// Incremental text emitted by a streaming generation call.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

// =============================================================================
// MODEL TRAITS
// =============================================================================

/// Text generation over a rotating set of API keys. Enables mocking in tests.
///
/// Each call uses the currently active key exactly once; retry policy lives in
/// [`super::generate_with_rotation`] and the NDJSON relay.
#[async_trait::async_trait]
pub trait TextModel: Send + Sync {
    /// Generate a complete response for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request fails or the response is malformed.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError>;

    /// Open a streaming generation for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the stream could not be opened.
    async fn stream(&self, model: &str, prompt: &str) -> Result<TextStream, LlmError>;

    /// Default model name used when a caller does not pick one.
    fn default_model(&self) -> &str;

    /// Number of configured keys.
    fn key_count(&self) -> usize;

    /// Index of the key the next call will use.
    fn active_key_index(&self) -> usize;

    /// Advance to the next key and return its index.
    fn rotate_key(&self) -> usize;
}

/// Image generation, returning base64-encoded PNG bytes without a data-URL prefix.
#[async_trait::async_trait]
pub trait ImageModel: Send + Sync {
    /// Generate one image for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request fails or no image is returned.
    async fn generate_image(&self, prompt: &str) -> Result<String, LlmError>;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
