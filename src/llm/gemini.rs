//! Gemini Generative Language API client.
//!
//! Thin HTTP wrapper for `generateContent`, `streamGenerateContent` (SSE)
//! and the Imagen `predict` endpoint. Parsing is kept in pure functions for
//! testability.

use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::config::LlmTimeouts;
use super::keys::KeyRing;
use super::types::{ImageModel, LlmError, TextModel, TextStream};

const API_KEY_HEADER: &str = "x-goog-api-key";

// =============================================================================
// CLIENT
// =============================================================================

pub struct GeminiClient {
    http: reqwest::Client,
    keys: KeyRing,
    base_url: String,
    model: String,
    image_model: String,
    request_timeout: Duration,
}

impl GeminiClient {
    /// Build a client over `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::NoApiKeys`] for an empty ring, or
    /// [`LlmError::HttpClientBuild`] if reqwest cannot be configured.
    pub fn new(
        keys: KeyRing,
        base_url: &str,
        model: &str,
        image_model: &str,
        timeouts: LlmTimeouts,
    ) -> Result<Self, LlmError> {
        if keys.is_empty() {
            return Err(LlmError::NoApiKeys);
        }
        let request_timeout = Duration::from_secs(timeouts.request_secs);
        let http = reqwest::Client::builder()
            .read_timeout(request_timeout)
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            keys,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.to_owned(),
            image_model: image_model.to_owned(),
            request_timeout,
        })
    }

    /// Total deadline for one call. Streamed bodies may legitimately run
    /// longer, so streams rely on the per-read timeout alone.
    fn deadline(&self, streaming: bool) -> Option<Duration> {
        (!streaming).then_some(self.request_timeout)
    }

    fn endpoint(&self, model: &str, action: &str) -> String {
        format!("{}/models/{model}:{action}", self.base_url)
    }

    async fn post(&self, url: &str, body: &impl Serialize, streaming: bool) -> Result<reqwest::Response, LlmError> {
        let key = self.keys.current().ok_or(LlmError::NoApiKeys)?;
        let mut request = self.http.post(url).header(API_KEY_HEADER, key).json(body);
        if let Some(deadline) = self.deadline(streaming) {
            request = request.timeout(deadline);
        }
        let response = request
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiResponse { status, body });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl TextModel for GeminiClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let body = GenerateRequest::from_prompt(prompt);
        let response = self.post(&self.endpoint(model, "generateContent"), &body, false).await?;
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        parse_generate_response(&text)
    }

    async fn stream(&self, model: &str, prompt: &str) -> Result<TextStream, LlmError> {
        let body = GenerateRequest::from_prompt(prompt);
        let url = format!("{}?alt=sse", self.endpoint(model, "streamGenerateContent"));
        let response = self.post(&url, &body, true).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::default();
            let mut failed = false;
            while let Some(next) = bytes.next().await {
                match next {
                    Ok(chunk) => {
                        for item in decoder.push(&chunk) {
                            yield item;
                        }
                    }
                    Err(e) => {
                        failed = true;
                        yield Err(LlmError::ApiRequest(e.to_string()));
                        break;
                    }
                }
            }
            if !failed {
                for item in decoder.finish() {
                    yield item;
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn active_key_index(&self) -> usize {
        self.keys.current_index()
    }

    fn rotate_key(&self) -> usize {
        self.keys.rotate()
    }
}

#[async_trait::async_trait]
impl ImageModel for GeminiClient {
    async fn generate_image(&self, prompt: &str) -> Result<String, LlmError> {
        let body = PredictRequest {
            instances: vec![PredictInstance { prompt }],
            parameters: PredictParameters { sample_count: 1 },
        };
        let response = self.post(&self.endpoint(&self.image_model, "predict"), &body, false).await?;
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        parse_predict_response(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

impl<'a> GenerateRequest<'a> {
    fn from_prompt(prompt: &'a str) -> Self {
        Self {
            contents: vec![RequestContent { role: "user", parts: vec![RequestPart { text: prompt }] }],
            generation_config: GenerationConfig { thinking_config: ThinkingConfig { thinking_budget: 0 } },
        }
    }
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    thinking_config: ThinkingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<PredictInstance<'a>>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Concatenate the text parts of the first candidate. Missing text is `""`.
fn parse_generate_response(json: &str) -> Result<String, LlmError> {
    let resp: GenerateResponse = serde_json::from_str(json).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    if resp.candidates.is_empty() {
        if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::ApiParse(format!("prompt blocked: {reason}")));
        }
    }
    Ok(candidate_text(resp.candidates))
}

fn candidate_text(candidates: Vec<Candidate>) -> String {
    candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn parse_predict_response(json: &str) -> Result<String, LlmError> {
    let resp: PredictResponse = serde_json::from_str(json).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    let Some(first) = resp.predictions.into_iter().next() else {
        return Err(LlmError::ApiParse("No images were generated".into()));
    };
    first
        .bytes_base64_encoded
        .filter(|b| !b.is_empty())
        .ok_or_else(|| LlmError::ApiParse("Generated image data is empty".into()))
}

/// Incremental decoder for `alt=sse` frames. Buffers raw bytes so multi-byte
/// characters split across network chunks are decoded intact.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, returning the text of every completed event.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, LlmError>> {
        self.buf.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
        let mut out = Vec::new();
        while let Some(pos) = find_event_boundary(&self.buf) {
            let event: Vec<u8> = self.buf.drain(..pos + 2).collect();
            if let Some(item) = decode_event(&event[..pos]) {
                out.push(item);
            }
        }
        out
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub(crate) fn finish(&mut self) -> Vec<Result<String, LlmError>> {
        let rest = std::mem::take(&mut self.buf);
        decode_event(&rest).into_iter().collect()
    }
}

fn find_event_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn decode_event(event: &[u8]) -> Option<Result<String, LlmError>> {
    let text = String::from_utf8_lossy(event);
    let data: String = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect::<Vec<_>>()
        .join("\n");
    if data.trim().is_empty() || data.trim() == "[DONE]" {
        return None;
    }
    let parsed = serde_json::from_str::<GenerateResponse>(&data)
        .map(|resp| candidate_text(resp.candidates))
        .map_err(|e| LlmError::ApiParse(e.to_string()));
    match parsed {
        Ok(text) if text.is_empty() => None,
        other => Some(other),
    }
}

#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;
