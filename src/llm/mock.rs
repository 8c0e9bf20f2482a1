//! Scripted model doubles shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::keys::KeyRing;
use super::types::{ImageModel, LlmError, TextModel, TextStream};

/// One scripted reply to a `generate` or `stream` call.
pub(crate) enum Reply {
    Text(String),
    Chunks(Vec<Result<String, LlmError>>),
    Fail(LlmError),
}

pub(crate) fn quota_error() -> LlmError {
    LlmError::ApiResponse { status: 429, body: "quota exceeded".into() }
}

pub(crate) struct MockModel {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
    keys: KeyRing,
}

impl MockModel {
    pub(crate) fn new(key_count: usize, replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            keys: KeyRing::new((0..key_count).map(|i| format!("mock-key-{i}")).collect()),
        }
    }

    pub(crate) fn text(reply: &str) -> Self {
        Self::new(1, vec![Reply::Text(reply.to_owned())])
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_reply(&self, prompt: &str) -> Reply {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::Fail(LlmError::ApiRequest("no scripted reply".into())))
    }
}

#[async_trait::async_trait]
impl TextModel for MockModel {
    async fn generate(&self, _model: &str, prompt: &str) -> Result<String, LlmError> {
        match self.next_reply(prompt) {
            Reply::Text(text) => Ok(text),
            Reply::Chunks(chunks) => chunks.into_iter().collect(),
            Reply::Fail(e) => Err(e),
        }
    }

    async fn stream(&self, _model: &str, prompt: &str) -> Result<TextStream, LlmError> {
        match self.next_reply(prompt) {
            Reply::Text(text) => Ok(Box::pin(futures::stream::iter(vec![Ok(text)]))),
            Reply::Chunks(chunks) => Ok(Box::pin(futures::stream::iter(chunks))),
            Reply::Fail(e) => Err(e),
        }
    }

    fn default_model(&self) -> &str {
        "mock-model"
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

/// Image double returning a fixed base64 payload or an error.
pub(crate) struct MockPainter {
    pub(crate) result: Mutex<Option<Result<String, LlmError>>>,
}

impl MockPainter {
    pub(crate) fn ok(base64: &str) -> Self {
        Self { result: Mutex::new(Some(Ok(base64.to_owned()))) }
    }

    pub(crate) fn failing(err: LlmError) -> Self {
        Self { result: Mutex::new(Some(Err(err))) }
    }
}

#[async_trait::async_trait]
impl ImageModel for MockPainter {
    async fn generate_image(&self, _prompt: &str) -> Result<String, LlmError> {
        self.result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(LlmError::ApiParse("No images were generated".into())))
    }
}
