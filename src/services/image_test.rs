use std::sync::Mutex;

use super::*;
use crate::llm::mock::{MockModel, MockPainter, Reply, quota_error};

/// Records uploads and returns a fixed URL or a rejection.
pub(crate) struct MockStore {
    pub(crate) uploads: Mutex<Vec<(String, String, String)>>,
    fail: bool,
}

impl MockStore {
    pub(crate) fn ok() -> Self {
        Self { uploads: Mutex::new(Vec::new()), fail: false }
    }

    fn failing() -> Self {
        Self { uploads: Mutex::new(Vec::new()), fail: true }
    }
}

#[async_trait::async_trait]
impl ImageStore for MockStore {
    async fn upload_png(&self, base64_png: &str, folder: &str, public_id: &str) -> Result<String, StoreError> {
        self.uploads
            .lock()
            .unwrap()
            .push((base64_png.to_owned(), folder.to_owned(), public_id.to_owned()));
        if self.fail {
            Err(StoreError::Rejected { status: 500, message: "down".into() })
        } else {
            Ok("https://cdn.example/img.png".into())
        }
    }
}

fn imaging(prompter: MockModel, painter: MockPainter, store: Arc<MockStore>) -> Imaging {
    Imaging { prompter: Arc::new(prompter), painter: Arc::new(painter), store }
}

#[tokio::test]
async fn render_runs_every_stage() {
    let prompter = Arc::new(MockModel::text("  A happy fox in a meadow  \n"));
    let store = Arc::new(MockStore::ok());
    let pipeline = Imaging {
        prompter: prompter.clone(),
        painter: Arc::new(MockPainter::ok("iVBORw0KGgo=")),
        store: store.clone(),
    };
    let paragraph_id = Uuid::new_v4();

    let rendered = pipeline.render(paragraph_id, "the fox", "The fox was happy.").await.unwrap();
    assert_eq!(rendered.url, "https://cdn.example/img.png");
    assert_eq!(rendered.prompt, "A happy fox in a meadow");
    assert!(prompter.prompts()[0].contains("SELECTED TEXT: \"the fox\""));

    let uploads = store.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "iVBORw0KGgo=");
    assert_eq!(uploads[0].1, IMAGE_FOLDER);
    assert!(uploads[0].2.starts_with(&format!("paragraph-{paragraph_id}-")));
}

#[tokio::test]
async fn render_reports_prompt_failure_as_ai_error() {
    let pipeline = imaging(
        MockModel::new(1, vec![Reply::Fail(quota_error())]),
        MockPainter::ok("x"),
        Arc::new(MockStore::ok()),
    );
    let err = pipeline.render(Uuid::new_v4(), "a", "b").await.unwrap_err();
    assert!(matches!(err, ImageError::PromptOptimization(_)));
    assert_eq!(err.code(), "AI_ERROR");
    assert_eq!(err.to_string(), "Failed to optimize image prompt");
}

#[tokio::test]
async fn render_rejects_blank_optimized_prompt() {
    let pipeline = imaging(MockModel::text("   "), MockPainter::ok("x"), Arc::new(MockStore::ok()));
    assert!(matches!(
        pipeline.render(Uuid::new_v4(), "a", "b").await,
        Err(ImageError::PromptOptimization(_))
    ));
}

#[tokio::test]
async fn render_reports_painter_failure() {
    let store = Arc::new(MockStore::ok());
    let pipeline = imaging(
        MockModel::text("prompt"),
        MockPainter::failing(LlmError::ApiParse("No images were generated".into())),
        store.clone(),
    );
    let err = pipeline.render(Uuid::new_v4(), "a", "b").await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to generate image");
    assert_eq!(err.code(), "AI_ERROR");
    assert!(store.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn render_reports_upload_failure_as_storage_error() {
    let pipeline = imaging(MockModel::text("prompt"), MockPainter::ok("x"), Arc::new(MockStore::failing()));
    let err = pipeline.render(Uuid::new_v4(), "a", "b").await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to upload image to cloud storage");
    assert_eq!(err.code(), "STORAGE_ERROR");
}

#[test]
fn public_id_embeds_paragraph_and_millis() {
    let id = Uuid::nil();
    assert_eq!(public_id(id, 1_700_000_000_123), format!("paragraph-{id}-1700000000123"));
}

#[test]
fn not_found_is_validation_error() {
    assert_eq!(ImageError::ParagraphNotFound.code(), "VALIDATION_ERROR");
}
