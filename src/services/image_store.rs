//! Image storage: hosted upload of generated images.
//!
//! DESIGN
//! ======
//! The image pipeline depends only on [`ImageStore`]. The production
//! implementation is Cloudinary's signed upload API over plain HTTPS: the
//! signature is the SHA-256 of the sorted signed parameters followed by the
//! API secret.

use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::session::bytes_to_hex;

const DEFAULT_CLOUDINARY_BASE_URL: &str = "https://api.cloudinary.com/v1_1";
const UPLOAD_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
    #[error("upload request failed: {0}")]
    Request(String),
    #[error("upload rejected: status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("upload response parse failed: {0}")]
    Parse(String),
}

/// Stores a base64 PNG and returns its public HTTPS URL.
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the upload fails.
    async fn upload_png(&self, base64_png: &str, folder: &str, public_id: &str) -> Result<String, StoreError>;
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

impl CloudinaryConfig {
    /// Read `CLOUDINARY_*` variables. `None` unless name, key and secret are all set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(crate::config::env_string)
    }

    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        Some(Self {
            cloud_name: lookup("CLOUDINARY_CLOUD_NAME")?,
            api_key: lookup("CLOUDINARY_API_KEY")?,
            api_secret: lookup("CLOUDINARY_API_SECRET")?,
            base_url: lookup("CLOUDINARY_BASE_URL").unwrap_or_else(|| DEFAULT_CLOUDINARY_BASE_URL.to_owned()),
        })
    }
}

// =============================================================================
// SIGNING
// =============================================================================

/// Cloudinary request signature over `params` (any order).
#[must_use]
pub fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    bytes_to_hex(&Sha256::digest(format!("{joined}{api_secret}").as_bytes()))
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Extract `secure_url` from a successful upload response.
///
/// # Errors
///
/// Returns [`StoreError::Parse`] if the body is not an upload result.
pub fn parse_upload_response(body: &str) -> Result<String, StoreError> {
    serde_json::from_str::<UploadResponse>(body)
        .map(|r| r.secure_url)
        .map_err(|e| StoreError::Parse(e.to_string()))
}

fn rejection_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body).map_or_else(|_| body.to_owned(), |e| e.error.message)
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct CloudinaryStore {
    http: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryStore {
    /// # Errors
    ///
    /// Returns [`StoreError::HttpClientBuild`] if reqwest cannot be configured.
    pub fn new(config: CloudinaryConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn upload_url(&self) -> String {
        format!("{}/{}/image/upload", self.config.base_url.trim_end_matches('/'), self.config.cloud_name)
    }
}

#[async_trait::async_trait]
impl ImageStore for CloudinaryStore {
    async fn upload_png(&self, base64_png: &str, folder: &str, public_id: &str) -> Result<String, StoreError> {
        let file = if base64_png.starts_with("data:") {
            base64_png.to_owned()
        } else {
            format!("data:image/png;base64,{base64_png}")
        };
        let timestamp = time::OffsetDateTime::now_utc().unix_timestamp().to_string();
        let signature = sign(
            &[("folder", folder), ("public_id", public_id), ("timestamp", &timestamp)],
            &self.config.api_secret,
        );
        let form = [
            ("file", file.as_str()),
            ("api_key", self.config.api_key.as_str()),
            ("folder", folder),
            ("public_id", public_id),
            ("timestamp", timestamp.as_str()),
            ("signature", signature.as_str()),
            ("signature_algorithm", "sha256"),
        ];

        let response = self
            .http
            .post(self.upload_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| StoreError::Request(e.to_string()))?;
        if status != 200 {
            return Err(StoreError::Rejected { status, message: rejection_message(&body) });
        }
        let url = parse_upload_response(&body)?;
        tracing::info!(%public_id, %url, "image uploaded");
        Ok(url)
    }
}

#[cfg(test)]
#[path = "image_store_test.rs"]
mod tests;
