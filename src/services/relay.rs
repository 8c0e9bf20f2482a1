//! NDJSON relay: re-chunk an upstream model stream for the browser.
//!
//! DESIGN
//! ======
//! Upstream deltas are buffered and flushed as `{"chunk": "..."}\n` lines
//! once the buffer holds at least [`FLUSH_THRESHOLD`] characters, with a
//! short pause after each flush so the client renders smoothly. Whatever is
//! left is flushed when the upstream ends.
//!
//! A failure before the first line has been sent rotates to the next key and
//! starts over, at most once per key. After the first line, or once every key
//! has failed, a single `{"error": ...}\n` line is emitted and the stream
//! ends. Each relay is one request-scoped task; nothing is shared across
//! requests except the key cursor.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::json;
use tracing::{info, warn};

use crate::llm::TextModel;

pub const FLUSH_THRESHOLD: usize = 20;
pub const FLUSH_PAUSE: Duration = Duration::from_millis(5);
pub const EXHAUSTED_MESSAGE: &str = "All API keys have hit quota limits";

#[must_use]
pub fn chunk_line(text: &str) -> String {
    let mut line = json!({ "chunk": text }).to_string();
    line.push('\n');
    line
}

#[must_use]
pub fn error_line(message: &str) -> String {
    let mut line = json!({ "error": message }).to_string();
    line.push('\n');
    line
}

/// Stream NDJSON lines for `prompt`. Never fails at the HTTP level; errors
/// are reported in-band.
pub fn relay(
    llm: Arc<dyn TextModel>,
    model: String,
    prompt: String,
) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
    async_stream::stream! {
        let max_attempts = llm.key_count().max(1);
        let mut attempt = 0;
        let mut sent_any = false;

        loop {
            attempt += 1;
            let key = llm.active_key_index();
            let mut upstream = match llm.stream(&model, &prompt).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    warn!(key, attempt, error = %e, "stream open failed");
                    llm.rotate_key();
                    if attempt < max_attempts {
                        continue;
                    }
                    yield Ok(error_line(EXHAUSTED_MESSAGE));
                    break;
                }
            };

            let mut buffer = String::new();
            let mut failure = None;
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(text) => {
                        buffer.push_str(&text);
                        if buffer.chars().count() >= FLUSH_THRESHOLD {
                            yield Ok(chunk_line(&buffer));
                            buffer.clear();
                            sent_any = true;
                            tokio::time::sleep(FLUSH_PAUSE).await;
                        }
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            let Some(e) = failure else {
                if !buffer.is_empty() {
                    yield Ok(chunk_line(&buffer));
                }
                info!(key, attempt, "stream relayed");
                break;
            };

            warn!(key, attempt, sent_any, error = %e, "stream failed");
            llm.rotate_key();
            if sent_any {
                if !buffer.is_empty() {
                    yield Ok(chunk_line(&buffer));
                }
                yield Ok(error_line(EXHAUSTED_MESSAGE));
                break;
            }
            if attempt >= max_attempts {
                yield Ok(error_line(EXHAUSTED_MESSAGE));
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
