//! VLM interaction: send one file's pages with the instruction, recover JSON.
//!
//! The network call lives behind the [`VisionClient`] trait. The default
//! implementation, [`LlmVisionClient`], wraps any `edgequake-llm` provider;
//! tests and embedders can supply their own. Every failure comes back as a
//! [`FileError`] value so the orchestrator can tag the file and move on.
//!
//! Calls are attempted once. A failed call is reported on the record and the
//! caller decides whether to resubmit that file.

use crate::error::FileError;
use crate::pipeline::optimize::OptimizedImage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Text answer from the inference endpoint plus token usage.
#[derive(Debug, Clone, Default)]
pub struct VisionResponse {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A multimodal endpoint that answers an instruction about some images.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Send `instruction` and all `images` as a single request.
    async fn complete(
        &self,
        instruction: &str,
        images: &[OptimizedImage],
    ) -> Result<VisionResponse, FileError>;
}

/// [`VisionClient`] backed by an `edgequake-llm` provider.
pub struct LlmVisionClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmVisionClient {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl VisionClient for LlmVisionClient {
    async fn complete(
        &self,
        instruction: &str,
        images: &[OptimizedImage],
    ) -> Result<VisionResponse, FileError> {
        // Instruction and pages travel in one user turn, pages in order.
        let attachments = images.iter().map(OptimizedImage::to_image_data).collect();
        let messages = vec![ChatMessage::user_with_images(instruction, attachments)];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| FileError::Call {
                detail: e.to_string(),
            })?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        Ok(VisionResponse {
            text: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

/// Run one request under `timeout_secs`.
pub async fn call_with_timeout(
    client: &dyn VisionClient,
    instruction: &str,
    images: &[OptimizedImage],
    timeout_secs: u64,
) -> Result<VisionResponse, FileError> {
    match tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        client.complete(instruction, images),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(FileError::Timeout { secs: timeout_secs }),
    }
}

// ── Response parsing ─────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Parse the model's answer into a JSON object or array of objects.
///
/// Models are told to answer with bare JSON but regularly wrap it in a code
/// fence or a sentence of prose, so the first balanced `{…}` / `[…]` span
/// that parses as an object or an array of objects is taken.
pub fn parse_response(text: &str) -> Result<Value, FileError> {
    let trimmed = text.trim();
    let parse_error = |detail: &str| FileError::Parse {
        detail: detail.to_string(),
        raw_response: text.to_string(),
    };

    if trimmed.is_empty() {
        return Err(parse_error("empty response"));
    }

    let body = match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps.get(1).map_or(trimmed, |m| m.as_str()),
        None => trimmed,
    };

    let mut saw_json = false;
    let value = json_candidates(body).find_map(|span| {
        let value = serde_json::from_str::<Value>(span).ok()?;
        saw_json = true;
        is_record_shaped(&value).then_some(value)
    });

    match value {
        Some(value) => Ok(value),
        None if saw_json => {
            warn!("Model returned JSON of unexpected shape");
            Err(parse_error("expected an object or an array of objects"))
        }
        None => Err(parse_error("no JSON object found")),
    }
}

fn is_record_shaped(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().all(Value::is_object),
        _ => false,
    }
}

/// Every balanced `{…}` or `[…]` span, in order of its opening bracket.
fn json_candidates(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|&(_, c)| c == '{' || c == '[')
        .filter_map(move |(start, _)| balanced_span(text, start))
}

/// The balanced span starting at `start`, skipping brackets inside strings.
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
