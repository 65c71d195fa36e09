//! Completion client: one shape over the text and vision providers.
//!
//! The orchestrator only sees [`CompletionClient`]. It hands over a prompt
//! (plus images for the vision tier) and gets back either the raw content
//! string or a [`CompletionError`]. Nothing thrown by a provider crosses this
//! boundary, and a reply with empty content is a failure, not an empty answer.
//!
//! ## Retry Strategy
//!
//! Retries live here, in the transport, and only for transient failures
//! (HTTP 429, 5xx, timeouts, connection resets). Backoff is exponential:
//! `retry_backoff_ms * 2^(attempt-1)` (saturating), so with 500 ms and 2
//! retries the waits are 500 ms → 1 s. Permanent errors (bad key, 400)
//! return at once.
//! The orchestrator never re-attempts a tier.

use crate::config::ExtractionConfig;
use crate::error::CompletionError;
use crate::prompts::SYSTEM_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Longest provider message surfaced to callers.
const MAX_ERROR_CHARS: usize = 200;

/// Which provider a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// Plain JSON-object completion over text.
    Text,
    /// Mixed image + text input.
    Vision,
}

/// A single completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub kind: CompletionKind,
    pub prompt: String,
    /// Attached images; empty for text requests.
    pub images: Vec<ImageData>,
}

impl CompletionRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            kind: CompletionKind::Text,
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }

    pub fn vision(prompt: impl Into<String>, images: Vec<ImageData>) -> Self {
        Self {
            kind: CompletionKind::Vision,
            prompt: prompt.into(),
            images,
        }
    }
}

/// A successful completion: non-empty content plus token usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Completion {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            input_tokens: 0,
            output_tokens: 0,
        }
    }
}

/// Adapter over the upstream completion providers.
///
/// Implementations must not panic and must report every failure as a
/// [`CompletionError`].
pub trait CompletionClient: Send + Sync {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<Completion, CompletionError>> + Send;
}

/// [`CompletionClient`] backed by `edgequake-llm` providers.
pub struct ProviderCompletionClient {
    text: Arc<dyn LLMProvider>,
    vision: Arc<dyn LLMProvider>,
    text_options: CompletionOptions,
    vision_options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout_secs: u64,
}

impl ProviderCompletionClient {
    /// Build a client. `vision` may be the same provider as `text`.
    pub fn new(
        text: Arc<dyn LLMProvider>,
        vision: Arc<dyn LLMProvider>,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            text,
            vision,
            text_options: build_options(config, CompletionKind::Text),
            vision_options: build_options(config, CompletionKind::Vision),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
        }
    }
}

impl CompletionClient for ProviderCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        let start = Instant::now();
        let (provider, options) = match request.kind {
            CompletionKind::Text => (&self.text, &self.text_options),
            CompletionKind::Vision => (&self.vision, &self.vision_options),
        };
        let messages = build_messages(&request);

        let mut last_err: Option<CompletionError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "{:?} completion: retry {}/{} after {}ms",
                    request.kind, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let call = provider.chat(&messages, Some(options));
            match timeout(Duration::from_secs(self.timeout_secs), call).await {
                Ok(Ok(response)) => {
                    if response.content.trim().is_empty() {
                        warn!("{:?} completion: empty content", request.kind);
                        return Err(CompletionError::EmptyCompletion);
                    }
                    debug!(
                        "{:?} completion: {} input tokens, {} output tokens, {:?}",
                        request.kind,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(Completion {
                        content: response.content,
                        input_tokens: response.prompt_tokens as u64,
                        output_tokens: response.completion_tokens as u64,
                    });
                }
                Ok(Err(e)) => {
                    let detail = sanitize_message(&e.to_string());
                    warn!(
                        "{:?} completion: attempt {} failed — {}",
                        request.kind,
                        attempt + 1,
                        detail
                    );
                    let transient = is_transient(&detail);
                    last_err = Some(CompletionError::Provider {
                        retries: attempt,
                        detail,
                    });
                    if !transient {
                        break;
                    }
                }
                Err(_) => {
                    warn!(
                        "{:?} completion: attempt {} timed out after {}s",
                        request.kind,
                        attempt + 1,
                        self.timeout_secs
                    );
                    last_err = Some(CompletionError::Timeout {
                        secs: self.timeout_secs,
                    });
                }
            }
        }

        Err(last_err.unwrap_or(CompletionError::EmptyCompletion))
    }
}

/// Message layout: system contract, then one user turn carrying the prompt
/// (and, for vision, the images).
fn build_messages(request: &CompletionRequest) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
    match request.kind {
        CompletionKind::Text => messages.push(ChatMessage::user(request.prompt.as_str())),
        CompletionKind::Vision => messages.push(ChatMessage::user_with_images(
            request.prompt.as_str(),
            request.images.clone(),
        )),
    }
    messages
}

/// Build `CompletionOptions` from the extraction config. Text requests ask
/// for a JSON object; vision requests leave the format to the prompt.
fn build_options(config: &ExtractionConfig, kind: CompletionKind) -> CompletionOptions {
    let base = match kind {
        CompletionKind::Text => CompletionOptions::json_mode(),
        CompletionKind::Vision => CompletionOptions::default(),
    };
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..base
    }
}

/// Delay before retry `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Rate limits, server errors, timeouts and connection failures.
pub fn is_transient(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    [
        "429",
        "rate limit",
        "too many requests",
        "500",
        "502",
        "503",
        "504",
        "internal server error",
        "bad gateway",
        "service unavailable",
        "overloaded",
        "timeout",
        "timed out",
        "connection",
        "network",
    ]
    .iter()
    .any(|needle| m.contains(needle))
}

/// First line only, bounded length.
fn sanitize_message(message: &str) -> String {
    let first = message.lines().next().unwrap_or("").trim();
    if first.is_empty() {
        return "unknown provider error".to_string();
    }
    if first.chars().count() > MAX_ERROR_CHARS {
        let cut: String = first.chars().take(MAX_ERROR_CHARS - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        first.to_string()
    }
}
