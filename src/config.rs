//! Configuration for stock-report extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The builder clamps numeric knobs to
//! sane ranges and `build()` rejects combinations that cannot work.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Hard ceiling on accepted payloads: 10 MB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for one or more extraction runs.
///
/// # Example
/// ```rust
/// use restock_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4o-mini")
///     .max_retries(1)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_payload_bytes, 10 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Payloads larger than this are rejected before any stage runs. Default: 10 MB.
    pub max_payload_bytes: usize,

    /// Model for the text tier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Model for the vision tier. If None, falls back to `model`.
    pub vision_model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed provider for the vision tier only. Falls back to `provider`.
    pub vision_provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction is transcription; any creativity shows up as invented rows.
    pub temperature: f32,

    /// Maximum tokens per completion. Default: 4096.
    pub max_tokens: usize,

    /// Transport retries for transient provider failures (429, 5xx, timeouts). Default: 2.
    ///
    /// These belong to the completion adapter. The orchestrator never
    /// re-attempts a tier; it only falls through to the next one.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-completion timeout in seconds. Default: 90.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Vertical cursor movement (PDF text-space units) that starts a new
    /// line during text-layer extraction. Default: 5.0.
    pub line_break_threshold: f32,

    /// Rasterise PDF pages to PNG for the vision tier. Default: true.
    ///
    /// When false, or when pdfium cannot be bound, the original PDF bytes
    /// are sent as an `application/pdf` data URL.
    pub rasterize_pdf: bool,

    /// Maximum PDF pages rendered for the vision tier. Default: 4.
    pub max_vision_pages: usize,

    /// Longest edge of a rendered page in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Optional stage event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            model: None,
            vision_model: None,
            provider_name: None,
            provider: None,
            vision_provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 90,
            download_timeout_secs: 60,
            line_break_threshold: 5.0,
            rasterize_pdf: true,
            max_vision_pages: 4,
            max_rendered_pixels: 2000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("model", &self.model)
            .field("vision_model", &self.vision_model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "vision_provider",
                &self.vision_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("line_break_threshold", &self.line_break_threshold)
            .field("rasterize_pdf", &self.rasterize_pdf)
            .field("max_vision_pages", &self.max_vision_pages)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model for the text tier.
    pub fn text_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Model for the vision tier.
    pub fn vision_model(&self) -> &str {
        self.vision_model.as_deref().unwrap_or_else(|| self.text_model())
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn max_payload_bytes(mut self, n: usize) -> Self {
        self.config.max_payload_bytes = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn vision_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.vision_provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn line_break_threshold(mut self, units: f32) -> Self {
        self.config.line_break_threshold = units.max(0.0);
        self
    }

    pub fn rasterize_pdf(mut self, v: bool) -> Self {
        self.config.rasterize_pdf = v;
        self
    }

    pub fn max_vision_pages(mut self, n: usize) -> Self {
        self.config.max_vision_pages = n.max(1);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.max_payload_bytes == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_payload_bytes must be > 0".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig("max_tokens must be > 0".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "api_timeout_secs must be > 0".into(),
            ));
        }
        if matches!(c.model.as_deref(), Some(m) if m.trim().is_empty()) {
            return Err(ExtractError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}
