//! Extraction entry points and the tier orchestrator.
//!
//! ## Tiers
//!
//! ```text
//! admit ─▶ text layer? ─yes─▶ segment ─▶ text completion ─▶ validate ─▶ items? ─yes─▶ normalize
//!              │ no                                                      │ no
//!              └──────────────▶ vision completion ─▶ validate ─▶ items? ─┴─yes─┘
//!                                                                  │ no
//!                                                          ExtractionFailed
//! ```
//!
//! Only admission (size and media type) and a failed vision tier are fatal.
//! Everything in the text tier degrades: no text layer, a provider error and
//! a reply with zero valid items all lead to the same fallback. The reason
//! is still recorded in [`ExtractionStats::text_tier`] so callers can tell an
//! outage from an empty page.
//!
//! A tier is never re-attempted here; bounded retries live in the
//! completion transport.

use crate::config::ExtractionConfig;
use crate::document::{
    DocumentInspection, ExtractionOutput, ExtractionStage, ExtractionStats, ParsedDocument,
    RawDocument, TextTierOutcome,
};
use crate::error::ExtractError;
use crate::pipeline::completion::{CompletionClient, CompletionRequest, ProviderCompletionClient};
use crate::pipeline::{encode, input, normalize, segment, text, validate};
use crate::prompts::{self, PROMPT_VERSION};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Message used when the vision tier answered but nothing survived validation.
pub const NOTHING_EXTRACTED: &str =
    "No stock items could be extracted from the report. Try a clearer photo or scan.";

/// Extract restock items from an in-memory document.
///
/// Resolves the text and vision providers from `config` (or the
/// environment), then runs [`extract_with_client`].
///
/// # Errors
/// * [`ExtractError::PayloadTooLarge`] / [`ExtractError::UnsupportedMediaType`]
///   before any stage runs.
/// * [`ExtractError::ProviderNotConfigured`] when no provider can be built.
/// * [`ExtractError::ExtractionFailed`] when both tiers come back empty.
pub async fn extract(
    document: &RawDocument,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    // Reject before touching provider configuration.
    input::admit(document, config.max_payload_bytes)?;

    let (text_provider, vision_provider) = resolve_providers(config)?;
    let client = ProviderCompletionClient::new(text_provider, vision_provider, config);
    extract_with_client(document, &client, config).await
}

/// Resolve a file path or URL and extract from it.
pub async fn extract_file(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let document = input::resolve_input(
        input_str.as_ref(),
        None,
        config.max_payload_bytes,
        config.download_timeout_secs,
    )
    .await?;
    extract(&document, config).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    document: &RawDocument,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(document, config))
}

/// Run the tiered pipeline against any [`CompletionClient`].
pub async fn extract_with_client<C: CompletionClient>(
    document: &RawDocument,
    client: &C,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let total_start = Instant::now();
    let kind = input::admit(document, config.max_payload_bytes)?;
    info!(
        "Starting extraction: {} ({:?}, {} bytes)",
        document.media_type(),
        kind,
        document.size()
    );

    let mut usage = Usage::default();
    let mut dropped_items = 0;

    // ── Text tier ────────────────────────────────────────────────────────
    let extracted = text::extract_text(document, config.line_break_threshold).await;
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(document.size(), extracted.is_some());
    }

    let mut text_blocks = 0;
    let text_tier = match extracted {
        None => {
            info!("No text layer, going straight to vision");
            TextTierOutcome::NoTextLayer
        }
        Some(extracted) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_stage_start(ExtractionStage::Text);
            }
            let blocks = segment::segment(&extracted.text);
            text_blocks = blocks.len();
            debug!(
                "Text layer: {} chars in {} block(s)",
                extracted.text.len(),
                blocks.len()
            );

            let prompt = prompts::build_text_prompt(&blocks);
            match client.complete(CompletionRequest::text(prompt)).await {
                Ok(completion) => {
                    usage.add(completion.input_tokens, completion.output_tokens);
                    let parsed = validate::validate(&completion.content);
                    dropped_items += parsed.dropped;
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_stage_complete(ExtractionStage::Text, parsed.items.len());
                    }
                    if !parsed.is_empty() {
                        let count = parsed.items.len();
                        let output = finish(
                            parsed,
                            ExtractionStage::Text,
                            TextTierOutcome::Items { count },
                            text_blocks,
                            dropped_items,
                            usage,
                            total_start,
                            config,
                        );
                        return Ok(output);
                    }
                    TextTierOutcome::NoItems
                }
                Err(e) => {
                    warn!("Text completion failed: {}", e);
                    TextTierOutcome::ProviderFailed {
                        message: e.to_string(),
                    }
                }
            }
        }
    };

    // ── Vision tier ──────────────────────────────────────────────────────
    let reason = fallback_reason(&text_tier);
    info!("Falling back to vision: {}", reason);
    if let Some(ref cb) = config.progress_callback {
        cb.on_fallback(ExtractionStage::Text, &reason);
        cb.on_stage_start(ExtractionStage::Vision);
    }

    let images = encode::vision_images(document, config).await;
    debug!("Vision payload: {} image(s)", images.len());
    let request = CompletionRequest::vision(prompts::build_vision_prompt(), images);

    let completion = match client.complete(request).await {
        Ok(completion) => completion,
        Err(e) => {
            warn!("Vision completion failed: {}", e);
            return Err(give_up(e.to_string(), config));
        }
    };
    usage.add(completion.input_tokens, completion.output_tokens);

    let parsed = validate::validate(&completion.content);
    dropped_items += parsed.dropped;
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(ExtractionStage::Vision, parsed.items.len());
    }
    if parsed.is_empty() {
        warn!("Vision tier produced no valid items");
        return Err(give_up(NOTHING_EXTRACTED.to_string(), config));
    }

    Ok(finish(
        parsed,
        ExtractionStage::Vision,
        text_tier,
        text_blocks,
        dropped_items,
        usage,
        total_start,
        config,
    ))
}

/// Run admission, text extraction and segmentation without calling a
/// provider.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(
    document: &RawDocument,
    config: &ExtractionConfig,
) -> Result<DocumentInspection, ExtractError> {
    let kind = input::admit(document, config.max_payload_bytes)?;
    let extracted = text::extract_text(document, config.line_break_threshold).await;

    let (text_chars, blocks) = match &extracted {
        Some(t) => (t.text.chars().count(), segment::segment(&t.text)),
        None => (0, Vec::new()),
    };
    let text_prompt = extracted
        .as_ref()
        .map(|_| prompts::build_text_prompt(&blocks));

    Ok(DocumentInspection {
        media_type: document.media_type().to_string(),
        kind,
        size_bytes: document.size(),
        has_text_layer: extracted.is_some(),
        text_chars,
        blocks,
        text_prompt,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Terminal vision failure: report it to the callback, then fail the run.
fn give_up(message: String, config: &ExtractionConfig) -> ExtractError {
    if let Some(ref cb) = config.progress_callback {
        cb.on_fallback(ExtractionStage::Vision, &message);
    }
    ExtractError::ExtractionFailed { message }
}

#[derive(Debug, Default, Clone, Copy)]
struct Usage {
    input: u64,
    output: u64,
}

impl Usage {
    fn add(&mut self, input: u64, output: u64) {
        self.input += input;
        self.output += output;
    }
}

fn fallback_reason(outcome: &TextTierOutcome) -> String {
    match outcome {
        TextTierOutcome::NoTextLayer => "no text layer".to_string(),
        TextTierOutcome::ProviderFailed { message } => format!("text completion failed: {message}"),
        TextTierOutcome::NoItems => "text completion returned no items".to_string(),
        TextTierOutcome::Items { count } => format!("{count} items"),
    }
}

#[allow(clippy::too_many_arguments)]
fn finish(
    parsed: ParsedDocument,
    stage: ExtractionStage,
    text_tier: TextTierOutcome,
    text_blocks: usize,
    dropped_items: usize,
    usage: Usage,
    total_start: Instant,
    config: &ExtractionConfig,
) -> ExtractionOutput {
    let (items, duplicate_items) = normalize::normalize_items(parsed.items);

    let stats = ExtractionStats {
        stage,
        text_tier,
        text_blocks,
        dropped_items,
        duplicate_items,
        total_input_tokens: usage.input,
        total_output_tokens: usage.output,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        prompt_version: PROMPT_VERSION.to_string(),
    };

    info!(
        "Extraction complete via {} tier: {} items ({} dropped, {} merged), {}ms",
        stage,
        items.len(),
        dropped_items,
        duplicate_items,
        stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(stage, items.len());
    }

    ExtractionOutput { items, stats }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Text and vision providers. The vision tier reuses the text provider
/// unless a separate provider or model was asked for.
fn resolve_providers(
    config: &ExtractionConfig,
) -> Result<(Arc<dyn LLMProvider>, Arc<dyn LLMProvider>), ExtractError> {
    let text = resolve_provider(config, ExtractionStage::Text)?;
    let separate_vision = config.vision_provider.is_some()
        || (config.provider.is_none() && config.vision_model.is_some());
    let vision = if separate_vision {
        resolve_provider(config, ExtractionStage::Vision)?
    } else {
        Arc::clone(&text)
    };
    Ok((text, vision))
}

/// Resolve the provider for one tier, from most-specific to least-specific:
///
/// 1. pre-built provider (`vision_provider` for the vision tier, then
///    `provider`)
/// 2. named provider + model (`provider_name`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. `OPENAI_API_KEY`
/// 5. full auto-detection (`ProviderFactory::from_env`)
fn resolve_provider(
    config: &ExtractionConfig,
    stage: ExtractionStage,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if stage == ExtractionStage::Vision {
        if let Some(ref provider) = config.vision_provider {
            return Ok(Arc::clone(provider));
        }
    }
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = match stage {
        ExtractionStage::Text => config.text_model(),
        ExtractionStage::Vision => config.vision_model(),
    };

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            // An explicit model in config still wins over the env model.
            let explicit = match stage {
                ExtractionStage::Text => config.model.as_deref(),
                ExtractionStage::Vision => config.vision_model.as_deref().or(config.model.as_deref()),
            };
            return create_provider(&prov, explicit.unwrap_or(&env_model));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
