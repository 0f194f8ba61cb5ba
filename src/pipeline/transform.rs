//! Chunk transformation: drive the LLM for one chunk under the rate-limit
//! discipline.
//!
//! ## State machine
//!
//! ```text
//!            ┌──────── rate limited ────────┐
//!            ▼                              │
//! start ──▶ Attempt ──▶ ok ──▶ Success      │
//!            │  └──────────────────────▶ Backoff (wait, retry += 1)
//!            └── any other error ──▶ Failed
//! ```
//!
//! The loop is explicit, so the number of backoff rounds is bounded by
//! `max_rate_limit_retries` (or by the cancellation token when unbounded) and
//! recorded in the [`ChunkResult`]. Nothing is persisted here; the driver
//! stores outputs.

use crate::config::PipelineConfig;
use crate::document::Chunk;
use crate::error::{PipelineError, TransformError};
use crate::output::{ChunkResult, ChunkStatus};
use crate::pipeline::postprocess::clean_markdown;
use crate::prompts::build_chunk_prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Text returned by one successful transformation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transformed {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// The text-transformation service.
///
/// Implementations make exactly one attempt per call and report throttling
/// as [`TransformError::RateLimited`]; retrying is the orchestrator's job.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, system: Option<&str>, prompt: &str) -> Result<Transformed, TransformError>;
}

/// [`Transformer`] backed by an `edgequake-llm` provider.
pub struct LlmTransformer {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmTransformer {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }

    /// Resolve the provider from `config` and apply its sampling settings.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config.temperature, config.max_tokens))
    }
}

#[async_trait]
impl Transformer for LlmTransformer {
    async fn transform(&self, system: Option<&str>, prompt: &str) -> Result<Transformed, TransformError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| classify_error(&e.to_string()))?;

        if response.content.trim().is_empty() {
            return Err(TransformError::Failed {
                detail: "empty response from model".to_string(),
            });
        }

        Ok(Transformed {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

static RE_THROTTLED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b429\b|rate[ _-]?limit|too many requests").expect("valid regex")
});

static RE_RETRY_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)retry[ _-]?after\D{0,16}?(\d+)|try again in (\d+)\s*s").expect("valid regex")
});

/// Map a provider error message onto the transform taxonomy.
///
/// Providers surface throttling as HTTP 429 or a "rate limit" / "too many
/// requests" message; everything else is terminal for the chunk. The status
/// code must stand alone so token counts and request IDs never match.
pub fn classify_error(message: &str) -> TransformError {
    let throttled = RE_THROTTLED.is_match(message);

    if throttled {
        let retry_after_secs = RE_RETRY_AFTER.captures(message).and_then(|c| {
            c.get(1)
                .or_else(|| c.get(2))
                .and_then(|m| m.as_str().parse().ok())
        });
        TransformError::RateLimited {
            retry_after_secs,
            detail: message.to_string(),
        }
    } else {
        TransformError::Failed {
            detail: message.to_string(),
        }
    }
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. pre-built `config.provider`
/// 2. `config.provider_name` (+ `config.model`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. `ProviderFactory::from_env()` auto-detection
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| PipelineError::ProviderNotConfigured {
        provider: name.to_string(),
        hint: format!("{e}"),
    })
}

/// Wait the configured pacing delay before the next chunk of a document.
///
/// Returns `false` if the run was cancelled during the wait.
pub async fn pace(config: &PipelineConfig) -> bool {
    wait_or_cancel(config.pacing_delay(), &config.cancel).await
}

/// Sleep for `wait`, returning `false` if `cancel` fired first.
async fn wait_or_cancel(wait: Duration, cancel: &CancellationToken) -> bool {
    if wait.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

fn finish(
    chunk: &Chunk,
    start: Instant,
    retries: u32,
    outcome: Result<(String, Transformed), TransformError>,
) -> ChunkResult {
    let mut result = ChunkResult {
        index: chunk.index,
        start_page: chunk.start_page,
        end_page: chunk.end_page,
        markdown: None,
        status: ChunkStatus::Failed,
        error: None,
        rate_limit_retries: retries,
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    match outcome {
        Ok((markdown, t)) => {
            result.markdown = Some(markdown);
            result.status = ChunkStatus::Success;
            result.input_tokens = t.input_tokens;
            result.output_tokens = t.output_tokens;
        }
        Err(e) => result.error = Some(e),
    }
    result
}

fn skipped(chunk: &Chunk) -> ChunkResult {
    ChunkResult {
        index: chunk.index,
        start_page: chunk.start_page,
        end_page: chunk.end_page,
        markdown: None,
        status: ChunkStatus::Skipped,
        error: None,
        rate_limit_retries: 0,
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: 0,
    }
}

/// Transform one chunk into a [`ChunkResult`].
///
/// Blank chunks are skipped without a call when `skip_blank_chunks` is set.
/// Pacing between chunks is the caller's job (see [`pace`]).
pub async fn transform_chunk(
    transformer: &dyn Transformer,
    document: &str,
    chunk: &Chunk,
    config: &PipelineConfig,
) -> ChunkResult {
    let start = Instant::now();

    if config.skip_blank_chunks && !chunk.has_text {
        info!(document, chunk = chunk.index, "Skipping chunk with no extracted text");
        return skipped(chunk);
    }

    let prompt = build_chunk_prompt(document, chunk, config.instructions.as_deref());
    let system = config.system_prompt.as_deref();
    let cancel = &config.cancel;
    let mut retries: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return finish(chunk, start, retries, Err(TransformError::Cancelled));
        }

        debug!(
            document,
            chunk = chunk.index,
            pages = %format!("{}-{}", chunk.start_page, chunk.end_page),
            attempt = retries + 1,
            "Calling transformation service"
        );

        let attempt = tokio::select! {
            _ = cancel.cancelled() => Err(TransformError::Cancelled),
            r = tokio::time::timeout(config.api_timeout(), transformer.transform(system, &prompt)) => {
                r.unwrap_or(Err(TransformError::Timeout { secs: config.api_timeout_secs }))
            }
        };

        match attempt {
            Ok(t) => {
                let markdown = if config.clean_output {
                    clean_markdown(&t.text, &chunk.images)
                } else {
                    t.text.clone()
                };
                debug!(
                    document,
                    chunk = chunk.index,
                    input_tokens = t.input_tokens,
                    output_tokens = t.output_tokens,
                    "Chunk transformed"
                );
                return finish(chunk, start, retries, Ok((markdown, t)));
            }
            Err(TransformError::RateLimited {
                retry_after_secs,
                detail,
            }) => {
                if let Some(max) = config.max_rate_limit_retries {
                    if retries >= max {
                        warn!(document, chunk = chunk.index, retries, "Rate-limit retries exhausted");
                        return finish(
                            chunk,
                            start,
                            retries,
                            Err(TransformError::RetriesExhausted { retries, detail }),
                        );
                    }
                }
                retries += 1;
                let wait = retry_after_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| config.rate_limit_backoff());
                warn!(
                    document,
                    chunk = chunk.index,
                    retry = retries,
                    "Rate limited; waiting {:?} before retrying",
                    wait
                );
                if let Some(ref observer) = config.observer {
                    observer.on_rate_limited(document, chunk.index, retries, wait);
                }
                if !wait_or_cancel(wait, cancel).await {
                    return finish(chunk, start, retries, Err(TransformError::Cancelled));
                }
            }
            Err(e) => {
                warn!(document, chunk = chunk.index, "Chunk failed: {}", e);
                return finish(chunk, start, retries, Err(e));
            }
        }
    }
}
