//! Configuration types for the chunked transformation pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built via [`PipelineConfigBuilder`].
//! The config is passed explicitly into [`crate::driver::PipelineDriver`];
//! nothing is read from process-wide state, so several pipelines with
//! different stores or providers can coexist in one process.

use crate::error::PipelineError;
use crate::progress::ProgressObserver;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pages per chunk used by the interface-spec pipelines.
pub const DEFAULT_CHUNK_SIZE: usize = 40;

/// Configuration for a pipeline run.
///
/// # Example
/// ```rust
/// use edgequake_pdfchunk::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .chunk_size(20)
///     .pacing_delay_ms(500)
///     .max_rate_limit_retries(Some(5))
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_size, 20);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Pages per chunk. Must be ≥ 1. Default: 40.
    ///
    /// Larger chunks mean fewer LLM calls but longer prompts; a 40-page slice
    /// of an interface spec usually stays well inside a 128k context window.
    pub chunk_size: usize,

    /// LLM model identifier (e.g. "gpt-4.1-mini"). If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "azure", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1 (faithful transcription).
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per chunk. Default: 4000.
    pub max_tokens: usize,

    /// Fixed wait after a rate-limit signal, in milliseconds. Default: 60 000.
    ///
    /// A provider-supplied `retry-after` hint overrides this value.
    pub rate_limit_backoff_ms: u64,

    /// Ceiling on consecutive rate-limit retries for one chunk. Default: `Some(10)`.
    ///
    /// `None` retries forever; pair it with [`PipelineConfig::cancel`] so the
    /// caller can still bound the run.
    pub max_rate_limit_retries: Option<u32>,

    /// Pause after each successful transformation, in milliseconds. Default: 2 000.
    pub pacing_delay_ms: u64,

    /// Per-call timeout for the transformation service, in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL sources, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Documents processed concurrently in batch mode. Default: 1.
    ///
    /// Chunks within a document are always sequential.
    pub document_concurrency: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Optional system message sent ahead of the instruction.
    pub system_prompt: Option<String>,

    /// Replacement for the built-in instruction block
    /// ([`crate::prompts::DEFAULT_INSTRUCTIONS`]).
    pub instructions: Option<String>,

    /// Do not call the LLM for chunks whose pages carry no text. Default: true.
    pub skip_blank_chunks: bool,

    /// Run deterministic Markdown cleanup on each output. Default: true.
    pub clean_output: bool,

    /// Receives per-document and per-chunk events.
    pub observer: Option<ProgressObserver>,

    /// Cancels in-flight backoff and pacing waits.
    pub cancel: CancellationToken,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4000,
            rate_limit_backoff_ms: 60_000,
            max_rate_limit_retries: Some(10),
            pacing_delay_ms: 2_000,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            document_concurrency: 1,
            password: None,
            system_prompt: None,
            instructions: None,
            skip_blank_chunks: true,
            clean_output: true,
            observer: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("chunk_size", &self.chunk_size)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("rate_limit_backoff_ms", &self.rate_limit_backoff_ms)
            .field("max_rate_limit_retries", &self.max_rate_limit_retries)
            .field("pacing_delay_ms", &self.pacing_delay_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("document_concurrency", &self.document_concurrency)
            .field("skip_blank_chunks", &self.skip_blank_chunks)
            .field("clean_output", &self.clean_output)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    /// Constraints checked by [`PipelineConfigBuilder::build`] and again by
    /// the driver builder.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.chunk_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk size must be ≥ 1 page".into(),
            ));
        }
        if self.document_concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "document concurrency must be ≥ 1".into(),
            ));
        }
        if self.api_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(())
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Pages per chunk. Zero is rejected by [`build`](Self::build).
    pub fn chunk_size(mut self, pages: usize) -> Self {
        self.config.chunk_size = pages;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
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

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn rate_limit_backoff_ms(mut self, ms: u64) -> Self {
        self.config.rate_limit_backoff_ms = ms;
        self
    }

    pub fn max_rate_limit_retries(mut self, n: Option<u32>) -> Self {
        self.config.max_rate_limit_retries = n;
        self
    }

    pub fn pacing_delay_ms(mut self, ms: u64) -> Self {
        self.config.pacing_delay_ms = ms;
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

    pub fn document_concurrency(mut self, n: usize) -> Self {
        self.config.document_concurrency = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.config.instructions = Some(text.into());
        self
    }

    pub fn skip_blank_chunks(mut self, v: bool) -> Self {
        self.config.skip_blank_chunks = v;
        self
    }

    pub fn clean_output(mut self, v: bool) -> Self {
        self.config.clean_output = v;
        self
    }

    pub fn observer(mut self, observer: ProgressObserver) -> Self {
        self.config.observer = Some(observer);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.config.cancel = token;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
