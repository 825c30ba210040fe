//! Configuration types for donation extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. One struct for every knob means the
//! CLI, the MCP server and library callers all share the same defaults.

use crate::error::DonationError;
use crate::pipeline::client::VisionClient;
use crate::pipeline::render::PageRenderer;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Provider used when nothing else is configured.
pub const DEFAULT_PROVIDER: &str = "openrouter";

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Files accepted by one batch call. Larger batches are rejected.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5;

/// Configuration for a donation extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use dvac_donations::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(150)
///     .max_pages(2)
///     .model("google/gemini-2.5-flash")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    ///
    /// Receipts are mostly large print and handwriting; 150 DPI reads reliably
    /// and renders quickly.
    pub dpi: u32,

    /// Safety cap on the longest rendered edge in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Pages rendered per file when the request does not say. Default: 1.
    ///
    /// A donation receipt is almost always a single page, and every extra
    /// page is another image in the request.
    pub max_pages: usize,

    /// Width the optimizer downscales to before upload. Default: 1000.
    pub max_image_width: u32,

    /// JPEG quality used by the optimizer (1–100). Default: 50.
    pub jpeg_quality: u8,

    /// Maximum files per batch call. Default: 5.
    pub max_batch_size: usize,

    /// LLM provider name (e.g. "openrouter", "openai", "gemini").
    pub provider_name: String,

    /// LLM model identifier. Default: `google/gemini-2.5-flash`.
    pub model: String,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed vision client. Takes precedence over `provider`.
    pub client: Option<Arc<dyn VisionClient>>,

    /// Page renderer. `None` uses pdfium.
    pub renderer: Option<Arc<dyn PageRenderer>>,

    /// Sampling temperature for the LLM completion. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per file. Default: 1024.
    pub max_tokens: usize,

    /// Per-call timeout for the inference request in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom extraction instruction. If None, uses the built-in prompt.
    pub instruction_prompt: Option<String>,

    /// Directory holding libpdfium, or the library file itself.
    /// If None, the working directory and then the system library are tried.
    pub pdfium_library_path: Option<PathBuf>,

    /// Optional per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            max_pages: 1,
            max_image_width: 1000,
            jpeg_quality: 50,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            provider_name: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider: None,
            client: None,
            renderer: None,
            temperature: 0.1,
            max_tokens: 1024,
            api_timeout_secs: 120,
            instruction_prompt: None,
            pdfium_library_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_pages", &self.max_pages)
            .field("max_image_width", &self.max_image_width)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("max_batch_size", &self.max_batch_size)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("client", &self.client.as_ref().map(|_| "<dyn VisionClient>"))
            .field("renderer", &self.renderer.as_ref().map(|_| "<dyn PageRenderer>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pdfium_library_path", &self.pdfium_library_path)
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

    /// Defaults overlaid with `DVAC_PROVIDER`, `DVAC_MODEL` and `PDFIUM_LIB_PATH`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(provider) = non_empty_env("DVAC_PROVIDER") {
            config.provider_name = provider;
        }
        if let Some(model) = non_empty_env("DVAC_MODEL") {
            config.model = model;
        }
        config.pdfium_library_path = non_empty_env("PDFIUM_LIB_PATH").map(PathBuf::from);
        config
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    /// Start from an existing configuration instead of the defaults.
    pub fn from_config(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn max_image_width(mut self, px: u32) -> Self {
        self.config.max_image_width = px;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn max_batch_size(mut self, n: usize) -> Self {
        self.config.max_batch_size = n;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn client(mut self, client: Arc<dyn VisionClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.config.renderer = Some(renderer);
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

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn instruction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.instruction_prompt = Some(prompt.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, DonationError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(DonationError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_pages == 0 {
            return Err(DonationError::InvalidConfig(
                "max_pages must be ≥ 1".into(),
            ));
        }
        if c.max_batch_size == 0 {
            return Err(DonationError::InvalidConfig(
                "max_batch_size must be ≥ 1".into(),
            ));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(DonationError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.max_image_width < 100 {
            return Err(DonationError::InvalidConfig(format!(
                "max_image_width must be ≥ 100, got {}",
                c.max_image_width
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(DonationError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(DonationError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}
