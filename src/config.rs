//! Configuration types for document conversion.
//!
//! All conversion behaviour is controlled through [`ConverterConfig`], built
//! via its [`ConverterConfigBuilder`]. The defaults reproduce the plain
//! "convert, export Markdown, write `output.md`" flow; every other knob is
//! opt-in.

use crate::document::MarkdownOptions;
use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Source converted when none is given on the command line.
pub const DEFAULT_SOURCE: &str = "https://arxiv.org/pdf/2206.01062";

/// Output file written relative to the working directory.
pub const DEFAULT_OUTPUT: &str = "output.md";

/// Upper bound for [`ConverterConfigBuilder::ocr_max_retries`].
pub const MAX_OCR_RETRIES: u32 = 10;

/// Configuration for a [`crate::DocumentConverter`].
///
/// # Example
/// ```rust
/// use doc2md::{ConverterConfig, OcrMode, PageSelection};
///
/// let config = ConverterConfig::builder()
///     .pages(PageSelection::Range(1, 3))
///     .ocr(OcrMode::Off)
///     .build()
///     .unwrap();
/// assert_eq!(config.ocr, OcrMode::Off);
/// ```
#[derive(Clone)]
pub struct ConverterConfig {
    /// Pages to convert. Default: all.
    pub pages: PageSelection,

    /// Markdown export options (separator, furniture, escaping, front matter).
    pub markdown: MarkdownOptions,

    /// When to transcribe pages with a vision model. Default: [`OcrMode::Auto`].
    pub ocr: OcrMode,

    /// Pre-constructed vision provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Vision provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Vision model identifier. If None, the provider default is used.
    pub model: Option<String>,

    /// Concurrent OCR calls. Default: 4.
    pub ocr_concurrency: usize,

    /// Retries per OCR page on a transient failure. Default: 3.
    pub ocr_max_retries: u32,

    /// Initial OCR retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub ocr_retry_backoff_ms: u64,

    /// Longest edge in pixels of a page rendered for OCR. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Sampling temperature for OCR calls. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the vision model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// User password for encrypted PDFs.
    pub password: Option<String>,

    /// Download timeout for URL sources in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            pages: PageSelection::default(),
            markdown: MarkdownOptions::default(),
            ocr: OcrMode::default(),
            provider: None,
            provider_name: None,
            model: None,
            ocr_concurrency: 4,
            ocr_max_retries: 3,
            ocr_retry_backoff_ms: 500,
            max_rendered_pixels: 2000,
            temperature: 0.1,
            max_tokens: 4096,
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterConfig")
            .field("pages", &self.pages)
            .field("markdown", &self.markdown)
            .field("ocr", &self.ocr)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("ocr_concurrency", &self.ocr_concurrency)
            .field("ocr_max_retries", &self.ocr_max_retries)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.markdown.page_separator = sep;
        self
    }

    pub fn include_metadata(mut self, v: bool) -> Self {
        self.config.markdown.include_metadata = v;
        self
    }

    pub fn include_furniture(mut self, v: bool) -> Self {
        self.config.markdown.include_furniture = v;
        self
    }

    pub fn escape_underscores(mut self, v: bool) -> Self {
        self.config.markdown.escape_underscores = v;
        self
    }

    pub fn image_placeholders(mut self, v: bool) -> Self {
        self.config.markdown.image_placeholders = v;
        self
    }

    pub fn ocr(mut self, mode: OcrMode) -> Self {
        self.config.ocr = mode;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr_concurrency = n.max(1);
        self
    }

    pub fn ocr_max_retries(mut self, n: u32) -> Self {
        self.config.ocr_max_retries = n.min(MAX_OCR_RETRIES);
        self
    }

    pub fn ocr_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.ocr_retry_backoff_ms = ms;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
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

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, ConvertError> {
        let c = &self.config;
        if c.download_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "Download timeout must be at least 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_tokens must be at least 1".into(),
            ));
        }
        if let PageSelection::Range(start, end) = c.pages {
            if start == 0 || start > end {
                return Err(ConvertError::InvalidConfig(format!(
                    "Invalid page range {start}-{end}: pages are 1-indexed and start must be <= end"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// When pages are transcribed by a vision model instead of read from the
/// PDF text layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrMode {
    /// Never call a vision model; pages without text are reported as errors.
    Off,
    /// Transcribe only pages that have no text layer (scans). (default)
    #[default]
    Auto,
    /// Transcribe every selected page.
    Force,
}

/// Specifies which pages of the document to convert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Sorted, deduplicated 0-indexed pages; pages past the end are dropped.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut pages: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => vec![*p],
            PageSelection::Range(start, end) => ((*start).max(1)..=(*end).min(total_pages)).collect(),
            PageSelection::Set(pages) => pages.clone(),
        };
        pages.retain(|p| (1..=total_pages).contains(p));
        pages.sort_unstable();
        pages.dedup();
        pages.into_iter().map(|p| p - 1).collect()
    }
}

/// Parses `all`, `5`, `3-15` or `1,3,5`. Pages are 1-indexed.
impl FromStr for PageSelection {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let page = |p: &str| -> Result<usize, ConvertError> {
            match p.trim().parse::<usize>() {
                Ok(n) if n >= 1 => Ok(n),
                Ok(_) => Err(ConvertError::InvalidConfig(
                    "pages are 1-indexed, minimum is 1".into(),
                )),
                Err(_) => Err(ConvertError::InvalidConfig(format!(
                    "invalid page number '{}'",
                    p.trim()
                ))),
            }
        };

        if s.eq_ignore_ascii_case("all") {
            Ok(PageSelection::All)
        } else if let Some((a, b)) = s.split_once('-') {
            let (start, end) = (page(a)?, page(b)?);
            if start > end {
                return Err(ConvertError::InvalidConfig(format!(
                    "page range {start}-{end} is reversed"
                )));
            }
            Ok(PageSelection::Range(start, end))
        } else if s.contains(',') {
            s.split(',')
                .map(page)
                .collect::<Result<Vec<_>, _>>()
                .map(PageSelection::Set)
        } else {
            page(s).map(PageSelection::Single)
        }
    }
}

/// How pages are separated in exported Markdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No marker; pages are joined like any other blocks. (default)
    #[default]
    None,
    /// Horizontal rule: `---`
    HorizontalRule,
    /// HTML comment with page number: `<!-- page N -->`
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Text placed between the last block of one page and the first block of
    /// page `page_num` (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {page_num} -->\n\n"),
            PageSeparator::Custom(s) => format!("\n\n{s}\n\n"),
        }
    }
}

/// `none`, `hr`, `comment` (any case); anything else is used verbatim.
impl FromStr for PageSeparator {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "none" | "" => PageSeparator::None,
            "hr" | "---" => PageSeparator::HorizontalRule,
            "comment" => PageSeparator::Comment,
            _ => PageSeparator::Custom(s.to_string()),
        })
    }
}
