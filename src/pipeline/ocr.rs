//! OCR fallback: transcribe page images with a vision model.
//!
//! Pages without a text layer (scans) cannot be laid out from text cells.
//! With [`OcrMode::Auto`](crate::config::OcrMode) those pages are rendered,
//! encoded as PNG, and sent to a vision-capable LLM; the reply is cleaned
//! and parsed back into [`DocItem`]s so it joins the same document model as
//! the text-layer pages.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient under concurrent load.
//! Each page is retried with exponential backoff
//! (`ocr_retry_backoff_ms * 2^attempt`): 500 ms → 1 s → 2 s with defaults.

use crate::config::ConverterConfig;
use crate::document::{BoundingBox, DocItem, ItemKind};
use crate::error::{ConvertError, PageError};
use crate::pipeline::layout::join_lines;
use crate::pipeline::postprocess::{clean_vlm_reply, is_separator_row, is_table_row};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// System prompt for page transcription.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an expert document transcriber. Convert the scanned page image to clean Markdown.

Rules:
1. Preserve ALL text in reading order. Do not summarise or translate.
2. Use # for the page title (at most one), ## for sections, ### for subsections.
3. Use - for bullet lists and 1. 2. 3. for numbered lists.
4. Convert tables to GFM pipe tables with a header separator row.
5. Write figure and table captions on their own line, e.g. "Figure 2: ...".
6. Ignore page numbers and running headers or footers.
7. Output ONLY the Markdown. No ```markdown fences, no commentary."#;

/// One transcribed page.
#[derive(Debug)]
pub struct OcrPage {
    /// 0-indexed page.
    pub index: usize,
    pub result: Result<Vec<DocItem>, PageError>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ConvertError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ConvertError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. a pre-built provider on the config;
/// 2. `provider_name` (+ `model`, defaulting to [`DEFAULT_VISION_MODEL`]);
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. OpenAI when `OPENAI_API_KEY` is present;
/// 5. whatever [`ProviderFactory::from_env`] detects.
pub fn resolve_provider(config: &ConverterConfig) -> Result<Arc<dyn LLMProvider>, ConvertError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ConvertError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "Scanned pages need a vision model.\n\
                Set OPENAI_API_KEY or ANTHROPIC_API_KEY, pass --provider, or use --ocr off.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

/// Encode a rendered page as a base64 PNG.
///
/// PNG keeps text edges lossless; `detail: "high"` lets tiling models see
/// fine print and small tables.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

fn build_options(config: &ConverterConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)`,
/// saturating instead of overflowing.
fn retry_backoff_ms(base: u64, attempt: u32) -> u64 {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base.saturating_mul(factor)
}

/// Transcribe one page image; returns the cleaned Markdown and token usage.
pub async fn transcribe_page(
    provider: &Arc<dyn LLMProvider>,
    page_no: usize,
    image_data: ImageData,
    config: &ConverterConfig,
) -> Result<(String, usize, usize), PageError> {
    let start = Instant::now();
    let messages = vec![
        ChatMessage::system(OCR_SYSTEM_PROMPT),
        ChatMessage::user_with_images("", vec![image_data]),
    ];
    let options = build_options(config);

    let mut last_err: Option<String> = None;
    for attempt in 0..=config.ocr_max_retries {
        if attempt > 0 {
            let backoff = retry_backoff_ms(config.ocr_retry_backoff_ms, attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_no, attempt, config.ocr_max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "Page {}: {} input tokens, {} output tokens, {:?}",
                    page_no,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok((
                    clean_vlm_reply(&response.content),
                    response.prompt_tokens,
                    response.completion_tokens,
                ));
            }
            Err(e) => {
                let err_msg = format!("{e}");
                warn!("Page {}: attempt {} failed: {}", page_no, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(PageError::OcrFailed {
        page: page_no,
        retries: config.ocr_max_retries,
        detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Encode and transcribe rendered pages concurrently.
///
/// `pages` carries, per 0-indexed page, the render result and the page
/// size in points used for the items' bounding boxes. Results come back in
/// completion order.
pub async fn ocr_pages(
    provider: &Arc<dyn LLMProvider>,
    pages: Vec<(usize, Result<DynamicImage, PageError>, (f32, f32))>,
    config: &ConverterConfig,
    total_pages: usize,
) -> Vec<OcrPage> {
    info!("Transcribing {} page(s) with the vision model", pages.len());

    stream::iter(pages.into_iter().map(|(index, rendered, (width, height))| {
        let provider = Arc::clone(provider);
        let config = config.clone();
        async move {
            let page_no = index + 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_start(page_no, total_pages);
            }

            let transcribed = match rendered {
                Ok(img) => match encode_page(&img) {
                    Ok(data) => transcribe_page(&provider, page_no, data, &config).await,
                    Err(e) => Err(PageError::RenderFailed {
                        page: page_no,
                        detail: format!("PNG encoding failed: {e}"),
                    }),
                },
                Err(e) => Err(e),
            };

            let page = match transcribed {
                Ok((markdown, input_tokens, output_tokens)) => {
                    let bbox = BoundingBox::new(0.0, 0.0, width, height);
                    OcrPage {
                        index,
                        result: Ok(markdown_to_items(&markdown, page_no, bbox)),
                        input_tokens,
                        output_tokens,
                    }
                }
                Err(e) => OcrPage {
                    index,
                    result: Err(e),
                    input_tokens: 0,
                    output_tokens: 0,
                },
            };

            if let Some(ref cb) = config.progress_callback {
                match &page.result {
                    Ok(items) => cb.on_page_complete(page_no, total_pages, items.len()),
                    Err(e) => cb.on_page_error(page_no, total_pages, &e.to_string()),
                }
            }
            page
        }
    }))
    .buffer_unordered(config.ocr_concurrency.max(1))
    .collect()
    .await
}

// ── Markdown → items ─────────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*$").expect("valid regex"));
static RE_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*+•]\s+(.+)$").expect("valid regex"));
static RE_ORDERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,3}[.)])\s+(.+)$").expect("valid regex"));
static RE_IMAGE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!\[[^\]]*\]\([^)]*\)$").expect("valid regex"));
static RE_CAPTION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[*_]*((?:Figure|Fig\.|Table)\s*\d+[a-z]?\s*[:.].*?)[*_]*$").expect("valid regex")
});

fn split_table_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|c| c.trim().to_string()).collect()
}

struct ItemSink {
    page_no: usize,
    bbox: BoundingBox,
    items: Vec<DocItem>,
    paragraph: Vec<String>,
    table: Vec<Vec<String>>,
}

impl ItemSink {
    fn push(&mut self, kind: ItemKind, text: impl Into<String>) {
        self.items
            .push(DocItem::new(kind, text, self.page_no, self.bbox));
    }

    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            let text = join_lines(&std::mem::take(&mut self.paragraph));
            self.push(ItemKind::Paragraph, text);
        }
    }

    fn flush_table(&mut self) {
        if !self.table.is_empty() {
            let rows = std::mem::take(&mut self.table);
            self.push(ItemKind::Table { rows }, "");
        }
    }

    fn flush(&mut self) {
        self.flush_paragraph();
        self.flush_table();
    }
}

/// Parse a transcribed page back into document items.
///
/// `#` becomes the title on page 1 and a level-1 header elsewhere; `##`,
/// `###` and deeper map to levels 1, 2 and 3. Every item carries the whole
/// page as its bounding box since the model reports no geometry.
pub fn markdown_to_items(markdown: &str, page_no: usize, page_bbox: BoundingBox) -> Vec<DocItem> {
    let mut sink = ItemSink {
        page_no,
        bbox: page_bbox,
        items: Vec::new(),
        paragraph: Vec::new(),
        table: Vec::new(),
    };
    let mut code: Option<Vec<String>> = None;

    for raw in markdown.lines() {
        if raw.trim_start().starts_with("```") {
            match code.take() {
                Some(lines) => sink.push(ItemKind::Paragraph, lines.join("\n")),
                None => {
                    sink.flush();
                    code = Some(Vec::new());
                }
            }
            continue;
        }
        if let Some(ref mut lines) = code {
            lines.push(raw.to_string());
            continue;
        }

        let line = raw.trim();
        if line.is_empty() {
            sink.flush();
            continue;
        }

        if is_table_row(line) {
            sink.flush_paragraph();
            if !is_separator_row(line) {
                sink.table.push(split_table_row(line));
            }
            continue;
        }
        sink.flush_table();

        if let Some(caps) = RE_HEADING.captures(line) {
            sink.flush_paragraph();
            let kind = match caps[1].len() {
                1 if page_no == 1 && !sink.items.iter().any(|i| i.kind == ItemKind::Title) => {
                    ItemKind::Title
                }
                1 | 2 => ItemKind::SectionHeader { level: 1 },
                3 => ItemKind::SectionHeader { level: 2 },
                _ => ItemKind::SectionHeader { level: 3 },
            };
            sink.push(kind, caps[2].to_string());
        } else if RE_IMAGE_LINE.is_match(line) {
            sink.flush_paragraph();
            sink.push(ItemKind::Picture, "");
        } else if let Some(caps) = RE_CAPTION_LINE.captures(line) {
            sink.flush_paragraph();
            sink.push(ItemKind::Caption, caps[1].trim().to_string());
        } else if let Some(caps) = RE_ORDERED.captures(line) {
            sink.flush_paragraph();
            sink.push(
                ItemKind::ListItem {
                    marker: caps[1].to_string(),
                    enumerated: true,
                },
                caps[2].trim().to_string(),
            );
        } else if let Some(caps) = RE_BULLET.captures(line) {
            sink.flush_paragraph();
            sink.push(
                ItemKind::ListItem {
                    marker: "-".to_string(),
                    enumerated: false,
                },
                caps[1].trim().to_string(),
            );
        } else {
            sink.paragraph.push(line.to_string());
        }
    }

    if let Some(lines) = code {
        sink.push(ItemKind::Paragraph, lines.join("\n"));
    }
    sink.flush();
    sink.items
}
