//! Conversion entry point.
//!
//! A [`DocumentConverter`] owns a [`ConverterConfig`] and turns a source
//! locator into a [`ConversionResult`]. The flow is sequential at the top
//! level:
//!
//! 1. resolve the source (downloads live in a temp dir dropped on return)
//! 2. extract metadata and the text layer of the selected pages
//! 3. lay out text pages; transcribe pages without text when OCR is enabled
//! 4. detect furniture and assemble the [`Document`]
//!
//! Page-level problems are collected in [`ConversionResult::errors`]; only
//! fatal problems, or every page failing, return `Err`.

use crate::config::{ConverterConfig, OcrMode, PageSelection};
use crate::document::{Document, DocumentMetadata, MarkdownOptions, Origin, PageInfo};
use crate::error::{ConvertError, PageError};
use crate::pipeline::extract::{self, PageContent};
use crate::pipeline::{layout, ocr, source};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Whether every selected page converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionStatus {
    Success,
    /// At least one page failed; see [`ConversionResult::errors`].
    PartialSuccess,
}

/// What was converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputInfo {
    /// The locator as given.
    pub source: String,
    pub filename: String,
    pub byte_len: u64,
    /// Pages in the document.
    pub page_count: usize,
    /// Pages selected for conversion.
    pub selected_pages: usize,
}

/// Wall-clock durations in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub total_ms: u64,
    pub extract_ms: u64,
    pub layout_ms: u64,
    pub ocr_ms: u64,
}

/// Vision-model usage for OCR pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrStats {
    pub pages: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Result of a successful (possibly partial) conversion.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub input: InputInfo,
    pub status: ConversionStatus,
    /// The document handle; export it with
    /// [`Document::export_to_markdown`] or [`Document::export_to_json`].
    pub document: Document,
    /// Per-page errors, ordered by page.
    pub errors: Vec<PageError>,
    pub timings: Timings,
    pub ocr: OcrStats,
    options: MarkdownOptions,
}

impl ConversionResult {
    /// Markdown rendered with the converter's configured options.
    pub fn markdown(&self) -> String {
        self.document.export_to_markdown_with(&self.options)
    }

    /// Number of pages that produced content.
    pub fn converted_pages(&self) -> usize {
        self.input.selected_pages.saturating_sub(self.errors.len())
    }
}

/// Converts documents to a structured [`Document`].
///
/// # Example
/// ```rust,no_run
/// use doc2md::DocumentConverter;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let converter = DocumentConverter::new();
/// let result = converter.convert("https://arxiv.org/pdf/2206.01062").await?;
/// std::fs::write("output.md", result.document.export_to_markdown())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct DocumentConverter {
    config: ConverterConfig,
}

impl DocumentConverter {
    /// Converter with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConverterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Convert the document named by `source` (URL or path).
    ///
    /// # Errors
    /// Fatal errors only: unresolvable source, unreadable PDF, empty page
    /// selection, missing engine, or every selected page failing.
    pub async fn convert(&self, source: impl AsRef<str>) -> Result<ConversionResult, ConvertError> {
        let total_start = Instant::now();
        let source = source.as_ref();
        let config = &self.config;
        info!("Starting conversion: {}", source);

        // ── Step 1: Resolve source ───────────────────────────────────────
        let resolved = source::resolve_source(source, config.download_timeout_secs).await?;
        let pdf_path = resolved.path().to_path_buf();

        // ── Step 2: Extract text layer ───────────────────────────────────
        let extract_start = Instant::now();
        let selection = config.pages.clone();
        let extraction = extract::extract_document(
            &pdf_path,
            config.password.as_deref(),
            move |total| select_pages(&selection, total),
        )
        .await?;
        let extract_ms = extract_start.elapsed().as_millis() as u64;

        let total_selected = extraction.pages.len();
        debug!("Selected {} pages for conversion", total_selected);
        if let Some(ref cb) = config.progress_callback {
            cb.on_conversion_start(total_selected);
        }

        // ── Step 3: Sort pages into layout, OCR, and failures ────────────
        let PagePlan {
            mut infos,
            text_pages,
            ocr_targets,
            mut errors,
        } = plan_pages(extraction.pages, config.ocr);
        for e in &errors {
            report_page_error(config, e, total_selected);
        }

        // ── Step 4: Layout ───────────────────────────────────────────────
        let layout_start = Instant::now();
        let mut page_items: BTreeMap<usize, Vec<_>> = BTreeMap::new();
        for page in layout::layout_document(&text_pages) {
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_start(page.page_no, total_selected);
                cb.on_page_complete(page.page_no, total_selected, page.items.len());
            }
            page_items.insert(page.page_no - 1, page.items);
        }
        let layout_ms = layout_start.elapsed().as_millis() as u64;

        // ── Step 5: OCR ──────────────────────────────────────────────────
        let ocr_start = Instant::now();
        let mut ocr_stats = OcrStats::default();
        if !ocr_targets.is_empty() {
            match ocr::resolve_provider(config) {
                Ok(provider) => {
                    let indices: Vec<usize> = ocr_targets.iter().map(|(i, _)| *i).collect();
                    let sizes: HashMap<usize, (f32, f32)> = ocr_targets.into_iter().collect();
                    let rendered = extract::render_pages(
                        &pdf_path,
                        config.password.as_deref(),
                        &indices,
                        config.max_rendered_pixels,
                    )
                    .await?;
                    let jobs = rendered
                        .into_iter()
                        .map(|(idx, img)| {
                            let size = sizes.get(&idx).copied().unwrap_or((0.0, 0.0));
                            (idx, img, size)
                        })
                        .collect();

                    for page in ocr::ocr_pages(&provider, jobs, config, total_selected).await {
                        ocr_stats.input_tokens += page.input_tokens as u64;
                        ocr_stats.output_tokens += page.output_tokens as u64;
                        match page.result {
                            Ok(items) => {
                                ocr_stats.pages += 1;
                                if let Some(info) = infos.get_mut(&page.index) {
                                    info.ocr = true;
                                }
                                page_items.insert(page.index, items);
                            }
                            Err(e) => errors.push(e),
                        }
                    }
                }
                Err(e) => {
                    warn!("No vision provider for {} page(s): {}", ocr_targets.len(), e);
                    for err in ocr_unavailable(&ocr_targets, config.ocr, e)? {
                        report_page_error(config, &err, total_selected);
                        errors.push(err);
                    }
                }
            }
        }
        let ocr_ms = ocr_start.elapsed().as_millis() as u64;

        // ── Step 6: Assemble ─────────────────────────────────────────────
        errors.sort_by_key(PageError::page);
        let converted = page_items.len();

        if let Some(ref cb) = config.progress_callback {
            cb.on_conversion_complete(total_selected, converted);
        }

        let status = conversion_status(converted, total_selected, &errors)?;

        let document = Document {
            name: resolved.stem(),
            origin: Origin {
                source: source.to_string(),
                filename: resolved.filename(),
                mimetype: "application/pdf".to_string(),
                binary_len: resolved.byte_len(),
            },
            pages: infos.into_values().collect(),
            items: page_items.into_values().flatten().collect(),
            metadata: extraction.metadata,
        };

        let timings = Timings {
            total_ms: total_start.elapsed().as_millis() as u64,
            extract_ms,
            layout_ms,
            ocr_ms,
        };

        info!(
            "Conversion complete: {}/{} pages, {} items, {}ms total",
            converted,
            total_selected,
            document.items.len(),
            timings.total_ms
        );

        Ok(ConversionResult {
            input: InputInfo {
                source: source.to_string(),
                filename: document.origin.filename.clone(),
                byte_len: document.origin.binary_len,
                page_count: document.metadata.page_count,
                selected_pages: total_selected,
            },
            status,
            document,
            errors,
            timings,
            ocr: ocr_stats,
            options: config.markdown.clone(),
        })
    }

    /// Convert and write the Markdown to `output_path` atomically.
    ///
    /// The file is only touched once the conversion has succeeded.
    pub async fn convert_to_file(
        &self,
        source: impl AsRef<str>,
        output_path: impl AsRef<Path>,
    ) -> Result<ConversionResult, ConvertError> {
        let result = self.convert(source).await?;
        write_output(output_path.as_ref(), &result.markdown()).await?;
        Ok(result)
    }

    /// Synchronous wrapper around [`DocumentConverter::convert`].
    ///
    /// Creates a temporary tokio runtime internally.
    pub fn convert_sync(&self, source: impl AsRef<str>) -> Result<ConversionResult, ConvertError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.convert(source))
    }

    /// Read document metadata without converting content.
    ///
    /// Does not require a vision provider.
    pub async fn inspect(&self, source: impl AsRef<str>) -> Result<DocumentMetadata, ConvertError> {
        let resolved =
            source::resolve_source(source.as_ref(), self.config.download_timeout_secs).await?;
        extract::extract_metadata(resolved.path(), self.config.password.as_deref()).await
    }
}

/// Selected pages sorted by what happens to them next.
#[derive(Debug, Default)]
struct PagePlan {
    infos: BTreeMap<usize, PageInfo>,
    text_pages: Vec<PageContent>,
    /// 0-indexed page and its size in points.
    ocr_targets: Vec<(usize, (f32, f32))>,
    errors: Vec<PageError>,
}

/// Route extracted pages to layout or OCR according to `mode`.
///
/// Pages without a text layer that will not be transcribed become
/// [`PageError::NoText`].
fn plan_pages(pages: Vec<Result<PageContent, PageError>>, mode: OcrMode) -> PagePlan {
    let mut plan = PagePlan::default();

    for page in pages {
        let content = match page {
            Ok(content) => content,
            Err(e) => {
                plan.errors.push(e);
                continue;
            }
        };

        plan.infos.insert(
            content.index,
            PageInfo {
                page_no: content.index + 1,
                width: content.width,
                height: content.height,
                ocr: false,
            },
        );

        let has_text = content.has_text();
        let needs_ocr = match mode {
            OcrMode::Off => false,
            OcrMode::Auto => !has_text,
            OcrMode::Force => true,
        };
        if needs_ocr {
            plan.ocr_targets
                .push((content.index, (content.width, content.height)));
        } else if has_text {
            plan.text_pages.push(content);
        } else {
            plan.errors.push(PageError::NoText {
                page: content.index + 1,
            });
        }
    }

    plan
}

/// Page errors for the OCR targets when no vision provider resolves.
///
/// Forced OCR cannot produce anything, so `error` is returned as is.
fn ocr_unavailable(
    targets: &[(usize, (f32, f32))],
    mode: OcrMode,
    error: ConvertError,
) -> Result<Vec<PageError>, ConvertError> {
    if mode == OcrMode::Force {
        return Err(error);
    }
    let detail = error.to_string();
    Ok(targets
        .iter()
        .map(|(idx, _)| PageError::OcrFailed {
            page: idx + 1,
            retries: 0,
            detail: detail.clone(),
        })
        .collect())
}

/// Status of a run that converted `converted` of `total` pages.
fn conversion_status(
    converted: usize,
    total: usize,
    errors: &[PageError],
) -> Result<ConversionStatus, ConvertError> {
    if converted == 0 {
        let first_error = errors
            .first()
            .map_or_else(|| "Unknown error".to_string(), ToString::to_string);
        return Err(ConvertError::AllPagesFailed { total, first_error });
    }
    Ok(if errors.is_empty() {
        ConversionStatus::Success
    } else {
        ConversionStatus::PartialSuccess
    })
}

fn report_page_error(config: &ConverterConfig, error: &PageError, total: usize) {
    warn!("{}", error);
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_error(error.page(), total, &error.to_string());
    }
}

/// Resolve the page selection against the document's page count.
fn select_pages(selection: &PageSelection, total: usize) -> Result<Vec<usize>, ConvertError> {
    let indices = selection.to_indices(total);
    if indices.is_empty() {
        let page = match selection {
            PageSelection::All => 1,
            PageSelection::Single(p) => *p,
            PageSelection::Range(start, _) => *start,
            PageSelection::Set(pages) => pages.first().copied().unwrap_or(0),
        };
        return Err(ConvertError::PageOutOfRange { page, total });
    }
    Ok(indices)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write `contents` to `path` via a sibling temp file and a rename, creating
/// parent directories. On failure the target is left as it was.
pub async fn write_output(path: &Path, contents: &str) -> Result<(), ConvertError> {
    let write_failed = |source: std::io::Error| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = temp_path_for(path);
    if let Err(e) = tokio::fs::write(&tmp_path, contents).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}
