//! pdfium access: bind the engine, open the document, read metadata and
//! per-page text cells, and rasterise pages for OCR.
//!
//! Everything here is blocking. The async wrappers move the work onto
//! `spawn_blocking` threads because pdfium keeps thread-local state and is
//! not safe to drive from Tokio worker threads. The engine is bound inside
//! each blocking task and released when the task returns, so no pdfium
//! handle outlives the call that needed it.
//!
//! All coordinates leaving this module are top-left origin PDF points.

use crate::document::{BoundingBox, DocumentMetadata};
use crate::error::{ConvertError, PageError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One run of text on a page, as pdfium segments it.
#[derive(Debug, Clone, PartialEq)]
pub struct TextCell {
    pub text: String,
    pub bbox: BoundingBox,
    /// Font size in points, scaled by the text matrix.
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
}

/// Raw content of a single page.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    /// 0-indexed page.
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub cells: Vec<TextCell>,
    /// Bounding boxes of embedded images.
    pub pictures: Vec<BoundingBox>,
}

impl PageContent {
    /// True when the page carries a usable text layer.
    pub fn has_text(&self) -> bool {
        self.cells
            .iter()
            .any(|c| c.text.chars().any(char::is_alphanumeric))
    }
}

/// Result of reading the selected pages of a document.
#[derive(Debug)]
pub struct Extraction {
    pub metadata: DocumentMetadata,
    /// One entry per selected page, in selection order.
    pub pages: Vec<Result<PageContent, PageError>>,
}

// ── Engine binding ───────────────────────────────────────────────────────

/// Bind to a pdfium shared library.
///
/// `PDFIUM_LIB_PATH` may name the library file or the directory holding it.
/// Without it, a library next to the working directory is tried before the
/// system library.
pub fn bind_pdfium() -> Result<Pdfium, ConvertError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.is_empty() => {
            let path = PathBuf::from(&p);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ConvertError::EngineUnavailable(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, ConvertError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.to_lowercase().contains("password") {
            if password.is_some() {
                ConvertError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                ConvertError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            ConvertError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail,
            }
        }
    })
}

// ── Metadata ─────────────────────────────────────────────────────────────

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();
    let get = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        title: get(PdfDocumentMetadataTagType::Title),
        author: get(PdfDocumentMetadataTagType::Author),
        subject: get(PdfDocumentMetadataTagType::Subject),
        creator: get(PdfDocumentMetadataTagType::Creator),
        producer: get(PdfDocumentMetadataTagType::Producer),
        creation_date: get(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    }
}

/// Read document metadata without touching page content.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, ConvertError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || -> Result<DocumentMetadata, ConvertError> {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, &path, pwd.as_deref())?;
        Ok(read_metadata(&document))
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("Metadata task panicked: {e}")))?
}

// ── Text extraction ──────────────────────────────────────────────────────

/// Read metadata and the text layer of the selected pages.
///
/// `select` receives the document page count and returns the 0-indexed
/// pages to read, so the selection can be resolved inside the same blocking
/// task that opened the document.
pub async fn extract_document<F>(
    pdf_path: &Path,
    password: Option<&str>,
    select: F,
) -> Result<Extraction, ConvertError>
where
    F: FnOnce(usize) -> Result<Vec<usize>, ConvertError> + Send + 'static,
{
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || extract_document_blocking(&path, pwd.as_deref(), select))
        .await
        .map_err(|e| ConvertError::Internal(format!("Extraction task panicked: {e}")))?
}

fn extract_document_blocking<F>(
    pdf_path: &Path,
    password: Option<&str>,
    select: F,
) -> Result<Extraction, ConvertError>
where
    F: FnOnce(usize) -> Result<Vec<usize>, ConvertError>,
{
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;
    let metadata = read_metadata(&document);
    info!("PDF loaded: {} pages", metadata.page_count);

    let indices = select(metadata.page_count)?;
    let pages = document.pages();

    let mut out = Vec::with_capacity(indices.len());
    for idx in indices {
        let page_no = idx + 1;
        let content = pages
            .get(idx as u16)
            .map_err(|e| format!("{e:?}"))
            .and_then(|page| extract_page(&page, idx).map_err(|e| format!("{e:?}")))
            .map_err(|detail| {
                warn!("Page {}: extraction failed: {}", page_no, detail);
                PageError::ExtractFailed {
                    page: page_no,
                    detail,
                }
            });
        if let Ok(ref c) = content {
            debug!(
                "Page {}: {} text cells, {} pictures",
                page_no,
                c.cells.len(),
                c.pictures.len()
            );
        }
        out.push(content);
    }

    Ok(Extraction {
        metadata,
        pages: out,
    })
}

fn extract_page(page: &PdfPage<'_>, index: usize) -> Result<PageContent, PdfiumError> {
    let width = page.width().value;
    let height = page.height().value;

    let text = page.text()?;
    let mut cells = Vec::new();
    for segment in text.segments().iter() {
        let content = normalise_segment_text(&segment.text());
        if content.trim().is_empty() {
            continue;
        }

        let bounds = segment.bounds();
        let bbox = BoundingBox::new(
            bounds.left().value,
            height - bounds.top().value,
            bounds.right().value,
            height - bounds.bottom().value,
        );

        let (font_size, bold, italic) = segment_font(&segment).unwrap_or((bbox.height(), false, false));

        cells.push(TextCell {
            text: content.trim().to_string(),
            bbox,
            font_size: if font_size > 0.0 { font_size } else { bbox.height() },
            bold,
            italic,
        });
    }

    let mut pictures = Vec::new();
    for object in page.objects().iter() {
        if object.object_type() != PdfPageObjectType::Image {
            continue;
        }
        if let Ok(bounds) = object.bounds() {
            pictures.push(BoundingBox::new(
                bounds.left().value,
                height - bounds.top().value,
                bounds.right().value,
                height - bounds.bottom().value,
            ));
        }
    }

    Ok(PageContent {
        index,
        width,
        height,
        cells,
        pictures,
    })
}

/// Font size and style of the first visible character of a segment.
fn segment_font(segment: &PdfPageTextSegment<'_>) -> Option<(f32, bool, bool)> {
    let chars = segment.chars().ok()?;
    let ch = chars
        .iter()
        .find(|c| c.unicode_char().is_some_and(|u| !u.is_whitespace()))?;
    let name = ch.font_name();
    Some((
        ch.scaled_font_size().value,
        font_name_is_bold(&name),
        font_name_is_italic(&name),
    ))
}

pub(crate) fn font_name_is_bold(name: &str) -> bool {
    let n = name.to_ascii_lowercase();
    ["bold", "black", "heavy", "semibold", "demi"]
        .iter()
        .any(|k| n.contains(k))
}

pub(crate) fn font_name_is_italic(name: &str) -> bool {
    let n = name.to_ascii_lowercase();
    n.contains("italic") || n.contains("oblique")
}

/// pdfium marks soft line-end hyphens with U+0002; ligatures and stray
/// control characters are normalised here.
pub(crate) fn normalise_segment_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{0002}' => out.push('-'),
            '\u{FB00}' => out.push_str("ff"),
            '\u{FB01}' => out.push_str("fi"),
            '\u{FB02}' => out.push_str("fl"),
            '\u{FB03}' => out.push_str("ffi"),
            '\u{FB04}' => out.push_str("ffl"),
            '\r' | '\n' | '\t' => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

// ── Rendering (OCR input) ────────────────────────────────────────────────

/// Rasterise the given 0-indexed pages, longest edge capped at `max_pixels`.
pub async fn render_pages(
    pdf_path: &Path,
    password: Option<&str>,
    page_indices: &[usize],
    max_pixels: u32,
) -> Result<Vec<(usize, Result<DynamicImage, PageError>)>, ConvertError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);
    let indices = page_indices.to_vec();

    tokio::task::spawn_blocking(move || -> Result<Vec<_>, ConvertError> {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, &path, pwd.as_deref())?;
        let pages = document.pages();
        let render_config = PdfRenderConfig::new()
            .set_target_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let rendered = indices
            .into_iter()
            .map(|idx| {
                let image = match pages.get(idx as u16) {
                    Ok(page) => page
                        .render_with_config(&render_config)
                        .map(|bitmap| bitmap.as_image()),
                    Err(e) => Err(e),
                }
                .map_err(|e| PageError::RenderFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                });
                if let Ok(ref img) = image {
                    debug!("Rendered page {} → {}x{} px", idx + 1, img.width(), img.height());
                }
                (idx, image)
            })
            .collect();
        Ok(rendered)
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("Render task panicked: {e}")))?
}
