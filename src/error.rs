//! Error types for the doc2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`]: **Fatal**: the conversion cannot proceed at all
//!   (unreachable source, not a PDF, wrong password, engine missing).
//!   Returned as `Err(ConvertError)` from [`crate::DocumentConverter`].
//!
//! * [`PageError`]: **Non-fatal**: a single page could not be extracted or
//!   transcribed, but the rest of the document is fine. Collected in
//!   [`crate::ConversionResult::errors`] so callers can inspect partial
//!   success instead of losing the whole document to one bad page.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the doc2md library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Source errors ─────────────────────────────────────────────────────
    /// The source locator is empty or otherwise unusable.
    #[error("Invalid source '{input}': expected a file path or an HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// Local source does not exist.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the source.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The URL was valid but fetching it failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes behind the locator are not a PDF.
    #[error("Source is not a PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Document errors ───────────────────────────────────────────────────
    /// pdfium could not parse the file.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The PDF is encrypted and no password was supplied.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was supplied but pdfium rejected it.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// Every selected page failed; there is nothing to export.
    #[error("All {total} selected pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The pdfium shared library could not be bound.
    #[error(
        "Failed to bind to the pdfium library: {0}\n\n\
Install libpdfium system-wide, or point PDFIUM_LIB_PATH at an existing copy."
    )]
    EngineUnavailable(String),

    /// OCR was requested but no vision provider could be configured.
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or replace the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The conversion continues unless every selected page fails.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// pdfium could not load the page or its text layer.
    #[error("Page {page}: text extraction failed: {detail}")]
    ExtractFailed { page: usize, detail: String },

    /// Rendering the page for OCR failed.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The vision model could not transcribe the page.
    #[error("Page {page}: OCR failed after {retries} retries: {detail}")]
    OcrFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The page has no text layer and OCR is disabled.
    #[error("Page {page}: no text layer (enable OCR to transcribe scanned pages)")]
    NoText { page: usize },
}

impl PageError {
    /// 1-indexed page the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::ExtractFailed { page, .. }
            | PageError::RenderFailed { page, .. }
            | PageError::OcrFailed { page, .. }
            | PageError::NoText { page } => *page,
        }
    }
}
