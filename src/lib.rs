//! # doc2md
//!
//! Convert PDF documents, local or fetched over HTTP(S), into a structured
//! document model and export it as Markdown.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source
//!  │
//!  ├─ 1. Source   resolve a local file or download a URL
//!  ├─ 2. Extract  metadata, text cells and images via pdfium (spawn_blocking)
//!  ├─ 3. Layout   lines, columns, blocks, tables, headings, furniture
//!  ├─ 4. OCR      pages without a text layer → vision model (optional)
//!  └─ 5. Export   Document → Markdown / JSON
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2md::DocumentConverter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = DocumentConverter::new();
//!     let result = converter.convert("https://arxiv.org/pdf/2206.01062").await?;
//!     std::fs::write("output.md", result.document.export_to_markdown())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! doc2md = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime Requirements
//!
//! The pdfium shared library must be loadable: set `PDFIUM_LIB_PATH` to the
//! library (or its directory), place it in the working directory, or install
//! it system-wide. Scanned pages additionally need a vision provider
//! (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, … read by `edgequake-llm`).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConverterConfig, ConverterConfigBuilder, OcrMode, PageSelection, PageSeparator,
    DEFAULT_OUTPUT, DEFAULT_SOURCE,
};
pub use converter::{
    write_output, ConversionResult, ConversionStatus, DocumentConverter, InputInfo, OcrStats,
    Timings,
};
pub use document::{
    BoundingBox, DocItem, Document, DocumentMetadata, ItemKind, MarkdownOptions, Origin, PageInfo,
};
pub use error::{ConvertError, PageError};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
