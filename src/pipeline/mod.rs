//! Pipeline stages for document conversion.
//!
//! Each submodule implements one transformation step and is testable on its
//! own.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ extract ──▶ layout ──▶ Document ──▶ markdown ──▶ postprocess
//! (URL/path)  (pdfium)    (blocks)                (export)     (cleanup)
//!                │
//!                └─▶ ocr (pages without a text layer, via a vision model)
//! ```
//!
//! 1. [`source`]: resolve the locator to a local PDF, downloading URLs
//! 2. [`extract`]: metadata, text cells and picture boxes; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`layout`]: pure heuristics from cells to document items
//! 4. [`ocr`]: render, encode and transcribe scanned pages; the only
//!    stage besides downloads with network I/O
//! 5. [`postprocess`]: deterministic Markdown cleanup

pub mod extract;
pub mod layout;
pub mod ocr;
pub mod postprocess;
pub mod source;
