//! Progress-callback trait for per-page conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConverterConfigBuilder::progress_callback`] to receive
//! events as the converter works through the selected pages.
//!
//! # Example
//!
//! ```rust
//! use doc2md::{ConversionProgressCallback, ConverterConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ConversionProgressCallback for Counter {
//!     fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _items: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ConverterConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the converter as it processes each page.
///
/// OCR pages are transcribed concurrently, so `on_page_*` may be called from
/// several tasks at once; implementations must synchronise their own state.
/// All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, after the page selection is known.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is laid out or sent for OCR.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page produced its items.
    ///
    /// * `items`: number of document items found on the page
    fn on_page_complete(&self, page_num: usize, total_pages: usize, items: usize) {
        let _ = (page_num, total_pages, items);
    }

    /// Called when a page failed; the conversion continues.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::ConverterConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
