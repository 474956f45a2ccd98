//! End-to-end tests against real documents.
//!
//! These need the pdfium shared library and network access, so they are
//! gated behind the `E2E_ENABLED` environment variable.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture

use doc2md::{
    ConversionStatus, ConverterConfig, DocumentConverter, ItemKind, OcrMode, PageSelection,
    DEFAULT_SOURCE,
};

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    };
}

/// Basic quality checks on exported Markdown.
fn assert_markdown_quality(md: &str, context: &str) {
    assert!(!md.trim().is_empty(), "[{context}] Markdown is empty");
    assert!(md.ends_with('\n'), "[{context}] Markdown must end with a newline");
    assert!(
        !md.contains("\n\n\n"),
        "[{context}] Output has runs of blank lines"
    );
    for ch in ['\u{200B}', '\u{FEFF}', '\u{00AD}'] {
        assert!(
            !md.contains(ch),
            "[{context}] Output contains invisible char U+{:04X}",
            ch as u32
        );
    }
}

fn text_only() -> ConverterConfig {
    ConverterConfig::builder()
        .ocr(OcrMode::Off)
        .build()
        .expect("config")
}

#[tokio::test]
async fn test_default_source_to_output_md() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().expect("tmp");
    let out = dir.path().join("output.md");

    let converter = DocumentConverter::with_config(text_only());
    let result = converter
        .convert_to_file(DEFAULT_SOURCE, &out)
        .await
        .expect("conversion");

    let md = std::fs::read_to_string(&out).expect("output.md written");
    assert_markdown_quality(&md, "default source");
    assert_eq!(md, result.markdown());
    assert!(result.input.page_count > 1);
    assert!(
        result
            .document
            .items
            .iter()
            .any(|i| matches!(i.kind, ItemKind::Title | ItemKind::SectionHeader { .. })),
        "expected at least one heading"
    );
    println!(
        "{} pages, {} items, {}ms",
        result.converted_pages(),
        result.document.items.len(),
        result.timings.total_ms
    );
}

#[tokio::test]
async fn test_single_page_selection() {
    e2e_skip_unless_enabled!();

    let config = ConverterConfig::builder()
        .ocr(OcrMode::Off)
        .pages(PageSelection::Single(1))
        .build()
        .expect("config");
    let result = DocumentConverter::with_config(config)
        .convert(DEFAULT_SOURCE)
        .await
        .expect("conversion");

    assert_eq!(result.input.selected_pages, 1);
    assert_eq!(result.status, ConversionStatus::Success);
    assert!(result.document.items.iter().all(|i| i.page_no == 1));
    assert_markdown_quality(&result.markdown(), "page 1");
}

#[tokio::test]
async fn test_inspect_metadata() {
    e2e_skip_unless_enabled!();

    let meta = DocumentConverter::new()
        .inspect(DEFAULT_SOURCE)
        .await
        .expect("inspect");
    assert!(meta.page_count > 1);
    assert!(!meta.pdf_version.is_empty());
}

#[tokio::test]
async fn test_page_out_of_range() {
    e2e_skip_unless_enabled!();

    let config = ConverterConfig::builder()
        .ocr(OcrMode::Off)
        .pages(PageSelection::Single(10_000))
        .build()
        .expect("config");
    let err = DocumentConverter::with_config(config)
        .convert(DEFAULT_SOURCE)
        .await
        .expect_err("out of range");
    assert!(
        matches!(err, doc2md::ConvertError::PageOutOfRange { page: 10_000, .. }),
        "got {err:?}"
    );
}
