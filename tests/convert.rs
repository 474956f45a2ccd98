//! Integration tests for the public conversion API that need neither the
//! pdfium library nor network access.
//!
//! Run with:
//!   cargo test --test convert

use doc2md::{
    write_output, BoundingBox, ConversionProgressCallback, ConvertError, ConverterConfig,
    DocItem, Document, DocumentConverter, DocumentMetadata, ItemKind, MarkdownOptions, Origin,
    PageInfo, PageSelection, PageSeparator, ProgressCallback,
};
use std::path::Path;
use std::sync::Arc;

fn page(page_no: usize) -> PageInfo {
    PageInfo {
        page_no,
        width: 612.0,
        height: 792.0,
        ocr: false,
    }
}

fn item(kind: ItemKind, text: &str, page_no: usize) -> DocItem {
    DocItem::new(kind, text, page_no, BoundingBox::new(72.0, 72.0, 540.0, 90.0))
}

fn sample_document() -> Document {
    Document {
        name: "layout".into(),
        origin: Origin {
            source: "layout.pdf".into(),
            filename: "layout.pdf".into(),
            mimetype: "application/pdf".into(),
            binary_len: 1024,
        },
        metadata: DocumentMetadata {
            title: Some("Layout Analysis".into()),
            page_count: 2,
            pdf_version: "1.7".into(),
            ..Default::default()
        },
        pages: vec![page(1), page(2)],
        items: vec![
            item(ItemKind::PageHeader, "Preprint", 1),
            item(ItemKind::Title, "Layout Analysis", 1),
            item(ItemKind::SectionHeader { level: 1 }, "1 Introduction", 1),
            item(ItemKind::Paragraph, "Documents carry structure.", 1),
            item(
                ItemKind::ListItem {
                    marker: "-".into(),
                    enumerated: false,
                },
                "titles",
                1,
            ),
            item(
                ItemKind::ListItem {
                    marker: "-".into(),
                    enumerated: false,
                },
                "tables",
                1,
            ),
            item(
                ItemKind::Table {
                    rows: vec![
                        vec!["class".into(), "count".into()],
                        vec!["text".into(), "510".into()],
                    ],
                },
                "",
                2,
            ),
            item(ItemKind::Caption, "Table 1: Class counts", 2),
            item(ItemKind::PageFooter, "2", 2),
        ],
    }
}

async fn assert_failure_leaves_output(source: &str, out: &Path, before: Option<&str>) {
    let converter = DocumentConverter::with_config(
        ConverterConfig::builder()
            .download_timeout_secs(5)
            .build()
            .expect("config"),
    );

    let result = converter.convert_to_file(source, out).await;
    assert!(result.is_err(), "conversion of {source} should fail");

    match before {
        Some(contents) => {
            assert_eq!(std::fs::read_to_string(out).expect("read"), contents);
        }
        None => assert!(!out.exists(), "{} must not be created", out.display()),
    }
}

#[tokio::test]
async fn missing_file_creates_no_output() {
    let dir = tempfile::tempdir().expect("tmp");
    let out = dir.path().join("output.md");
    let missing = dir.path().join("absent.pdf");

    assert_failure_leaves_output(&missing.to_string_lossy(), &out, None).await;
}

#[tokio::test]
async fn unreachable_url_creates_no_output() {
    let dir = tempfile::tempdir().expect("tmp");
    let out = dir.path().join("output.md");

    assert_failure_leaves_output("http://127.0.0.1:9/paper.pdf", &out, None).await;
}

#[tokio::test]
async fn failure_keeps_existing_output() {
    let dir = tempfile::tempdir().expect("tmp");
    let out = dir.path().join("output.md");
    std::fs::write(&out, "# Previous run\n").expect("seed");

    let not_pdf = dir.path().join("notes.pdf");
    std::fs::write(&not_pdf, "plain text, no header").expect("write");

    assert_failure_leaves_output(&not_pdf.to_string_lossy(), &out, Some("# Previous run\n"))
        .await;
}

#[tokio::test]
async fn non_pdf_is_rejected_with_magic_bytes() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("page.html");
    std::fs::write(&path, "<html></html>").expect("write");

    let err = DocumentConverter::new()
        .convert(path.to_string_lossy())
        .await
        .expect_err("not a pdf");
    match err {
        ConvertError::NotAPdf { magic, .. } => assert_eq!(&magic, b"<htm"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn empty_locator_is_invalid_input() {
    let err = DocumentConverter::new()
        .convert("   ")
        .await
        .expect_err("empty");
    assert!(matches!(err, ConvertError::InvalidInput { .. }), "got {err:?}");
}

#[tokio::test]
async fn write_output_writes_markdown() {
    let dir = tempfile::tempdir().expect("tmp");
    let out = dir.path().join("output.md");
    let md = sample_document().export_to_markdown();

    write_output(&out, &md).await.expect("write");
    assert_eq!(std::fs::read_to_string(&out).expect("read"), md);
}

#[test]
fn markdown_export_of_a_built_document() {
    let md = sample_document().export_to_markdown();

    assert!(md.starts_with("# Layout Analysis\n"), "got:\n{md}");
    assert!(md.contains("## 1 Introduction"));
    assert!(md.contains("- titles\n- tables"));
    assert!(md.contains("| class | count |"));
    assert!(md.contains("*Table 1: Class counts*"));
    assert!(!md.contains("Preprint"), "page header is furniture");
    assert!(md.ends_with('\n'));
}

#[test]
fn markdown_options_change_the_export() {
    let doc = sample_document();
    let options = MarkdownOptions {
        include_furniture: true,
        include_metadata: true,
        page_separator: PageSeparator::Comment,
        ..Default::default()
    };
    let md = doc.export_to_markdown_with(&options);

    assert!(md.starts_with("---\ntitle: \"Layout Analysis\""), "got:\n{md}");
    assert!(md.contains("Preprint"));
    assert!(md.contains("<!-- page 2 -->"));
}

#[test]
fn json_export_carries_items_and_origin() {
    let json = sample_document().export_to_json().expect("json");
    let back: Document = serde_json::from_str(&json).expect("parse");
    assert_eq!(back, sample_document());
}

#[test]
fn page_selection_resolves_against_page_count() {
    assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
    assert_eq!(PageSelection::Single(2).to_indices(3), vec![1]);
    assert_eq!(PageSelection::Range(2, 10).to_indices(4), vec![1, 2, 3]);
    assert!(PageSelection::Single(7).to_indices(3).is_empty());
}

#[test]
fn builder_applies_markdown_options() {
    let config = ConverterConfig::builder()
        .pages(PageSelection::Set(vec![1, 3]))
        .page_separator(PageSeparator::HorizontalRule)
        .include_metadata(true)
        .build()
        .expect("config");
    assert_eq!(config.pages, PageSelection::Set(vec![1, 3]));
    assert_eq!(config.markdown.page_separator, PageSeparator::HorizontalRule);
    assert!(config.markdown.include_metadata);
}

#[test]
fn progress_callback_is_shareable() {
    struct Count(std::sync::atomic::AtomicUsize);
    impl ConversionProgressCallback for Count {
        fn on_page_complete(&self, _page: usize, _total: usize, _items: usize) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    let cb: ProgressCallback = Arc::new(Count(Default::default()));
    let config = ConverterConfig::builder()
        .progress_callback(Arc::clone(&cb))
        .build()
        .expect("config");
    let handle = std::thread::spawn(move || {
        cb.on_page_complete(1, 1, 4);
    });
    handle.join().expect("thread");
    assert!(config.progress_callback.is_some());
}
