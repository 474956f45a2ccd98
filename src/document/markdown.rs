//! Markdown export for [`Document`].
//!
//! Each item renders to one Markdown block; blocks are separated by a blank
//! line except between consecutive list items, which stay on adjacent lines
//! so renderers keep them in one list. The assembled text is finished by
//! [`crate::pipeline::postprocess::clean_markdown`].

use super::{DocItem, Document, DocumentMetadata, ItemKind};
use crate::config::PageSeparator;
use crate::pipeline::postprocess::clean_markdown;
use serde::{Deserialize, Serialize};

/// Placeholder emitted for embedded images.
pub const IMAGE_PLACEHOLDER: &str = "<!-- image -->";

/// Options controlling Markdown export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownOptions {
    /// Escape `_` as `\_` so identifiers do not turn into emphasis. Default: true.
    pub escape_underscores: bool,
    /// Emit page headers and footers. Default: false.
    pub include_furniture: bool,
    /// Emit `<!-- image -->` for pictures. Default: true.
    pub image_placeholders: bool,
    /// Separator inserted where the page number changes. Default: none.
    pub page_separator: PageSeparator,
    /// Prepend YAML front matter built from the document metadata. Default: false.
    pub include_metadata: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            escape_underscores: true,
            include_furniture: false,
            image_placeholders: true,
            page_separator: PageSeparator::None,
            include_metadata: false,
        }
    }
}

/// Serialise `doc` to Markdown.
pub fn serialize(doc: &Document, options: &MarkdownOptions) -> String {
    let mut out = String::new();

    if options.include_metadata {
        out.push_str(&front_matter(&doc.metadata));
    }

    let mut prev: Option<&DocItem> = None;
    for item in doc.items.iter().filter(|i| include_item(i, options)) {
        let Some(block) = render_item(item, options) else {
            continue;
        };

        if let Some(p) = prev {
            if p.page_no != item.page_no {
                out.push_str(&options.page_separator.render(item.page_no));
            } else if is_list(p) && is_list(item) {
                out.push('\n');
            } else {
                out.push_str("\n\n");
            }
        }
        out.push_str(&block);
        prev = Some(item);
    }

    clean_markdown(&out)
}

fn include_item(item: &DocItem, options: &MarkdownOptions) -> bool {
    if item.is_furniture() && !options.include_furniture {
        return false;
    }
    if matches!(item.kind, ItemKind::Picture) && !options.image_placeholders {
        return false;
    }
    true
}

fn is_list(item: &DocItem) -> bool {
    matches!(item.kind, ItemKind::ListItem { .. })
}

fn render_item(item: &DocItem, options: &MarkdownOptions) -> Option<String> {
    let text = escape_text(item.text.trim(), options);
    let block = match &item.kind {
        ItemKind::Title => format!("# {text}"),
        ItemKind::SectionHeader { level } => {
            let hashes = "#".repeat(usize::from((*level).clamp(1, 5)) + 1);
            format!("{hashes} {text}")
        }
        ItemKind::ListItem { marker, enumerated } => {
            if *enumerated {
                format!("{marker} {text}")
            } else {
                format!("- {text}")
            }
        }
        ItemKind::Table { rows } => render_table(rows, options)?,
        ItemKind::Caption => format!("*{text}*"),
        ItemKind::Picture => IMAGE_PLACEHOLDER.to_string(),
        ItemKind::Paragraph | ItemKind::Footnote | ItemKind::PageHeader | ItemKind::PageFooter => {
            text
        }
    };
    if block.trim().is_empty() {
        None
    } else {
        Some(block)
    }
}

/// Render a GFM pipe table. The first row is the header; short rows are padded.
fn render_table(rows: &[Vec<String>], options: &MarkdownOptions) -> Option<String> {
    let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    if cols == 0 {
        return None;
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<String> = (0..cols)
            .map(|c| {
                let raw = row.get(c).map(String::as_str).unwrap_or("");
                escape_text(raw.trim(), options).replace('|', "\\|")
            })
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
        if i == 0 {
            lines.push(format!("|{}", " --- |".repeat(cols)));
        }
    }
    Some(lines.join("\n"))
}

fn escape_text(text: &str, options: &MarkdownOptions) -> String {
    if options.escape_underscores {
        escape_underscores(text)
    } else {
        text.to_string()
    }
}

/// Escape underscores, leaving URLs and already-escaped ones alone.
fn escape_underscores(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            if word.starts_with("http://") || word.starts_with("https://") {
                word.to_string()
            } else {
                let mut s = String::with_capacity(word.len());
                let mut prev = '\0';
                for ch in word.chars() {
                    if ch == '_' && prev != '\\' {
                        s.push('\\');
                    }
                    s.push(ch);
                    prev = ch;
                }
                s
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format document metadata as YAML front matter.
fn front_matter(meta: &DocumentMetadata) -> String {
    let mut yaml = String::from("---\n");
    let mut field = |key: &str, value: &Option<String>| {
        if let Some(v) = value {
            yaml.push_str(&format!("{key}: \"{}\"\n", v.replace('"', "\\\"")));
        }
    };
    field("title", &meta.title);
    field("author", &meta.author);
    field("subject", &meta.subject);
    field("creator", &meta.creator);
    field("producer", &meta.producer);
    yaml.push_str(&format!("pages: {}\n", meta.page_count));
    if !meta.pdf_version.is_empty() {
        yaml.push_str(&format!("pdf_version: \"{}\"\n", meta.pdf_version));
    }
    yaml.push_str("---\n\n");
    yaml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::BoundingBox;

    fn item(kind: ItemKind, text: &str, page: usize) -> DocItem {
        DocItem::new(kind, text, page, BoundingBox::default())
    }

    fn doc(items: Vec<DocItem>) -> Document {
        Document {
            items,
            ..Default::default()
        }
    }

    #[test]
    fn headings_and_paragraphs() {
        let d = doc(vec![
            item(ItemKind::Title, "DocLayNet", 1),
            item(ItemKind::Paragraph, "A dataset.", 1),
            item(ItemKind::SectionHeader { level: 1 }, "1 Introduction", 1),
            item(ItemKind::SectionHeader { level: 2 }, "1.1 Scope", 1),
        ]);
        let md = d.export_to_markdown();
        assert_eq!(
            md,
            "# DocLayNet\n\nA dataset.\n\n## 1 Introduction\n\n### 1.1 Scope\n"
        );
    }

    #[test]
    fn list_items_stay_adjacent() {
        let d = doc(vec![
            item(
                ItemKind::ListItem {
                    marker: "•".into(),
                    enumerated: false,
                },
                "first",
                1,
            ),
            item(
                ItemKind::ListItem {
                    marker: "•".into(),
                    enumerated: false,
                },
                "second",
                1,
            ),
            item(
                ItemKind::ListItem {
                    marker: "3.".into(),
                    enumerated: true,
                },
                "third",
                1,
            ),
            item(ItemKind::Paragraph, "after", 1),
        ]);
        assert_eq!(
            d.export_to_markdown(),
            "- first\n- second\n3. third\n\nafter\n"
        );
    }

    #[test]
    fn table_gets_separator_and_padding() {
        let d = doc(vec![item(
            ItemKind::Table {
                rows: vec![
                    vec!["Class".into(), "Count".into()],
                    vec!["Text".into()],
                    vec!["a|b".into(), "3".into()],
                ],
            },
            "",
            1,
        )]);
        assert_eq!(
            d.export_to_markdown(),
            "| Class | Count |\n| --- | --- |\n| Text |  |\n| a\\|b | 3 |\n"
        );
    }

    #[test]
    fn furniture_hidden_by_default() {
        let d = doc(vec![
            item(ItemKind::PageHeader, "Running head", 1),
            item(ItemKind::Paragraph, "Body", 1),
            item(ItemKind::PageFooter, "1", 1),
        ]);
        assert_eq!(d.export_to_markdown(), "Body\n");

        let opts = MarkdownOptions {
            include_furniture: true,
            ..Default::default()
        };
        assert_eq!(d.export_to_markdown_with(&opts), "Running head\n\nBody\n\n1\n");
    }

    #[test]
    fn page_separator_between_pages_only() {
        let d = doc(vec![
            item(ItemKind::Paragraph, "one", 1),
            item(ItemKind::Paragraph, "one more", 1),
            item(ItemKind::Paragraph, "two", 2),
        ]);
        let opts = MarkdownOptions {
            page_separator: PageSeparator::Comment,
            ..Default::default()
        };
        assert_eq!(
            d.export_to_markdown_with(&opts),
            "one\n\none more\n\n<!-- page 2 -->\n\ntwo\n"
        );
    }

    #[test]
    fn underscores_escaped_except_urls() {
        let d = doc(vec![item(
            ItemKind::Paragraph,
            "snake_case see https://x.org/a_b",
            1,
        )]);
        assert_eq!(
            d.export_to_markdown(),
            "snake\\_case see https://x.org/a_b\n"
        );
        let opts = MarkdownOptions {
            escape_underscores: false,
            ..Default::default()
        };
        assert_eq!(
            d.export_to_markdown_with(&opts),
            "snake_case see https://x.org/a_b\n"
        );
    }

    #[test]
    fn pictures_and_captions() {
        let d = doc(vec![
            item(ItemKind::Picture, "", 1),
            item(ItemKind::Caption, "Figure 1: Layout classes.", 1),
        ]);
        assert_eq!(
            d.export_to_markdown(),
            "<!-- image -->\n\n*Figure 1: Layout classes.*\n"
        );
    }

    #[test]
    fn front_matter_escapes_quotes() {
        let mut d = doc(vec![item(ItemKind::Paragraph, "x", 1)]);
        d.metadata.title = Some("The \"Best\" Paper".into());
        d.metadata.page_count = 9;
        let opts = MarkdownOptions {
            include_metadata: true,
            ..Default::default()
        };
        let md = d.export_to_markdown_with(&opts);
        assert!(md.starts_with("---\ntitle: \"The \\\"Best\\\" Paper\"\npages: 9\n---\n\nx"));
    }

    #[test]
    fn empty_document_is_single_newline() {
        assert_eq!(doc(vec![]).export_to_markdown(), "\n");
    }
}
