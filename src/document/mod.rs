//! The structured document produced by a conversion.
//!
//! A [`Document`] is a flat list of [`DocItem`]s in reading order, plus the
//! page geometry and metadata they were extracted from. Every export (Markdown,
//! JSON) is a pure function of this structure, so the same conversion can be
//! rendered several ways without touching the PDF again.

pub mod markdown;

use serde::{Deserialize, Serialize};

pub use markdown::MarkdownOptions;

/// Axis-aligned box in PDF points, top-left origin (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub l: f32,
    pub t: f32,
    pub r: f32,
    pub b: f32,
}

impl BoundingBox {
    pub fn new(l: f32, t: f32, r: f32, b: f32) -> Self {
        Self { l, t, r, b }
    }

    pub fn width(&self) -> f32 {
        self.r - self.l
    }

    pub fn height(&self) -> f32 {
        self.b - self.t
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            l: self.l.min(other.l),
            t: self.t.min(other.t),
            r: self.r.max(other.r),
            b: self.b.max(other.b),
        }
    }

    /// Length of the vertical overlap between two boxes (0 when disjoint).
    pub fn vertical_overlap(&self, other: &BoundingBox) -> f32 {
        (self.b.min(other.b) - self.t.max(other.t)).max(0.0)
    }
}

/// Geometry of one page of the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    /// 1-indexed page number.
    pub page_no: usize,
    pub width: f32,
    pub height: f32,
    /// True when the page content came from OCR rather than the text layer.
    #[serde(default)]
    pub ocr: bool,
}

/// What a [`DocItem`] represents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "label", rename_all = "snake_case")]
pub enum ItemKind {
    /// Document title (at most one, normally on page 1).
    Title,
    /// Section heading; `level` 1 is the top level below the title.
    SectionHeader { level: u8 },
    /// Running body text.
    Paragraph,
    /// One entry of a bulleted or numbered list.
    ListItem { marker: String, enumerated: bool },
    /// Table content, first row is the header.
    Table { rows: Vec<Vec<String>> },
    /// `Figure N:` / `Table N:` captions.
    Caption,
    Footnote,
    /// An embedded image; carries no text.
    Picture,
    PageHeader,
    PageFooter,
}

/// One content element of a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocItem {
    #[serde(flatten)]
    pub kind: ItemKind,
    /// Text content; empty for pictures and tables.
    pub text: String,
    /// 1-indexed page the item was found on.
    pub page_no: usize,
    pub bbox: BoundingBox,
}

impl DocItem {
    pub fn new(kind: ItemKind, text: impl Into<String>, page_no: usize, bbox: BoundingBox) -> Self {
        Self {
            kind,
            text: text.into(),
            page_no,
            bbox,
        }
    }

    /// Page headers and footers are "furniture": repeated page decoration
    /// rather than document body.
    pub fn is_furniture(&self) -> bool {
        matches!(self.kind, ItemKind::PageHeader | ItemKind::PageFooter)
    }
}

/// Metadata read from the PDF information dictionary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Where the document came from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Origin {
    /// The source locator exactly as given (URL or path).
    pub source: String,
    /// File name of the resolved PDF.
    pub filename: String,
    pub mimetype: String,
    /// Size of the resolved file in bytes.
    pub binary_len: u64,
}

/// A converted document: items in reading order plus page geometry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    /// Short name, derived from the source file stem.
    pub name: String,
    pub origin: Origin,
    pub metadata: DocumentMetadata,
    pub pages: Vec<PageInfo>,
    pub items: Vec<DocItem>,
}

impl Document {
    /// Export to Markdown with default options.
    pub fn export_to_markdown(&self) -> String {
        markdown::serialize(self, &MarkdownOptions::default())
    }

    /// Export to Markdown with explicit options.
    pub fn export_to_markdown_with(&self, options: &MarkdownOptions) -> String {
        markdown::serialize(self, options)
    }

    /// Export the full structure as pretty-printed JSON.
    pub fn export_to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Items found on the given 1-indexed page.
    pub fn items_on_page(&self, page_no: usize) -> impl Iterator<Item = &DocItem> {
        self.items.iter().filter(move |i| i.page_no == page_no)
    }

    /// Concatenated plain text of all body items, one item per line.
    pub fn plain_text(&self) -> String {
        self.items
            .iter()
            .filter(|i| !i.is_furniture() && !i.text.is_empty())
            .map(|i| i.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 10.0, 10.0)
    }

    #[test]
    fn bbox_union_and_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 20.0, 12.0);
        let u = a.union(&b);
        assert_eq!(u, BoundingBox::new(0.0, 0.0, 20.0, 12.0));
        assert_eq!(a.vertical_overlap(&b), 5.0);
        let c = BoundingBox::new(0.0, 30.0, 10.0, 40.0);
        assert_eq!(a.vertical_overlap(&c), 0.0);
    }

    #[test]
    fn items_on_page_filters_by_page_number() {
        let doc = Document {
            items: vec![
                DocItem::new(ItemKind::Paragraph, "first", 1, bbox()),
                DocItem::new(ItemKind::Paragraph, "second", 2, bbox()),
                DocItem::new(ItemKind::PageFooter, "2", 2, bbox()),
            ],
            ..Document::default()
        };

        let texts: Vec<&str> = doc.items_on_page(2).map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "2"]);
        assert_eq!(doc.items_on_page(1).count(), 1);
        assert_eq!(doc.items_on_page(3).count(), 0);
    }

    #[test]
    fn json_uses_label_tag() {
        let item = DocItem::new(ItemKind::SectionHeader { level: 2 }, "Methods", 1, bbox());
        let json = serde_json::to_value(&item).expect("serialise");
        assert_eq!(json["label"], "section_header");
        assert_eq!(json["level"], 2);
        assert_eq!(json["text"], "Methods");
    }

    #[test]
    fn plain_text_skips_furniture() {
        let doc = Document {
            items: vec![
                DocItem::new(ItemKind::PageHeader, "Journal of Things", 1, bbox()),
                DocItem::new(ItemKind::Paragraph, "Body.", 1, bbox()),
                DocItem::new(ItemKind::PageFooter, "1", 1, bbox()),
            ],
            ..Default::default()
        };
        assert_eq!(doc.plain_text(), "Body.");
    }

    #[test]
    fn export_to_json_round_trips_items() {
        let doc = Document {
            name: "sample".into(),
            items: vec![DocItem::new(
                ItemKind::Table {
                    rows: vec![vec!["a".into(), "b".into()]],
                },
                "",
                1,
                bbox(),
            )],
            ..Default::default()
        };
        let json = doc.export_to_json().expect("json");
        let back: Document = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, doc);
    }
}
