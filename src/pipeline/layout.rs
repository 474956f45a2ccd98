//! Layout analysis: turn positioned text cells into document items.
//!
//! The page is processed in five passes, all pure functions so they can be
//! tested on synthetic cells:
//!
//! 1. cells on the same row are merged into fragments when the horizontal
//!    gap is small relative to the font size;
//! 2. a vertical gutter splits two-column pages into sections, read top to
//!    bottom, left column before right;
//! 3. fragments are grouped into lines, and runs of multi-fragment lines
//!    with a consistent column count become tables;
//! 4. the remaining lines are grouped into blocks (pitch, font band, bold
//!    changes, list markers, short terminated lines);
//! 5. every block is classified against the body font size.
//!
//! Furniture (running headers, footers, page numbers) needs every page and
//! is detected afterwards by [`detect_furniture`].

use crate::document::{BoundingBox, DocItem, ItemKind};
use crate::pipeline::extract::{PageContent, TextCell};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Font size assumed when a document carries no measurable text.
pub const DEFAULT_BODY_SIZE: f32 = 10.0;

/// Largest gap, in font sizes, between two cells of the same fragment.
const WORD_GAP: f32 = 1.2;
/// Minimum vertical overlap, as a share of the smaller height, for one row.
const ROW_OVERLAP: f32 = 0.5;
/// Largest line pitch, in font sizes, inside one block.
const BLOCK_PITCH: f32 = 1.5;
/// Relative font-size difference that splits blocks.
const FONT_BAND: f32 = 0.15;
const HEADING_RATIO: f32 = 1.15;
const TITLE_RATIO: f32 = 1.3;
const FOOTNOTE_RATIO: f32 = 0.85;
/// Top and bottom share of the page searched for headers and footers.
const FURNITURE_BAND: f32 = 0.08;
const MIN_TABLE_ROWS: usize = 2;

/// Items of one page after layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    /// 1-indexed.
    pub page_no: usize,
    pub width: f32,
    pub height: f32,
    pub items: Vec<DocItem>,
}

/// Lay out every page and mark furniture across them.
pub fn layout_document(pages: &[PageContent]) -> Vec<PageLayout> {
    let body_size = body_font_size(pages);
    debug!(body_size, pages = pages.len(), "Laying out pages");

    let mut layouts: Vec<PageLayout> = pages
        .iter()
        .map(|page| PageLayout {
            page_no: page.index + 1,
            width: page.width,
            height: page.height,
            items: layout_page(page, body_size),
        })
        .collect();

    detect_furniture(&mut layouts);
    layouts
}

/// Character-weighted mode of the font sizes, rounded to half points.
///
/// Ties resolve to the smaller size.
pub fn body_font_size<'a>(pages: impl IntoIterator<Item = &'a PageContent>) -> f32 {
    let mut histogram: BTreeMap<i32, usize> = BTreeMap::new();
    for page in pages {
        for cell in &page.cells {
            let chars = cell.text.chars().filter(|c| !c.is_whitespace()).count();
            if chars == 0 || cell.font_size <= 0.0 {
                continue;
            }
            *histogram
                .entry((cell.font_size * 2.0).round() as i32)
                .or_default() += chars;
        }
    }

    histogram
        .into_iter()
        .fold(None, |best: Option<(i32, usize)>, (size, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((size, count)),
        })
        .map(|(size, _)| size as f32 / 2.0)
        .unwrap_or(DEFAULT_BODY_SIZE)
}

/// Lay out a single page. `body_size` comes from [`body_font_size`] over the
/// whole document so headings are judged consistently across pages.
pub fn layout_page(page: &PageContent, body_size: f32) -> Vec<DocItem> {
    let page_no = page.index + 1;
    let pictures = significant_pictures(page);

    let frags: Vec<TextCell> = fragments(&page.cells)
        .into_iter()
        .filter(|f| !pictures.iter().any(|p| contains_center(p, &f.bbox)))
        .collect();

    let ctx = PageContext {
        page_index: page.index,
        height: page.height,
        body_size: body_size.max(1.0),
        max_size: frags.iter().map(|f| f.font_size).fold(0.0, f32::max),
    };

    let mut items = Vec::new();
    let mut title_taken = false;

    for section in reading_sections(frags, page.width) {
        let lines = build_lines(section);
        let right_edge = lines.iter().map(|l| l.bbox.r).fold(0.0, f32::max);
        let mut pending: Vec<Line> = Vec::new();

        for unit in split_tables(lines) {
            match unit {
                Unit::Text(line) => {
                    if pending
                        .last()
                        .is_some_and(|prev| starts_new_block(prev, &line, right_edge))
                    {
                        flush_block(&mut pending, &mut items, &ctx, page_no, &mut title_taken);
                    }
                    pending.push(line);
                }
                Unit::Table(rows) => {
                    flush_block(&mut pending, &mut items, &ctx, page_no, &mut title_taken);
                    items.push(table_item(&rows, page_no));
                }
            }
        }
        flush_block(&mut pending, &mut items, &ctx, page_no, &mut title_taken);
    }

    insert_pictures(&mut items, &pictures, page_no);
    items
}

// ── Fragments ────────────────────────────────────────────────────────────

fn same_row(a: &BoundingBox, b: &BoundingBox) -> bool {
    let min_height = a.height().min(b.height()).max(0.1);
    a.vertical_overlap(b) >= ROW_OVERLAP * min_height
}

fn is_rotated(cell: &TextCell) -> bool {
    let height = cell.bbox.height();
    height > 3.0 * cell.font_size && cell.bbox.width() < height / 4.0
}

/// Cluster cells into rows, each sorted left to right.
fn group_rows(mut cells: Vec<TextCell>) -> Vec<Vec<TextCell>> {
    cells.sort_by(|a, b| {
        a.bbox
            .t
            .total_cmp(&b.bbox.t)
            .then(a.bbox.l.total_cmp(&b.bbox.l))
    });

    let mut rows: Vec<(BoundingBox, Vec<TextCell>)> = Vec::new();
    for cell in cells {
        match rows.last_mut() {
            Some((bbox, row)) if same_row(bbox, &cell.bbox) => {
                *bbox = bbox.union(&cell.bbox);
                row.push(cell);
            }
            _ => rows.push((cell.bbox, vec![cell])),
        }
    }

    rows.into_iter()
        .map(|(_, mut row)| {
            row.sort_by(|a, b| a.bbox.l.total_cmp(&b.bbox.l));
            row
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_cell(prev: &mut TextCell, cell: TextCell, gap: f32) {
    let needs_space = gap > 0.1 * prev.font_size.min(cell.font_size)
        && !prev.text.ends_with(char::is_whitespace)
        && !cell.text.starts_with(char::is_whitespace);

    let (a, b) = (char_len(&prev.text) as f32, char_len(&cell.text) as f32);
    if a + b > 0.0 {
        prev.font_size = (prev.font_size * a + cell.font_size * b) / (a + b);
    }
    prev.bold &= cell.bold;
    prev.italic &= cell.italic;
    if needs_space {
        prev.text.push(' ');
    }
    prev.text.push_str(&cell.text);
    prev.bbox = prev.bbox.union(&cell.bbox);
}

fn merge_row(row: Vec<TextCell>) -> Vec<TextCell> {
    let mut out: Vec<TextCell> = Vec::with_capacity(row.len());
    for cell in row {
        if let Some(prev) = out.last_mut() {
            let size = prev.font_size.max(cell.font_size).max(1.0);
            let gap = cell.bbox.l - prev.bbox.r;
            if gap <= WORD_GAP * size {
                join_cell(prev, cell, gap);
                continue;
            }
        }
        out.push(cell);
    }
    out
}

/// Merge raw cells into fragments: runs of cells on one row separated by
/// word-sized gaps. Whitespace is collapsed and rotated text dropped.
fn fragments(cells: &[TextCell]) -> Vec<TextCell> {
    let usable: Vec<TextCell> = cells
        .iter()
        .filter(|c| !c.text.trim().is_empty() && !is_rotated(c))
        .cloned()
        .collect();

    group_rows(usable)
        .into_iter()
        .flat_map(merge_row)
        .filter_map(|mut frag| {
            frag.text = frag.text.split_whitespace().collect::<Vec<_>>().join(" ");
            (!frag.text.is_empty()).then_some(frag)
        })
        .collect()
}

// ── Columns ──────────────────────────────────────────────────────────────

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f32::total_cmp);
    values[values.len() / 2]
}

/// Find a vertical gutter in the middle of the page that separates two
/// text columns.
fn find_gutter(frags: &[TextCell], width: f32) -> Option<f32> {
    if frags.len() < 6 || width <= 0.0 {
        return None;
    }

    let centre = width / 2.0;
    let mut best: Option<(usize, f32)> = None;
    for xi in (width * 0.35) as i32..=(width * 0.65) as i32 {
        let x = xi as f32;
        let crossing = frags
            .iter()
            .filter(|f| f.bbox.l < x && f.bbox.r > x)
            .count();
        let better = match best {
            None => true,
            Some((c, bx)) => {
                crossing < c || (crossing == c && (x - centre).abs() < (bx - centre).abs())
            }
        };
        if better {
            best = Some((crossing, x));
        }
    }

    let (crossing, x) = best?;
    if crossing as f32 > 0.25 * frags.len() as f32 {
        return None;
    }

    let mut left: Vec<f32> = frags
        .iter()
        .filter(|f| f.bbox.r <= x)
        .map(|f| f.bbox.width())
        .collect();
    let mut right: Vec<f32> = frags
        .iter()
        .filter(|f| f.bbox.l >= x)
        .map(|f| f.bbox.width())
        .collect();
    if left.len() < 3 || right.len() < 3 {
        return None;
    }

    // Column text is wide; table cells and labels are not.
    let min_column = width * 0.2;
    if median(&mut left) < min_column || median(&mut right) < min_column {
        return None;
    }

    Some(x)
}

/// Split fragments into sections in reading order.
///
/// Fragments crossing the gutter (titles, wide figures) close the current
/// pair of columns and start a full-width section.
fn reading_sections(mut frags: Vec<TextCell>, width: f32) -> Vec<Vec<TextCell>> {
    let Some(gutter) = find_gutter(&frags, width) else {
        return vec![frags];
    };
    debug!(gutter, "Two-column layout");

    frags.sort_by(|a, b| a.bbox.t.total_cmp(&b.bbox.t));

    let mut sections = Vec::new();
    let mut full: Vec<TextCell> = Vec::new();
    let mut left: Vec<TextCell> = Vec::new();
    let mut right: Vec<TextCell> = Vec::new();

    for frag in frags {
        let spanning = frag.bbox.l < gutter && frag.bbox.r > gutter;
        if spanning {
            for side in [&mut left, &mut right] {
                if !side.is_empty() {
                    sections.push(std::mem::take(side));
                }
            }
            full.push(frag);
        } else {
            if !full.is_empty() {
                sections.push(std::mem::take(&mut full));
            }
            if frag.bbox.r <= gutter {
                left.push(frag);
            } else {
                right.push(frag);
            }
        }
    }

    sections.extend([full, left, right].into_iter().filter(|s| !s.is_empty()));
    sections
}

// ── Lines and tables ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Line {
    cells: Vec<TextCell>,
    bbox: BoundingBox,
    font_size: f32,
    bold: bool,
}

impl Line {
    fn from_cells(cells: Vec<TextCell>) -> Self {
        let bbox = cells
            .iter()
            .skip(1)
            .fold(cells[0].bbox, |acc, c| acc.union(&c.bbox));
        let chars: usize = cells.iter().map(|c| char_len(&c.text)).sum();
        let font_size = if chars == 0 {
            cells[0].font_size
        } else {
            cells
                .iter()
                .map(|c| c.font_size * char_len(&c.text) as f32)
                .sum::<f32>()
                / chars as f32
        };
        let bold = cells.iter().all(|c| c.bold);
        Self {
            cells,
            bbox,
            font_size,
            bold,
        }
    }

    fn text(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn build_lines(section: Vec<TextCell>) -> Vec<Line> {
    group_rows(section)
        .into_iter()
        .filter(|row| !row.is_empty())
        .map(Line::from_cells)
        .collect()
}

enum Unit {
    Text(Line),
    Table(Vec<Line>),
}

fn flush_table_run(units: &mut Vec<Unit>, run: &mut Vec<Line>) {
    if run.len() >= MIN_TABLE_ROWS {
        units.push(Unit::Table(std::mem::take(run)));
    } else {
        units.extend(run.drain(..).map(Unit::Text));
    }
}

/// Runs of consecutive lines with two or more fragments and a similar
/// column count (±1) are tables.
fn split_tables(lines: Vec<Line>) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut run: Vec<Line> = Vec::new();

    for line in lines {
        let multi = line.cells.len() >= 2;
        let fits = multi
            && run
                .first()
                .is_none_or(|first| line.cells.len().abs_diff(first.cells.len()) <= 1)
            && run
                .last()
                .is_none_or(|prev| line.bbox.t - prev.bbox.b <= 2.5 * line.font_size);

        if fits {
            run.push(line);
            continue;
        }

        flush_table_run(&mut units, &mut run);
        if multi {
            run.push(line);
        } else {
            units.push(Unit::Text(line));
        }
    }

    flush_table_run(&mut units, &mut run);
    units
}

fn centre_x(bbox: &BoundingBox) -> f32 {
    (bbox.l + bbox.r) / 2.0
}

/// Assign each fragment to the column of the widest row whose centre is
/// nearest.
fn table_rows(lines: &[Line]) -> Vec<Vec<String>> {
    let cols = lines.iter().map(|l| l.cells.len()).max().unwrap_or(0);
    let Some(reference) = lines.iter().find(|l| l.cells.len() == cols) else {
        return Vec::new();
    };
    let anchors: Vec<f32> = reference.cells.iter().map(|c| centre_x(&c.bbox)).collect();

    lines
        .iter()
        .map(|line| {
            let mut row = vec![String::new(); cols];
            for cell in &line.cells {
                let x = centre_x(&cell.bbox);
                let idx = anchors
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| (*a - x).abs().total_cmp(&(*b - x).abs()))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                if !row[idx].is_empty() {
                    row[idx].push(' ');
                }
                row[idx].push_str(&cell.text);
            }
            row
        })
        .collect()
}

fn table_item(lines: &[Line], page_no: usize) -> DocItem {
    let bbox = lines
        .iter()
        .skip(1)
        .fold(lines[0].bbox, |acc, l| acc.union(&l.bbox));
    DocItem::new(
        ItemKind::Table {
            rows: table_rows(lines),
        },
        "",
        page_no,
        bbox,
    )
}

// ── Blocks ───────────────────────────────────────────────────────────────

static RE_CAPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:Figure|Fig\.|Table|Tab\.)\s*\d+[a-z]?\s*[:.|]").expect("valid regex")
});

static RE_ENUMERATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\(?(?:\d{1,3}|[a-z]|[ivx]{1,4})[.)])\s+(\S.*)$").expect("valid regex")
});

static RE_NUMBERED_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((?:\d{1,2}|[A-Z])(?:\.\d{1,2}){0,3})\.?\s+\p{Lu}").expect("valid regex")
});

static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?i:page)\s+)?(\d{1,4}|[ivxlc]{1,9})(?:\s*(?:/|(?i:of))\s*\d{1,4})?$")
        .expect("valid regex")
});

// Lowercase numerals up to 399, as used for front-matter pages.
static RE_ROMAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^c{0,3}(?:xc|xl|l?x{0,3})(?:ix|iv|v?i{0,3})$").expect("valid regex")
});

const BULLETS: &[char] = &[
    '•', '◦', '▪', '‣', '∙', '·', '●', '○', '■', '□', '–', '-', '*',
];

fn is_caption(text: &str) -> bool {
    RE_CAPTION.is_match(text)
}

/// Split a list marker off the start of `text`: `(marker, enumerated, rest)`.
pub(crate) fn list_marker(text: &str) -> Option<(String, bool, String)> {
    let text = text.trim();
    let mut chars = text.chars();
    if let Some(first) = chars.next() {
        if BULLETS.contains(&first) {
            let rest = chars.as_str();
            if rest.starts_with(char::is_whitespace) && !rest.trim().is_empty() {
                return Some((first.to_string(), false, rest.trim().to_string()));
            }
        }
    }

    RE_ENUMERATOR
        .captures(text)
        .map(|caps| (caps[1].to_string(), true, caps[2].trim().to_string()))
}

/// Depth of a numbered section heading: `1` → 1, `4.1` → 2, `A` → 1.
pub(crate) fn section_depth(text: &str) -> Option<usize> {
    RE_NUMBERED_SECTION
        .captures(text.trim())
        .map(|caps| caps[1].split('.').count())
}

pub(crate) fn is_page_number(text: &str) -> bool {
    RE_PAGE_NUMBER
        .captures(text.trim())
        .is_some_and(|caps| {
            let number = &caps[1];
            number.starts_with(|c: char| c.is_ascii_digit()) || RE_ROMAN.is_match(number)
        })
}

/// Join the lines of a block, removing end-of-line hyphenation.
pub(crate) fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        if out.is_empty() {
            out.push_str(line);
        } else if ends_with_break_hyphen(&out) && line.starts_with(char::is_lowercase) {
            out.pop();
            out.push_str(line);
        } else {
            out.push(' ');
            out.push_str(line);
        }
    }
    out
}

fn ends_with_break_hyphen(s: &str) -> bool {
    let mut rev = s.chars().rev();
    rev.next() == Some('-') && rev.next().is_some_and(char::is_lowercase)
}

fn starts_new_block(prev: &Line, line: &Line, right_edge: f32) -> bool {
    let size = prev.font_size.max(line.font_size).max(1.0);
    let pitch = line.bbox.t - prev.bbox.t;
    if pitch <= 0.0 || pitch > BLOCK_PITCH * size {
        return true;
    }
    if (prev.font_size - line.font_size).abs() > FONT_BAND * size {
        return true;
    }
    if prev.bold != line.bold {
        return true;
    }

    let text = line.text();
    if list_marker(&text).is_some() || is_caption(&text) {
        return true;
    }

    // A terminated line that stops well short of the column ends a paragraph.
    let prev_text = prev.text();
    prev_text.ends_with(['.', ':', '?', '!']) && prev.bbox.r < right_edge - 2.0 * size
}

struct PageContext {
    page_index: usize,
    height: f32,
    body_size: f32,
    max_size: f32,
}

fn classify(
    text: String,
    lines: &[Line],
    bbox: &BoundingBox,
    ctx: &PageContext,
    title_taken: &mut bool,
) -> (ItemKind, String) {
    let chars: usize = lines.iter().map(|l| char_len(&l.text())).sum();
    let size = if chars == 0 {
        lines[0].font_size
    } else {
        lines
            .iter()
            .map(|l| l.font_size * char_len(&l.text()) as f32)
            .sum::<f32>()
            / chars as f32
    };
    let ratio = size / ctx.body_size;
    let bold = lines.iter().all(|l| l.bold);

    if is_caption(&text) {
        return (ItemKind::Caption, text);
    }

    if ctx.page_index == 0
        && !*title_taken
        && ratio >= TITLE_RATIO
        && size >= ctx.max_size - 0.5
        && bbox.t < ctx.height * 0.5
        && lines.len() <= 3
    {
        *title_taken = true;
        return (ItemKind::Title, text);
    }

    let heading_shape = lines.len() <= 2
        && char_len(&text) <= 150
        && !text.ends_with(['.', ',', ';'])
        && text.chars().any(char::is_alphabetic);
    if heading_shape && (ratio >= HEADING_RATIO || (bold && ratio >= 0.95)) {
        let level = match section_depth(&text) {
            Some(depth) => depth.clamp(1, 3) as u8,
            None if ratio >= 1.5 => 1,
            None if ratio >= HEADING_RATIO => 2,
            None => 3,
        };
        return (ItemKind::SectionHeader { level }, text);
    }

    if ratio <= FOOTNOTE_RATIO && bbox.t >= ctx.height * 0.75 {
        return (ItemKind::Footnote, text);
    }

    if let Some((marker, enumerated, rest)) = list_marker(&text) {
        return (ItemKind::ListItem { marker, enumerated }, rest);
    }

    (ItemKind::Paragraph, text)
}

fn flush_block(
    pending: &mut Vec<Line>,
    items: &mut Vec<DocItem>,
    ctx: &PageContext,
    page_no: usize,
    title_taken: &mut bool,
) {
    if pending.is_empty() {
        return;
    }
    let lines = std::mem::take(pending);
    let bbox = lines
        .iter()
        .skip(1)
        .fold(lines[0].bbox, |acc, l| acc.union(&l.bbox));
    let texts: Vec<String> = lines.iter().map(Line::text).collect();
    let (kind, text) = classify(join_lines(&texts), &lines, &bbox, ctx, title_taken);
    items.push(DocItem::new(kind, text, page_no, bbox));
}

// ── Pictures ─────────────────────────────────────────────────────────────

/// Images large enough to be figures but not full-page backgrounds.
fn significant_pictures(page: &PageContent) -> Vec<BoundingBox> {
    let page_area = (page.width * page.height).max(1.0);
    page.pictures
        .iter()
        .filter(|p| {
            let area = p.width().max(0.0) * p.height().max(0.0);
            area >= 0.005 * page_area && area <= 0.8 * page_area
        })
        .copied()
        .collect()
}

fn contains_center(outer: &BoundingBox, inner: &BoundingBox) -> bool {
    let x = centre_x(inner);
    let y = (inner.t + inner.b) / 2.0;
    x >= outer.l && x <= outer.r && y >= outer.t && y <= outer.b
}

/// Insert each picture before the first item below it in the same column.
fn insert_pictures(items: &mut Vec<DocItem>, pictures: &[BoundingBox], page_no: usize) {
    let mut pictures = pictures.to_vec();
    pictures.sort_by(|a, b| a.t.total_cmp(&b.t));

    for pic in pictures {
        let pos = items
            .iter()
            .position(|item| item.bbox.t >= pic.t && item.bbox.l < pic.r && item.bbox.r > pic.l)
            .unwrap_or(items.len());
        items.insert(pos, DocItem::new(ItemKind::Picture, "", page_no, pic));
    }
}

// ── Furniture ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Band {
    Top,
    Bottom,
}

fn band(item: &DocItem, height: f32) -> Option<Band> {
    if height <= 0.0 || item.text.is_empty() {
        return None;
    }
    if matches!(item.kind, ItemKind::Picture | ItemKind::Table { .. }) {
        return None;
    }
    if item.bbox.b <= FURNITURE_BAND * height {
        Some(Band::Top)
    } else if item.bbox.t >= (1.0 - FURNITURE_BAND) * height {
        Some(Band::Bottom)
    } else {
        None
    }
}

/// Lowercased text with digits normalised, so "Page 3" matches "Page 4".
fn furniture_key(text: &str) -> String {
    text.split_whitespace()
        .map(|w| {
            w.chars()
                .map(|c| if c.is_ascii_digit() { '#' } else { c })
                .collect::<String>()
                .to_lowercase()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Relabel running headers, footers and page numbers.
///
/// An item in the top or bottom band is furniture when its normalised text
/// appears in the same band on at least half of the pages (and at least
/// two). Bare page numbers in either band are footers on any page.
pub fn detect_furniture(pages: &mut [PageLayout]) {
    let threshold = pages.len().div_ceil(2).max(2);

    let mut counts: HashMap<(Band, String), usize> = HashMap::new();
    for page in pages.iter() {
        let keys: HashSet<(Band, String)> = page
            .items
            .iter()
            .filter_map(|item| Some((band(item, page.height)?, furniture_key(&item.text))))
            .collect();
        for key in keys {
            *counts.entry(key).or_default() += 1;
        }
    }

    for page in pages.iter_mut() {
        let height = page.height;
        for item in &mut page.items {
            let Some(band) = band(item, height) else {
                continue;
            };
            if is_page_number(&item.text) {
                item.kind = ItemKind::PageFooter;
                continue;
            }
            let repeated = counts
                .get(&(band, furniture_key(&item.text)))
                .is_some_and(|&n| n >= threshold);
            if repeated {
                item.kind = match band {
                    Band::Top => ItemKind::PageHeader,
                    Band::Bottom => ItemKind::PageFooter,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(text: &str, l: f32, t: f32, r: f32, size: f32) -> TextCell {
        TextCell {
            text: text.to_string(),
            bbox: BoundingBox::new(l, t, r, t + size),
            font_size: size,
            bold: false,
            italic: false,
        }
    }

    fn bold(mut c: TextCell) -> TextCell {
        c.bold = true;
        c
    }

    fn page(index: usize, cells: Vec<TextCell>) -> PageContent {
        PageContent {
            index,
            width: 600.0,
            height: 800.0,
            cells,
            pictures: Vec::new(),
        }
    }

    fn kinds(items: &[DocItem]) -> Vec<ItemKind> {
        items.iter().map(|i| i.kind.clone()).collect()
    }

    #[test]
    fn near_cells_merge_far_cells_do_not() {
        let frags = fragments(&[
            cell("Hello", 50.0, 100.0, 80.0, 10.0),
            cell("world", 84.0, 100.0, 115.0, 10.0),
            cell("Right", 300.0, 100.0, 330.0, 10.0),
        ]);
        let texts: Vec<&str> = frags.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello world", "Right"]);
    }

    #[test]
    fn blank_and_rotated_cells_are_dropped() {
        let mut rotated = cell("arXiv:2206.01062v1", 10.0, 200.0, 30.0, 10.0);
        rotated.bbox.b = 500.0;
        let frags = fragments(&[cell("   ", 50.0, 100.0, 80.0, 10.0), rotated]);
        assert!(frags.is_empty());
    }

    #[test]
    fn body_size_is_character_weighted_mode() {
        let p = page(
            0,
            vec![
                cell("abcdefgh", 0.0, 0.0, 10.0, 9.5),
                cell("xy", 0.0, 20.0, 10.0, 12.0),
                cell("Big Title", 0.0, 40.0, 10.0, 20.0),
            ],
        );
        assert_eq!(body_font_size([&p]), 9.5);
        assert_eq!(body_font_size(std::iter::empty()), DEFAULT_BODY_SIZE);
    }

    #[test]
    fn paragraph_lines_join_with_dehyphenation() {
        let p = page(
            0,
            vec![
                cell("Document conver-", 50.0, 100.0, 550.0, 10.0),
                cell("sion is hard and", 50.0, 112.0, 550.0, 10.0),
                cell("slow.", 50.0, 124.0, 80.0, 10.0),
            ],
        );
        let items = layout_page(&p, 10.0);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ItemKind::Paragraph);
        assert_eq!(items[0].text, "Document conversion is hard and slow.");
        assert_eq!(items[0].page_no, 1);
    }

    #[test]
    fn classifies_title_heading_paragraph_list_and_caption() {
        let p = page(
            0,
            vec![
                cell("A Study of Layout", 150.0, 60.0, 450.0, 20.0),
                bold(cell("1 Introduction", 50.0, 120.0, 200.0, 12.0)),
                cell(
                    "We convert documents into a structured form.",
                    50.0,
                    140.0,
                    550.0,
                    10.0,
                ),
                cell("It works well.", 50.0, 152.0, 150.0, 10.0),
                cell("• First point", 50.0, 180.0, 200.0, 10.0),
                cell("• Second point", 50.0, 192.0, 210.0, 10.0),
                cell("Figure 1: A caption.", 50.0, 220.0, 300.0, 10.0),
            ],
        );
        let body = body_font_size([&p]);
        assert_eq!(body, 10.0);

        let items = layout_page(&p, body);
        assert_eq!(
            kinds(&items),
            vec![
                ItemKind::Title,
                ItemKind::SectionHeader { level: 1 },
                ItemKind::Paragraph,
                ItemKind::ListItem {
                    marker: "•".into(),
                    enumerated: false
                },
                ItemKind::ListItem {
                    marker: "•".into(),
                    enumerated: false
                },
                ItemKind::Caption,
            ]
        );
        assert_eq!(items[0].text, "A Study of Layout");
        assert_eq!(
            items[2].text,
            "We convert documents into a structured form. It works well."
        );
        assert_eq!(items[3].text, "First point");
        assert_eq!(items[5].text, "Figure 1: A caption.");
    }

    #[test]
    fn two_columns_read_left_then_right() {
        let mut cells = Vec::new();
        for (i, word) in ["one", "two", "three", "four"].iter().enumerate() {
            let t = 100.0 + 12.0 * i as f32;
            cells.push(cell(&format!("left {word}"), 50.0, t, 280.0, 10.0));
            cells.push(cell(&format!("right {word}"), 320.0, t, 550.0, 10.0));
        }
        let items = layout_page(&page(1, cells), 10.0);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text, "left one left two left three left four");
        assert_eq!(items[1].text, "right one right two right three right four");
    }

    #[test]
    fn aligned_rows_become_a_table() {
        let mut cells = Vec::new();
        for (i, row) in [["Name", "Pages", "Size"], ["alpha", "12", "3.4"], ["beta", "7", "1.1"]]
            .iter()
            .enumerate()
        {
            let t = 100.0 + 14.0 * i as f32;
            for (j, text) in row.iter().enumerate() {
                let l = 50.0 + 150.0 * j as f32;
                cells.push(cell(text, l, t, l + 50.0, 10.0));
            }
        }
        let items = layout_page(&page(1, cells), 10.0);
        assert_eq!(items.len(), 1);
        match &items[0].kind {
            ItemKind::Table { rows } => {
                assert_eq!(rows.len(), 3);
                assert_eq!(rows[0], vec!["Name", "Pages", "Size"]);
                assert_eq!(rows[2], vec!["beta", "7", "1.1"]);
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn picture_precedes_caption_and_swallows_labels() {
        let mut p = page(
            0,
            vec![
                cell("axis label", 200.0, 200.0, 260.0, 10.0),
                cell("Figure 1: Results.", 100.0, 410.0, 300.0, 10.0),
                cell("Some body text here", 100.0, 500.0, 400.0, 10.0),
            ],
        );
        p.pictures.push(BoundingBox::new(100.0, 100.0, 500.0, 400.0));
        let items = layout_page(&p, 10.0);
        assert_eq!(
            kinds(&items),
            vec![ItemKind::Picture, ItemKind::Caption, ItemKind::Paragraph]
        );
        assert!(items[0].text.is_empty());
    }

    #[test]
    fn repeated_headers_and_page_numbers_are_furniture() {
        let pages: Vec<PageContent> = (0..3)
            .map(|i| {
                page(
                    i,
                    vec![
                        cell("Journal of Tests 2024", 50.0, 20.0, 250.0, 10.0),
                        cell(
                            "Body text for this page of the document",
                            50.0,
                            300.0,
                            400.0,
                            10.0,
                        ),
                        cell(&(i + 1).to_string(), 295.0, 770.0, 305.0, 10.0),
                    ],
                )
            })
            .collect();

        let layouts = layout_document(&pages);
        assert_eq!(layouts.len(), 3);
        for (i, layout) in layouts.iter().enumerate() {
            assert_eq!(layout.page_no, i + 1);
            assert_eq!(
                kinds(&layout.items),
                vec![ItemKind::PageHeader, ItemKind::Paragraph, ItemKind::PageFooter]
            );
        }
    }

    #[test]
    fn single_page_keeps_running_head_but_marks_page_number() {
        let mut layouts = vec![PageLayout {
            page_no: 1,
            width: 600.0,
            height: 800.0,
            items: vec![
                DocItem::new(
                    ItemKind::Paragraph,
                    "Some Running Head",
                    1,
                    BoundingBox::new(50.0, 20.0, 250.0, 30.0),
                ),
                DocItem::new(
                    ItemKind::Paragraph,
                    "12",
                    1,
                    BoundingBox::new(295.0, 770.0, 305.0, 780.0),
                ),
            ],
        }];
        detect_furniture(&mut layouts);
        assert_eq!(
            kinds(&layouts[0].items),
            vec![ItemKind::Paragraph, ItemKind::PageFooter]
        );
    }

    #[test]
    fn list_markers() {
        assert_eq!(
            list_marker("1. Collect the data"),
            Some(("1.".into(), true, "Collect the data".into()))
        );
        assert_eq!(
            list_marker("(a) option"),
            Some(("(a)".into(), true, "option".into()))
        );
        assert_eq!(
            list_marker("- dash item"),
            Some(("-".into(), false, "dash item".into()))
        );
        assert_eq!(list_marker("e.g. this"), None);
        assert_eq!(list_marker("Plain text"), None);
        assert_eq!(list_marker("-"), None);
    }

    #[test]
    fn numbered_section_depths() {
        assert_eq!(section_depth("1 Introduction"), Some(1));
        assert_eq!(section_depth("4.1 Methods"), Some(2));
        assert_eq!(section_depth("2.3.1. Setup"), Some(3));
        assert_eq!(section_depth("A Appendix"), Some(1));
        assert_eq!(section_depth("Introduction"), None);
    }

    #[test]
    fn page_numbers() {
        assert!(is_page_number("12"));
        assert!(is_page_number("Page 3 of 10"));
        assert!(is_page_number("iv"));
        assert!(is_page_number("3 / 9"));
        assert!(is_page_number("xiv"));
        assert!(is_page_number("PAGE 7"));
        assert!(!is_page_number("Chapter 3"));
        for word in ["Civil", "ill", "Vicci", "XL", "civil", "iiii", "vv"] {
            assert!(!is_page_number(word), "{word} is not a page number");
        }
    }

    #[test]
    fn roman_looking_word_in_footer_band_stays_body_text() {
        let mut layouts = vec![PageLayout {
            page_no: 1,
            width: 600.0,
            height: 800.0,
            items: vec![DocItem::new(
                ItemKind::Paragraph,
                "Civil",
                1,
                BoundingBox::new(50.0, 770.0, 90.0, 780.0),
            )],
        }];
        detect_furniture(&mut layouts);
        assert_eq!(kinds(&layouts[0].items), vec![ItemKind::Paragraph]);
    }

    #[test]
    fn repeats_only_count_within_the_same_band() {
        let item = |page_no, t| {
            DocItem::new(
                ItemKind::Paragraph,
                "Results Summary",
                page_no,
                BoundingBox::new(50.0, t, 250.0, t + 10.0),
            )
        };
        let mut layouts = vec![
            PageLayout {
                page_no: 1,
                width: 600.0,
                height: 800.0,
                items: vec![item(1, 20.0)],
            },
            PageLayout {
                page_no: 2,
                width: 600.0,
                height: 800.0,
                items: vec![item(2, 770.0)],
            },
        ];
        detect_furniture(&mut layouts);
        assert_eq!(kinds(&layouts[0].items), vec![ItemKind::Paragraph]);
        assert_eq!(kinds(&layouts[1].items), vec![ItemKind::Paragraph]);
    }

    #[test]
    fn dehyphenation_rules() {
        assert_eq!(join_lines(&["conver-", "sion"]), "conversion");
        assert_eq!(join_lines(&["state-of-the-", "Art"]), "state-of-the- Art");
        assert_eq!(join_lines(&["a", "", "b"]), "a b");
    }

    #[test]
    fn furniture_keys_normalise_digits() {
        assert_eq!(furniture_key("Page  3"), furniture_key("page 4"));
        assert_ne!(furniture_key("Page 3"), furniture_key("Chapter 3"));
    }
}
