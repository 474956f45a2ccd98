//! Post-processing: deterministic cleanup of Markdown text.
//!
//! Two entry points share the same small rules:
//!
//! - [`clean_markdown`] finishes exported Markdown (line endings, trailing
//!   whitespace, blank-line runs, invisible characters, final newline).
//! - [`clean_vlm_reply`] additionally repairs the quirks vision models
//!   introduce when transcribing a scanned page (outer fences, missing or
//!   repeated table separators, placeholder image links) before the reply is
//!   parsed back into document items.
//!
//! Rules run in a fixed order: fences are stripped before line endings are
//! normalised, and tables are repaired before blank lines are collapsed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Finish exported Markdown.
///
/// Line endings become LF, invisible characters (zero-width spaces, BOM,
/// soft hyphens) go, lines lose trailing whitespace, blank-line runs shrink
/// to one, and the text ends with exactly one newline.
pub fn clean_markdown(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 1);
    let mut blank_run = 0usize;

    for line in normalise_line_endings(input).split('\n') {
        let line: String = line.chars().filter(|c| !INVISIBLE.contains(c)).collect();
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = 0;
    }

    out.push('\n');
    out
}

/// Clean a raw VLM transcription before it is parsed into items.
pub fn clean_vlm_reply(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = repair_tables(&normalise_line_endings(&s));
    clean_markdown(&remove_placeholder_images(&s))
}

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}',
];

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Outer fences ─────────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").expect("valid regex"));

fn strip_markdown_fences(input: &str) -> String {
    RE_OUTER_FENCES
        .captures(input.trim())
        .map_or_else(|| input.to_string(), |caps| caps[1].to_string())
}

// ── Tables ───────────────────────────────────────────────────────────────────

pub(crate) fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

pub(crate) fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Give every pipe table exactly one separator, directly under its header.
///
/// Models sometimes omit the separator or repeat it between body rows.
fn repair_tables(input: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    // Position of the current line within its table, 0 outside tables.
    let mut row = 0usize;

    for line in input.lines() {
        if !is_table_row(line) {
            row = 0;
            out.push(line.to_string());
            continue;
        }
        row += 1;
        let separator = is_separator_row(line);
        match (row, separator) {
            (2, false) => {
                let header = out.last().map(String::as_str).unwrap_or("");
                let cols = header.trim().matches('|').count().saturating_sub(1).max(1);
                out.push(format!("|{}", " --- |".repeat(cols)));
                out.push(line.to_string());
                row = 3;
            }
            (2, true) => out.push(line.to_string()),
            (_, true) => row -= 1,
            _ => out.push(line.to_string()),
        }
    }

    out.join("\n")
}

// ── Images ───────────────────────────────────────────────────────────────────

static RE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").expect("valid regex"));

fn is_placeholder_url(url: &str) -> bool {
    let u = url.trim();
    if !u.starts_with("http://") && !u.starts_with("https://") {
        return true;
    }
    [
        "example.com",
        "placeholder.com",
        "dummyimage.com",
        "placehold.it",
        "picsum.photos",
    ]
    .iter()
    .any(|d| u.contains(d))
}

/// Replace invented image links with their alt text in italics.
fn remove_placeholder_images(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            if !is_placeholder_url(&caps[2]) {
                caps[0].to_string()
            } else if alt.is_empty() {
                String::new()
            } else {
                format!("*{alt}*")
            }
        })
        .to_string()
}
