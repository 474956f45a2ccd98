//! `doc2md`: convert a document (URL or path) to Markdown.
//!
//! Resolves the source, converts it, exports Markdown (or JSON) and writes
//! the result to `output.md` unless told otherwise. Any fatal error leaves
//! the output file untouched and exits non-zero.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use doc2md::{
    write_output, ConversionProgressCallback, ConversionResult, ConversionStatus,
    ConverterConfig, DocumentConverter, DocumentMetadata, OcrMode, PageSelection, PageSeparator,
    ProgressCallback, DEFAULT_OUTPUT, DEFAULT_SOURCE,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  doc2md                                   # default paper → ./output.md
  doc2md report.pdf -o report.md
  doc2md --pages 1-5 --separator comment paper.pdf
  doc2md --stdout --metadata https://arxiv.org/pdf/1706.03762
  doc2md --json paper.pdf -o paper.json
  doc2md --inspect-only paper.pdf
  doc2md --ocr force --provider openai --model gpt-4.1-mini scan.pdf

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         pdfium shared library (file or directory)
  OPENAI_API_KEY          OpenAI key, enables OCR of scanned pages
  ANTHROPIC_API_KEY       Anthropic key
  EDGEQUAKE_LLM_PROVIDER  vision provider, read together with EDGEQUAKE_MODEL
  EDGEQUAKE_MODEL         vision model ID
  RUST_LOG                log filter, overrides -v / -q
  DOC2MD_*                every flag, e.g. DOC2MD_OUTPUT, DOC2MD_PAGES
"#;

#[derive(Parser, Debug)]
#[command(
    name = "doc2md",
    version,
    about = "Convert a PDF document (file or URL) to Markdown",
    long_about = "Convert a PDF document, local or fetched over HTTP(S), into a structured \
document and export it as Markdown. Layout comes from the PDF text layer; pages without \
one can be transcribed by a vision model.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(env = "DOC2MD_SOURCE", default_value = DEFAULT_SOURCE)]
    source: String,

    /// Output file.
    #[arg(short, long, env = "DOC2MD_OUTPUT", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Print to stdout instead of writing the output file.
    #[arg(long, env = "DOC2MD_STDOUT")]
    stdout: bool,

    /// Pages to convert: all, 5, 3-15 or 1,3,5.
    #[arg(long, env = "DOC2MD_PAGES", default_value = "all")]
    pages: PageSelection,

    /// Between pages: none, hr, comment, or any literal string.
    #[arg(long, env = "DOC2MD_SEPARATOR", default_value = "none")]
    separator: PageSeparator,

    /// Prepend YAML front matter with the document metadata.
    #[arg(long, env = "DOC2MD_METADATA")]
    metadata: bool,

    /// Write the structured document as JSON instead of Markdown.
    #[arg(long, env = "DOC2MD_JSON")]
    json: bool,

    /// Keep running page headers and footers.
    #[arg(long, env = "DOC2MD_INCLUDE_FURNITURE")]
    include_furniture: bool,

    /// Leave underscores unescaped.
    #[arg(long, env = "DOC2MD_NO_ESCAPE_UNDERSCORES")]
    no_escape_underscores: bool,

    /// When to transcribe pages with a vision model.
    #[arg(long, env = "DOC2MD_OCR", value_enum, default_value_t = Ocr::Auto)]
    ocr: Ocr,

    /// Vision provider: openai, anthropic, gemini, ollama, azure, ...
    #[arg(long, env = "DOC2MD_PROVIDER")]
    provider: Option<String>,

    /// Vision model ID (default: gpt-4.1-nano).
    #[arg(long, env = "DOC2MD_MODEL")]
    model: Option<String>,

    /// Concurrent vision-model requests.
    #[arg(long, env = "DOC2MD_OCR_CONCURRENCY", default_value_t = 4)]
    ocr_concurrency: usize,

    /// Retries per OCR page.
    #[arg(long, env = "DOC2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Output token limit per OCR page.
    #[arg(long, env = "DOC2MD_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Longest edge, in pixels, of pages rendered for OCR.
    #[arg(long, env = "DOC2MD_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// User password of an encrypted PDF.
    #[arg(long, env = "DOC2MD_PASSWORD")]
    password: Option<String>,

    /// Download timeout in seconds.
    #[arg(long, env = "DOC2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the document metadata and exit.
    #[arg(long)]
    inspect_only: bool,

    /// No progress bar.
    #[arg(long, env = "DOC2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Debug logging.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Ocr {
    Off,
    Auto,
    Force,
}

impl From<Ocr> for OcrMode {
    fn from(v: Ocr) -> Self {
        match v {
            Ocr::Off => OcrMode::Off,
            Ocr::Auto => OcrMode::Auto,
            Ocr::Force => OcrMode::Force,
        }
    }
}

impl Cli {
    fn shows_progress(&self) -> bool {
        !(self.quiet || self.no_progress || self.stdout || self.inspect_only)
    }

    /// Default log level; `RUST_LOG` takes precedence.
    fn log_level(&self) -> &'static str {
        match (self.verbose, self.quiet || self.shows_progress()) {
            (true, _) => "debug",
            (false, true) => "error",
            (false, false) => "info",
        }
    }

    fn config(&self, progress: Option<ProgressCallback>) -> Result<ConverterConfig> {
        let mut builder = ConverterConfig::builder()
            .pages(self.pages.clone())
            .page_separator(self.separator.clone())
            .include_metadata(self.metadata)
            .include_furniture(self.include_furniture)
            .escape_underscores(!self.no_escape_underscores)
            .ocr(self.ocr.into())
            .ocr_concurrency(self.ocr_concurrency)
            .ocr_max_retries(self.max_retries)
            .max_tokens(self.max_tokens)
            .max_rendered_pixels(self.max_pixels)
            .download_timeout_secs(self.download_timeout);

        if let Some(name) = &self.provider {
            builder = builder.provider_name(name.as_str());
        }
        if let Some(model) = &self.model {
            builder = builder.model(model.as_str());
        }
        if let Some(password) = &self.password {
            builder = builder.password(password.as_str());
        }
        if let Some(cb) = progress {
            builder = builder.progress_callback(cb);
        }

        builder.build().context("Invalid configuration")
    }
}

// ── Terminal styling ─────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Tone {
    Ok,
    Warn,
    Fail,
    Faint,
    Strong,
}

fn paint(tone: Tone, text: impl std::fmt::Display) -> String {
    if !io::stderr().is_terminal() {
        return text.to_string();
    }
    let code = match tone {
        Tone::Ok => "32",
        Tone::Warn => "33",
        Tone::Fail => "31",
        Tone::Faint => "2",
        Tone::Strong => "1",
    };
    format!("\x1b[{code}m{text}\x1b[0m")
}

// ── Progress ─────────────────────────────────────────────────────────────

/// One bar for the whole run plus a line per finished page. OCR pages finish
/// out of order, so start times are keyed by page number.
struct PageProgress {
    bar: ProgressBar,
    started: Mutex<HashMap<usize, Instant>>,
}

impl PageProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("Opening document");
        bar.enable_steady_tick(Duration::from_millis(100));
        Arc::new(Self {
            bar,
            started: Mutex::new(HashMap::new()),
        })
    }

    fn took(&self, page: usize) -> String {
        let secs = self
            .started
            .lock()
            .ok()
            .and_then(|mut started| started.remove(&page))
            .map_or(0.0, |t| t.elapsed().as_secs_f64());
        paint(Tone::Faint, format!("{secs:.2}s"))
    }
}

impl ConversionProgressCallback for PageProgress {
    fn on_conversion_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {bar:40.green/238} {pos}/{len} pages  {elapsed}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸ "),
        );
        self.bar.set_message("");
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut started) = self.started.lock() {
            started.insert(page_num, Instant::now());
        }
    }

    fn on_page_complete(&self, page_num: usize, _total_pages: usize, items: usize) {
        let took = self.took(page_num);
        self.bar.println(format!(
            "  {} page {page_num:<4} {items:>4} items  {took}",
            paint(Tone::Ok, "✓")
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, _total_pages: usize, error: &str) {
        let took = self.took(page_num);
        let first_line = error.lines().next().unwrap_or_default();
        self.bar.println(format!(
            "  {} page {page_num:<4} {}  {took}",
            paint(Tone::Fail, "✗"),
            paint(Tone::Fail, first_line)
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, _total_pages: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

// ── Output ───────────────────────────────────────────────────────────────

fn print_metadata(source: &str, meta: &DocumentMetadata) {
    let fields = [
        ("Source", Some(source.to_string())),
        ("Title", meta.title.clone()),
        ("Author", meta.author.clone()),
        ("Subject", meta.subject.clone()),
        ("Pages", Some(meta.page_count.to_string())),
        ("PDF version", Some(meta.pdf_version.clone())),
        ("Creator", meta.creator.clone()),
        ("Producer", meta.producer.clone()),
        ("Created", meta.creation_date.clone()),
        ("Modified", meta.modification_date.clone()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("{:<13}{value}", format!("{label}:"));
        }
    }
}

fn print_summary(result: &ConversionResult, target: &str) {
    let mark = match result.status {
        ConversionStatus::Success => paint(Tone::Ok, "✔"),
        ConversionStatus::PartialSuccess => paint(Tone::Warn, "⚠"),
    };
    eprintln!(
        "{mark} {}/{} pages, {} items in {}ms → {}",
        result.converted_pages(),
        result.input.selected_pages,
        result.document.items.len(),
        result.timings.total_ms,
        paint(Tone::Strong, target),
    );
    for error in &result.errors {
        eprintln!("  {} {error}", paint(Tone::Warn, "·"));
    }
    if result.ocr.pages > 0 {
        let usage = format!(
            "OCR: {} pages, {} input / {} output tokens",
            result.ocr.pages, result.ocr.input_tokens, result.ocr.output_tokens
        );
        eprintln!("  {}", paint(Tone::Faint, usage));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_writer(io::stderr)
        .init();

    let progress = cli
        .shows_progress()
        .then(|| PageProgress::new() as ProgressCallback);
    let converter = DocumentConverter::with_config(cli.config(progress)?);

    if cli.inspect_only {
        let meta = converter
            .inspect(&cli.source)
            .await
            .with_context(|| format!("Failed to inspect '{}'", cli.source))?;
        if cli.json {
            let json =
                serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?;
            println!("{json}");
        } else {
            print_metadata(&cli.source, &meta);
        }
        return Ok(());
    }

    let result = converter
        .convert(&cli.source)
        .await
        .with_context(|| format!("Conversion of '{}' failed", cli.source))?;

    let content = if cli.json {
        result
            .document
            .export_to_json()
            .context("Failed to serialise document")?
    } else {
        result.markdown()
    };

    let target = if cli.stdout {
        let mut out = io::stdout().lock();
        out.write_all(content.as_bytes())
            .and_then(|()| out.flush())
            .context("Failed to write to stdout")?;
        "stdout".to_string()
    } else {
        write_output(&cli.output, &content)
            .await
            .with_context(|| format!("Failed to write {}", cli.output.display()))?;
        cli.output.display().to_string()
    };

    if !cli.quiet {
        print_summary(&result, &target);
    }
    Ok(())
}
