//! Source resolution: turn a source locator into a local PDF file.
//!
//! pdfium opens documents from a file-system path, so URL sources are
//! downloaded into a [`TempDir`] owned by the returned [`ResolvedSource`];
//! the directory is removed when the value is dropped, on every exit path.
//! Both branches check the `%PDF` magic before returning so callers get a
//! meaningful error instead of an engine failure.

use crate::error::ConvertError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A parsed source locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    Url(String),
    Path(PathBuf),
}

impl SourceLocator {
    /// Classify a locator string. `file://` prefixes are accepted for paths.
    pub fn parse(input: &str) -> Result<Self, ConvertError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ConvertError::InvalidInput {
                input: input.to_string(),
            });
        }
        if is_url(trimmed) {
            return Ok(SourceLocator::Url(trimmed.to_string()));
        }
        let path = trimmed.strip_prefix("file://").unwrap_or(trimmed);
        Ok(SourceLocator::Path(PathBuf::from(path)))
    }
}

/// The resolved source, either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedSource {
    Local(PathBuf),
    /// The `TempDir` keeps the download alive until conversion completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedSource {
    /// Path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedSource::Local(p) => p,
            ResolvedSource::Downloaded { path, .. } => path,
        }
    }

    /// File name of the resolved PDF.
    pub fn filename(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string())
    }

    /// Document name: the file stem.
    pub fn stem(&self) -> String {
        self.path()
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    /// Size of the resolved file in bytes (0 if it cannot be read).
    pub fn byte_len(&self) -> u64 {
        std::fs::metadata(self.path()).map(|m| m.len()).unwrap_or(0)
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the source locator to a local PDF file.
pub async fn resolve_source(input: &str, timeout_secs: u64) -> Result<ResolvedSource, ConvertError> {
    match SourceLocator::parse(input)? {
        SourceLocator::Url(url) => download_url(&url, timeout_secs).await,
        SourceLocator::Path(path) => resolve_local(path),
    }
}

fn resolve_local(path: PathBuf) -> Result<ResolvedSource, ConvertError> {
    if !path.exists() {
        return Err(ConvertError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            let read = f.read(&mut magic).unwrap_or(0);
            if read < 4 || &magic != PDF_MAGIC {
                return Err(ConvertError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConvertError::PermissionDenied { path });
        }
        Err(_) => return Err(ConvertError::FileNotFound { path }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedSource::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedSource, ConvertError> {
    info!("Downloading {}", url);

    let failed = |reason: String| ConvertError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ConvertError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ConvertError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    let filename = filename_from_url(url);
    if bytes.len() < 4 || &bytes[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(ConvertError::NotAPdf {
            path: PathBuf::from(filename),
            magic,
        });
    }

    let temp_dir = TempDir::new().map_err(|e| ConvertError::Internal(format!("tempdir: {e}")))?;
    let file_path = temp_dir.path().join(&filename);
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ConvertError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded {} bytes to {}", bytes.len(), file_path.display());

    Ok(ResolvedSource::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// File name for a downloaded source: the last URL path segment, with a
/// `.pdf` extension added when missing (arXiv style `/pdf/2206.01062`).
pub fn filename_from_url(url: &str) -> String {
    let last = reqwest::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|s| !s.is_empty())
    });

    match last {
        Some(name) if name.to_ascii_lowercase().ends_with(".pdf") => name,
        Some(name) => format!("{name}.pdf"),
        None => "downloaded.pdf".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn parse_locators() {
        assert_eq!(
            SourceLocator::parse(" https://arxiv.org/pdf/2206.01062 ").expect("url"),
            SourceLocator::Url("https://arxiv.org/pdf/2206.01062".into())
        );
        assert_eq!(
            SourceLocator::parse("file:///tmp/a.pdf").expect("path"),
            SourceLocator::Path(PathBuf::from("/tmp/a.pdf"))
        );
        assert!(matches!(
            SourceLocator::parse("   "),
            Err(ConvertError::InvalidInput { .. })
        ));
    }

    #[test]
    fn filenames_from_urls() {
        assert_eq!(filename_from_url("https://arxiv.org/pdf/2206.01062"), "2206.01062.pdf");
        assert_eq!(filename_from_url("https://x.org/files/paper.PDF"), "paper.PDF");
        assert_eq!(filename_from_url("https://x.org/"), "downloaded.pdf");
    }

    #[test]
    fn local_missing_file() {
        let err = resolve_local(PathBuf::from("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, ConvertError::FileNotFound { .. }));
    }

    #[test]
    fn local_non_pdf_rejected() {
        let mut f = tempfile::NamedTempFile::new().expect("tmp");
        f.write_all(b"hello world").expect("write");
        let err = resolve_local(f.path().to_path_buf()).unwrap_err();
        match err {
            ConvertError::NotAPdf { magic, .. } => assert_eq!(&magic, b"hell"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn local_pdf_accepted() {
        let dir = tempfile::tempdir().expect("tmp");
        let path = dir.path().join("paper.pdf");
        std::fs::write(&path, b"%PDF-1.7\n%%EOF\n").expect("write");
        let resolved = resolve_local(path).expect("resolved");
        assert_eq!(resolved.filename(), "paper.pdf");
        assert_eq!(resolved.stem(), "paper");
        assert_eq!(resolved.byte_len(), 15);
    }

    #[tokio::test]
    async fn unreachable_url_is_download_failure() {
        // Port 9 (discard) on loopback is closed on any sane test host.
        let err = resolve_source("http://127.0.0.1:9/missing.pdf", 5)
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                ConvertError::DownloadFailed { .. } | ConvertError::DownloadTimeout { .. }
            ),
            "got {err:?}"
        );
    }
}
