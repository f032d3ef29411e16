//! Source loading
//!
//! Stems and analysis inputs are addressed by a locator string: a local path,
//! a `file://` URL or an `http(s)://` URL. A `SourceLoader` turns a locator
//! into the encoded bytes; `load_audio` decodes them.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use log::debug;

use crate::engine::buffer::AudioBuffer;
use crate::engine::io::decode_audio;
use crate::error::{Result, StemError};

/// Default timeout for remote fetches
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

/// Fetches encoded audio by locator
pub trait SourceLoader {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>>;
}

impl<T: SourceLoader + ?Sized> SourceLoader for Box<T> {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        (**self).fetch(locator)
    }
}

impl<T: SourceLoader + ?Sized> SourceLoader for &T {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        (**self).fetch(locator)
    }
}

/// Fetch and decode a locator in one step
pub fn load_audio(loader: &dyn SourceLoader, locator: &str) -> Result<AudioBuffer> {
    let bytes = loader.fetch(locator)?;
    debug!("Fetched {} bytes from {}", bytes.len(), locator);
    decode_audio(bytes, extension_hint(locator).as_deref())
}

/// File extension of a locator, ignoring any query string or fragment
///
/// ```
/// use stemmix::engine::loader::extension_hint;
/// assert_eq!(extension_hint("https://cdn/x/Vocals.MP3?sig=1").as_deref(), Some("mp3"));
/// assert_eq!(extension_hint("stems/bass"), None);
/// ```
pub fn extension_hint(locator: &str) -> Option<String> {
    let path = locator.split(['?', '#']).next().unwrap_or(locator);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether a locator points at a remote http(s) resource
pub fn is_remote(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

// ============================================================================
// File loader
// ============================================================================

/// Reads local paths and `file://` URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    fn resolve(locator: &str) -> Result<PathBuf> {
        if is_remote(locator) {
            return Err(StemError::UnsupportedLocator {
                locator: locator.to_string(),
            });
        }
        Ok(PathBuf::from(
            locator.strip_prefix("file://").unwrap_or(locator),
        ))
    }
}

impl SourceLoader for FileLoader {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        let path = Self::resolve(locator)?;
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StemError::SourceNotFound {
                locator: locator.to_string(),
                source: Some(e),
            },
            _ => StemError::Io(e),
        })
    }
}

// ============================================================================
// In-memory loader
// ============================================================================

/// Serves bytes registered up front
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: HashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes under a locator, replacing any previous entry
    pub fn insert(&mut self, locator: impl Into<String>, bytes: Vec<u8>) {
        self.sources.insert(locator.into(), bytes);
    }

    /// Builder form of `insert`
    pub fn with_source(mut self, locator: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(locator, bytes);
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        self.sources
            .get(locator)
            .cloned()
            .ok_or_else(|| StemError::SourceNotFound {
                locator: locator.to_string(),
                source: None,
            })
    }
}

// ============================================================================
// HTTP loader
// ============================================================================

/// Fetches `http(s)://` URLs with a blocking client
#[derive(Debug, Clone)]
pub struct HttpLoader {
    timeout_ms: u64,
}

impl HttpLoader {
    /// Timeout comes from `STEMMIX_HTTP_TIMEOUT_MS` when set
    pub fn new() -> Self {
        let timeout_ms = env::var("STEMMIX_HTTP_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS);
        Self { timeout_ms }
    }

    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

impl Default for HttpLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "http")]
impl SourceLoader for HttpLoader {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        let failed = |reason: String| StemError::FetchFailed {
            locator: locator.to_string(),
            reason,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| failed(e.to_string()))?;

        let response = client.get(locator).send().map_err(|e| {
            if e.is_timeout() {
                failed(format!("timed out after {}ms", self.timeout_ms))
            } else {
                failed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(failed(format!("server returned {}", response.status())));
        }

        let bytes = response.bytes().map_err(|e| failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(not(feature = "http"))]
impl SourceLoader for HttpLoader {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        Err(StemError::FetchFailed {
            locator: locator.to_string(),
            reason: "HTTP support not compiled. Build with --features http".to_string(),
        })
    }
}

// ============================================================================
// Scheme dispatch
// ============================================================================

/// Routes remote locators to `HttpLoader` and everything else to `FileLoader`
#[derive(Debug, Clone, Default)]
pub struct DefaultLoader {
    file: FileLoader,
    http: HttpLoader,
}

impl DefaultLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SourceLoader for DefaultLoader {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        if is_remote(locator) {
            self.http.fetch(locator)
        } else {
            self.file.fetch(locator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::{encode_wav, generate_test_tone};
    use tempfile::tempdir;
    use test_case::test_case;

    #[test_case("drums.wav", Some("wav") ; "plain path")]
    #[test_case("file:///tmp/Bass.FLAC", Some("flac") ; "file url upper case")]
    #[test_case("https://cdn.example.com/a/vox.mp3?token=abc#t=1", Some("mp3") ; "query and fragment")]
    #[test_case("https://cdn.example.com/stems/vox", None ; "no extension")]
    #[test_case(".hidden", None ; "dotfile")]
    fn test_extension_hint(locator: &str, expected: Option<&str>) {
        assert_eq!(extension_hint(locator).as_deref(), expected);
    }

    #[test]
    fn test_file_loader_reads_path_and_file_url() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, [1u8, 2, 3]).unwrap();

        let by_path = FileLoader.fetch(path.to_str().unwrap()).unwrap();
        let by_url = FileLoader
            .fetch(&format!("file://{}", path.display()))
            .unwrap();
        assert_eq!(by_path, vec![1, 2, 3]);
        assert_eq!(by_url, by_path);
    }

    #[test]
    fn test_file_loader_missing_file() {
        let err = FileLoader.fetch("/definitely/not/here.wav").unwrap_err();
        assert_eq!(err.error_code(), "SOURCE_NOT_FOUND");
    }

    #[test]
    fn test_file_loader_rejects_http() {
        let err = FileLoader.fetch("http://example.com/a.wav").unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_LOCATOR");
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with_source("mem://a", vec![9, 9]);
        assert_eq!(loader.fetch("mem://a").unwrap(), vec![9, 9]);
        assert!(loader.fetch("mem://b").is_err());
    }

    #[test]
    fn test_load_audio_decodes() {
        let tone = generate_test_tone(220.0, 0.5, 0.2, 8000);
        let loader = MemoryLoader::new().with_source("tone.wav", encode_wav(&tone).unwrap());

        let decoded = load_audio(&loader, "tone.wav").unwrap();
        assert_eq!(decoded.len(), tone.len());
        assert_eq!(decoded.sample_rate, 8000);
    }

    #[test]
    fn test_default_loader_routes_local_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.bin");
        fs::write(&path, [7u8]).unwrap();
        assert_eq!(DefaultLoader::new().fetch(path.to_str().unwrap()).unwrap(), vec![7]);
    }
}
