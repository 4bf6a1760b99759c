//! Reader configuration shared by the dispatcher and every plugin call.

use encoding_rs::Encoding;

use crate::format::DEFAULT_SNIFF_LEN;

/// Tunables for classification and parsing.
///
/// ```
/// use quire::ReaderConfig;
///
/// let config = ReaderConfig::default()
///     .with_fallback_encoding("windows-1251")
///     .with_max_resource_bytes(8 * 1024 * 1024);
/// assert_eq!(config.fallback_encoding().name(), "windows-1251");
/// ```
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Leading bytes inspected when sniffing an unknown file.
    pub sniff_len: usize,
    /// Encoding label used when text is neither valid UTF-8 nor declares
    /// its own encoding.
    pub fallback_encoding: String,
    /// Embedded resources larger than this are skipped.
    pub max_resource_bytes: usize,
    /// Parsing stops (keeping what was read) after this many paragraphs.
    pub max_paragraphs: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            sniff_len: DEFAULT_SNIFF_LEN,
            fallback_encoding: "windows-1252".to_string(),
            max_resource_bytes: 32 * 1024 * 1024,
            max_paragraphs: 2_000_000,
        }
    }
}

impl ReaderConfig {
    pub fn with_sniff_len(mut self, len: usize) -> Self {
        self.sniff_len = len;
        self
    }

    pub fn with_fallback_encoding(mut self, label: impl Into<String>) -> Self {
        self.fallback_encoding = label.into();
        self
    }

    pub fn with_max_resource_bytes(mut self, max: usize) -> Self {
        self.max_resource_bytes = max;
        self
    }

    pub fn with_max_paragraphs(mut self, max: usize) -> Self {
        self.max_paragraphs = max.max(1);
        self
    }

    /// The fallback encoding; unknown labels resolve to Windows-1252.
    pub fn fallback_encoding(&self) -> &'static Encoding {
        Encoding::for_label(self.fallback_encoding.trim().as_bytes())
            .unwrap_or(encoding_rs::WINDOWS_1252)
    }
}
