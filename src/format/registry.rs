use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use super::{FormatType, sniff};

/// Default number of leading bytes inspected when sniffing.
pub const DEFAULT_SNIFF_LEN: usize = 4096;

/// Maps a file reference to a [`FormatType`].
///
/// Lookup order: declared format, then file extension, then content
/// sniffing. Classification never fails; it yields [`FormatType::Unknown`]
/// when no rule matches and callers must check for it.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    sniff_len: usize,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self {
            sniff_len: DEFAULT_SNIFF_LEN,
        }
    }

    pub fn with_sniff_len(mut self, len: usize) -> Self {
        self.sniff_len = len.max(64);
        self
    }

    pub fn sniff_len(&self) -> usize {
        self.sniff_len
    }

    /// Classify from already-available information.
    ///
    /// `head` holds the leading bytes of the file, when the caller has them.
    pub fn classify(
        &self,
        path: &Path,
        declared: Option<FormatType>,
        head: Option<&[u8]>,
    ) -> FormatType {
        if let Some(format) = declared.filter(|f| f.is_known()) {
            return format;
        }
        let by_extension = Self::by_extension(path);
        if by_extension.is_known() {
            return by_extension;
        }
        head.map(sniff).unwrap_or(FormatType::Unknown)
    }

    /// Classify a file on disk, reading at most `sniff_len` bytes when the
    /// declared format and the extension are inconclusive.
    pub fn classify_file(&self, path: &Path, declared: Option<FormatType>) -> FormatType {
        let format = self.classify(path, declared, None);
        if format.is_known() {
            debug!(path = %path.display(), %format, "classified without sniffing");
            return format;
        }
        match self.read_head(path) {
            Ok(head) => {
                let format = sniff(&head);
                debug!(path = %path.display(), %format, "classified by content");
                format
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "could not sniff file");
                FormatType::Unknown
            }
        }
    }

    /// Classify by file name alone. Compound names like `book.fb2.xml` are
    /// recognized.
    pub fn by_extension(path: &Path) -> FormatType {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_ascii_lowercase()) else {
            return FormatType::Unknown;
        };
        if name.ends_with(".fb2.xml") {
            return FormatType::Fb2;
        }
        path.extension()
            .map(|ext| FormatType::from_extension(&ext.to_string_lossy()))
            .unwrap_or(FormatType::Unknown)
    }

    fn read_head(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        let file = File::open(path)?;
        let mut head = Vec::with_capacity(self.sniff_len);
        file.take(self.sniff_len as u64).read_to_end(&mut head)?;
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_wins_over_extension() {
        let registry = FormatRegistry::new();
        let format = registry.classify(Path::new("book.epub"), Some(FormatType::Fb2), None);
        assert_eq!(format, FormatType::Fb2);
    }

    #[test]
    fn test_declared_unknown_is_ignored() {
        let registry = FormatRegistry::new();
        let format = registry.classify(Path::new("book.epub"), Some(FormatType::Unknown), None);
        assert_eq!(format, FormatType::Epub);
    }

    #[test]
    fn test_extension_wins_over_sniffing() {
        let registry = FormatRegistry::new();
        let format = registry.classify(
            Path::new("notes.txt"),
            None,
            Some(b"<html><body></body></html>"),
        );
        assert_eq!(format, FormatType::PlainText);
    }

    #[test]
    fn test_sniffing_is_last_resort() {
        let registry = FormatRegistry::new();
        let format = registry.classify(Path::new("download.bin"), None, Some(b"<!DOCTYPE html>"));
        assert_eq!(format, FormatType::Html);
    }

    #[test]
    fn test_compound_fb2_extension() {
        assert_eq!(
            FormatRegistry::by_extension(Path::new("Tolstoy.War.FB2.XML")),
            FormatType::Fb2
        );
        assert_eq!(FormatRegistry::by_extension(Path::new("data.xml")), FormatType::Unknown);
        assert_eq!(FormatRegistry::by_extension(Path::new("README")), FormatType::Unknown);
    }

    #[test]
    fn test_missing_file_is_unknown() {
        let registry = FormatRegistry::new();
        let format = registry.classify_file(Path::new("/nonexistent/quire/book.bin"), None);
        assert_eq!(format, FormatType::Unknown);
    }
}
