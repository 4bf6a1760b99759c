//! Supported document formats and the rules used to recognize them.

mod registry;
mod sniff;

pub use registry::{DEFAULT_SNIFF_LEN, FormatRegistry};
pub use sniff::sniff;

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Closed set of document formats, plus the `Unknown` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
#[cfg_attr(feature = "cli", serde(rename_all = "snake_case"))]
pub enum FormatType {
    /// FictionBook 2 XML (.fb2)
    Fb2,
    /// EPUB 2/3 ZIP container (.epub)
    Epub,
    /// Mobipocket / PalmDOC database (.mobi, .prc, .pdb)
    Mobi,
    /// Standalone HTML or XHTML document
    Html,
    /// Plain text
    PlainText,
    /// No rule matched.
    Unknown,
}

impl FormatType {
    /// Every recognizable format, excluding `Unknown`.
    pub const SUPPORTED: [FormatType; 5] = [
        FormatType::Fb2,
        FormatType::Epub,
        FormatType::Mobi,
        FormatType::Html,
        FormatType::PlainText,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FormatType::Fb2 => "FB2",
            FormatType::Epub => "EPUB",
            FormatType::Mobi => "MOBI",
            FormatType::Html => "HTML",
            FormatType::PlainText => "Plain text",
            FormatType::Unknown => "Unknown",
        }
    }

    /// File extensions (lowercase, without dot). The first one is canonical.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FormatType::Fb2 => &["fb2"],
            FormatType::Epub => &["epub"],
            FormatType::Mobi => &["mobi", "prc", "pdb", "azw"],
            FormatType::Html => &["html", "htm", "xhtml"],
            FormatType::PlainText => &["txt", "text"],
            FormatType::Unknown => &[],
        }
    }

    pub fn canonical_extension(self) -> Option<&'static str> {
        self.extensions().first().copied()
    }

    /// MIME types declared for this format. The first one is canonical.
    pub fn mime_types(self) -> &'static [&'static str] {
        match self {
            FormatType::Fb2 => &["application/x-fictionbook+xml", "text/fb2+xml"],
            FormatType::Epub => &["application/epub+zip"],
            FormatType::Mobi => &["application/x-mobipocket-ebook"],
            FormatType::Html => &["text/html", "application/xhtml+xml"],
            FormatType::PlainText => &["text/plain"],
            FormatType::Unknown => &[],
        }
    }

    /// Look up a format by file extension (case-insensitive, leading dot allowed).
    pub fn from_extension(ext: &str) -> FormatType {
        let ext = ext.trim_start_matches('.');
        Self::SUPPORTED
            .into_iter()
            .find(|format| {
                format
                    .extensions()
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(FormatType::Unknown)
    }

    /// Look up a format by MIME type, ignoring parameters such as `charset`.
    pub fn from_mime(mime: &str) -> FormatType {
        let essence = mime.split(';').next().unwrap_or("").trim();
        Self::SUPPORTED
            .into_iter()
            .find(|format| {
                format
                    .mime_types()
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(essence))
            })
            .unwrap_or(FormatType::Unknown)
    }

    pub fn is_known(self) -> bool {
        self != FormatType::Unknown
    }
}

impl fmt::Display for FormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FormatType {
    type Err = Error;

    /// Accepts an extension (`fb2`), a MIME type or a display name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let by_ext = FormatType::from_extension(s);
        if by_ext.is_known() {
            return Ok(by_ext);
        }
        let by_mime = FormatType::from_mime(s);
        if by_mime.is_known() {
            return Ok(by_mime);
        }
        FormatType::SUPPORTED
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::unsupported(format!("unknown format name `{s}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(FormatType::from_extension("FB2"), FormatType::Fb2);
        assert_eq!(FormatType::from_extension(".epub"), FormatType::Epub);
        assert_eq!(FormatType::from_extension("prc"), FormatType::Mobi);
        assert_eq!(FormatType::from_extension("htm"), FormatType::Html);
        assert_eq!(FormatType::from_extension("txt"), FormatType::PlainText);
        assert_eq!(FormatType::from_extension("docx"), FormatType::Unknown);
    }

    #[test]
    fn test_from_mime_ignores_parameters() {
        assert_eq!(
            FormatType::from_mime("text/plain; charset=utf-8"),
            FormatType::PlainText
        );
        assert_eq!(FormatType::from_mime("application/epub+zip"), FormatType::Epub);
        assert_eq!(FormatType::from_mime("image/png"), FormatType::Unknown);
    }

    #[test]
    fn test_canonical_extension_round_trips() {
        for format in FormatType::SUPPORTED {
            let ext = format.canonical_extension().unwrap();
            assert_eq!(FormatType::from_extension(ext), format);
        }
        assert_eq!(FormatType::Unknown.canonical_extension(), None);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("epub".parse::<FormatType>().unwrap(), FormatType::Epub);
        assert_eq!("Plain text".parse::<FormatType>().unwrap(), FormatType::PlainText);
        assert_eq!(
            "application/x-fictionbook+xml".parse::<FormatType>().unwrap(),
            FormatType::Fb2
        );
        assert!("pdf".parse::<FormatType>().is_err());
    }
}
