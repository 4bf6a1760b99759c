//! The [`Book`] handle and its bibliographic [`Metadata`].

use std::path::{Path, PathBuf};

use crate::format::FormatType;
use crate::io::FileSource;

/// Handle to a single document registered with the library.
///
/// A book knows where its file lives and, once classified, which format it
/// is in. Its metadata is written by metadata reads and by explicit user
/// edits through [`Book::metadata_mut`].
#[derive(Debug, Clone)]
pub struct Book {
    path: PathBuf,
    declared: Option<FormatType>,
    format: Option<FormatType>,
    encoding: Option<String>,
    metadata: Metadata,
    metadata_loaded: bool,
}

/// Bibliographic metadata of a book.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Metadata {
    pub title: String,
    /// Authors in file order.
    pub authors: Vec<String>,
    /// Language tag, e.g. `en` or `ru-RU`.
    pub language: Option<String>,
    pub series: Option<Series>,
    /// Id of the cover image in the book's resource collection.
    pub cover: Option<String>,
    /// Genres, subjects or keywords.
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub identifier: Option<String>,
    /// Text encoding detected while reading, for text-based formats.
    pub encoding: Option<String>,
}

/// A series the book belongs to.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Series {
    pub name: String,
    pub index: Option<f32>,
}

impl Book {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            declared: None,
            format: None,
            encoding: None,
            metadata: Metadata::default(),
            metadata_loaded: false,
        }
    }

    /// A book whose format the caller already knows; skips sniffing.
    pub fn with_format(path: impl Into<PathBuf>, format: FormatType) -> Self {
        let mut book = Self::new(path);
        book.declared = Some(format).filter(|f| f.is_known());
        book
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn declared_format(&self) -> Option<FormatType> {
        self.declared
    }

    /// The detected format, once classification has happened.
    pub fn format(&self) -> Option<FormatType> {
        self.format
    }

    /// Record the detected format.
    ///
    /// The format is set at most once; returns `false` if a different
    /// format was already recorded (the old value is kept).
    pub fn set_format(&mut self, format: FormatType) -> bool {
        if !format.is_known() {
            return false;
        }
        match self.format {
            Some(existing) => existing == format,
            None => {
                self.format = Some(format);
                true
            }
        }
    }

    /// User-chosen encoding that overrides detection for text formats.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn set_encoding(&mut self, encoding: Option<String>) {
        self.encoding = encoding.filter(|e| !e.trim().is_empty());
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Explicit user edits.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Whether a metadata read has succeeded at least once.
    pub fn has_metadata(&self) -> bool {
        self.metadata_loaded
    }

    /// File name without extensions, used as a fallback title.
    pub fn file_stem(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let lower = name.to_ascii_lowercase();
        let stem_len = if lower.ends_with(".fb2.xml") {
            name.len() - ".fb2.xml".len()
        } else {
            name.rfind('.').filter(|&i| i > 0).unwrap_or(name.len())
        };
        name[..stem_len].replace('_', " ").trim().to_string()
    }

    /// Open the book's file for one read. The handle closes on drop.
    pub(crate) fn open_source(&self) -> std::io::Result<FileSource> {
        FileSource::open(&self.path)
    }

    /// Replace the metadata with a successfully read value.
    pub(crate) fn commit_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
        self.metadata_loaded = true;
    }
}

impl Metadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_series(mut self, name: impl Into<String>, index: Option<f32>) -> Self {
        self.series = Some(Series {
            name: name.into(),
            index,
        });
        self
    }

    pub fn with_cover(mut self, resource_id: impl Into<String>) -> Self {
        self.cover = Some(resource_id.into());
        self
    }

    /// Trim fields and drop empty values so plugins can push raw text.
    pub fn normalize(&mut self) {
        self.title = collapse_whitespace(&self.title);
        self.authors = self
            .authors
            .iter()
            .map(|a| collapse_whitespace(a))
            .filter(|a| !a.is_empty())
            .collect();
        self.tags = self
            .tags
            .iter()
            .map(|t| collapse_whitespace(t))
            .filter(|t| !t.is_empty())
            .collect();
        for field in [
            &mut self.language,
            &mut self.cover,
            &mut self.description,
            &mut self.identifier,
            &mut self.encoding,
        ] {
            *field = field
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }
        if let Some(series) = &mut self.series {
            series.name = collapse_whitespace(&series.name);
        }
        if self.series.as_ref().is_some_and(|s| s.name.is_empty()) {
            self.series = None;
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
