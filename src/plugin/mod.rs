//! The format plugin contract.
//!
//! A plugin is a stateless strategy bound to one [`FormatType`]. It knows
//! how to pull [`Metadata`] out of a file cheaply and how to stream the full
//! document into a [`ModelBuilder`]. The provided methods
//! [`FormatPlugin::read_meta_info`] and [`FormatPlugin::read_model`] wrap
//! those two hooks with file handling and commit-on-success semantics, so
//! individual plugins only deal with bytes.

mod registry;

pub use registry::{PluginRegistry, PluginRegistryBuilder};

use std::path::Path;

use tracing::{debug, warn};

use crate::book::{Book, Metadata};
use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::format::FormatType;
use crate::io::ByteSource;
use crate::model::{BookModel, ModelBuilder};

/// Per-call information handed to plugin hooks.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
    /// Path of the file being read; relative resources resolve against it.
    pub path: &'a Path,
    /// User-chosen encoding that overrides detection.
    pub encoding: Option<&'a str>,
    pub config: &'a ReaderConfig,
}

impl<'a> ReadContext<'a> {
    pub fn new(path: &'a Path, config: &'a ReaderConfig) -> Self {
        Self {
            path,
            encoding: None,
            config,
        }
    }

    pub fn with_encoding(mut self, encoding: Option<&'a str>) -> Self {
        self.encoding = encoding;
        self
    }
}

/// A reader for one document format.
pub trait FormatPlugin: Send + Sync {
    /// The format this plugin reads. Never fails.
    fn support_type(&self) -> FormatType;

    /// Extract bibliographic metadata without building the full model.
    fn read_metadata(&self, source: &dyn ByteSource, ctx: &ReadContext<'_>) -> Result<Metadata>;

    /// Stream the whole document into `builder`.
    ///
    /// Malformed fragments should be skipped with
    /// [`ModelBuilder::diagnostic`]; an error means nothing usable could be
    /// read.
    fn build_model(
        &self,
        source: &dyn ByteSource,
        ctx: &ReadContext<'_>,
        builder: &mut ModelBuilder,
    ) -> Result<()>;

    /// Read metadata from the book's file and store it on the book.
    ///
    /// The book is updated only when the read succeeds. A missing title
    /// falls back to the file name.
    fn read_meta_info(&self, book: &mut Book, config: &ReaderConfig) -> Result<()> {
        let source = book.open_source()?;
        let ctx = ReadContext::new(book.path(), config).with_encoding(book.encoding());
        let mut metadata = self.read_metadata(&source, &ctx)?;
        drop(source);

        metadata.normalize();
        if metadata.title.is_empty() {
            metadata.title = book.file_stem();
        }
        if metadata.title.is_empty() {
            return Err(Error::malformed("book has no title"));
        }
        debug!(
            path = %book.path().display(),
            format = %self.support_type(),
            title = %metadata.title,
            "metadata read"
        );
        book.commit_metadata(metadata);
        Ok(())
    }

    /// Parse the full document into `model`.
    ///
    /// The model is populated only when parsing and validation succeed;
    /// on error it is left empty.
    fn read_model(&self, model: &mut BookModel, config: &ReaderConfig) -> Result<()> {
        let source = crate::io::FileSource::open(model.path())?;
        let ctx = ReadContext::new(model.path(), config).with_encoding(model.encoding());
        let mut builder = ModelBuilder::new(config);
        self.build_model(&source, &ctx, &mut builder)?;
        drop(source);

        let built = builder.finish()?;
        if !built.diagnostics.is_empty() {
            warn!(
                path = %model.path().display(),
                skipped = built.diagnostics.len(),
                "model read with recovered errors"
            );
        }
        model.install(built);
        Ok(())
    }
}
