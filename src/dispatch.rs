//! Routing of load requests to format plugins.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::book::Book;
use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::format::{FormatRegistry, FormatType};
use crate::model::BookModel;
use crate::plugin::{FormatPlugin, PluginRegistry};

/// Classifies books and hands them to the matching plugin.
///
/// The dispatcher never branches on the concrete format: every plugin is
/// driven through the same [`FormatPlugin`] calls.
///
/// ```no_run
/// use quire::{Book, Dispatcher};
///
/// let dispatcher = Dispatcher::with_defaults();
/// let mut book = Book::new("war-and-peace.fb2");
/// dispatcher.load_metadata(&mut book)?;
/// println!("{} by {:?}", book.metadata().title, book.metadata().authors);
///
/// let model = dispatcher.load_model(&book)?;
/// println!("{} paragraphs", model.paragraph_count());
/// # Ok::<(), quire::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Dispatcher {
    formats: FormatRegistry,
    plugins: Arc<PluginRegistry>,
    config: ReaderConfig,
}

impl Dispatcher {
    pub fn new(plugins: Arc<PluginRegistry>) -> Self {
        Self::with_config(plugins, ReaderConfig::default())
    }

    pub fn with_config(plugins: Arc<PluginRegistry>, config: ReaderConfig) -> Self {
        Self {
            formats: FormatRegistry::new().with_sniff_len(config.sniff_len),
            plugins,
            config,
        }
    }

    /// Dispatcher over the built-in plugins with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(PluginRegistry::with_defaults()))
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// The book's format: the recorded one, or a fresh classification.
    pub fn classify(&self, book: &Book) -> FormatType {
        book.format().unwrap_or_else(|| {
            self.formats
                .classify_file(book.path(), book.declared_format())
        })
    }

    /// The plugin for `format`, or `UnsupportedFormat`.
    pub fn plugin_for(&self, format: FormatType) -> Result<&Arc<dyn FormatPlugin>> {
        if !format.is_known() {
            return Err(Error::unsupported("file format not recognized"));
        }
        self.plugins
            .get(format)
            .ok_or_else(|| Error::unsupported(format!("no plugin registered for {format}")))
    }

    /// Classify the book if needed and read its metadata.
    ///
    /// The detected format is recorded on the book even if the metadata
    /// read itself fails.
    pub fn load_metadata(&self, book: &mut Book) -> Result<()> {
        let format = self.classify(book);
        let plugin = self.plugin_for(format)?;
        if !book.set_format(format) {
            debug!(
                path = %book.path().display(),
                recorded = ?book.format(),
                detected = %format,
                "format already recorded, keeping it"
            );
        }
        debug!(path = %book.path().display(), %format, "loading metadata");
        plugin.read_meta_info(book, &self.config)
    }

    /// Parse the whole book into a fresh model.
    pub fn load_model(&self, book: &Book) -> Result<BookModel> {
        let format = self.classify(book);
        let plugin = self.plugin_for(format)?;
        debug!(path = %book.path().display(), %format, "loading model");
        let mut model = BookModel::bound_to(book, format);
        plugin.read_model(&mut model, &self.config)?;
        Ok(model)
    }

    /// Read metadata for many books in parallel; one result per book, in
    /// input order.
    pub fn load_metadata_all(&self, books: &mut [Book]) -> Vec<Result<()>> {
        books
            .par_iter_mut()
            .map(|book| self.load_metadata(book))
            .collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let mut file = NamedTempFile::with_suffix(".xyz").unwrap();
        file.write_all(b"\x00\x01\x02 nothing to see").unwrap();
        let mut book = Book::new(file.path());
        let err = Dispatcher::with_defaults()
            .load_metadata(&mut book)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert!(book.format().is_none());
    }

    #[test]
    fn test_missing_plugin_is_unsupported() {
        let registry = PluginRegistry::builder().build().unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry));
        let book = Book::with_format("a.txt", FormatType::PlainText);
        assert!(dispatcher.load_model(&book).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_format_recorded_on_load() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        file.write_all(b"Some text").unwrap();
        let mut book = Book::new(file.path());
        Dispatcher::with_defaults().load_metadata(&mut book).unwrap();
        assert_eq!(book.format(), Some(FormatType::PlainText));
    }

    #[test]
    fn test_recorded_format_is_kept() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        file.write_all(b"<FictionBook><description><title-info><book-title>Kept</book-title></title-info></description></FictionBook>")
            .unwrap();
        let mut book = Book::new(file.path());
        assert!(book.set_format(FormatType::Fb2));
        assert!(!book.set_format(FormatType::PlainText));

        Dispatcher::with_defaults().load_metadata(&mut book).unwrap();
        assert_eq!(book.format(), Some(FormatType::Fb2));
        assert_eq!(book.metadata().title, "Kept");
    }

    #[test]
    fn test_sniff_len_follows_config() {
        let config = ReaderConfig::default().with_sniff_len(128);
        let dispatcher = Dispatcher::with_config(Arc::new(PluginRegistry::default()), config);
        assert_eq!(dispatcher.formats.sniff_len(), 128);
    }
}
