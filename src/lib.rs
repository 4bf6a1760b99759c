//! # quire
//!
//! Pluggable ebook ingestion: recognize a file's format, read its
//! bibliographic metadata cheaply, and parse the full document into a
//! format-independent model.
//!
//! ## Features
//!
//! - FB2, EPUB 2/3, MOBI/PalmDOC, HTML and plain text readers
//! - Format detection by declaration, extension and content sniffing
//! - Metadata reads that never touch the book on failure
//! - A [`BookModel`] of sections, paragraphs and styled runs with resolved
//!   internal links, a table of contents and embedded images
//! - Best-effort parsing: malformed fragments are skipped and reported as
//!   diagnostics
//!
//! ## Quick Start
//!
//! ```no_run
//! use quire::{Book, Dispatcher};
//!
//! let dispatcher = Dispatcher::with_defaults();
//!
//! let mut book = Book::new("input.epub");
//! dispatcher.load_metadata(&mut book)?;
//! println!("{} ({})", book.metadata().title, book.metadata().authors.join(", "));
//!
//! let model = dispatcher.load_model(&book)?;
//! for entry in model.toc() {
//!     println!("{} -> paragraph {}", entry.title, entry.position.paragraph);
//! }
//! # Ok::<(), quire::Error>(())
//! ```
//!
//! ## Custom Plugins
//!
//! Plugins implement [`FormatPlugin`] and are registered once at startup:
//!
//! ```
//! use std::sync::Arc;
//! use quire::{Dispatcher, PluginRegistry, TxtPlugin};
//!
//! let registry = PluginRegistry::builder()
//!     .register(TxtPlugin)
//!     .build()
//!     .unwrap();
//! let dispatcher = Dispatcher::new(Arc::new(registry));
//! assert!(dispatcher.plugins().supports(quire::FormatType::PlainText));
//! ```

pub mod book;
pub mod config;
pub mod container;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod format;
pub mod formats;
pub mod io;
pub mod markup;
pub mod model;
pub mod plugin;
pub(crate) mod util;

pub use book::{Book, Metadata, Series};
pub use config::ReaderConfig;
pub use dispatch::Dispatcher;
pub use error::{Error, ErrorKind, Result};
pub use format::{FormatRegistry, FormatType};
pub use formats::{EpubPlugin, Fb2Plugin, HtmlPlugin, MobiPlugin, TxtPlugin};
pub use io::{ByteSource, FileSource, MemorySource};
pub use model::{
    BookModel, Control, LinkTarget, ModelBuilder, Paragraph, ParagraphKind, Position, Resource,
    Run, Section, TextStyle, TocEntry,
};
pub use plugin::{FormatPlugin, PluginRegistry, ReadContext};
