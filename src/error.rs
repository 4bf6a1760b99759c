//! Error types for quire operations.
//!
//! Every failure surfaced to the application falls into one of four kinds
//! (see [`ErrorKind`]). Collaborator errors (I/O, XML, ZIP) are translated at
//! the boundary so callers never branch on parser internals.

use std::io;

use thiserror::Error;

use crate::format::FormatType;

/// Errors that can occur while classifying or reading a book.
#[derive(Error, Debug)]
pub enum Error {
    /// The underlying file could not be opened or read.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// No plugin is registered for the book's format.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A plugin ran but could not produce usable output.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Two plugins were registered for the same format.
    #[error("A plugin for {0} is already registered")]
    DuplicatePlugin(FormatType),

    /// A plugin registration was rejected at startup.
    #[error("Invalid plugin registration: {0}")]
    InvalidRegistration(String),
}

/// Coarse classification of an [`Error`], used for user-facing messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedFormat,
    MalformedInput,
    IoFailure,
    Configuration,
}

impl Error {
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedInput(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedFormat(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::IoFailure,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::MalformedInput(_) => ErrorKind::MalformedInput,
            Error::DuplicatePlugin(_) | Error::InvalidRegistration(_) => ErrorKind::Configuration,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::MalformedInput(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedFormat(_))
    }

    /// Only I/O failures are worth retrying (e.g. after a remount).
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::IoFailure
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            // Short reads and undecodable bytes mean the content is bad, not the file system.
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                Error::MalformedInput(err.to_string())
            }
            _ => Error::Io(err),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Io(io_err) => Error::Io(io::Error::new(io_err.kind(), io_err.to_string())),
            other => Error::MalformedInput(format!("XML: {other}")),
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io_err) => Error::from(io_err),
            other => Error::MalformedInput(format!("ZIP: {other}")),
        }
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::MalformedInput(format!("UTF-8 decoding error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
