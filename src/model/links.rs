//! Link representation shared by every format.
//!
//! Formats address link targets differently:
//! - **FB2 / HTML**: fragment ids (`#note-1`)
//! - **EPUB**: archive paths with fragments (`text/ch2.xhtml#sec-5`)
//! - **MOBI**: byte offsets (`filepos=0001234`), turned into anchors before parsing
//!
//! Plugins normalize all of these to anchor keys ([`LinkRef::Anchor`]); the
//! model builder resolves keys to [`Position`]s once the document is read.

use percent_encoding::percent_decode_str;

use super::Position;

/// The resolved target of a link run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
#[cfg_attr(feature = "cli", serde(rename_all = "snake_case"))]
pub enum LinkTarget {
    /// A location inside the same book.
    Internal(Position),
    /// External URL (http://, https://, mailto:, ...).
    External(String),
}

impl LinkTarget {
    pub fn is_internal(&self) -> bool {
        matches!(self, LinkTarget::Internal(_))
    }

    pub fn as_external(&self) -> Option<&str> {
        match self {
            LinkTarget::External(url) => Some(url),
            LinkTarget::Internal(_) => None,
        }
    }
}

/// An unresolved link, as found in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRef {
    /// Internal link by anchor key, resolved when the model is finished.
    Anchor(String),
    /// External URL, kept verbatim.
    External(String),
}

impl LinkRef {
    /// Parse a raw href from a single-document format.
    ///
    /// This handles:
    /// - External URLs (http://, https://, mailto:, tel:)
    /// - Fragment ids (`#footnote-1`, percent-decoded)
    /// - Anything else is used as an anchor key verbatim
    pub fn parse(href: &str) -> LinkRef {
        let href = href.trim();
        if is_external_href(href) {
            return LinkRef::External(href.to_string());
        }
        match href.strip_prefix('#') {
            Some(fragment) => LinkRef::Anchor(percent_decode(fragment)),
            None => LinkRef::Anchor(percent_decode(href)),
        }
    }

    /// Parse an href from a standalone document: only `#fragment` links
    /// stay inside the book, any other target is kept as an external link.
    pub fn parse_local(href: &str) -> LinkRef {
        let href = href.trim();
        match href.strip_prefix('#') {
            Some(fragment) if !is_external_href(href) => LinkRef::Anchor(percent_decode(fragment)),
            _ => LinkRef::External(href.to_string()),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, LinkRef::External(_))
    }
}

/// Whether an href leaves the book.
pub fn is_external_href(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    ["http://", "https://", "mailto:", "tel:", "ftp://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Split `path#fragment` into its parts. The fragment excludes the `#`.
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    }
}

pub fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Resolve a relative href against the archive path of the document that
/// contains it.
///
/// Archive paths always use `/`. A fragment-only href resolves to the base
/// document itself; `..` never climbs above the archive root.
pub fn resolve_relative_path(base: &str, relative: &str) -> String {
    if relative.contains("://") {
        return relative.to_string();
    }

    if relative.starts_with('#') {
        return format!("{base}{relative}");
    }

    let (relative, fragment) = split_fragment(relative);
    let relative = percent_decode(relative);

    let mut parts: Vec<&str> = Vec::new();
    if !relative.starts_with('/') {
        if let Some((dir, _)) = base.rsplit_once('/') {
            parts.extend(dir.split('/'));
        }
    }
    for component in relative.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    parts.retain(|p| !p.is_empty() && *p != ".");

    let mut resolved = parts.join("/");
    if let Some(fragment) = fragment {
        resolved.push('#');
        resolved.push_str(fragment);
    }
    resolved
}
