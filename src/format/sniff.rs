//! Content sniffing from leading bytes.
//!
//! Only the first few kilobytes of a file are inspected. Plain text has no
//! signature and is never recognized here.

use memchr::{memchr, memmem};

use super::FormatType;

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";
const PDB_TYPE_OFFSET: usize = 60;
const MARKUP_WINDOW: usize = 1024;

/// Detect a format from the leading bytes of a file.
///
/// Returns [`FormatType::Unknown`] when no signature matches.
pub fn sniff(head: &[u8]) -> FormatType {
    if head.len() < 4 {
        return FormatType::Unknown;
    }
    if is_epub(head) {
        return FormatType::Epub;
    }
    if is_palm_database(head) {
        return FormatType::Mobi;
    }
    if is_fictionbook(head) {
        return FormatType::Fb2;
    }
    if is_html(head) {
        return FormatType::Html;
    }
    FormatType::Unknown
}

/// EPUB: a ZIP whose first stored entry is `mimetype` = `application/epub+zip`.
fn is_epub(head: &[u8]) -> bool {
    if !head.starts_with(ZIP_LOCAL_HEADER) || head.len() < 30 {
        return false;
    }
    let name_len = u16::from_le_bytes([head[26], head[27]]) as usize;
    let extra_len = u16::from_le_bytes([head[28], head[29]]) as usize;
    let name_end = 30 + name_len;
    let data_start = name_end + extra_len;
    head.get(30..name_end) == Some(b"mimetype".as_slice())
        && head
            .get(data_start..)
            .is_some_and(|data| data.starts_with(EPUB_MIMETYPE))
}

/// MOBI / PalmDOC: PalmDB type+creator at offset 60.
fn is_palm_database(head: &[u8]) -> bool {
    matches!(
        head.get(PDB_TYPE_OFFSET..PDB_TYPE_OFFSET + 8),
        Some(b"BOOKMOBI") | Some(b"TEXtREAd")
    )
}

fn is_fictionbook(head: &[u8]) -> bool {
    let prolog = Prolog::scan(markup_window(head));
    prolog.root.is_some_and(|name| local_part(name) == b"FictionBook")
}

/// HTML: a `html` doctype or an `<html>` root, after any XML declaration
/// and comments. Tags further into the file do not count.
fn is_html(head: &[u8]) -> bool {
    let prolog = Prolog::scan(markup_window(head));
    prolog.html_doctype || prolog.root.is_some_and(|name| name.eq_ignore_ascii_case(b"html"))
}

/// What precedes the first element of a markup document.
#[derive(Debug, Default)]
struct Prolog<'a> {
    html_doctype: bool,
    root: Option<&'a [u8]>,
}

impl<'a> Prolog<'a> {
    fn scan(window: &'a [u8]) -> Self {
        let mut prolog = Prolog::default();
        let mut rest = window;
        loop {
            rest = trim_start(rest);
            if rest.starts_with(b"<?") {
                let Some(end) = memmem::find(rest, b"?>") else {
                    return prolog;
                };
                rest = &rest[end + 2..];
            } else if rest.starts_with(b"<!--") {
                let Some(end) = memmem::find(&rest[4..], b"-->") else {
                    return prolog;
                };
                rest = &rest[4 + end + 3..];
            } else if rest.len() >= 9 && rest[..9].eq_ignore_ascii_case(b"<!doctype") {
                let Some(end) = memchr(b'>', rest) else {
                    return prolog;
                };
                let name = trim_start(&rest[9..end]);
                prolog.html_doctype = name.len() >= 4 && name[..4].eq_ignore_ascii_case(b"html");
                rest = &rest[end + 1..];
            } else if rest.first() == Some(&b'<') {
                let name = &rest[1..];
                let len = name
                    .iter()
                    .position(|&b| b.is_ascii_whitespace() || b == b'>' || b == b'/')
                    .unwrap_or(name.len());
                if len > 0 {
                    prolog.root = Some(&name[..len]);
                }
                return prolog;
            } else {
                return prolog;
            }
        }
    }
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn local_part(name: &[u8]) -> &[u8] {
    match memchr(b':', name) {
        Some(colon) => &name[colon + 1..],
        None => name,
    }
}

/// Leading markup bytes with any UTF-8 BOM and whitespace removed.
fn markup_window(head: &[u8]) -> &[u8] {
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    let end = (start + MARKUP_WINDOW).min(head.len());
    &head[start..end]
}
