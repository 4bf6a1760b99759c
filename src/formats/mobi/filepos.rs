//! Filepos links in MOBI markup.
//!
//! MOBI links address byte offsets in the decompressed text stream
//! (`<a filepos=0000123>`) and images by record index (`<img recindex="00001">`).
//! Before parsing, an `<a id="filepos123"></a>` anchor is inserted at every
//! referenced offset and both attributes are rewritten into ordinary
//! `href="#filepos123"` and `src="image_00001"` attributes.

use std::collections::BTreeSet;

use memchr::memmem;

/// Anchor id for a text offset.
pub fn anchor_id(offset: usize) -> String {
    format!("filepos{offset}")
}

/// Resource id of the `n`th image record (1-based).
pub fn image_id(n: usize) -> String {
    format!("image_{n:05}")
}

/// Offsets referenced by `filepos=` attributes.
pub fn collect_targets(html: &[u8]) -> BTreeSet<usize> {
    let lower = html.to_ascii_lowercase();
    memmem::find_iter(&lower, b"filepos=")
        .filter(|&at| is_attribute_start(&lower, at))
        .filter_map(|at| parse_number(&lower, at + b"filepos=".len()))
        .map(|(value, _)| value)
        .collect()
}

/// Insert an anchor at each target offset.
///
/// Offsets inside a tag move to the start of that tag. In UTF-8 text an
/// offset inside a multibyte character moves to the character start.
/// Offsets at or past the end of the text get no anchor.
pub fn insert_anchors(html: &[u8], targets: &BTreeSet<usize>, utf8: bool) -> Vec<u8> {
    let mut output = Vec::with_capacity(html.len() + targets.len() * 24);
    let mut last = 0;
    for &target in targets.range(..html.len()) {
        let mut at = target;
        let tag_open = memchr::memrchr(b'<', &html[..at]);
        let tag_close = memchr::memrchr(b'>', &html[..at]);
        if let Some(open) = tag_open
            && tag_close.is_none_or(|close| close < open)
        {
            at = open;
        }
        if utf8 {
            while at > 0 && html[at] & 0xC0 == 0x80 {
                at -= 1;
            }
        }
        // Targets are sorted, but tag adjustment can move one behind `last`.
        let at = at.max(last);
        output.extend_from_slice(&html[last..at]);
        output.extend_from_slice(format!("<a id=\"{}\"></a>", anchor_id(target)).as_bytes());
        last = at;
    }
    output.extend_from_slice(&html[last..]);
    output
}

/// Rewrite `filepos=` and `recindex=` attributes into `href` and `src`.
pub fn rewrite_attributes(html: &[u8]) -> Vec<u8> {
    let lower = html.to_ascii_lowercase();
    let mut output = Vec::with_capacity(html.len() + html.len() / 16);
    let mut last = 0;
    let mut pos = 0;

    while let Some(found) = memchr::memchr2(b'f', b'r', &lower[pos..]) {
        let at = pos + found;
        pos = at + 1;
        if !is_attribute_start(&lower, at) {
            continue;
        }
        let rest = &lower[at..];
        let replacement = if rest.starts_with(b"filepos=") {
            parse_number(&lower, at + b"filepos=".len())
                .map(|(value, end)| (format!("href=\"#{}\"", anchor_id(value)), end))
        } else if rest.starts_with(b"recindex=") {
            parse_number(&lower, at + b"recindex=".len())
                .map(|(value, end)| (format!("src=\"{}\"", image_id(value)), end))
        } else {
            None
        };
        if let Some((attribute, end)) = replacement {
            output.extend_from_slice(&html[last..at]);
            output.extend_from_slice(attribute.as_bytes());
            last = end;
            pos = end;
        }
    }
    output.extend_from_slice(&html[last..]);
    output
}

fn is_attribute_start(html: &[u8], at: usize) -> bool {
    at > 0 && html[at - 1].is_ascii_whitespace()
}

/// Parse an optionally quoted decimal number; returns the value and the
/// offset just past it (and its closing quote).
fn parse_number(html: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut pos = start;
    let quote = html.get(pos).copied().filter(|b| *b == b'"' || *b == b'\'');
    if quote.is_some() {
        pos += 1;
    }
    let digits_start = pos;
    while html.get(pos).is_some_and(u8::is_ascii_digit) {
        pos += 1;
    }
    if pos == digits_start {
        return None;
    }
    let value = std::str::from_utf8(&html[digits_start..pos])
        .ok()?
        .parse()
        .ok()?;
    if let Some(quote) = quote
        && html.get(pos) == Some(&quote)
    {
        pos += 1;
    }
    Some((value, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_targets() {
        let html = b"<a filepos=0000012>x</a><A FILEPOS=\"7\">y</A><p data-filepos=3>";
        let targets: Vec<_> = collect_targets(html).into_iter().collect();
        assert_eq!(targets, vec![7, 12]);
    }

    #[test]
    fn test_insert_anchors() {
        let html = b"<p>abc</p><p>def</p>";
        let targets = BTreeSet::from([5, 12, 20, 99]);
        let out = String::from_utf8(insert_anchors(html, &targets, true)).unwrap();
        // 12 falls inside `<p>`, 20 is the end of the text
        assert_eq!(
            out,
            "<p>ab<a id=\"filepos5\"></a>c</p><a id=\"filepos12\"></a><p>def</p>"
        );
    }

    #[test]
    fn test_insert_anchor_in_multibyte_char() {
        let html = "<p>ёж</p>".as_bytes();
        let targets = BTreeSet::from([4]);
        let out = String::from_utf8(insert_anchors(html, &targets, true)).unwrap();
        assert_eq!(out, "<p><a id=\"filepos4\"></a>ёж</p>");
    }

    #[test]
    fn test_rewrite_attributes() {
        let html = b"<a filepos=00042 >go</a><img recindex=\"3\" /><p>free text</p>";
        let out = String::from_utf8(rewrite_attributes(html)).unwrap();
        assert_eq!(
            out,
            "<a href=\"#filepos42\" >go</a><img src=\"image_00003\" /><p>free text</p>"
        );
    }
}
