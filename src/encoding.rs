//! Encoding detection and transcoding to UTF-8.
//!
//! Text-based plugins hand raw bytes to [`decode_text`] (or
//! [`decode_text_as`] when the user forced an encoding) and work on the
//! returned `str` from then on.

use std::borrow::Cow;

use encoding_rs::Encoding;
use memchr::memmem;

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. Honors a byte order mark (UTF-8, UTF-16LE/BE)
/// 2. Tries strict UTF-8; an incomplete sequence at the very end (a
///    truncated file) is dropped rather than failing the whole decode
/// 3. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`,
///    `<meta charset>` or document metadata)
/// 4. Falls back to `fallback`
pub fn decode_text_with<'a>(
    bytes: &'a [u8],
    hint_encoding: Option<&str>,
    fallback: &'static Encoding,
) -> Cow<'a, str> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (result, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return result;
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => return Cow::Borrowed(text),
        Err(err) if err.error_len().is_none() && err.valid_up_to() + 4 > bytes.len() => {
            let valid = &bytes[..err.valid_up_to()];
            return Cow::Borrowed(std::str::from_utf8(valid).unwrap_or_default());
        }
        Err(_) => {}
    }

    let encoding = hint_encoding
        .and_then(|name| Encoding::for_label(name.trim().as_bytes()))
        .unwrap_or(fallback);
    let (result, _) = encoding.decode_without_bom_handling(bytes);
    result
}

/// [`decode_text_with`] with Windows-1252 as the fallback, the most common
/// legacy encoding in old ebooks.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    decode_text_with(bytes, hint_encoding, encoding_rs::WINDOWS_1252)
}

/// Decode with an explicitly chosen encoding label, ignoring detection.
///
/// Unknown labels fall back to [`decode_text`].
pub fn decode_text_as<'a>(bytes: &'a [u8], label: &str) -> Cow<'a, str> {
    match Encoding::for_label(label.trim().as_bytes()) {
        Some(encoding) => {
            let (result, _) = encoding.decode_with_bom_removal(bytes);
            result
        }
        None => decode_text(bytes, None),
    }
}

/// Guess which encoding [`decode_text_with`] would use for these bytes.
pub fn detect_encoding(
    bytes: &[u8],
    hint_encoding: Option<&str>,
    fallback: &'static Encoding,
) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    match std::str::from_utf8(bytes) {
        Ok(_) => return encoding_rs::UTF_8,
        // Only the tail is cut: a truncated sample of UTF-8 text.
        Err(err) if err.error_len().is_none() => return encoding_rs::UTF_8,
        Err(_) => {}
    }
    hint_encoding
        .and_then(|name| Encoding::for_label(name.trim().as_bytes()))
        .unwrap_or(fallback)
}

/// Resolve an encoding label, e.g. `"cp1251"` or `"utf-8"`.
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Extract the `encoding` pseudo-attribute of an XML declaration.
pub fn xml_declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(256)];
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    if !head.starts_with(b"<?xml") {
        return None;
    }
    let decl_end = memmem::find(head, b"?>")?;
    let decl = &head[..decl_end];
    let at = memmem::find(decl, b"encoding")?;
    quoted_value(&decl[at + b"encoding".len()..])
}

/// Extract a `charset=` declaration from the head of an HTML document.
pub fn html_declared_charset(bytes: &[u8]) -> Option<String> {
    let head = bytes[..bytes.len().min(2048)].to_ascii_lowercase();
    let at = memmem::find(&head, b"charset")?;
    let rest = &head[at + b"charset".len()..];
    let rest = rest.strip_prefix(b"=").or_else(|| {
        let trimmed = trim_ascii_start(rest);
        trimmed.strip_prefix(b"=")
    })?;
    let rest = trim_ascii_start(rest);
    if rest.first().is_some_and(|b| *b == b'"' || *b == b'\'') {
        return quoted_value(rest);
    }
    let end = rest
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_'))
        .unwrap_or(rest.len());
    (end > 0).then(|| String::from_utf8_lossy(&rest[..end]).into_owned())
}

/// Read `= "value"` / `'value'` after an attribute name.
fn quoted_value(rest: &[u8]) -> Option<String> {
    let rest = trim_ascii_start(rest);
    let rest = trim_ascii_start(rest.strip_prefix(b"=").unwrap_or(rest));
    let quote = *rest.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let body = &rest[1..];
    let end = memchr::memchr(quote, body)?;
    let value = String::from_utf8_lossy(&body[..end]).trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_borrowed() {
        let text = decode_text("Привет".as_bytes(), None);
        assert!(matches!(text, Cow::Borrowed(_)));
        assert_eq!(text, "Привет");
    }

    #[test]
    fn test_decode_strips_bom() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFHello", None), "Hello");
        assert_eq!(decode_text(b"\xFF\xFEH\x00i\x00", None), "Hi");
    }

    #[test]
    fn test_truncated_utf8_keeps_valid_prefix() {
        let bytes = "abc д".as_bytes();
        let truncated = &bytes[..bytes.len() - 1];
        assert_eq!(decode_text(truncated, None), "abc ");
    }

    #[test]
    fn test_hint_encoding_used_for_invalid_utf8() {
        // "Мир" in windows-1251
        let bytes = [0xCC, 0xE8, 0xF0];
        assert_eq!(decode_text(&bytes, Some("windows-1251")), "Мир");
    }

    #[test]
    fn test_fallback_is_windows_1252() {
        assert_eq!(decode_text(&[0x93, b'q', 0x94], None), "\u{201C}q\u{201D}");
    }

    #[test]
    fn test_decode_text_as_overrides_detection() {
        let bytes = [0xCC, 0xE8, 0xF0];
        assert_eq!(decode_text_as(&bytes, "cp1251"), "Мир");
    }

    #[test]
    fn test_detect_encoding() {
        assert_eq!(
            detect_encoding(b"plain", None, encoding_rs::WINDOWS_1252),
            encoding_rs::UTF_8
        );
        assert_eq!(
            detect_encoding(&[0xCC, 0xE8], Some("koi8-r"), encoding_rs::WINDOWS_1252),
            encoding_rs::KOI8_R
        );
    }

    #[test]
    fn test_xml_declared_encoding() {
        let doc = b"<?xml version=\"1.0\" encoding=\"windows-1251\"?><FictionBook/>";
        assert_eq!(xml_declared_encoding(doc).as_deref(), Some("windows-1251"));
        assert_eq!(xml_declared_encoding(b"<?xml version='1.0'?><a/>"), None);
        assert_eq!(xml_declared_encoding(b"<a/>"), None);
    }

    #[test]
    fn test_html_declared_charset() {
        let doc = b"<html><head><meta charset=\"KOI8-R\"></head>";
        assert_eq!(html_declared_charset(doc).as_deref(), Some("koi8-r"));
        let doc = b"<meta http-equiv=\"Content-Type\" content=\"text/html; charset=windows-1251\">";
        assert_eq!(html_declared_charset(doc).as_deref(), Some("windows-1251"));
        assert_eq!(html_declared_charset(b"<html></html>"), None);
    }
}
