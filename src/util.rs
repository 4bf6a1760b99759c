//! Small helpers shared by the XML-based plugins.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::escape::unescape;
use quick_xml::events::BytesStart;

// ============================================================================
// XML helpers
// ============================================================================

/// Strip a namespace prefix: `dc:title` -> `title`, `l:href` -> `href`.
pub fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Value of the first attribute whose local name is `name`, unescaped.
///
/// Matching ignores prefixes, so `href` finds `l:href` and `xlink:href`.
pub fn attr(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .with_checks(false)
        .flatten()
        .find(|a| local_name(a.key.as_ref()).eq_ignore_ascii_case(name))
        .map(|a| unescape_lossy(&a.value))
}

/// Decode raw attribute or text bytes, resolving entities where possible.
pub fn unescape_lossy(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    match unescape(&text) {
        Ok(unescaped) => unescaped.into_owned(),
        Err(_) => text.into_owned(),
    }
}

/// Resolve an entity reference body (`amp`, `#x41`, `nbsp`) to text.
///
/// Besides the five XML entities this knows the HTML entities that
/// commonly appear in ebooks.
pub fn resolve_entity(entity: &str) -> Option<String> {
    let named = match entity {
        "apos" => "'",
        "quot" => "\"",
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "nbsp" => "\u{a0}",
        "shy" => "\u{ad}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "hellip" => "\u{2026}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "bdquo" => "\u{201e}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "deg" => "\u{b0}",
        "middot" => "\u{b7}",
        "bull" => "\u{2022}",
        "times" => "\u{d7}",
        _ => "",
    };
    if !named.is_empty() {
        return Some(named.to_string());
    }

    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32).map(|c| c.to_string())
}

pub fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

// ============================================================================
// Media detection
// ============================================================================

/// Detect the MIME type of image data from its magic bytes.
pub fn detect_image_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if data.starts_with(b"GIF8") {
        Some("image/gif")
    } else if data.starts_with(b"BM") && data.len() > 14 {
        Some("image/bmp")
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// MIME type from a file name extension.
pub fn media_type_from_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    Some(match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => return None,
    })
}

/// Decode a `data:` URI, returning its media type and payload.
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.trim().strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mut parts = header.split(';');
    let media_type = parts
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("text/plain")
        .to_string();
    let data = if parts.any(|p| p.eq_ignore_ascii_case("base64")) {
        decode_base64(payload)?
    } else {
        crate::model::percent_decode(payload).into_bytes()
    };
    Some((media_type, data))
}

/// Decode base64 that may be wrapped across lines (FB2 `<binary>`).
pub fn decode_base64(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact.as_bytes()).ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"dc:title"), b"title");
        assert_eq!(local_name(b"title"), b"title");
    }

    #[test]
    fn test_attr_ignores_prefix() {
        let element = BytesStart::from_content(r##"image l:href="#cover.jpg""##, 5);
        assert_eq!(attr(&element, b"href").as_deref(), Some("#cover.jpg"));
        let element = BytesStart::from_content(r#"a title="Tom &amp; Jerry""#, 1);
        assert_eq!(attr(&element, b"title").as_deref(), Some("Tom & Jerry"));
        assert_eq!(attr(&element, b"href"), None);
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp").as_deref(), Some("&"));
        assert_eq!(resolve_entity("#x41").as_deref(), Some("A"));
        assert_eq!(resolve_entity("#8212").as_deref(), Some("\u{2014}"));
        assert_eq!(resolve_entity("nbsp").as_deref(), Some("\u{a0}"));
        assert_eq!(resolve_entity("bogus"), None);
        assert_eq!(resolve_entity("#xD800"), None);
    }

    #[test]
    fn test_detect_image_type() {
        assert_eq!(detect_image_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(detect_image_type(b"\x89PNG\r\n"), Some("image/png"));
        assert_eq!(detect_image_type(b"GIF89a"), Some("image/gif"));
        assert_eq!(detect_image_type(b"text"), None);
    }

    #[test]
    fn test_decode_data_uri() {
        let (media_type, data) = decode_data_uri("data:image/png;base64,iVBO\nRw==").unwrap();
        assert_eq!(media_type, "image/png");
        assert_eq!(data, vec![0x89, 0x50, 0x4E, 0x47]);
        let (media_type, data) = decode_data_uri("data:,a%20b").unwrap();
        assert_eq!(media_type, "text/plain");
        assert_eq!(data, b"a b");
        assert!(decode_data_uri("http://x").is_none());
    }
}
