//! Format recognition against files on disk.

mod common;

use std::path::Path;

use common::{epub, fb2, mobi, pdb, write_file};
use proptest::prelude::*;
use quire::format::sniff;
use quire::{Book, Dispatcher, FormatRegistry, FormatType};
use tempfile::TempDir;

#[test]
fn test_canonical_extensions_round_trip() {
    let registry = FormatRegistry::new();
    for format in FormatType::SUPPORTED {
        let ext = format.canonical_extension().unwrap();
        let path = format!("book.{ext}");
        assert_eq!(registry.classify(Path::new(&path), None, None), format, "{path}");
        let upper = path.to_ascii_uppercase();
        assert_eq!(registry.classify(Path::new(&upper), None, None), format, "{upper}");
    }
}

#[test]
fn test_every_supported_format_has_a_plugin() {
    let dispatcher = Dispatcher::with_defaults();
    for format in FormatType::SUPPORTED {
        assert!(dispatcher.plugin_for(format).is_ok(), "{format}");
    }
    assert!(matches!(
        dispatcher.plugin_for(FormatType::Unknown),
        Err(err) if err.is_unsupported()
    ));
}

#[test]
fn test_signatures_without_extension() {
    let dir = TempDir::new().unwrap();
    let cases = [
        ("a", epub("A", &[], &[]), FormatType::Epub),
        ("b", mobi("B", &[], "<p>x</p>"), FormatType::Mobi),
        ("c", pdb(b"TEXtREAd", &[vec![0; 16]]), FormatType::Mobi),
        ("d", fb2("D", &[]).into_bytes(), FormatType::Fb2),
        ("e", b"\n  <!DOCTYPE html><html><body/></html>".to_vec(), FormatType::Html),
        ("f", b"just some words".to_vec(), FormatType::Unknown),
    ];

    let dispatcher = Dispatcher::with_defaults();
    for (name, data, expected) in cases {
        let path = write_file(&dir, name, &data);
        assert_eq!(dispatcher.classify(&Book::new(&path)), expected, "{name}");
    }
}

#[test]
fn test_extension_beats_content() {
    let dir = TempDir::new().unwrap();
    // FictionBook markup saved as .txt is read as text
    let path = write_file(&dir, "story.txt", fb2("X", &[]).as_bytes());
    let format = Dispatcher::with_defaults().classify(&Book::new(&path));
    assert_eq!(format, FormatType::PlainText);
}

#[test]
fn test_short_sniff_window() {
    let dir = TempDir::new().unwrap();
    let mut data = vec![b' '; 200];
    data.extend_from_slice(b"<html></html>");
    let path = write_file(&dir, "padded", &data);

    let wide = FormatRegistry::new();
    assert_eq!(wide.classify_file(&path, None), FormatType::Html);
    let narrow = FormatRegistry::new().with_sniff_len(64);
    assert_eq!(narrow.classify_file(&path, None), FormatType::Unknown);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_sniff_never_panics(head in prop::collection::vec(any::<u8>(), 0..512)) {
        let format = sniff(&head);
        prop_assert_ne!(format, FormatType::PlainText);
    }

    #[test]
    fn prop_declared_format_always_wins(
        index in 0usize..FormatType::SUPPORTED.len(),
        name in "[a-z]{1,8}\\.(epub|fb2|mobi|html|txt|bin)",
    ) {
        let declared = FormatType::SUPPORTED[index];
        let format = FormatRegistry::new().classify(Path::new(&name), Some(declared), Some(b"PK\x03\x04"));
        prop_assert_eq!(format, declared);
    }
}
