//! Reading a truncated or corrupted file never panics: it either fails as
//! malformed or yields a prefix of the complete book.

mod common;

use common::{Chapter, epub, fb2, mobi, write_file};
use proptest::prelude::*;
use proptest::sample::Index;
use quire::{Book, BookModel, Dispatcher, Error, ErrorKind, Section};
use tempfile::TempDir;

const TEXT: &str = "Call me Ishmael. Some years ago,\nnever mind how long precisely.\n\n\
                    It is a way I have of driving off the spleen.\n\n\
                    Whenever I find myself growing grim about the mouth.\n";

const HTML: &str = "<!DOCTYPE html><html><head><title>Notes</title></head><body>\
                    <h1>Intro</h1><p>Read <a href=\"#n\">the note</a> now.<br>Twice.</p>\
                    <h1>Notes</h1><p id=\"n\">A <i>quoted</i> remark.</p></body></html>";

const MOBI_MARKUP: &str = "<html><body><h2>Start</h2><p>Hello <b>there</b>.</p>\
                           <mbp:pagebreak/><h2>Finish</h2><p>Bye.</p></body></html>";

fn sample_epub() -> Vec<u8> {
    epub(
        "Cut",
        &["Ann Smith"],
        &[
            Chapter {
                name: "one.xhtml",
                title: "One",
                body: "<h1>One</h1><p>First chapter.</p>",
            },
            Chapter {
                name: "two.xhtml",
                title: "Two",
                body: "<h1>Two</h1><p>Second chapter.</p>",
            },
        ],
    )
}

/// Malformed content and short reads are the only acceptable failures.
fn is_expected_failure(err: &Error) -> bool {
    matches!(err.kind(), ErrorKind::MalformedInput | ErrorKind::IoFailure)
}

/// Sections in document order as `(title, first paragraph)`.
fn flatten(sections: &[Section], out: &mut Vec<(Option<String>, usize)>) {
    for section in sections {
        out.push((section.title().map(str::to_string), section.paragraphs().start));
        flatten(section.children(), out);
    }
}

fn assert_prefix(full: &BookModel, cut: &BookModel) -> Result<(), TestCaseError> {
    let paragraphs = cut.paragraphs();
    prop_assert!(paragraphs.len() <= full.paragraph_count());
    if let Some((last, rest)) = paragraphs.split_last() {
        for (i, paragraph) in rest.iter().enumerate() {
            prop_assert_eq!(paragraph.text(), full.paragraphs()[i].text());
        }
        let whole = full.paragraphs()[rest.len()].text();
        let partial = last.text();
        let partial = partial.trim_end_matches('\u{FFFD}');
        prop_assert!(whole.starts_with(partial), "{:?} is not a prefix of {:?}", partial, whole);
    }

    let (mut full_sections, mut cut_sections) = (Vec::new(), Vec::new());
    flatten(full.sections(), &mut full_sections);
    flatten(cut.sections(), &mut cut_sections);
    prop_assert!(cut_sections.len() <= full_sections.len());
    if let Some((last, rest)) = cut_sections.split_last() {
        prop_assert_eq!(rest, &full_sections[..rest.len()]);
        let expected = &full_sections[rest.len()];
        prop_assert_eq!(last.1, expected.1);
        prop_assert!(last.0.is_none() || last.0 == expected.0);
    }
    Ok(())
}

fn check_truncation(name: &str, data: &[u8], index: Index) -> Result<(), TestCaseError> {
    let dir = TempDir::new().unwrap();
    let dispatcher = Dispatcher::with_defaults();
    let full = dispatcher
        .load_model(&Book::new(write_file(&dir, &format!("full-{name}"), data)))
        .unwrap();

    let cut_at = index.index(data.len() + 1);
    let path = write_file(&dir, name, &data[..cut_at]);
    match dispatcher.load_model(&Book::new(path)) {
        Ok(model) => assert_prefix(&full, &model),
        Err(err) => {
            prop_assert!(is_expected_failure(&err), "cut at {}: {}", cut_at, err);
            Ok(())
        }
    }
}

/// Offsets of MOBI header fields in the `common::mobi` fixture, with their
/// widths. Record 0 follows the 78-byte PDB header and two table entries.
const MOBI_FIELDS: [(usize, usize); 15] = [
    (76, 2),        // PDB record count
    (78, 4),        // record 0 offset
    (86, 4),        // record 1 offset
    (94, 2),        // compression
    (94 + 4, 4),    // text length
    (94 + 8, 2),    // text record count
    (94 + 12, 2),   // encryption
    (94 + 20, 4),   // MOBI header length
    (94 + 28, 4),   // text encoding
    (94 + 0x54, 4), // full name offset
    (94 + 0x58, 4), // full name length
    (94 + 0x6C, 4), // first image record
    (94 + 0x80, 4), // EXTH flags
    (94 + 0xF2, 2), // extra data flags
    (94 + 0xFC, 4), // EXTH length
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_truncated_text(index in any::<Index>()) {
        check_truncation("moby.txt", TEXT.as_bytes(), index)?;
    }

    #[test]
    fn prop_truncated_text_multibyte(index in any::<Index>()) {
        let text = "Жили-были дед да баба.\n\nИ была у них курочка Ряба.\n";
        check_truncation("ryaba.txt", text.as_bytes(), index)?;
    }

    #[test]
    fn prop_truncated_fb2(index in any::<Index>()) {
        let data = fb2("Cut", &["Ann Smith"]);
        check_truncation("cut.fb2", data.as_bytes(), index)?;
    }

    #[test]
    fn prop_truncated_html(index in any::<Index>()) {
        check_truncation("notes.html", HTML.as_bytes(), index)?;
    }

    #[test]
    fn prop_truncated_epub(index in any::<Index>()) {
        check_truncation("cut.epub", &sample_epub(), index)?;
    }

    #[test]
    fn prop_truncated_mobi(index in any::<Index>()) {
        let data = mobi("Cut", &["Ann Smith"], MOBI_MARKUP);
        check_truncation("cut.mobi", &data, index)?;
    }

    #[test]
    fn prop_corrupted_mobi_header(
        field in 0..MOBI_FIELDS.len(),
        value in prop_oneof![Just(0u32), Just(u32::MAX), Just(0x8000_0000), any::<u32>()],
    ) {
        let mut data = mobi("Cut", &["Ann Smith"], MOBI_MARKUP);
        let (offset, width) = MOBI_FIELDS[field];
        data[offset..offset + width].copy_from_slice(&value.to_be_bytes()[4 - width..]);

        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "corrupt.mobi", &data);
        let dispatcher = Dispatcher::with_defaults();
        if let Err(err) = dispatcher.load_metadata(&mut Book::new(&path)) {
            prop_assert!(is_expected_failure(&err), "metadata: {}", err);
        }
        match dispatcher.load_model(&Book::new(&path)) {
            Ok(model) => {
                for (_, target) in model.internal_links() {
                    prop_assert!(model.contains(target));
                }
            }
            Err(err) => prop_assert!(is_expected_failure(&err), "model: {}", err),
        }
    }
}

#[test]
fn test_empty_file_is_malformed() {
    let dir = TempDir::new().unwrap();
    let dispatcher = Dispatcher::with_defaults();
    for name in ["empty.txt", "empty.fb2", "empty.html", "empty.epub", "empty.mobi"] {
        let err = dispatcher
            .load_model(&Book::new(write_file(&dir, name, b"")))
            .unwrap_err();
        assert!(err.is_malformed(), "{name}: {err}");
    }
}
