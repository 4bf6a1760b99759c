//! Fixture builders shared by the integration tests.
//!
//! Every fixture is generated on the fly and written into a temporary
//! directory, so the tests need no checked-in binaries.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, data).expect("write fixture");
    path
}

/// An FB2 book with the given title and authors, two chapters, a nested
/// section, a footnote link and an embedded cover.
pub fn fb2(title: &str, authors: &[&str]) -> String {
    let authors: String = authors
        .iter()
        .map(|a| {
            let (first, last) = a.split_once(' ').unwrap_or(("", a));
            format!("<author><first-name>{first}</first-name><last-name>{last}</last-name></author>")
        })
        .collect();
    format!(
        r##"<?xml version="1.0" encoding="UTF-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
<description><title-info>
<genre>sf</genre>{authors}<book-title>{title}</book-title>
<coverpage><image l:href="#cover.png"/></coverpage>
<lang>en</lang><sequence name="Saga" number="2"/>
</title-info></description>
<body>
<section><title><p>Chapter One</p></title>
<p>It was a <emphasis>dark</emphasis> night.<a l:href="#n1" type="note">1</a></p>
<section><title><p>Part</p></title><p>Nested text.</p></section>
</section>
<section><title><p>Chapter Two</p></title><p>The end.</p></section>
</body>
<body name="notes"><section id="n1"><title><p>1</p></title><p>A footnote.</p></section></body>
<binary id="cover.png" content-type="image/png">iVBORw0KGgo=</binary>
</FictionBook>"##
    )
}

/// A chapter in an EPUB fixture: archive name relative to `OEBPS/` and
/// XHTML body markup.
pub struct Chapter<'a> {
    pub name: &'a str,
    pub title: &'a str,
    pub body: &'a str,
}

/// An EPUB 2 book with an NCX table of contents.
pub fn epub(title: &str, authors: &[&str], chapters: &[Chapter<'_>]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default();

    writer.start_file("mimetype", stored).unwrap();
    writer.write_all(b"application/epub+zip").unwrap();
    writer
        .start_file("META-INF/container.xml", deflated)
        .unwrap();
    writer
        .write_all(
            br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
<rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#,
        )
        .unwrap();

    let mut manifest = String::from(
        r#"<item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#,
    );
    let mut spine = String::new();
    let mut nav_points = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        manifest.push_str(&format!(
            r#"<item id="c{i}" href="{}" media-type="application/xhtml+xml"/>"#,
            chapter.name
        ));
        spine.push_str(&format!(r#"<itemref idref="c{i}"/>"#));
        nav_points.push_str(&format!(
            r#"<navPoint id="p{i}" playOrder="{}"><navLabel><text>{}</text></navLabel><content src="{}"/></navPoint>"#,
            i + 1,
            chapter.title,
            chapter.name
        ));
        writer
            .start_file(format!("OEBPS/{}", chapter.name), deflated)
            .unwrap();
        write!(
            writer,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>{}</title></head><body>{}</body></html>"#,
            chapter.title, chapter.body
        )
        .unwrap();
    }

    let creators: String = authors
        .iter()
        .map(|a| format!("<dc:creator>{a}</dc:creator>"))
        .collect();
    writer.start_file("OEBPS/content.opf", deflated).unwrap();
    write!(
        writer,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
<metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
<dc:title>{title}</dc:title>{creators}<dc:language>en</dc:language>
<dc:identifier id="uid">urn:uuid:1234</dc:identifier>
</metadata>
<manifest>{manifest}</manifest>
<spine toc="ncx">{spine}</spine>
</package>"#
    )
    .unwrap();

    writer.start_file("OEBPS/toc.ncx", deflated).unwrap();
    write!(
        writer,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1"><navMap>{nav_points}</navMap></ncx>"#
    )
    .unwrap();

    writer.finish().unwrap().into_inner()
}

/// A `BOOKMOBI` database: uncompressed UTF-8 markup in one text record and
/// an EXTH block with title and authors.
pub fn mobi(title: &str, authors: &[&str], markup: &str) -> Vec<u8> {
    let text = markup.as_bytes();
    let mut record0 = vec![0u8; 16 + 0xE8];
    record0[0..2].copy_from_slice(&1u16.to_be_bytes());
    record0[4..8].copy_from_slice(&(text.len() as u32).to_be_bytes());
    record0[8..10].copy_from_slice(&1u16.to_be_bytes());
    record0[10..12].copy_from_slice(&4096u16.to_be_bytes());
    record0[16..20].copy_from_slice(b"MOBI");
    record0[20..24].copy_from_slice(&0xE8u32.to_be_bytes());
    record0[28..32].copy_from_slice(&65001u32.to_be_bytes());
    record0[0x6C..0x70].copy_from_slice(&u32::MAX.to_be_bytes());
    record0[0x80..0x84].copy_from_slice(&0x40u32.to_be_bytes());

    let mut exth = Vec::new();
    let mut count = 0u32;
    let mut push = |kind: u32, value: &str| {
        exth.extend_from_slice(&kind.to_be_bytes());
        exth.extend_from_slice(&(value.len() as u32 + 8).to_be_bytes());
        exth.extend_from_slice(value.as_bytes());
        count += 1;
    };
    push(503, title);
    for author in authors {
        push(100, author);
    }
    record0.extend_from_slice(b"EXTH");
    record0.extend_from_slice(&(exth.len() as u32 + 12).to_be_bytes());
    record0.extend_from_slice(&count.to_be_bytes());
    record0.extend_from_slice(&exth);

    pdb(b"BOOKMOBI", &[record0, text.to_vec()])
}

/// A Palm database with the given type/creator and records.
pub fn pdb(ident: &[u8; 8], records: &[Vec<u8>]) -> Vec<u8> {
    let mut data = vec![0u8; 78];
    data[..8].copy_from_slice(b"fixture\0");
    data[60..68].copy_from_slice(ident);
    data[76..78].copy_from_slice(&(records.len() as u16).to_be_bytes());
    let mut offset = 78 + records.len() * 8;
    for record in records {
        data.extend_from_slice(&(offset as u32).to_be_bytes());
        data.extend_from_slice(&[0; 4]);
        offset += record.len();
    }
    for record in records {
        data.extend_from_slice(record);
    }
    data
}

/// Count TOC entries including nested ones.
pub fn count_toc(entries: &[quire::TocEntry]) -> usize {
    entries.iter().map(|e| 1 + count_toc(&e.children)).sum()
}

pub fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}
