//! Mobipocket and PalmDOC reader.
//!
//! `BOOKMOBI` files carry HTML in PalmDOC-compressed text records, metadata
//! in the MOBI and EXTH headers and images in the records following
//! `first_image_index`. `TEXtREAd` files are plain PalmDOC text.
//!
//! Encrypted books and HUFF/CDIC compression are rejected.

mod filepos;
mod headers;
mod palmdoc;

use tracing::debug;

use crate::book::Metadata;
use crate::encoding::{decode_text_as, decode_text_with};
use crate::error::{Error, Result};
use crate::format::FormatType;
use crate::io::ByteSource;
use crate::markup::{self, MarkupHost, MarkupOptions};
use crate::model::{LinkRef, ModelBuilder};
use crate::plugin::{FormatPlugin, ReadContext};
use crate::util::detect_image_type;

use super::txt::emit_paragraphs;

/// Upper bound on the buffer reserved up front for decompressed text.
const MAX_TEXT_PREALLOC: u64 = 16 << 20;
use headers::{BookKind, Compression, ExthHeader, MobiHeader, NULL_INDEX, PdbHeader, TextEncoding, strip_trailing_data};

#[derive(Debug, Clone, Copy, Default)]
pub struct MobiPlugin;

struct Opened {
    pdb: PdbHeader,
    header: MobiHeader,
    exth: Option<ExthHeader>,
}

fn open(source: &dyn ByteSource) -> Result<Opened> {
    let pdb = PdbHeader::read(source)?;
    let record0 = pdb.record(source, 0)?;
    let header = MobiHeader::parse(&record0)?;
    let exth = ExthHeader::from_record0(&record0, &header);
    Ok(Opened { pdb, header, exth })
}

impl FormatPlugin for MobiPlugin {
    fn support_type(&self) -> FormatType {
        FormatType::Mobi
    }

    fn read_metadata(&self, source: &dyn ByteSource, ctx: &ReadContext<'_>) -> Result<Metadata> {
        let Opened { pdb, header, exth } = open(source)?;
        let exth = exth.unwrap_or_default();

        let title = exth
            .title
            .filter(|t| !t.is_empty())
            .or_else(|| Some(header.full_name.trim().to_string()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| pdb.name.replace('_', " ").trim().to_string());
        let encoding = match ctx.encoding {
            Some(label) => Some(label.to_string()),
            None => header.encoding.label().map(String::from),
        };
        let cover = exth
            .cover_offset
            .filter(|_| header.first_image_index != NULL_INDEX)
            .map(|offset| filepos::image_id(offset as usize + 1));

        Ok(Metadata {
            title,
            authors: exth.authors,
            language: exth
                .language
                .filter(|l| !l.is_empty())
                .or_else(|| header.language().map(String::from)),
            series: None,
            cover,
            tags: exth.subjects,
            description: exth.description.filter(|d| !d.is_empty()),
            identifier: exth.isbn.or(exth.asin).filter(|id| !id.is_empty()),
            encoding,
        })
    }

    fn build_model(
        &self,
        source: &dyn ByteSource,
        ctx: &ReadContext<'_>,
        builder: &mut ModelBuilder,
    ) -> Result<()> {
        let Opened { pdb, header, .. } = open(source)?;
        if header.encryption != 0 {
            return Err(Error::malformed("encrypted MOBI books are not supported"));
        }
        let raw = read_text(source, &pdb, &header, builder)?;

        if pdb.kind == BookKind::PalmDoc {
            let text = decode(&raw, ctx, header.encoding);
            builder.begin_section(None);
            emit_paragraphs(&text, builder);
            builder.end_section();
            return Ok(());
        }

        load_images(source, &pdb, &header, builder);

        let targets = filepos::collect_targets(&raw);
        let utf8 = header.encoding == TextEncoding::Utf8;
        let html = filepos::rewrite_attributes(&filepos::insert_anchors(&raw, &targets, utf8));
        let text = decode(&html, ctx, header.encoding);

        let options = MarkupOptions {
            split_headings: false,
            split_page_breaks: true,
        };
        builder.begin_section(None);
        markup::convert(&text, &mut MobiHost, builder, options);
        builder.end_section();
        Ok(())
    }
}

/// Concatenate and decompress the text records.
fn read_text(
    source: &dyn ByteSource,
    pdb: &PdbHeader,
    header: &MobiHeader,
    builder: &mut ModelBuilder,
) -> Result<Vec<u8>> {
    match header.compression {
        Compression::None | Compression::PalmDoc => {}
        Compression::Huffman => {
            return Err(Error::malformed("HUFF/CDIC compression is not supported"));
        }
        Compression::Unknown(n) => {
            return Err(Error::malformed(format!("unknown compression type {n}")));
        }
    }

    let count = (header.text_record_count as usize).min(pdb.record_count().saturating_sub(1));
    // text_length is untrusted: PalmDOC expands a record at most eightfold
    let capacity = u64::from(header.text_length)
        .min(source.len().saturating_mul(8))
        .min(MAX_TEXT_PREALLOC);
    let mut text = Vec::with_capacity(capacity as usize);
    for index in 1..=count {
        let record = match pdb.record(source, index) {
            Ok(record) => record,
            Err(err) => {
                builder.diagnostic(format!("text record {index} unreadable: {err}"));
                break;
            }
        };
        let record = strip_trailing_data(&record, header.extra_data_flags);
        match header.compression {
            Compression::PalmDoc => text.extend_from_slice(&palmdoc::decompress(record)),
            _ => text.extend_from_slice(record),
        }
    }
    if header.text_length > 0 {
        text.truncate(header.text_length as usize);
    }
    debug!(records = count, bytes = text.len(), "mobi text read");
    Ok(text)
}

/// Store every image record; ids follow the `recindex` numbering.
fn load_images(source: &dyn ByteSource, pdb: &PdbHeader, header: &MobiHeader, builder: &mut ModelBuilder) {
    if header.first_image_index == NULL_INDEX {
        return;
    }
    let first = header.first_image_index as usize;
    for index in first..pdb.record_count() {
        let Ok(record) = pdb.record(source, index) else {
            break;
        };
        if let Some(media_type) = detect_image_type(&record) {
            builder.add_resource(filepos::image_id(index - first + 1), media_type, record);
        }
    }
}

fn decode(bytes: &[u8], ctx: &ReadContext<'_>, encoding: TextEncoding) -> String {
    match ctx.encoding {
        Some(label) => decode_text_as(bytes, label).into_owned(),
        None => decode_text_with(bytes, encoding.label(), ctx.config.fallback_encoding()).into_owned(),
    }
}

/// Links were rewritten to `#fileposN` fragments; images to `image_N` ids.
struct MobiHost;

impl MarkupHost for MobiHost {
    fn resolve_link(&self, href: &str) -> LinkRef {
        LinkRef::parse_local(href)
    }

    fn anchor_key(&self, id: &str) -> String {
        id.to_string()
    }

    fn image(&mut self, src: &str, builder: &mut ModelBuilder) -> Option<String> {
        let src = src.trim();
        builder.has_resource(src).then(|| src.to_string())
    }
}
