//! Palm database, MOBI and EXTH headers.

use crate::error::{Error, Result};
use crate::io::ByteSource;

pub const NULL_INDEX: u32 = 0xFFFF_FFFF;

/// Size of the fixed Palm database header, before the record list.
const PDB_HEADER_LEN: usize = 78;

/// What kind of book the Palm database holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookKind {
    /// `BOOKMOBI`: Mobipocket HTML.
    Mobi,
    /// `TEXtREAd`: plain PalmDOC text.
    PalmDoc,
}

/// The Palm database header and record table.
#[derive(Debug)]
pub struct PdbHeader {
    pub name: String,
    pub kind: BookKind,
    record_offsets: Vec<u64>,
    file_len: u64,
}

impl PdbHeader {
    pub fn read(source: &dyn ByteSource) -> Result<Self> {
        let head = source.read_prefix(0, PDB_HEADER_LEN)?;
        if head.len() < PDB_HEADER_LEN {
            return Err(Error::malformed("PDB header too short"));
        }

        let name_end = head[..32].iter().position(|&b| b == 0).unwrap_or(32);
        let name = String::from_utf8_lossy(&head[..name_end]).into_owned();

        let kind = match &head[60..68] {
            b"BOOKMOBI" => BookKind::Mobi,
            ident if ident.eq_ignore_ascii_case(b"TEXtREAd") => BookKind::PalmDoc,
            ident => {
                return Err(Error::malformed(format!(
                    "unknown book type {:?}",
                    String::from_utf8_lossy(ident)
                )));
            }
        };

        let num_records = u16::from_be_bytes([head[76], head[77]]) as usize;
        let table = source.read_prefix(PDB_HEADER_LEN as u64, num_records * 8)?;
        if table.len() < num_records * 8 {
            return Err(Error::malformed("PDB record table truncated"));
        }
        let record_offsets = table
            .chunks_exact(8)
            .map(|entry| be_u32(entry, 0) as u64)
            .collect();

        Ok(Self {
            name,
            kind,
            record_offsets,
            file_len: source.len(),
        })
    }

    pub fn record_count(&self) -> usize {
        self.record_offsets.len()
    }

    /// Read record `index`; a record reaching past the end of the file is
    /// cut at the end.
    pub fn record(&self, source: &dyn ByteSource, index: usize) -> Result<Vec<u8>> {
        let start = *self
            .record_offsets
            .get(index)
            .ok_or_else(|| Error::malformed(format!("record {index} out of bounds")))?;
        let end = self
            .record_offsets
            .get(index + 1)
            .copied()
            .unwrap_or(self.file_len)
            .min(self.file_len);
        if start >= self.file_len || end < start {
            return Err(Error::malformed(format!("record {index} lies outside the file")));
        }
        Ok(source.read_at(start, (end - start) as usize)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    PalmDoc,
    Huffman,
    Unknown(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Cp1252,
    Utf8,
    Unknown(u32),
}

impl TextEncoding {
    pub fn label(self) -> Option<&'static str> {
        match self {
            TextEncoding::Cp1252 => Some("windows-1252"),
            TextEncoding::Utf8 => Some("UTF-8"),
            TextEncoding::Unknown(_) => None,
        }
    }
}

/// Record 0: the PalmDOC header, followed by the MOBI header in `BOOKMOBI`
/// files.
#[derive(Debug, Clone)]
pub struct MobiHeader {
    pub compression: Compression,
    pub text_length: u32,
    pub text_record_count: u16,
    pub encryption: u16,
    pub encoding: TextEncoding,
    pub full_name: String,
    pub locale: u32,
    pub first_image_index: u32,
    pub exth_flags: u32,
    pub extra_data_flags: u16,
    pub header_length: u32,
}

impl MobiHeader {
    pub fn parse(record0: &[u8]) -> Result<Self> {
        if record0.len() < 16 {
            return Err(Error::malformed("MOBI header too short"));
        }

        let compression = match be_u16(record0, 0) {
            1 => Compression::None,
            2 => Compression::PalmDoc,
            0x4448 => Compression::Huffman,
            n => Compression::Unknown(n),
        };
        let mut header = Self {
            compression,
            text_length: be_u32(record0, 4),
            text_record_count: be_u16(record0, 8),
            encryption: be_u16(record0, 12),
            encoding: TextEncoding::Cp1252,
            full_name: String::new(),
            locale: 0,
            first_image_index: NULL_INDEX,
            exth_flags: 0,
            extra_data_flags: 0,
            header_length: 0,
        };
        if record0.len() < 32 || &record0[16..20] != b"MOBI" {
            return Ok(header);
        }

        header.header_length = be_u32(record0, 20);
        header.encoding = match be_u32(record0, 28) {
            1252 => TextEncoding::Cp1252,
            65001 => TextEncoding::Utf8,
            n => TextEncoding::Unknown(n),
        };
        if record0.len() >= 0x5C {
            let offset = be_u32(record0, 0x54) as usize;
            let len = be_u32(record0, 0x58) as usize;
            if let Some(name) = record0.get(offset..offset.saturating_add(len)) {
                header.full_name = decode_string(name, header.encoding);
            }
        }
        if record0.len() >= 0x60 {
            header.locale = be_u32(record0, 0x5C);
        }
        if record0.len() >= 0x70 {
            header.first_image_index = be_u32(record0, 0x6C);
        }
        if record0.len() >= 0x84 {
            header.exth_flags = be_u32(record0, 0x80);
        }
        if record0.len() >= 0xF4 && header.header_length >= 0xE4 {
            header.extra_data_flags = be_u16(record0, 0xF2);
        }
        Ok(header)
    }

    pub fn has_exth(&self) -> bool {
        self.exth_flags & 0x40 != 0
    }

    /// Language tag for the header's Windows locale id.
    pub fn language(&self) -> Option<&'static str> {
        language_for_locale(self.locale)
    }
}

/// Extended metadata records.
#[derive(Debug, Default)]
pub struct ExthHeader {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub isbn: Option<String>,
    pub asin: Option<String>,
    pub subjects: Vec<String>,
    pub language: Option<String>,
    pub cover_offset: Option<u32>,
}

impl ExthHeader {
    /// Parse the EXTH block following the MOBI header, if the flags say
    /// there is one.
    pub fn from_record0(record0: &[u8], header: &MobiHeader) -> Option<Self> {
        if !header.has_exth() || header.header_length == 0 {
            return None;
        }
        let start = 16usize.checked_add(header.header_length as usize)?;
        Self::parse(record0.get(start..)?, header.encoding)
    }

    fn parse(data: &[u8], encoding: TextEncoding) -> Option<Self> {
        if data.len() < 12 || &data[0..4] != b"EXTH" {
            return None;
        }
        let record_count = be_u32(data, 8);

        let mut exth = ExthHeader::default();
        let mut pos = 12;
        for _ in 0..record_count {
            if pos + 8 > data.len() {
                break;
            }
            let record_type = be_u32(data, pos);
            let record_len = be_u32(data, pos + 4) as usize;
            if record_len < 8 || pos + record_len > data.len() {
                break;
            }
            let content = &data[pos + 8..pos + record_len];
            let text = || decode_string(content, encoding).trim().to_string();

            match record_type {
                100 => exth.authors.push(text()),
                103 => exth.description = Some(text()),
                104 => exth.isbn = Some(text()),
                105 => exth.subjects.extend(
                    text()
                        .split(';')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from),
                ),
                113 => exth.asin = Some(text()),
                201 if content.len() >= 4 => {
                    let offset = be_u32(content, 0);
                    if offset != NULL_INDEX {
                        exth.cover_offset = Some(offset);
                    }
                }
                503 => exth.title = Some(text()),
                524 => exth.language = Some(text()),
                _ => {}
            }
            pos += record_len;
        }
        exth.authors.retain(|a| !a.is_empty());
        Some(exth)
    }
}

fn decode_string(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

/// Primary language of a Windows LCID.
fn language_for_locale(locale: u32) -> Option<&'static str> {
    let tag = match locale & 0x3FF {
        0x01 => "ar",
        0x02 => "bg",
        0x03 => "ca",
        0x04 => "zh",
        0x05 => "cs",
        0x06 => "da",
        0x07 => "de",
        0x08 => "el",
        0x09 => "en",
        0x0A => "es",
        0x0B => "fi",
        0x0C => "fr",
        0x0D => "he",
        0x0E => "hu",
        0x0F => "is",
        0x10 => "it",
        0x11 => "ja",
        0x12 => "ko",
        0x13 => "nl",
        0x14 => "no",
        0x15 => "pl",
        0x16 => "pt",
        0x18 => "ro",
        0x19 => "ru",
        0x1A => "hr",
        0x1B => "sk",
        0x1D => "sv",
        0x1F => "tr",
        0x22 => "uk",
        0x23 => "be",
        0x24 => "sl",
        0x25 => "et",
        0x26 => "lv",
        0x27 => "lt",
        0x2A => "vi",
        _ => return None,
    };
    Some(tag)
}

/// Strip the trailing entries that MOBI appends to text records.
///
/// Bits 1..15 of `flags` each announce one entry whose size is stored as a
/// backward variable-width integer at the current end. Bit 0 announces
/// multibyte overlap bytes and is removed last.
pub fn strip_trailing_data(record: &[u8], flags: u16) -> &[u8] {
    if flags == 0 || record.is_empty() {
        return record;
    }

    let mut end = record.len();
    let mut shifted = flags >> 1;
    while shifted != 0 {
        if shifted & 1 != 0 {
            if end == 0 {
                break;
            }
            let mut size = 0usize;
            let mut shift = 0;
            let mut pos = end;
            while pos > 0 {
                pos -= 1;
                let byte = record[pos];
                size |= ((byte & 0x7F) as usize) << shift;
                shift += 7;
                if byte & 0x80 != 0 || shift >= 28 {
                    break;
                }
            }
            if size > 0 && size <= end {
                end -= size;
            }
        }
        shifted >>= 1;
    }

    if flags & 1 != 0 && end > 0 {
        let overlap = (record[end - 1] & 3) as usize + 1;
        if overlap <= end {
            end -= overlap;
        }
    }

    &record[..end]
}

fn be_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn be_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}
