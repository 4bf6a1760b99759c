//! Plain text reader.
//!
//! Blank lines separate paragraphs; line breaks inside a paragraph are kept.
//! The whole file forms a single section.

use crate::book::Metadata;
use crate::encoding::{decode_text_as, decode_text_with, detect_encoding};
use crate::error::Result;
use crate::format::FormatType;
use crate::io::ByteSource;
use crate::model::{ModelBuilder, ParagraphKind, TextStyle};
use crate::plugin::{FormatPlugin, ReadContext};

/// Bytes sampled for encoding detection during a metadata read.
const DETECT_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
pub struct TxtPlugin;

impl FormatPlugin for TxtPlugin {
    fn support_type(&self) -> FormatType {
        FormatType::PlainText
    }

    /// Plain text carries no metadata; the title comes from the file name.
    fn read_metadata(&self, source: &dyn ByteSource, ctx: &ReadContext<'_>) -> Result<Metadata> {
        let encoding = match ctx.encoding {
            Some(label) => label.to_string(),
            None => {
                let sample = source.read_prefix(0, DETECT_LEN)?;
                detect_encoding(&sample, None, ctx.config.fallback_encoding())
                    .name()
                    .to_string()
            }
        };
        Ok(Metadata {
            encoding: Some(encoding),
            ..Default::default()
        })
    }

    fn build_model(
        &self,
        source: &dyn ByteSource,
        ctx: &ReadContext<'_>,
        builder: &mut ModelBuilder,
    ) -> Result<()> {
        let data = source.read_all()?;
        let text = match ctx.encoding {
            Some(label) => decode_text_as(&data, label),
            None => decode_text_with(&data, None, ctx.config.fallback_encoding()),
        };
        builder.begin_section(None);
        emit_paragraphs(&text, builder);
        builder.end_section();
        Ok(())
    }
}

/// Split text on blank lines into paragraphs, keeping inner line breaks.
pub(crate) fn emit_paragraphs(text: &str, builder: &mut ModelBuilder) {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if builder.is_full() {
            return;
        }
        let line = line.trim_end();
        if line.is_empty() {
            flush(&mut lines, builder);
        } else {
            lines.push(line);
        }
    }
    flush(&mut lines, builder);
}

fn flush(lines: &mut Vec<&str>, builder: &mut ModelBuilder) {
    if lines.is_empty() {
        return;
    }
    builder.begin_paragraph(ParagraphKind::Text);
    builder.add_text_verbatim(&lines.join("\n"), TextStyle::PLAIN);
    builder.end_paragraph();
    lines.clear();
}
