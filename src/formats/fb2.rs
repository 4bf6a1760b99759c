//! FictionBook 2 reader.
//!
//! FB2 is a single XML document: a `<description>` header with bibliographic
//! data, one or more `<body>` elements with nested `<section>`s, and
//! base64-encoded `<binary>` images at the end.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::book::{Metadata, Series};
use crate::encoding::{decode_text_as, decode_text_with, detect_encoding, xml_declared_encoding};
use crate::error::Result;
use crate::format::FormatType;
use crate::io::ByteSource;
use crate::model::{LinkRef, ModelBuilder, ParagraphKind, TextStyle};
use crate::plugin::{FormatPlugin, ReadContext};
use crate::util::{attr, decode_base64, detect_image_type, local_name, resolve_entity};

/// Leading bytes read when looking for the end of `<description>`.
const HEADER_PROBE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct Fb2Plugin;

impl FormatPlugin for Fb2Plugin {
    fn support_type(&self) -> FormatType {
        FormatType::Fb2
    }

    fn read_metadata(&self, source: &dyn ByteSource, ctx: &ReadContext<'_>) -> Result<Metadata> {
        // The header is at the front; avoid reading the binaries when possible.
        let mut data = source.read_prefix(0, HEADER_PROBE)?;
        if (data.len() as u64) < source.len()
            && memchr::memmem::find(&data, b"</description>").is_none()
        {
            data = source.read_all()?;
        }
        let (text, encoding) = decode(&data, ctx);
        let mut metadata = parse_description(&text)?;
        metadata.encoding = Some(encoding);
        Ok(metadata)
    }

    fn build_model(
        &self,
        source: &dyn ByteSource,
        ctx: &ReadContext<'_>,
        builder: &mut ModelBuilder,
    ) -> Result<()> {
        let data = source.read_all()?;
        let (text, _) = decode(&data, ctx);
        BodyReader::new(builder).run(&text);
        Ok(())
    }
}

fn decode(data: &[u8], ctx: &ReadContext<'_>) -> (String, String) {
    if let Some(label) = ctx.encoding {
        return (decode_text_as(data, label).into_owned(), label.to_string());
    }
    let hint = xml_declared_encoding(data);
    let fallback = ctx.config.fallback_encoding();
    let encoding = detect_encoding(data, hint.as_deref(), fallback);
    let text = decode_text_with(data, hint.as_deref(), fallback).into_owned();
    (text, encoding.name().to_string())
}

fn is_inline(name: &[u8]) -> bool {
    matches!(
        name,
        b"emphasis" | b"strong" | b"strikethrough" | b"sub" | b"sup" | b"code" | b"a" | b"style"
    )
}

// ----------------------------------------------------------------------------
// Description
// ----------------------------------------------------------------------------

#[derive(Default)]
struct AuthorDraft {
    first: String,
    middle: String,
    last: String,
    nickname: String,
}

impl AuthorDraft {
    fn name(&self) -> String {
        let full = [&self.first, &self.middle, &self.last]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            self.nickname.trim().to_string()
        } else {
            full
        }
    }
}

/// Parse `<description>` into metadata, stopping at its end tag.
fn parse_description(text: &str) -> Result<Metadata> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().check_end_names = false;

    let mut metadata = Metadata::default();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut buf = String::new();
    let mut author: Option<AuthorDraft> = None;
    let mut annotation: Vec<String> = Vec::new();
    let mut found_root = false;

    let in_title_info = |stack: &[Vec<u8>]| stack.iter().any(|n| n == b"title-info");

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            // Keep whatever was read from a broken header.
            Err(err) if found_root => {
                tracing::debug!(error = %err, "stopping at malformed FB2 header");
                break;
            }
            Err(err) => return Err(err.into()),
        };
        match event {
            Event::Start(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                found_root |= name == b"FictionBook";
                if !is_inline(&name) {
                    buf.clear();
                }
                if in_title_info(&stack) {
                    if name == b"author" {
                        author = Some(AuthorDraft::default());
                    }
                    header_attributes(&name, &e, &stack, &mut metadata);
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                if in_title_info(&stack) {
                    header_attributes(&name, &e, &stack, &mut metadata);
                }
            }
            Event::Text(e) => buf.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::CData(e) => buf.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::GeneralRef(e) => {
                if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                    buf.push_str(&resolved);
                }
            }
            Event::End(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                if stack.last() == Some(&name) {
                    stack.pop();
                }
                if name == b"description" {
                    break;
                }
                if is_inline(&name) {
                    continue;
                }
                let text = std::mem::take(&mut buf);
                let parent = stack.last().map(Vec::as_slice).unwrap_or_default();
                if in_title_info(&stack) || name == b"title-info" {
                    match name.as_slice() {
                        b"book-title" => metadata.title = text,
                        b"first-name" | b"middle-name" | b"last-name" | b"nickname"
                            if parent == b"author" =>
                        {
                            if let Some(author) = author.as_mut() {
                                let field = match name.as_slice() {
                                    b"first-name" => &mut author.first,
                                    b"middle-name" => &mut author.middle,
                                    b"last-name" => &mut author.last,
                                    _ => &mut author.nickname,
                                };
                                *field = text;
                            }
                        }
                        b"author" => {
                            if let Some(draft) = author.take() {
                                metadata.authors.push(draft.name());
                            }
                        }
                        b"lang" => metadata.language = Some(text),
                        b"genre" => metadata.tags.push(text),
                        b"keywords" => metadata.tags.extend(
                            text.split(',').map(|k| k.trim().to_string()),
                        ),
                        b"p" if stack.iter().any(|n| n == b"annotation") => {
                            annotation.push(text.trim().to_string());
                        }
                        _ => {}
                    }
                } else if stack.iter().any(|n| n == b"document-info") && name == b"id" {
                    metadata.identifier.get_or_insert(text);
                } else if stack.iter().any(|n| n == b"publish-info") && name == b"isbn" {
                    if metadata.identifier.is_none() {
                        metadata.identifier = Some(format!("isbn:{}", text.trim()));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !found_root {
        return Err(crate::error::Error::malformed("missing FictionBook root element"));
    }
    annotation.retain(|p| !p.is_empty());
    if !annotation.is_empty() {
        metadata.description = Some(annotation.join("\n"));
    }
    Ok(metadata)
}

fn header_attributes(name: &[u8], e: &BytesStart<'_>, stack: &[Vec<u8>], metadata: &mut Metadata) {
    match name {
        b"sequence" if metadata.series.is_none() => {
            if let Some(series) = attr(e, b"name") {
                metadata.series = Some(Series {
                    name: series,
                    index: attr(e, b"number").and_then(|n| n.trim().parse().ok()),
                });
            }
        }
        b"image" if stack.last().is_some_and(|n| n == b"coverpage") => {
            if metadata.cover.is_none() {
                metadata.cover = attr(e, b"href").map(|h| h.trim_start_matches('#').to_string());
            }
        }
        _ => {}
    }
}

// ----------------------------------------------------------------------------
// Bodies
// ----------------------------------------------------------------------------

struct Element {
    name: Vec<u8>,
    style: TextStyle,
    link: bool,
}

struct Binary {
    id: String,
    content_type: Option<String>,
    data: String,
}

struct BodyReader<'b> {
    builder: &'b mut ModelBuilder,
    stack: Vec<Element>,
    bodies: usize,
    in_body: bool,
    /// Paragraph text inside the current `<title>`.
    title: Option<Vec<String>>,
    binary: Option<Binary>,
}

impl<'b> BodyReader<'b> {
    fn new(builder: &'b mut ModelBuilder) -> Self {
        Self {
            builder,
            stack: Vec::new(),
            bodies: 0,
            in_body: false,
            title: None,
            binary: None,
        }
    }

    fn run(mut self, text: &str) {
        let mut reader = Reader::from_str(text);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        loop {
            if self.builder.is_full() {
                break;
            }
            match reader.read_event() {
                Ok(Event::Start(e)) => self.start(&e, false),
                Ok(Event::Empty(e)) => self.start(&e, true),
                Ok(Event::End(e)) => self.end(local_name(e.name().as_ref())),
                Ok(Event::Text(e)) => self.text(&String::from_utf8_lossy(e.as_ref())),
                Ok(Event::CData(e)) => self.text(&String::from_utf8_lossy(e.as_ref())),
                Ok(Event::GeneralRef(e)) => {
                    if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                        self.text(&resolved);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    self.builder.diagnostic(format!(
                        "FB2 parse error at byte {}: {err}; rest of file skipped",
                        reader.error_position()
                    ));
                    break;
                }
            }
        }
        self.builder.end_link();
        self.builder.end_paragraph();
    }

    fn within(&self, name: &[u8]) -> bool {
        self.stack.iter().any(|e| e.name == name)
    }

    fn style(&self) -> TextStyle {
        self.stack
            .iter()
            .fold(TextStyle::PLAIN, |acc, e| acc.merge(e.style))
    }

    fn heading_level(&self) -> u8 {
        self.builder.section_depth().clamp(1, 6) as u8
    }

    /// Kind for a `<p>` given its containers.
    fn paragraph_kind(&self) -> ParagraphKind {
        for element in self.stack.iter().rev() {
            match element.name.as_slice() {
                b"title" => return ParagraphKind::Heading(self.heading_level()),
                b"subtitle" => return ParagraphKind::Subtitle,
                b"epigraph" => return ParagraphKind::Epigraph,
                b"cite" => return ParagraphKind::Quote,
                b"poem" | b"stanza" => return ParagraphKind::Verse,
                b"section" | b"body" => break,
                _ => {}
            }
        }
        ParagraphKind::Text
    }

    fn start(&mut self, e: &BytesStart<'_>, empty: bool) {
        let name = local_name(e.name().as_ref()).to_vec();

        if name == b"binary" {
            self.in_body = false;
            if !empty {
                self.binary = Some(Binary {
                    id: attr(e, b"id").unwrap_or_default(),
                    content_type: attr(e, b"content-type"),
                    data: String::new(),
                });
            }
            return;
        }

        if name == b"body" {
            if empty {
                return;
            }
            self.bodies += 1;
            self.in_body = true;
            self.builder.end_paragraph();
            // Later bodies (notes, comments) become their own top-level sections.
            if self.bodies > 1 {
                while self.builder.section_depth() > 0 {
                    self.builder.end_section();
                }
                let title = attr(e, b"name");
                self.builder.begin_section(None);
                if let Some(title) = title {
                    self.builder.set_section_title(&title);
                }
            }
            self.push(name, TextStyle::PLAIN, false);
            return;
        }

        if !self.in_body {
            if !empty {
                self.push(name, TextStyle::PLAIN, false);
            }
            return;
        }

        let id = attr(e, b"id");
        let mut style = TextStyle::PLAIN;
        let mut link = false;

        match name.as_slice() {
            b"section" => {
                self.builder.begin_section(None);
                self.anchor(id);
            }
            b"title" => {
                self.builder.end_paragraph();
                self.anchor(id);
                self.title = Some(Vec::new());
            }
            b"p" | b"v" | b"subtitle" | b"text-author" | b"tr" => {
                let kind = match name.as_slice() {
                    b"v" => ParagraphKind::Verse,
                    b"subtitle" if !self.within(b"title") => ParagraphKind::Subtitle,
                    _ => self.paragraph_kind(),
                };
                self.builder.end_paragraph();
                self.anchor(id);
                self.builder.begin_paragraph(kind);
                if let Some(lines) = self.title.as_mut() {
                    lines.push(String::new());
                }
            }
            b"empty-line" => {
                self.builder.begin_paragraph(ParagraphKind::EmptyLine);
                self.builder.end_paragraph();
            }
            b"poem" | b"stanza" | b"epigraph" | b"cite" | b"annotation" | b"table" => {
                self.builder.end_paragraph();
                self.anchor(id);
            }
            b"td" | b"th" => {
                if self.builder.has_open_paragraph() {
                    self.builder.add_text(" ", TextStyle::PLAIN);
                }
            }
            b"image" => {
                self.anchor(id);
                if let Some(href) = attr(e, b"href") {
                    let inline = self.builder.has_open_paragraph();
                    if !inline {
                        self.builder.begin_paragraph(ParagraphKind::Text);
                    }
                    let alt = attr(e, b"alt").or_else(|| attr(e, b"title"));
                    self.builder
                        .add_image(href.trim().trim_start_matches('#'), alt);
                    if !inline {
                        self.builder.end_paragraph();
                    }
                }
            }
            b"a" => {
                self.anchor(id);
                if let Some(href) = attr(e, b"href").filter(|h| !h.trim().is_empty()) {
                    self.builder.begin_link(LinkRef::parse(&href));
                    link = true;
                }
            }
            b"emphasis" => style.italic = true,
            b"strong" => style.bold = true,
            b"strikethrough" => style.strikethrough = true,
            b"sub" => style.subscript = true,
            b"sup" => style.superscript = true,
            b"code" => style.code = true,
            _ => self.anchor(id),
        }

        if !empty {
            self.push(name, style, link);
        } else if link {
            self.builder.end_link();
        }
    }

    fn push(&mut self, name: Vec<u8>, style: TextStyle, link: bool) {
        self.stack.push(Element { name, style, link });
    }

    fn end(&mut self, name: &[u8]) {
        if name == b"binary" {
            self.finish_binary();
            return;
        }
        let Some(index) = self.stack.iter().rposition(|e| e.name == name) else {
            return;
        };
        while self.stack.len() > index {
            let Some(element) = self.stack.pop() else {
                break;
            };
            self.close(element);
        }
    }

    fn close(&mut self, element: Element) {
        if element.link {
            self.builder.end_link();
        }
        if !self.in_body {
            return;
        }
        match element.name.as_slice() {
            b"section" => self.builder.end_section(),
            b"body" => {
                self.builder.end_paragraph();
                self.in_body = false;
                if self.bodies > 1 {
                    self.builder.end_section();
                }
            }
            b"title" => {
                self.builder.end_paragraph();
                if let Some(lines) = self.title.take() {
                    let title = lines
                        .iter()
                        .map(|line| line.trim())
                        .filter(|line| !line.is_empty())
                        .collect::<Vec<_>>()
                        .join(" ");
                    self.builder.set_section_title(&title);
                }
            }
            b"p" | b"v" | b"subtitle" | b"text-author" | b"tr" => {
                self.builder.end_paragraph();
            }
            b"poem" | b"stanza" | b"epigraph" | b"cite" | b"annotation" | b"table" => {
                self.builder.end_paragraph();
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(binary) = self.binary.as_mut() {
            binary.data.push_str(text);
            return;
        }
        if !self.in_body || !self.builder.has_open_paragraph() {
            return;
        }
        if let Some(last) = self.title.as_mut().and_then(|lines| lines.last_mut()) {
            last.push_str(text);
        }
        let style = self.style();
        self.builder.add_text(text, style);
    }

    fn finish_binary(&mut self) {
        let Some(binary) = self.binary.take() else {
            return;
        };
        if binary.id.is_empty() {
            self.builder.diagnostic("binary without id skipped");
            return;
        }
        match decode_base64(&binary.data) {
            Some(data) => {
                let media_type = binary
                    .content_type
                    .filter(|t| !t.trim().is_empty())
                    .or_else(|| detect_image_type(&data).map(str::to_string))
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                self.builder.add_resource(binary.id, media_type, data);
            }
            None => self
                .builder
                .diagnostic(format!("binary `{}` is not valid base64", binary.id)),
        }
    }

    fn anchor(&mut self, id: Option<String>) {
        if let Some(id) = id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) {
            self.builder.anchor(id);
        }
    }
}
