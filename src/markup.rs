//! Lenient (X)HTML to model conversion.
//!
//! EPUB chapters, standalone HTML files and decoded MOBI text are all fed
//! through [`convert`]. Real-world markup is frequently not well-formed, so
//! the reader tolerates mismatched and unclosed tags, unknown entities and
//! void elements written without a slash. Syntax errors are recorded as
//! diagnostics on the builder and reading resumes after the bad fragment.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::model::{Control, LinkRef, ModelBuilder, ParagraphKind, TextStyle};
use crate::util::{attr, local_name, resolve_entity};

/// Give up on a document after this many syntax errors.
const MAX_ERRORS: usize = 16;

/// Format-specific services needed while converting markup.
pub trait MarkupHost {
    /// Turn an `href` into a link reference.
    fn resolve_link(&self, href: &str) -> LinkRef;

    /// Anchor key registered for an element `id`.
    fn anchor_key(&self, id: &str) -> String;

    /// Make the image at `src` available as a resource, returning its id.
    fn image(&mut self, src: &str, builder: &mut ModelBuilder) -> Option<String>;
}

/// How document structure maps onto sections.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupOptions {
    /// Each heading opens a section nested by heading level.
    pub split_headings: bool,
    /// `<mbp:pagebreak/>` starts a new top-level section.
    pub split_page_breaks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Block,
    Inline,
    Link,
    Skip,
    Pre,
}

struct Frame {
    name: Vec<u8>,
    kind: FrameKind,
    style: TextStyle,
    paragraph: Option<ParagraphKind>,
}

/// Convert one markup document into the builder.
pub fn convert(
    text: &str,
    host: &mut dyn MarkupHost,
    builder: &mut ModelBuilder,
    options: MarkupOptions,
) {
    let mut converter = Converter {
        host,
        builder,
        options,
        stack: Vec::new(),
        skip_depth: 0,
        pre_depth: 0,
        heading_sections: Vec::new(),
        heading_text: None,
    };
    converter.run(text);
}

struct Converter<'h, 'b> {
    host: &'h mut dyn MarkupHost,
    builder: &'b mut ModelBuilder,
    options: MarkupOptions,
    stack: Vec<Frame>,
    skip_depth: usize,
    pre_depth: usize,
    /// Levels of the heading sections opened by `split_headings`.
    heading_sections: Vec<u8>,
    heading_text: Option<String>,
}

impl Converter<'_, '_> {
    fn run(&mut self, text: &str) {
        let mut reader = Reader::from_str(text);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.check_comments = false;

        let mut errors = 0;
        loop {
            if self.builder.is_full() {
                break;
            }
            let before = reader.buffer_position();
            match reader.read_event() {
                Ok(Event::Start(e)) => self.start(&e, false),
                Ok(Event::Empty(e)) => self.start(&e, true),
                Ok(Event::End(e)) => {
                    let name = e.name();
                    self.end(&local_name(name.as_ref()).to_ascii_lowercase());
                }
                Ok(Event::Text(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    self.text(&text);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    self.text(&text);
                }
                Ok(Event::GeneralRef(e)) => {
                    let entity = String::from_utf8_lossy(e.as_ref()).into_owned();
                    match resolve_entity(&entity) {
                        Some(resolved) => self.text(&resolved),
                        None => self.text(&format!("&{entity};")),
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    errors += 1;
                    self.builder.diagnostic(format!(
                        "markup error at byte {}: {e}",
                        reader.error_position()
                    ));
                    if errors >= MAX_ERRORS || reader.buffer_position() == before {
                        self.builder
                            .diagnostic("too many markup errors, rest of document skipped");
                        break;
                    }
                }
            }
        }

        self.builder.end_link();
        self.builder.end_paragraph();
        while self.heading_sections.pop().is_some() {
            self.builder.end_section();
        }
    }

    fn style(&self) -> TextStyle {
        self.stack
            .iter()
            .fold(TextStyle::PLAIN, |acc, frame| acc.merge(frame.style))
    }

    /// Paragraph kind implied by the innermost block ancestors.
    fn context_kind(&self) -> ParagraphKind {
        self.stack
            .iter()
            .rev()
            .find_map(|frame| frame.paragraph)
            .unwrap_or(ParagraphKind::Text)
    }

    fn ensure_paragraph(&mut self) {
        if !self.builder.has_open_paragraph() {
            let kind = self.context_kind();
            self.builder.begin_paragraph(kind);
        }
    }

    fn start(&mut self, e: &BytesStart<'_>, empty: bool) {
        let name = e.name();
        let name = local_name(name.as_ref()).to_ascii_lowercase();

        if self.skip_depth > 0 && self.head_implicitly_closed_by(&name) {
            self.end(b"head");
        }

        if self.skip_depth > 0 {
            if !empty && !is_void(&name) {
                self.stack.push(frame(name, FrameKind::Skip));
                self.skip_depth += 1;
            }
            return;
        }

        let id = attr(e, b"id").or_else(|| {
            (name == b"a")
                .then(|| attr(e, b"name"))
                .flatten()
        });

        match name.as_slice() {
            b"br" => {
                if self.builder.has_open_paragraph() {
                    self.builder.add_control(Control::LineBreak);
                }
                return;
            }
            b"hr" => {
                self.register_anchor(id);
                self.builder.begin_paragraph(ParagraphKind::Text);
                self.builder.add_control(Control::Rule);
                self.builder.end_paragraph();
                return;
            }
            b"pagebreak" => {
                self.page_break();
                return;
            }
            b"img" | b"image" => {
                self.register_anchor(id);
                self.image(e);
                return;
            }
            b"meta" | b"link" | b"base" | b"col" | b"input" | b"wbr" | b"source" => return,
            _ => {}
        }

        if matches!(
            name.as_slice(),
            b"script" | b"style" | b"head" | b"noscript" | b"template"
        ) {
            if !empty {
                self.stack.push(frame(name, FrameKind::Skip));
                self.skip_depth += 1;
            }
            return;
        }

        if let Some(level) = heading_level(&name) {
            self.builder.end_paragraph();
            if self.options.split_headings {
                while self.heading_sections.last().is_some_and(|&open| open >= level) {
                    self.heading_sections.pop();
                    self.builder.end_section();
                }
                self.builder.begin_section(None);
                self.heading_sections.push(level);
            }
            self.register_anchor(id);
            if empty {
                return;
            }
            self.builder.begin_paragraph(ParagraphKind::Heading(level));
            self.heading_text = Some(String::new());
            let mut f = frame(name, FrameKind::Block);
            f.paragraph = Some(ParagraphKind::Heading(level));
            self.stack.push(f);
            return;
        }

        if let Some(paragraph) = block_paragraph(&name) {
            self.builder.end_paragraph();
            self.register_anchor(id);
            if empty {
                return;
            }
            let mut f = frame(name.clone(), FrameKind::Block);
            if name == b"pre" {
                f.kind = FrameKind::Pre;
                self.pre_depth += 1;
            }
            f.paragraph = paragraph;
            self.stack.push(f);
            if is_leaf_block(&name) {
                let kind = self.context_kind();
                self.builder.begin_paragraph(kind);
            }
            return;
        }

        if matches!(name.as_slice(), b"td" | b"th") && self.builder.has_open_paragraph() {
            self.builder.add_text(" ", TextStyle::PLAIN);
        }

        // inline
        self.register_anchor(id);
        if empty {
            return;
        }
        if name == b"a" {
            if let Some(href) = attr(e, b"href").filter(|h| !h.trim().is_empty()) {
                let target = self.host.resolve_link(&href);
                self.builder.begin_link(target);
                self.stack.push(frame(name, FrameKind::Link));
                return;
            }
        }
        let mut f = frame(name, FrameKind::Inline);
        f.style = inline_style(&f.name, e);
        self.stack.push(f);
    }

    /// `</head>` may be omitted: any element that cannot appear in the head
    /// ends it, unless it sits inside raw-text content such as a script.
    fn head_implicitly_closed_by(&self, name: &[u8]) -> bool {
        if is_head_content(name) {
            return false;
        }
        let Some(head) = self.stack.iter().rposition(|f| f.name == b"head") else {
            return false;
        };
        !self.stack[head + 1..].iter().any(|f| {
            matches!(
                f.name.as_slice(),
                b"script" | b"style" | b"template" | b"title" | b"noscript"
            )
        })
    }

    fn end(&mut self, name: &[u8]) {
        let Some(index) = self.stack.iter().rposition(|f| f.name == name) else {
            return;
        };
        while self.stack.len() > index {
            let Some(frame) = self.stack.pop() else {
                break;
            };
            match frame.kind {
                FrameKind::Skip => self.skip_depth = self.skip_depth.saturating_sub(1),
                FrameKind::Link => self.builder.end_link(),
                FrameKind::Pre => {
                    self.pre_depth = self.pre_depth.saturating_sub(1);
                    self.builder.end_paragraph();
                }
                FrameKind::Block => {
                    self.builder.end_paragraph();
                    if heading_level(&frame.name).is_some() {
                        if let Some(title) = self.heading_text.take() {
                            self.builder.set_section_title(&title);
                        }
                    }
                }
                FrameKind::Inline => {}
            }
        }
    }

    fn text(&mut self, text: &str) {
        if self.skip_depth > 0 || text.is_empty() {
            return;
        }
        let style = self.style();
        if self.pre_depth > 0 {
            self.ensure_paragraph();
            self.builder.add_text_verbatim(text, style);
            return;
        }
        if text.trim().is_empty() && !self.builder.has_open_paragraph() {
            return;
        }
        self.ensure_paragraph();
        if let Some(heading) = &mut self.heading_text {
            heading.push_str(text);
        }
        self.builder.add_text(text, style);
    }

    fn image(&mut self, e: &BytesStart<'_>) {
        let Some(src) = attr(e, b"src").or_else(|| attr(e, b"href")) else {
            return;
        };
        let Some(id) = self.host.image(&src, self.builder) else {
            self.builder
                .diagnostic(format!("image `{src}` could not be loaded"));
            return;
        };
        let alt = attr(e, b"alt");
        self.ensure_paragraph();
        self.builder.add_image(id, alt);
    }

    fn page_break(&mut self) {
        self.builder.end_paragraph();
        if self.options.split_page_breaks {
            while self.heading_sections.pop().is_some() {
                self.builder.end_section();
            }
            while self.builder.section_depth() > 0 {
                self.builder.end_section();
            }
            self.builder.begin_section(None);
        } else {
            self.builder.begin_paragraph(ParagraphKind::Text);
            self.builder.add_control(Control::PageBreak);
            self.builder.end_paragraph();
        }
    }

    fn register_anchor(&mut self, id: Option<String>) {
        if let Some(id) = id.filter(|id| !id.trim().is_empty()) {
            let key = self.host.anchor_key(id.trim());
            self.builder.anchor(key);
        }
    }
}

fn frame(name: Vec<u8>, kind: FrameKind) -> Frame {
    Frame {
        name,
        kind,
        style: TextStyle::PLAIN,
        paragraph: None,
    }
}

fn heading_level(name: &[u8]) -> Option<u8> {
    match name {
        [b'h', d @ b'1'..=b'6'] => Some(d - b'0'),
        _ => None,
    }
}

/// Block elements, with the paragraph kind they impose on their content.
fn block_paragraph(name: &[u8]) -> Option<Option<ParagraphKind>> {
    Some(match name {
        b"blockquote" => Some(ParagraphKind::Quote),
        b"pre" => Some(ParagraphKind::Code),
        b"p" | b"div" | b"li" | b"dd" | b"dt" | b"tr" | b"caption" | b"figcaption" => None,
        b"body" | b"section" | b"article" | b"aside" | b"nav" | b"header" | b"footer"
        | b"main" | b"ul" | b"ol" | b"dl" | b"table" | b"figure" | b"center" => None,
        _ => return None,
    })
}

/// Blocks that hold text directly rather than other blocks.
fn is_leaf_block(name: &[u8]) -> bool {
    matches!(
        name,
        b"p" | b"li" | b"dd" | b"dt" | b"tr" | b"pre" | b"caption" | b"figcaption"
    )
}

fn is_void(name: &[u8]) -> bool {
    matches!(
        name,
        b"br" | b"hr" | b"img" | b"meta" | b"link" | b"base" | b"col" | b"input" | b"wbr"
            | b"source"
    )
}

fn is_head_content(name: &[u8]) -> bool {
    matches!(
        name,
        b"head" | b"title" | b"meta" | b"link" | b"base" | b"script" | b"style" | b"noscript"
            | b"template"
    )
}

fn inline_style(name: &[u8], e: &BytesStart<'_>) -> TextStyle {
    let mut style = TextStyle::PLAIN;
    match name {
        b"b" | b"strong" => style.bold = true,
        b"i" | b"em" | b"cite" | b"var" | b"dfn" => style.italic = true,
        b"u" | b"ins" => style.underline = true,
        b"s" | b"strike" | b"del" => style.strikethrough = true,
        b"code" | b"tt" | b"kbd" | b"samp" => style.code = true,
        b"sup" => style.superscript = true,
        b"sub" => style.subscript = true,
        b"span" | b"font" => {
            if let Some(css) = attr(e, b"style") {
                let css = css.to_ascii_lowercase().replace(' ', "");
                style.bold = css.contains("font-weight:bold") || css.contains("font-weight:700");
                style.italic = css.contains("font-style:italic");
                style.underline = css.contains("text-decoration:underline");
            }
        }
        _ => {}
    }
    style
}
