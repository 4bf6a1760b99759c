//! Format-independent document model.
//!
//! This module contains:
//! - [`BookModel`], the parsed content of one book
//! - Sections, paragraphs and runs of styled text
//! - [`Position`] addressing used by links and the table of contents
//! - Embedded resources (images) keyed by id
//! - [`ModelBuilder`], the only way plugins construct a model
//!
//! Paragraphs are stored flat in document order so consumers can navigate
//! randomly; sections describe the tree over paragraph ranges.

mod builder;
mod links;

pub use builder::{BuiltModel, ModelBuilder, TocDraft};
pub use links::{
    LinkRef, LinkTarget, is_external_href, percent_decode, resolve_relative_path, split_fragment,
};

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::book::Book;
use crate::format::FormatType;

/// A location inside a [`BookModel`]: a paragraph and a run offset within it.
///
/// `run == paragraph.runs().len()` addresses the end of the paragraph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Position {
    pub paragraph: usize,
    pub run: usize,
}

impl Position {
    pub const START: Position = Position {
        paragraph: 0,
        run: 0,
    };

    pub fn new(paragraph: usize, run: usize) -> Self {
        Self { paragraph, run }
    }

    pub fn paragraph(paragraph: usize) -> Self {
        Self { paragraph, run: 0 }
    }
}

/// Character-level styling of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub code: bool,
    pub superscript: bool,
    pub subscript: bool,
}

impl TextStyle {
    pub const PLAIN: TextStyle = TextStyle {
        bold: false,
        italic: false,
        underline: false,
        strikethrough: false,
        code: false,
        superscript: false,
        subscript: false,
    };

    pub fn is_plain(&self) -> bool {
        *self == Self::PLAIN
    }

    /// Union of two styles (nested markup accumulates).
    pub fn merge(self, other: TextStyle) -> TextStyle {
        TextStyle {
            bold: self.bold || other.bold,
            italic: self.italic || other.italic,
            underline: self.underline || other.underline,
            strikethrough: self.strikethrough || other.strikethrough,
            code: self.code || other.code,
            superscript: self.superscript || other.superscript,
            subscript: self.subscript || other.subscript,
        }
    }

    pub fn bold() -> Self {
        TextStyle {
            bold: true,
            ..Self::PLAIN
        }
    }

    pub fn italic() -> Self {
        TextStyle {
            italic: true,
            ..Self::PLAIN
        }
    }
}

/// Non-text markers inside a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
#[cfg_attr(feature = "cli", serde(rename_all = "snake_case"))]
pub enum Control {
    LineBreak,
    PageBreak,
    /// Horizontal rule / scene break.
    Rule,
}

/// A typed run inside a paragraph.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
#[cfg_attr(feature = "cli", serde(tag = "type", rename_all = "snake_case"))]
pub enum Run {
    Text {
        text: String,
    },
    Styled {
        text: String,
        style: TextStyle,
    },
    Link {
        text: String,
        style: TextStyle,
        target: LinkTarget,
    },
    Image {
        resource: String,
        #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Option::is_none"))]
        alt: Option<String>,
    },
    Control {
        control: Control,
    },
}

impl Run {
    /// Text carried by this run; empty for images and controls.
    pub fn text(&self) -> &str {
        match self {
            Run::Text { text } | Run::Styled { text, .. } | Run::Link { text, .. } => text,
            Run::Image { .. } | Run::Control { .. } => "",
        }
    }

    pub fn style(&self) -> TextStyle {
        match self {
            Run::Styled { style, .. } | Run::Link { style, .. } => *style,
            _ => TextStyle::PLAIN,
        }
    }

    pub fn link_target(&self) -> Option<&LinkTarget> {
        match self {
            Run::Link { target, .. } => Some(target),
            _ => None,
        }
    }
}

/// Block-level role of a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
#[cfg_attr(feature = "cli", serde(rename_all = "snake_case"))]
pub enum ParagraphKind {
    Text,
    /// Heading with level 1-6.
    Heading(u8),
    Subtitle,
    Epigraph,
    Quote,
    Verse,
    Code,
    /// Deliberate vertical space; carries no runs.
    EmptyLine,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Paragraph {
    kind: ParagraphKind,
    runs: Vec<Run>,
}

impl Paragraph {
    pub(crate) fn new(kind: ParagraphKind, runs: Vec<Run>) -> Self {
        Self { kind, runs }
    }

    pub fn kind(&self) -> ParagraphKind {
        self.kind
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Concatenated text of the paragraph; line breaks become `\n`.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for run in &self.runs {
            match run {
                Run::Control {
                    control: Control::LineBreak,
                } => text.push('\n'),
                other => text.push_str(other.text()),
            }
        }
        text
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// A node of the section tree, covering a contiguous paragraph range.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Section {
    title: Option<String>,
    start: usize,
    end: usize,
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Vec::is_empty"))]
    children: Vec<Section>,
}

impl Section {
    pub(crate) fn new(title: Option<String>, range: Range<usize>, children: Vec<Section>) -> Self {
        Self {
            title,
            start: range.start,
            end: range.end,
            children,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Paragraph indices covered, including those of child sections.
    pub fn paragraphs(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn children(&self) -> &[Section] {
        &self.children
    }

    pub fn position(&self) -> Position {
        Position::paragraph(self.start)
    }

    pub fn contains(&self, paragraph: usize) -> bool {
        (self.start..self.end).contains(&paragraph)
    }
}

/// A table of contents entry (hierarchical).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct TocEntry {
    pub title: String,
    pub position: Position,
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Vec::is_empty"))]
    pub children: Vec<TocEntry>,
}

/// An embedded binary resource (image, font, ...).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Resource {
    pub media_type: String,
    #[cfg_attr(feature = "cli", serde(skip))]
    pub data: Vec<u8>,
}

/// The parsed content of one [`Book`].
///
/// A model is bound to the book it was allocated for and is populated by a
/// single plugin call. It has no public mutators: once the call returns the
/// model is read-only. Reloading a book produces a new model.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct BookModel {
    path: PathBuf,
    format: FormatType,
    #[cfg_attr(feature = "cli", serde(skip))]
    encoding: Option<String>,
    sections: Vec<Section>,
    paragraphs: Vec<Paragraph>,
    toc: Vec<TocEntry>,
    resources: BTreeMap<String, Resource>,
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Vec::is_empty"))]
    diagnostics: Vec<String>,
}

impl BookModel {
    /// Allocate an empty model bound to `book`, to be read as `format`.
    pub fn bound_to(book: &Book, format: FormatType) -> Self {
        Self {
            path: book.path().to_path_buf(),
            format,
            encoding: book.encoding().map(str::to_string),
            sections: Vec::new(),
            paragraphs: Vec::new(),
            toc: Vec::new(),
            resources: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Install the output of a successful build.
    pub(crate) fn install(&mut self, built: BuiltModel) {
        self.sections = built.sections;
        self.paragraphs = built.paragraphs;
        self.toc = built.toc;
        self.resources = built.resources;
        self.diagnostics = built.diagnostics;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FormatType {
        self.format
    }

    /// Encoding override inherited from the book.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Top-level sections in reading order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.paragraphs
    }

    pub fn paragraph(&self, index: usize) -> Option<&Paragraph> {
        self.paragraphs.get(index)
    }

    pub fn paragraph_count(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    pub fn toc(&self) -> &[TocEntry] {
        &self.toc
    }

    pub fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Malformed fragments that were skipped while reading.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// True when the model was produced by best-effort recovery.
    pub fn is_degraded(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// Whether `position` addresses a location inside this model.
    pub fn contains(&self, position: Position) -> bool {
        self.paragraphs
            .get(position.paragraph)
            .is_some_and(|p| position.run <= p.runs.len())
    }

    /// Innermost section containing a paragraph.
    pub fn section_for(&self, paragraph: usize) -> Option<&Section> {
        let mut current = self.sections.iter().find(|s| s.contains(paragraph))?;
        while let Some(child) = current.children.iter().find(|c| c.contains(paragraph)) {
            current = child;
        }
        Some(current)
    }

    /// All internal links as `(source, target)` pairs.
    pub fn internal_links(&self) -> impl Iterator<Item = (Position, Position)> + '_ {
        self.paragraphs.iter().enumerate().flat_map(|(p, paragraph)| {
            paragraph
                .runs
                .iter()
                .enumerate()
                .filter_map(move |(r, run)| match run.link_target() {
                    Some(LinkTarget::Internal(target)) => Some((Position::new(p, r), *target)),
                    _ => None,
                })
        })
    }

    /// Flattened TOC entries, depth-first.
    pub fn toc_entries(&self) -> Vec<&TocEntry> {
        fn walk<'a>(entries: &'a [TocEntry], out: &mut Vec<&'a TocEntry>) {
            for entry in entries {
                out.push(entry);
                walk(&entry.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.toc, &mut out);
        out
    }

    /// Whole-book plain text, one paragraph per line.
    pub fn plain_text(&self) -> String {
        self.paragraphs
            .iter()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderConfig;

    fn sample_model() -> BookModel {
        let config = ReaderConfig::default();
        let mut builder = ModelBuilder::new(&config);
        builder.begin_section(Some("One".into()));
        builder.begin_paragraph(ParagraphKind::Heading(1));
        builder.add_text("One", TextStyle::PLAIN);
        builder.end_paragraph();
        builder.begin_section(Some("One.A".into()));
        builder.add_text("Nested", TextStyle::PLAIN);
        builder.end_section();
        builder.end_section();
        builder.begin_section(None);
        builder.anchor("two");
        builder.add_text("Second", TextStyle::italic());
        builder.end_section();
        builder.begin_link(LinkRef::Anchor("two".into()));
        builder.add_text("back", TextStyle::PLAIN);
        builder.end_link();

        let built = builder.finish().unwrap();
        let mut model = BookModel::bound_to(&Book::new("x.fb2"), FormatType::Fb2);
        model.install(built);
        model
    }

    #[test]
    fn test_section_for_finds_innermost() {
        let model = sample_model();
        assert_eq!(model.sections().len(), 3);
        assert_eq!(model.section_for(0).unwrap().title(), Some("One"));
        assert_eq!(model.section_for(1).unwrap().title(), Some("One.A"));
        assert!(model.section_for(99).is_none());
    }

    #[test]
    fn test_internal_links_resolve() {
        let model = sample_model();
        let links: Vec<_> = model.internal_links().collect();
        assert_eq!(links.len(), 1);
        let (_, target) = links[0];
        assert!(model.contains(target));
        assert_eq!(model.paragraph(target.paragraph).unwrap().text(), "Second");
    }

    #[test]
    fn test_contains_allows_end_of_paragraph() {
        let model = sample_model();
        let runs = model.paragraph(0).unwrap().runs().len();
        assert!(model.contains(Position::new(0, runs)));
        assert!(!model.contains(Position::new(0, runs + 1)));
        assert!(!model.contains(Position::paragraph(model.paragraph_count())));
    }

    #[test]
    fn test_plain_text() {
        let model = sample_model();
        assert_eq!(model.plain_text(), "One\nNested\nSecond\nback");
    }

    #[test]
    fn test_style_merge() {
        let style = TextStyle::bold().merge(TextStyle::italic());
        assert!(style.bold && style.italic);
        assert!(!style.is_plain());
        assert!(TextStyle::default().is_plain());
    }
}
