//! Incremental construction of a [`BookModel`](super::BookModel).
//!
//! Plugins stream document events into a [`ModelBuilder`] (sections,
//! paragraphs, text, links, images, anchors) and never touch the model
//! directly. [`ModelBuilder::finish`] closes whatever is still open, resolves
//! anchor keys to positions and checks referential integrity, so a model that
//! reaches the caller never holds a dangling link.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use super::{
    Control, LinkRef, LinkTarget, Paragraph, ParagraphKind, Position, Resource, Run, Section,
    TextStyle, TocEntry,
};
use crate::config::ReaderConfig;
use crate::error::{Error, Result};

/// A table-of-contents entry whose target is still an anchor key.
#[derive(Debug, Clone, PartialEq)]
pub struct TocDraft {
    pub title: String,
    pub target: String,
    pub children: Vec<TocDraft>,
}

impl TocDraft {
    pub fn new(title: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            target: target.into(),
            children: Vec::new(),
        }
    }
}

/// Validated output of [`ModelBuilder::finish`].
#[derive(Debug)]
pub struct BuiltModel {
    pub(crate) sections: Vec<Section>,
    pub(crate) paragraphs: Vec<Paragraph>,
    pub(crate) toc: Vec<TocEntry>,
    pub(crate) resources: BTreeMap<String, Resource>,
    pub(crate) diagnostics: Vec<String>,
}

enum DraftRun {
    Done(Run),
    Link {
        text: String,
        style: TextStyle,
        target: LinkRef,
    },
}

impl DraftRun {
    fn text_mut(&mut self) -> Option<&mut String> {
        match self {
            DraftRun::Done(Run::Text { text })
            | DraftRun::Done(Run::Styled { text, .. })
            | DraftRun::Link { text, .. } => Some(text),
            _ => None,
        }
    }

    fn ends_with_space(&self) -> bool {
        match self {
            DraftRun::Done(Run::Control {
                control: Control::LineBreak,
            }) => true,
            DraftRun::Done(run) => run.text().ends_with(' '),
            DraftRun::Link { text, .. } => text.ends_with(' '),
        }
    }
}

struct DraftParagraph {
    kind: ParagraphKind,
    runs: Vec<DraftRun>,
}

struct OpenSection {
    title: Option<String>,
    start: usize,
    children: Vec<Section>,
    implicit: bool,
}

/// Streaming builder for a book model.
pub struct ModelBuilder {
    max_paragraphs: usize,
    max_resource_bytes: usize,
    paragraphs: Vec<DraftParagraph>,
    current: Option<DraftParagraph>,
    /// Set when an anchor points at the end of the current paragraph, so the
    /// next text must not be merged into the preceding run.
    run_barrier: bool,
    open: Vec<OpenSection>,
    sections: Vec<Section>,
    link: Option<LinkRef>,
    anchors: HashMap<String, Position>,
    toc: Vec<TocDraft>,
    resources: BTreeMap<String, Resource>,
    diagnostics: Vec<String>,
    full: bool,
}

impl ModelBuilder {
    pub fn new(config: &ReaderConfig) -> Self {
        Self {
            max_paragraphs: config.max_paragraphs.max(1),
            max_resource_bytes: config.max_resource_bytes,
            paragraphs: Vec::new(),
            current: None,
            run_barrier: false,
            open: Vec::new(),
            sections: Vec::new(),
            link: None,
            anchors: HashMap::new(),
            toc: Vec::new(),
            resources: BTreeMap::new(),
            diagnostics: Vec::new(),
            full: false,
        }
    }

    // ========================================================================
    // Sections
    // ========================================================================

    /// Open a section nested in the current one.
    ///
    /// Content added before any section is opened goes into an implicit
    /// top-level section, which is closed when the next explicit section
    /// begins.
    pub fn begin_section(&mut self, title: Option<String>) {
        self.end_paragraph();
        if self.open.len() == 1 && self.open[0].implicit {
            self.close_section();
        }
        self.open.push(OpenSection {
            title: title.map(|t| collapse_whitespace(&t)).filter(|t| !t.is_empty()),
            start: self.paragraphs.len(),
            children: Vec::new(),
            implicit: false,
        });
    }

    /// Close the innermost open section. Unbalanced calls are ignored.
    pub fn end_section(&mut self) {
        self.end_paragraph();
        if self.open.last().is_some_and(|s| !s.implicit) {
            self.close_section();
        }
    }

    /// Title the innermost open section if it has none yet.
    pub fn set_section_title(&mut self, title: &str) {
        let title = collapse_whitespace(title);
        if title.is_empty() {
            return;
        }
        if let Some(section) = self.open.last_mut() {
            section.title.get_or_insert(title);
        }
    }

    /// Number of explicitly opened sections.
    pub fn section_depth(&self) -> usize {
        self.open.iter().filter(|s| !s.implicit).count()
    }

    fn ensure_section(&mut self) {
        if self.open.is_empty() {
            self.open.push(OpenSection {
                title: None,
                start: self.paragraphs.len(),
                children: Vec::new(),
                implicit: true,
            });
        }
    }

    fn close_section(&mut self) {
        let Some(open) = self.open.pop() else {
            return;
        };
        let end = self.paragraphs.len();
        if open.start == end {
            return;
        }
        let section = Section::new(open.title, open.start..end, open.children);
        match self.open.last_mut() {
            Some(parent) => parent.children.push(section),
            None => self.sections.push(section),
        }
    }

    // ========================================================================
    // Paragraphs and runs
    // ========================================================================

    /// Start a paragraph, closing any open one (paragraphs do not nest).
    pub fn begin_paragraph(&mut self, kind: ParagraphKind) {
        self.end_paragraph();
        if self.full {
            return;
        }
        self.ensure_section();
        self.current = Some(DraftParagraph {
            kind,
            runs: Vec::new(),
        });
        self.run_barrier = false;
    }

    /// Close the open paragraph. Empty paragraphs are discarded unless they
    /// are deliberate empty lines.
    pub fn end_paragraph(&mut self) {
        let Some(mut paragraph) = self.current.take() else {
            return;
        };
        trim_trailing_space(&mut paragraph.runs);
        if paragraph.runs.is_empty() && paragraph.kind != ParagraphKind::EmptyLine {
            return;
        }
        if self.paragraphs.len() >= self.max_paragraphs {
            self.mark_full();
            return;
        }
        self.paragraphs.push(paragraph);
    }

    pub fn has_open_paragraph(&self) -> bool {
        self.current.is_some()
    }

    /// Whether the paragraph limit was reached; plugins may stop reading.
    pub fn is_full(&self) -> bool {
        self.full || self.paragraphs.len() >= self.max_paragraphs
    }

    /// Add flowing text. Runs of whitespace collapse to a single space and
    /// whitespace at the start of a paragraph is dropped.
    pub fn add_text(&mut self, text: &str, style: TextStyle) {
        if text.is_empty() {
            return;
        }
        let collapsed = collapse_inline(text);
        if self.current.is_none() && collapsed.trim().is_empty() {
            return;
        }
        let Some(paragraph) = self.paragraph_for_run() else {
            return;
        };
        let at_start = paragraph.runs.last().is_none_or(DraftRun::ends_with_space);
        let collapsed = if at_start {
            collapsed.trim_start()
        } else {
            collapsed.as_str()
        };
        if collapsed.is_empty() {
            return;
        }
        let link = self.link.clone();
        self.push_text(collapsed, style, link);
    }

    /// Add text whose whitespace is significant (preformatted blocks, plain
    /// text lines). Newlines become line-break controls.
    pub fn add_text_verbatim(&mut self, text: &str, style: TextStyle) {
        if self.paragraph_for_run().is_none() {
            return;
        }
        let link = self.link.clone();
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                self.push_run(Run::Control {
                    control: Control::LineBreak,
                });
            }
            let line = line.strip_suffix('\r').unwrap_or(line);
            if !line.is_empty() {
                self.push_text(line, style, link.clone());
            }
        }
    }

    /// Following text becomes part of a link until [`end_link`](Self::end_link).
    pub fn begin_link(&mut self, target: LinkRef) {
        self.link = Some(target);
        self.run_barrier = true;
    }

    pub fn end_link(&mut self) {
        self.link = None;
        self.run_barrier = true;
    }

    /// Reference an image resource. The resource may be added later; images
    /// whose resource never appears are dropped by [`finish`](Self::finish).
    pub fn add_image(&mut self, resource: impl Into<String>, alt: Option<String>) {
        let alt = alt.map(|a| collapse_whitespace(&a)).filter(|a| !a.is_empty());
        self.push_run(Run::Image {
            resource: resource.into(),
            alt,
        });
    }

    pub fn add_control(&mut self, control: Control) {
        self.push_run(Run::Control { control });
    }

    fn paragraph_for_run(&mut self) -> Option<&mut DraftParagraph> {
        if self.full {
            return None;
        }
        if self.current.is_none() {
            self.begin_paragraph(ParagraphKind::Text);
        }
        self.current.as_mut()
    }

    fn push_run(&mut self, run: Run) {
        if let Some(paragraph) = self.paragraph_for_run() {
            paragraph.runs.push(DraftRun::Done(run));
            self.run_barrier = false;
        }
    }

    fn push_text(&mut self, text: &str, style: TextStyle, link: Option<LinkRef>) {
        let barrier = self.run_barrier;
        let Some(paragraph) = self.current.as_mut() else {
            return;
        };
        if !barrier {
            if let Some(last) = paragraph.runs.last_mut() {
                let mergeable = match (&*last, &link) {
                    (DraftRun::Done(Run::Text { .. }), None) => style.is_plain(),
                    (DraftRun::Done(Run::Styled { style: s, .. }), None) => *s == style,
                    (
                        DraftRun::Link {
                            style: s,
                            target: t,
                            ..
                        },
                        Some(link),
                    ) => *s == style && t == link,
                    _ => false,
                };
                if mergeable {
                    if let Some(existing) = last.text_mut() {
                        existing.push_str(text);
                        return;
                    }
                }
            }
        }
        let run = match link {
            Some(target) => DraftRun::Link {
                text: text.to_string(),
                style,
                target,
            },
            None if style.is_plain() => DraftRun::Done(Run::Text {
                text: text.to_string(),
            }),
            None => DraftRun::Done(Run::Styled {
                text: text.to_string(),
                style,
            }),
        };
        paragraph.runs.push(run);
        self.run_barrier = false;
    }

    // ========================================================================
    // Anchors, TOC, resources
    // ========================================================================

    /// Register `key` at the current position: inside the open paragraph, or
    /// at the start of the next one. The first registration of a key wins.
    pub fn anchor(&mut self, key: impl Into<String>) {
        let key = key.into();
        if key.is_empty() || self.anchors.contains_key(&key) {
            return;
        }
        let position = match &self.current {
            Some(paragraph) => {
                self.run_barrier = true;
                Position::new(self.paragraphs.len(), paragraph.runs.len())
            }
            None => Position::paragraph(self.paragraphs.len()),
        };
        self.anchors.insert(key, position);
    }

    pub fn has_anchor(&self, key: &str) -> bool {
        self.anchors.contains_key(key)
    }

    pub fn add_toc_entry(&mut self, entry: TocDraft) {
        self.toc.push(entry);
    }

    pub fn has_toc(&self) -> bool {
        !self.toc.is_empty()
    }

    /// Store an embedded resource. Oversized or duplicate resources are
    /// skipped with a diagnostic; returns whether it was stored.
    pub fn add_resource(
        &mut self,
        id: impl Into<String>,
        media_type: impl Into<String>,
        data: Vec<u8>,
    ) -> bool {
        let id = id.into();
        if data.len() > self.max_resource_bytes {
            self.diagnostic(format!(
                "resource `{id}` skipped: {} bytes exceeds limit",
                data.len()
            ));
            return false;
        }
        if self.resources.contains_key(&id) {
            self.diagnostic(format!("duplicate resource `{id}` ignored"));
            return false;
        }
        self.resources.insert(
            id,
            Resource {
                media_type: media_type.into(),
                data,
            },
        );
        true
    }

    pub fn has_resource(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    /// Record a skipped malformed fragment.
    pub fn diagnostic(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.diagnostics.push(message);
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    fn mark_full(&mut self) {
        if !self.full {
            self.full = true;
            let limit = self.max_paragraphs;
            self.diagnostic(format!("paragraph limit of {limit} reached, rest skipped"));
        }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Close everything, resolve links and the table of contents, and check
    /// referential integrity.
    ///
    /// Fails with `MalformedInput` when no content was produced or an
    /// internal link cannot be resolved to a position inside the model.
    pub fn finish(mut self) -> Result<BuiltModel> {
        self.end_paragraph();
        while !self.open.is_empty() {
            self.close_section();
        }

        if self.paragraphs.is_empty() {
            return Err(Error::malformed("document has no readable content"));
        }

        self.drop_missing_images();
        self.clamp_anchors();

        let mut paragraphs = Vec::with_capacity(self.paragraphs.len());
        for draft in std::mem::take(&mut self.paragraphs) {
            let mut runs = Vec::with_capacity(draft.runs.len());
            for run in draft.runs {
                runs.push(match run {
                    DraftRun::Done(run) => run,
                    DraftRun::Link {
                        text,
                        style,
                        target,
                    } => Run::Link {
                        text,
                        style,
                        target: self.resolve_link(target)?,
                    },
                });
            }
            paragraphs.push(Paragraph::new(draft.kind, runs));
        }

        let toc_drafts = std::mem::take(&mut self.toc);
        let mut toc = self.resolve_toc(toc_drafts);
        if toc.is_empty() {
            toc = toc_from_sections(&self.sections);
        }

        Ok(BuiltModel {
            sections: self.sections,
            paragraphs,
            toc,
            resources: self.resources,
            diagnostics: self.diagnostics,
        })
    }

    fn drop_missing_images(&mut self) {
        let mut dropped = Vec::new();
        for (index, paragraph) in self.paragraphs.iter_mut().enumerate() {
            let has_missing = paragraph.runs.iter().any(|run| {
                matches!(run, DraftRun::Done(Run::Image { resource, .. }) if !self.resources.contains_key(resource))
            });
            if !has_missing {
                continue;
            }
            // old run index -> new run index, for anchors into this paragraph
            let mut remap = Vec::with_capacity(paragraph.runs.len() + 1);
            let mut kept = Vec::with_capacity(paragraph.runs.len());
            for run in std::mem::take(&mut paragraph.runs) {
                remap.push(kept.len());
                match run {
                    DraftRun::Done(Run::Image { resource, alt })
                        if !self.resources.contains_key(&resource) =>
                    {
                        if let Some(alt) = alt {
                            kept.push(DraftRun::Done(Run::Text { text: alt }));
                        }
                        dropped.push(resource);
                    }
                    other => kept.push(other),
                }
            }
            remap.push(kept.len());
            if kept.is_empty() {
                paragraph.kind = ParagraphKind::EmptyLine;
            }
            paragraph.runs = kept;
            for position in self.anchors.values_mut() {
                if position.paragraph == index {
                    position.run = remap[position.run.min(remap.len() - 1)];
                }
            }
        }
        for resource in dropped {
            self.diagnostic(format!("image `{resource}` has no resource, dropped"));
        }
    }

    /// Anchors registered after the last paragraph point at its end.
    fn clamp_anchors(&mut self) {
        let last = self.paragraphs.len() - 1;
        let last_len = self.paragraphs[last].runs.len();
        for position in self.anchors.values_mut() {
            if position.paragraph > last {
                *position = Position::new(last, last_len);
            } else {
                let len = self.paragraphs[position.paragraph].runs.len();
                position.run = position.run.min(len);
            }
        }
    }

    fn resolve_link(&mut self, target: LinkRef) -> Result<LinkTarget> {
        match target {
            LinkRef::External(url) => Ok(LinkTarget::External(url)),
            LinkRef::Anchor(key) => {
                if let Some(position) = self.anchors.get(&key) {
                    return Ok(LinkTarget::Internal(*position));
                }
                // `doc#missing` still lands on the containing document
                if let Some((document, _)) = key.split_once('#') {
                    if let Some(position) = self.anchors.get(document).copied() {
                        self.diagnostic(format!(
                            "link fragment `{key}` not found, using `{document}`"
                        ));
                        return Ok(LinkTarget::Internal(position));
                    }
                }
                Err(Error::malformed(format!(
                    "internal link to `{key}` does not resolve"
                )))
            }
        }
    }

    fn resolve_toc(&mut self, drafts: Vec<TocDraft>) -> Vec<TocEntry> {
        let mut entries = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let children = self.resolve_toc(draft.children);
            let position = self.anchors.get(&draft.target).copied().or_else(|| {
                let (document, _) = draft.target.split_once('#')?;
                self.anchors.get(document).copied()
            });
            match position {
                Some(position) => {
                    let title = collapse_whitespace(&draft.title);
                    entries.push(TocEntry {
                        title,
                        position,
                        children,
                    });
                }
                None => {
                    self.diagnostic(format!(
                        "table of contents entry `{}` points to missing `{}`",
                        draft.title.trim(),
                        draft.target
                    ));
                    entries.extend(children);
                }
            }
        }
        entries
    }
}

fn toc_from_sections(sections: &[Section]) -> Vec<TocEntry> {
    let mut entries = Vec::new();
    for section in sections {
        let children = toc_from_sections(section.children());
        match section.title() {
            Some(title) => entries.push(TocEntry {
                title: title.to_string(),
                position: section.position(),
                children,
            }),
            None => entries.extend(children),
        }
    }
    entries
}

fn trim_trailing_space(runs: &mut Vec<DraftRun>) {
    while let Some(last) = runs.last_mut() {
        match last.text_mut() {
            Some(text) => {
                let trimmed = text.trim_end().len();
                text.truncate(trimmed);
                if text.is_empty() && !matches!(last, DraftRun::Link { .. }) {
                    runs.pop();
                } else {
                    return;
                }
            }
            None => return,
        }
    }
}

fn collapse_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() && c != '\u{a0}' {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ModelBuilder {
        ModelBuilder::new(&ReaderConfig::default())
    }

    #[test]
    fn test_empty_document_is_malformed() {
        let mut b = builder();
        b.begin_section(Some("Empty".into()));
        b.add_text("   ", TextStyle::PLAIN);
        b.end_section();
        assert!(b.finish().unwrap_err().is_malformed());
    }

    #[test]
    fn test_whitespace_collapses_across_runs() {
        let mut b = builder();
        b.add_text("  Hello,   ", TextStyle::PLAIN);
        b.add_text(" world ", TextStyle::bold());
        b.add_text("!  ", TextStyle::PLAIN);
        let built = b.finish().unwrap();
        let paragraph = &built.paragraphs[0];
        assert_eq!(paragraph.text(), "Hello, world !");
        assert_eq!(paragraph.runs().len(), 3);
    }

    #[test]
    fn test_plain_text_merges() {
        let mut b = builder();
        b.add_text("a ", TextStyle::PLAIN);
        b.add_text("b", TextStyle::PLAIN);
        let built = b.finish().unwrap();
        assert_eq!(built.paragraphs[0].runs().len(), 1);
    }

    #[test]
    fn test_implicit_section_wraps_leading_content() {
        let mut b = builder();
        b.add_text("Preface", TextStyle::PLAIN);
        b.begin_section(Some("Chapter".into()));
        b.add_text("Body", TextStyle::PLAIN);
        b.end_section();
        let built = b.finish().unwrap();
        assert_eq!(built.sections.len(), 2);
        assert_eq!(built.sections[0].title(), None);
        assert_eq!(built.sections[0].paragraphs(), 0..1);
        assert_eq!(built.sections[1].paragraphs(), 1..2);
    }

    #[test]
    fn test_unclosed_sections_are_closed() {
        let mut b = builder();
        b.begin_section(Some("A".into()));
        b.begin_section(Some("B".into()));
        b.add_text("deep", TextStyle::PLAIN);
        let built = b.finish().unwrap();
        assert_eq!(built.sections.len(), 1);
        assert_eq!(built.sections[0].children()[0].title(), Some("B"));
    }

    #[test]
    fn test_forward_link_resolves() {
        let mut b = builder();
        b.begin_link(LinkRef::Anchor("n1".into()));
        b.add_text("[1]", TextStyle::PLAIN);
        b.end_link();
        b.begin_paragraph(ParagraphKind::Text);
        b.anchor("n1");
        b.add_text("Note", TextStyle::PLAIN);
        let built = b.finish().unwrap();
        assert_eq!(
            built.paragraphs[0].runs()[0].link_target(),
            Some(&LinkTarget::Internal(Position::new(1, 0)))
        );
    }

    #[test]
    fn test_dangling_link_is_malformed() {
        let mut b = builder();
        b.begin_link(LinkRef::Anchor("nowhere".into()));
        b.add_text("x", TextStyle::PLAIN);
        b.end_link();
        let err = b.finish().unwrap_err();
        assert!(err.is_malformed());
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_fragment_falls_back_to_document() {
        let mut b = builder();
        b.anchor("ch1.xhtml");
        b.begin_link(LinkRef::Anchor("ch1.xhtml#gone".into()));
        b.add_text("x", TextStyle::PLAIN);
        b.end_link();
        let built = b.finish().unwrap();
        assert_eq!(built.diagnostics.len(), 1);
    }

    #[test]
    fn test_anchor_after_content_is_clamped() {
        let mut b = builder();
        b.add_text("only", TextStyle::PLAIN);
        b.end_paragraph();
        b.anchor("end");
        b.begin_link(LinkRef::Anchor("end".into()));
        b.end_link();
        b.add_toc_entry(TocDraft::new("End", "end"));
        let built = b.finish().unwrap();
        assert_eq!(built.toc[0].position, Position::new(0, 1));
    }

    #[test]
    fn test_dangling_toc_entry_promotes_children() {
        let mut b = builder();
        b.anchor("a");
        b.add_text("text", TextStyle::PLAIN);
        let mut parent = TocDraft::new("Missing", "zzz");
        parent.children.push(TocDraft::new("Child", "a"));
        b.add_toc_entry(parent);
        let built = b.finish().unwrap();
        assert_eq!(built.toc.len(), 1);
        assert_eq!(built.toc[0].title, "Child");
        assert_eq!(built.diagnostics.len(), 1);
    }

    #[test]
    fn test_toc_derived_from_titled_sections() {
        let mut b = builder();
        b.begin_section(Some("One".into()));
        b.add_text("1", TextStyle::PLAIN);
        b.begin_section(Some("One.A".into()));
        b.add_text("1a", TextStyle::PLAIN);
        b.end_section();
        b.end_section();
        let built = b.finish().unwrap();
        assert_eq!(built.toc.len(), 1);
        assert_eq!(built.toc[0].children[0].title, "One.A");
        assert_eq!(built.toc[0].children[0].position, Position::paragraph(1));
    }

    #[test]
    fn test_missing_image_is_dropped() {
        let mut b = builder();
        b.add_image("present", None);
        b.add_image("absent", Some("A picture".into()));
        b.add_resource("present", "image/png", vec![0x89, b'P']);
        let built = b.finish().unwrap();
        let runs = built.paragraphs[0].runs();
        assert!(matches!(&runs[0], Run::Image { resource, .. } if resource == "present"));
        assert_eq!(runs[1].text(), "A picture");
        assert_eq!(built.diagnostics.len(), 1);
    }

    #[test]
    fn test_oversized_resource_skipped() {
        let config = ReaderConfig::default().with_max_resource_bytes(4);
        let mut b = ModelBuilder::new(&config);
        assert!(!b.add_resource("big", "image/png", vec![0; 5]));
        assert!(b.add_resource("small", "image/png", vec![0; 4]));
        assert!(!b.add_resource("small", "image/png", vec![1]));
        assert_eq!(b.diagnostics().len(), 2);
    }

    #[test]
    fn test_paragraph_limit() {
        let config = ReaderConfig::default().with_max_paragraphs(2);
        let mut b = ModelBuilder::new(&config);
        for i in 0..5 {
            b.begin_paragraph(ParagraphKind::Text);
            b.add_text(&format!("p{i}"), TextStyle::PLAIN);
        }
        assert!(b.is_full());
        let built = b.finish().unwrap();
        assert_eq!(built.paragraphs.len(), 2);
        assert_eq!(built.diagnostics.len(), 1);
    }

    #[test]
    fn test_verbatim_keeps_line_breaks() {
        let mut b = builder();
        b.begin_paragraph(ParagraphKind::Code);
        b.add_text_verbatim("fn main() {\r\n    run();\n}", TextStyle::PLAIN);
        let built = b.finish().unwrap();
        assert_eq!(built.paragraphs[0].text(), "fn main() {\n    run();\n}");
    }

    #[test]
    fn test_empty_line_paragraph_is_kept() {
        let mut b = builder();
        b.add_text("a", TextStyle::PLAIN);
        b.begin_paragraph(ParagraphKind::EmptyLine);
        b.begin_paragraph(ParagraphKind::Text);
        b.add_text("b", TextStyle::PLAIN);
        let built = b.finish().unwrap();
        assert_eq!(built.paragraphs.len(), 3);
        assert_eq!(built.paragraphs[1].kind(), ParagraphKind::EmptyLine);
    }
}
