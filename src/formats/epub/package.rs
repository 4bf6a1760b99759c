//! Parsing of the EPUB package documents: `container.xml`, the OPF
//! package, the NCX table of contents and the EPUB 3 navigation document.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::book::{Metadata, Series};
use crate::error::{Error, Result};
use crate::model::{TocDraft, resolve_relative_path};
use crate::util::{attr, local_name, resolve_entity, strip_bom};

pub(super) const CONTAINER_PATH: &str = "META-INF/container.xml";

#[derive(Debug, Clone)]
pub(super) struct ManifestItem {
    /// Full archive path.
    pub path: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl ManifestItem {
    fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|props| props.split_ascii_whitespace().any(|p| p == property))
    }
}

#[derive(Debug, Clone, Default)]
pub(super) struct Package {
    pub metadata: Metadata,
    pub manifest: HashMap<String, ManifestItem>,
    /// Archive paths in reading order.
    pub spine: Vec<String>,
    pub ncx: Option<String>,
    pub nav: Option<String>,
}

impl Package {
    pub fn media_type_of(&self, path: &str) -> Option<&str> {
        self.manifest
            .values()
            .find(|item| item.path == path)
            .map(|item| item.media_type.as_str())
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    Ok(String::from_utf8(strip_bom(bytes).to_vec())?)
}

/// Path of the OPF package from `META-INF/container.xml`.
pub(super) fn parse_container_xml(bytes: &[u8]) -> Result<String> {
    let content = utf8(bytes)?;
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                if let Some(path) = attr(&e, b"full-path").filter(|p| !p.trim().is_empty()) {
                    return Ok(path.trim().to_string());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Err(Error::malformed("container.xml names no rootfile"))
}

/// Parse the OPF package document located at `opf_path`.
pub(super) fn parse_opf(bytes: &[u8], opf_path: &str) -> Result<Package> {
    let content = utf8(bytes)?;
    let mut reader = Reader::from_str(&content);

    let mut package = Package::default();
    let mut spine_ids: Vec<String> = Vec::new();
    let mut toc_id: Option<String> = None;
    let mut epub2_cover_id: Option<String> = None;

    let mut in_metadata = false;
    // (local name, meta key, id) of the open metadata element
    let mut current: Option<(String, Option<String>, Option<String>)> = None;
    let mut buf = String::new();
    let mut collections: HashMap<String, String> = HashMap::new();
    let mut positions: HashMap<String, f32> = HashMap::new();
    let mut calibre_series: Option<String> = None;
    let mut calibre_index: Option<f32> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"metadata" => in_metadata = true,
                    b"title" | b"creator" | b"language" | b"identifier" | b"description"
                    | b"subject" | b"meta"
                        if in_metadata =>
                    {
                        // `property@refined-id` for refinements, e.g. `group-position@c01`
                        let key = if local == b"meta" {
                            match (attr(&e, b"property"), attr(&e, b"refines")) {
                                (Some(p), Some(r)) => {
                                    Some(format!("{p}@{}", r.trim_start_matches('#')))
                                }
                                (p, _) => p,
                            }
                        } else {
                            None
                        };
                        current = Some((
                            String::from_utf8_lossy(local).into_owned(),
                            key,
                            attr(&e, b"id"),
                        ));
                        buf.clear();
                    }
                    b"spine" => toc_id = attr(&e, b"toc"),
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"item" => {
                        let (Some(id), Some(href)) = (attr(&e, b"id"), attr(&e, b"href")) else {
                            continue;
                        };
                        let item = ManifestItem {
                            path: resolve_relative_path(opf_path, href.trim()),
                            media_type: attr(&e, b"media-type").unwrap_or_default(),
                            properties: attr(&e, b"properties"),
                        };
                        package.manifest.insert(id, item);
                    }
                    b"itemref" => {
                        let linear = attr(&e, b"linear");
                        if let Some(idref) = attr(&e, b"idref")
                            && linear.as_deref() != Some("no")
                        {
                            spine_ids.push(idref);
                        }
                    }
                    b"meta" if in_metadata => {
                        let content = attr(&e, b"content").unwrap_or_default();
                        match attr(&e, b"name").as_deref() {
                            Some("cover") => epub2_cover_id = Some(content),
                            Some("calibre:series") => calibre_series = Some(content),
                            Some("calibre:series_index") => {
                                calibre_index = content.trim().parse().ok()
                            }
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if current.is_some() {
                    buf.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if current.is_some()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    buf.push_str(&resolved);
                }
            }
            Event::End(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if local == b"metadata" {
                    in_metadata = false;
                }
                let Some((element, key, id)) = current.take() else {
                    continue;
                };
                if element.as_bytes() != local {
                    current = Some((element, key, id));
                    continue;
                }
                let text = std::mem::take(&mut buf).trim().to_string();
                let metadata = &mut package.metadata;
                match element.as_str() {
                    "title" if metadata.title.is_empty() => metadata.title = text,
                    "creator" => metadata.authors.push(text),
                    "language" if metadata.language.is_none() => metadata.language = Some(text),
                    "identifier" if metadata.identifier.is_none() => {
                        metadata.identifier = Some(text)
                    }
                    "description" => metadata.description = Some(text),
                    "subject" => metadata.tags.push(text),
                    "meta" => match key.as_deref() {
                        Some("belongs-to-collection") => {
                            collections.insert(id.unwrap_or_default(), text);
                        }
                        Some(k) if k.starts_with("group-position@") => {
                            if let Ok(position) = text.parse() {
                                positions.insert(k["group-position@".len()..].to_string(), position);
                            }
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // EPUB 3 collections win over calibre's series metadata.
    let collection = collections
        .iter()
        .min_by(|a, b| a.0.cmp(b.0))
        .map(|(id, name)| (name.clone(), positions.get(id).copied()));
    package.metadata.series = collection
        .or_else(|| calibre_series.map(|name| (name, calibre_index)))
        .map(|(name, index)| Series { name, index });

    let epub3_cover = package
        .manifest
        .values()
        .find(|item| item.has_property("cover-image"));
    package.metadata.cover = epub3_cover
        .or_else(|| epub2_cover_id.and_then(|id| package.manifest.get(&id)))
        .map(|item| item.path.clone());

    package.spine = spine_ids
        .iter()
        .filter_map(|id| package.manifest.get(id))
        .map(|item| item.path.clone())
        .collect();
    package.ncx = toc_id
        .and_then(|id| package.manifest.get(&id))
        .or_else(|| {
            package
                .manifest
                .values()
                .find(|item| item.media_type == "application/x-dtbncx+xml")
        })
        .map(|item| item.path.clone());
    package.nav = package
        .manifest
        .values()
        .find(|item| item.has_property("nav"))
        .map(|item| item.path.clone());

    if package.spine.is_empty() {
        return Err(Error::malformed("package spine is empty"));
    }
    Ok(package)
}

struct NavState {
    title: String,
    target: Option<String>,
    children: Vec<TocDraft>,
}

impl NavState {
    fn new() -> Self {
        Self {
            title: String::new(),
            target: None,
            children: Vec::new(),
        }
    }

    /// Attach this entry to `parent`; entries without a target hand their
    /// children up instead.
    fn attach(self, parent: &mut Vec<TocDraft>) {
        match self.target {
            Some(target) if !self.title.trim().is_empty() => parent.push(TocDraft {
                title: self.title,
                target,
                children: self.children,
            }),
            _ => parent.extend(self.children),
        }
    }
}

/// Parse an NCX document. Targets are resolved against `ncx_path`.
pub(super) fn parse_ncx(bytes: &[u8], ncx_path: &str) -> Result<Vec<TocDraft>> {
    let content = utf8(bytes)?;
    let mut reader = Reader::from_str(&content);

    let mut stack = vec![NavState::new()];
    let mut in_text = false;
    let mut in_nav_map = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"navMap" => in_nav_map = true,
                b"navPoint" if in_nav_map => stack.push(NavState::new()),
                b"text" => in_text = true,
                _ => {}
            },
            Event::Empty(e) if local_name(e.name().as_ref()) == b"content" => {
                if let (Some(src), Some(state)) = (attr(&e, b"src"), stack.last_mut()) {
                    state.target = Some(resolve_relative_path(ncx_path, src.trim()));
                }
            }
            Event::Text(e) => {
                if in_text && let Some(state) = stack.last_mut() {
                    state.title.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if in_text
                    && let Some(state) = stack.last_mut()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    state.title.push_str(&resolved);
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"text" => in_text = false,
                b"navMap" => in_nav_map = false,
                b"navPoint" if stack.len() > 1 => {
                    if let Some(state) = stack.pop()
                        && let Some(parent) = stack.last_mut()
                    {
                        state.attach(&mut parent.children);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let mut entries = Vec::new();
    while let Some(state) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => state.attach(&mut parent.children),
            None => entries = state.children,
        }
    }
    Ok(entries)
}

/// Parse the `toc` navigation of an EPUB 3 navigation document.
pub(super) fn parse_nav(bytes: &[u8], nav_path: &str) -> Result<Vec<TocDraft>> {
    let content = utf8(bytes)?;
    let mut reader = Reader::from_str(&content);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut stack = vec![NavState::new()];
    let mut in_toc = false;
    let mut in_label = false;
    let mut done = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"nav" => {
                    let is_toc = attr(&e, b"type")
                        .is_some_and(|t| t.split_ascii_whitespace().any(|t| t == "toc"));
                    if is_toc && !done {
                        in_toc = true;
                    }
                }
                b"li" if in_toc => stack.push(NavState::new()),
                b"a" if in_toc => {
                    if let Some(state) = stack.last_mut()
                        && let Some(href) = attr(&e, b"href")
                    {
                        state.target = Some(resolve_relative_path(nav_path, href.trim()));
                    }
                    in_label = true;
                }
                b"span" if in_toc => in_label = true,
                _ => {}
            },
            Event::Text(e) => {
                if in_label && let Some(state) = stack.last_mut() {
                    state.title.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if in_label
                    && let Some(state) = stack.last_mut()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    state.title.push_str(&resolved);
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"a" | b"span" => in_label = false,
                b"li" if in_toc && stack.len() > 1 => {
                    if let Some(mut state) = stack.pop()
                        && let Some(parent) = stack.last_mut()
                    {
                        state.title = state.title.split_whitespace().collect::<Vec<_>>().join(" ");
                        state.attach(&mut parent.children);
                    }
                }
                b"nav" if in_toc => {
                    in_toc = false;
                    done = true;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(stack.into_iter().next().map(|s| s.children).unwrap_or_default())
}
