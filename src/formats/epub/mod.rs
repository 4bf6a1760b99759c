//! EPUB 2/3 reader.
//!
//! The OPF package supplies metadata and the reading order. Each spine
//! document becomes one top-level section, converted with the shared markup
//! reader. Resources are keyed by their archive path.

mod package;

use std::collections::HashSet;

use tracing::debug;

use crate::book::Metadata;
use crate::container::ZipContainer;
use crate::encoding::{decode_text_as, decode_text_with, html_declared_charset, xml_declared_encoding};
use crate::error::Result;
use crate::format::FormatType;
use crate::io::ByteSource;
use crate::markup::{self, MarkupHost, MarkupOptions};
use crate::model::{LinkRef, ModelBuilder, is_external_href, resolve_relative_path, split_fragment};
use crate::plugin::{FormatPlugin, ReadContext};
use crate::util::{decode_data_uri, detect_image_type, media_type_from_path};

use package::{CONTAINER_PATH, Package, parse_container_xml, parse_nav, parse_ncx, parse_opf};

#[derive(Debug, Clone, Copy, Default)]
pub struct EpubPlugin;

fn open_package(zip: &mut ZipContainer<'_>) -> Result<Package> {
    let container = zip.read(CONTAINER_PATH)?;
    let opf_path = parse_container_xml(&container)?;
    let opf = zip.read(&opf_path)?;
    parse_opf(&opf, &opf_path)
}

impl FormatPlugin for EpubPlugin {
    fn support_type(&self) -> FormatType {
        FormatType::Epub
    }

    fn read_metadata(&self, source: &dyn ByteSource, _ctx: &ReadContext<'_>) -> Result<Metadata> {
        let mut zip = ZipContainer::open(source)?;
        Ok(open_package(&mut zip)?.metadata)
    }

    fn build_model(
        &self,
        source: &dyn ByteSource,
        ctx: &ReadContext<'_>,
        builder: &mut ModelBuilder,
    ) -> Result<()> {
        let mut zip = ZipContainer::open(source)?;
        let package = open_package(&mut zip)?;
        let spine: HashSet<String> = package.spine.iter().cloned().collect();

        for path in &package.spine {
            if builder.is_full() {
                break;
            }
            let bytes = match zip.read(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    builder.diagnostic(format!("spine item `{path}` skipped: {err}"));
                    continue;
                }
            };
            let text = decode_document(&bytes, ctx);

            builder.begin_section(None);
            builder.anchor(path.clone());
            let mut host = EpubHost {
                document: path,
                spine: &spine,
                package: &package,
                zip: &mut zip,
                max_resource_bytes: ctx.config.max_resource_bytes as u64,
                inline_images: 0,
            };
            markup::convert(&text, &mut host, builder, MarkupOptions::default());
            builder.end_section();
        }

        let toc = read_toc(&mut zip, &package);
        match toc {
            Ok(entries) => {
                for entry in entries {
                    builder.add_toc_entry(entry);
                }
            }
            Err(err) => builder.diagnostic(format!("table of contents skipped: {err}")),
        }
        Ok(())
    }
}

fn read_toc(zip: &mut ZipContainer<'_>, package: &Package) -> Result<Vec<crate::model::TocDraft>> {
    if let Some(ncx) = &package.ncx {
        let entries = parse_ncx(&zip.read(ncx)?, ncx)?;
        if !entries.is_empty() {
            return Ok(entries);
        }
    }
    match &package.nav {
        Some(nav) => parse_nav(&zip.read(nav)?, nav),
        None => Ok(Vec::new()),
    }
}

fn decode_document(bytes: &[u8], ctx: &ReadContext<'_>) -> String {
    if let Some(label) = ctx.encoding {
        return decode_text_as(bytes, label).into_owned();
    }
    let hint = xml_declared_encoding(bytes).or_else(|| html_declared_charset(bytes));
    decode_text_with(bytes, hint.as_deref(), ctx.config.fallback_encoding()).into_owned()
}

/// Resolves links and images relative to one spine document.
struct EpubHost<'a, 'z> {
    document: &'a str,
    spine: &'a HashSet<String>,
    package: &'a Package,
    zip: &'a mut ZipContainer<'z>,
    max_resource_bytes: u64,
    inline_images: usize,
}

impl MarkupHost for EpubHost<'_, '_> {
    fn resolve_link(&self, href: &str) -> LinkRef {
        let href = href.trim();
        if is_external_href(href) {
            return LinkRef::External(href.to_string());
        }
        let resolved = resolve_relative_path(self.document, href);
        let (path, _) = split_fragment(&resolved);
        if self.spine.contains(path) {
            LinkRef::Anchor(resolved)
        } else {
            // Points outside the reading order; keep it as an opaque reference.
            LinkRef::External(href.to_string())
        }
    }

    fn anchor_key(&self, id: &str) -> String {
        format!("{}#{id}", self.document)
    }

    fn image(&mut self, src: &str, builder: &mut ModelBuilder) -> Option<String> {
        if src.trim_start().starts_with("data:") {
            let (media_type, data) = decode_data_uri(src)?;
            self.inline_images += 1;
            let id = format!("{}#inline-{}", self.document, self.inline_images);
            return builder.add_resource(id.clone(), media_type, data).then_some(id);
        }

        let resolved = resolve_relative_path(self.document, src.trim());
        let (path, _) = split_fragment(&resolved);
        if builder.has_resource(path) {
            return Some(path.to_string());
        }
        let data = match self.zip.read_limited(path, self.max_resource_bytes) {
            Ok(data) => data,
            Err(err) => {
                debug!(path, error = %err, "image not loaded");
                return None;
            }
        };
        let media_type = self
            .package
            .media_type_of(path)
            .filter(|m| !m.is_empty())
            .or_else(|| detect_image_type(&data))
            .or_else(|| media_type_from_path(path))
            .unwrap_or("application/octet-stream")
            .to_string();
        builder
            .add_resource(path, media_type, data)
            .then(|| path.to_string())
    }
}
