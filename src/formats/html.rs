//! Standalone HTML reader.
//!
//! Metadata comes from the document head (`<title>`, `<meta>` and the `lang`
//! attribute). Headings split the body into nested sections. Images are
//! loaded from files next to the document or from `data:` URIs.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::book::Metadata;
use crate::encoding::{decode_text_as, decode_text_with, detect_encoding, html_declared_charset, xml_declared_encoding};
use crate::error::Result;
use crate::format::FormatType;
use crate::io::ByteSource;
use crate::markup::{self, MarkupHost, MarkupOptions};
use crate::model::{LinkRef, ModelBuilder, is_external_href, percent_decode, split_fragment};
use crate::plugin::{FormatPlugin, ReadContext};
use crate::util::{attr, decode_data_uri, detect_image_type, local_name, media_type_from_path, resolve_entity};

/// The head is expected within this many bytes.
const HEAD_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlPlugin;

impl FormatPlugin for HtmlPlugin {
    fn support_type(&self) -> FormatType {
        FormatType::Html
    }

    fn read_metadata(&self, source: &dyn ByteSource, ctx: &ReadContext<'_>) -> Result<Metadata> {
        let head = source.read_prefix(0, HEAD_LEN)?;
        let (text, encoding) = decode(&head, ctx);
        let mut metadata = parse_head(&text);
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
        let mut host = HtmlHost {
            base: ctx.path.parent().map(Path::to_path_buf).unwrap_or_default(),
            max_resource_bytes: ctx.config.max_resource_bytes as u64,
            inline_images: 0,
        };
        let options = MarkupOptions {
            split_headings: true,
            split_page_breaks: false,
        };
        markup::convert(&text, &mut host, builder, options);
        Ok(())
    }
}

fn decode(bytes: &[u8], ctx: &ReadContext<'_>) -> (String, String) {
    if let Some(label) = ctx.encoding {
        return (decode_text_as(bytes, label).into_owned(), label.to_string());
    }
    let hint = xml_declared_encoding(bytes).or_else(|| html_declared_charset(bytes));
    let fallback = ctx.config.fallback_encoding();
    let encoding = detect_encoding(bytes, hint.as_deref(), fallback);
    let text = decode_text_with(bytes, hint.as_deref(), fallback).into_owned();
    (text, encoding.name().to_string())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum HeadField {
    None,
    Title,
}

/// Collect metadata from `<head>`, stopping at `<body>`.
fn parse_head(text: &str) -> Metadata {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.check_comments = false;

    let mut metadata = Metadata::default();
    let mut field = HeadField::None;
    let mut title = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.name();
                match local_name(name.as_ref()).to_ascii_lowercase().as_slice() {
                    b"html" => {
                        if let Some(lang) = attr(&e, b"lang").filter(|l| !l.trim().is_empty()) {
                            metadata.language = Some(lang.trim().to_string());
                        }
                    }
                    b"title" if title.is_empty() => field = HeadField::Title,
                    b"meta" => apply_meta(&mut metadata, attr(&e, b"name"), attr(&e, b"content")),
                    b"body" => break,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                if local_name(name.as_ref()).eq_ignore_ascii_case(b"title") {
                    field = HeadField::None;
                }
            }
            Ok(Event::Text(e)) if field == HeadField::Title => {
                title.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::GeneralRef(e)) if field == HeadField::Title => {
                let entity = String::from_utf8_lossy(e.as_ref());
                if let Some(resolved) = resolve_entity(&entity) {
                    title.push_str(&resolved);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "html head parse stopped");
                break;
            }
        }
    }

    metadata.title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    metadata
}

fn apply_meta(metadata: &mut Metadata, name: Option<String>, content: Option<String>) {
    let (Some(name), Some(content)) = (name, content) else {
        return;
    };
    let content = content.trim();
    if content.is_empty() {
        return;
    }
    match name.trim().to_ascii_lowercase().as_str() {
        "author" | "dc.creator" => metadata.authors.push(content.to_string()),
        "description" | "dc.description" => metadata.description = Some(content.to_string()),
        "keywords" | "dc.subject" => metadata.tags.extend(
            content
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from),
        ),
        "dc.language" | "language" => metadata.language = Some(content.to_string()),
        "dc.identifier" => metadata.identifier = Some(content.to_string()),
        _ => {}
    }
}

/// Resolves links and images for a document on disk.
struct HtmlHost {
    base: PathBuf,
    max_resource_bytes: u64,
    inline_images: usize,
}

impl HtmlHost {
    fn load_file(&self, path: &Path) -> Option<Vec<u8>> {
        let file = File::open(path).ok()?;
        let len = file.metadata().ok()?.len();
        if len > self.max_resource_bytes {
            debug!(path = %path.display(), len, "image exceeds size limit");
            return None;
        }
        let mut data = Vec::with_capacity(len as usize);
        file.take(self.max_resource_bytes).read_to_end(&mut data).ok()?;
        Some(data)
    }
}

impl MarkupHost for HtmlHost {
    fn resolve_link(&self, href: &str) -> LinkRef {
        LinkRef::parse_local(href)
    }

    fn anchor_key(&self, id: &str) -> String {
        id.to_string()
    }

    fn image(&mut self, src: &str, builder: &mut ModelBuilder) -> Option<String> {
        let src = src.trim();
        if src.starts_with("data:") {
            let (media_type, data) = decode_data_uri(src)?;
            self.inline_images += 1;
            let id = format!("inline-{}", self.inline_images);
            return builder.add_resource(id.clone(), media_type, data).then_some(id);
        }
        if is_external_href(src) {
            return None;
        }

        let (relative, _) = split_fragment(src);
        let relative = percent_decode(relative);
        if builder.has_resource(&relative) {
            return Some(relative);
        }
        let path = self.base.join(&relative);
        let data = self.load_file(&path)?;
        let media_type = detect_image_type(&data)
            .or_else(|| media_type_from_path(&relative))
            .unwrap_or("application/octet-stream")
            .to_string();
        builder
            .add_resource(relative.clone(), media_type, data)
            .then_some(relative)
    }
}
