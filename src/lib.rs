//! HTML thesis documents (with embedded CSS) to `.docx`.
//!
//! The conversion parses the HTML, extracts every `<style>` block into a
//! [`StyleSheet`](stylesheet::StyleSheet), walks `<body>` resolving each
//! element's cascaded style, and serializes the resulting
//! [`Document`](model::Document) as an OOXML package.

pub mod cascade;
pub mod config;
pub mod docx;
pub mod dom;
pub mod error;
pub mod format;
pub mod model;
pub mod picture;
pub mod selector;
pub mod storage;
pub mod stylesheet;
pub mod table;
pub mod token;
pub mod units;
pub mod walker;

use crate::cascade::StyleResolver;
use crate::error::ConvertError;
use crate::model::Document;
use crate::picture::{FsImageLoader, ImageLoader};
use crate::units::{StyleTables, UnitConverter, DEFAULT_TABLES};
use crate::walker::TreeWalker;
use std::path::PathBuf;
use tracing::{info, warn};

/// Label used in image placeholders unless configured otherwise.
pub const DEFAULT_PLACEHOLDER_LABEL: &str = "image";

/// Reusable conversion settings. Conversions share nothing mutable, so one
/// converter can serve any number of threads.
pub struct Converter {
    images: Box<dyn ImageLoader>,
    placeholder_label: String,
    tables: &'static StyleTables,
    title: Option<String>,
}

impl Default for Converter {
    fn default() -> Self {
        Self {
            images: Box::new(FsImageLoader::default()),
            placeholder_label: DEFAULT_PLACEHOLDER_LABEL.to_string(),
            tables: &DEFAULT_TABLES,
            title: None,
        }
    }
}

impl Converter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative image paths are resolved against `dir`.
    pub fn with_image_base_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.images = Box::new(FsImageLoader::new(dir));
        self
    }

    pub fn with_image_loader(mut self, loader: Box<dyn ImageLoader>) -> Self {
        self.images = loader;
        self
    }

    pub fn with_placeholder_label(mut self, label: impl Into<String>) -> Self {
        self.placeholder_label = label.into();
        self
    }

    pub fn with_style_tables(mut self, tables: &'static StyleTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Builds the document model without packaging it.
    pub fn build_document(&self, html: &str) -> Result<Document, ConvertError> {
        if html.trim().is_empty() {
            return Err(ConvertError::EmptyInput);
        }
        info!(len = html.len(), "starting conversion");

        // html5ever builds html/head/body around bare fragments itself; the
        // wrapper only pins the charset.
        let wrapped;
        let source = if html.to_ascii_lowercase().contains("<html") {
            html
        } else {
            wrapped = format!("<!doctype html><html><head><meta charset=\"utf-8\"></head><body>{html}</body></html>");
            wrapped.as_str()
        };

        let dom = dom::html5_parse(source);
        let sheet = stylesheet::extract_stylesheet(&dom.document);
        let resolver = StyleResolver::new(&sheet);
        let units = UnitConverter::new(self.tables);

        let Some(body) = dom::find_element(&dom.document, "body") else {
            warn!("document has no body");
            return Ok(Document {
                title: self.title.clone(),
                ..Document::default()
            });
        };

        let defaults = format::document_defaults(&resolver.resolve(&body), &units);
        let out = TreeWalker::new(resolver, units, self.images.as_ref(), &self.placeholder_label).walk(&body);

        Ok(Document {
            title: self.title.clone(),
            defaults,
            blocks: out.blocks,
            media: out.media,
        })
    }

    /// Converts `html` into the bytes of a `.docx` package.
    pub fn convert(&self, html: &str) -> Result<Vec<u8>, ConvertError> {
        let document = self.build_document(html)?;
        let bytes = docx::write_package(&document)?;
        info!(
            blocks = document.blocks.len(),
            media = document.media.len(),
            bytes = bytes.len(),
            "conversion finished"
        );
        Ok(bytes)
    }
}

/// Converts with default settings.
pub fn convert(html: &str) -> Result<Vec<u8>, ConvertError> {
    Converter::default().convert(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Block;

    #[test]
    fn empty_input_is_fatal() {
        assert!(matches!(convert(""), Err(ConvertError::EmptyInput)));
        assert!(matches!(convert("  \n\t"), Err(ConvertError::EmptyInput)));
    }

    #[test]
    fn fragments_are_accepted() {
        let doc = Converter::new().build_document("<p>hi</p>").unwrap();
        assert_eq!(doc.paragraphs().next().unwrap().text(), "hi");
    }

    #[test]
    fn body_style_sets_defaults_and_title_is_kept() {
        let html = r#"<html><head><style>body { font-family: SimSun; font-size: 小四; line-height: 1.5 }</style></head>
            <body><p>正文</p></body></html>"#;
        let doc = Converter::new()
            .with_title(Some("论文".into()))
            .build_document(html)
            .unwrap();
        assert_eq!(doc.title.as_deref(), Some("论文"));
        assert_eq!(doc.defaults.size_pt, Some(12.0));
        assert_eq!(doc.defaults.line_spacing, Some(1.5));
        assert_eq!(doc.defaults.font.unwrap().name, "宋体");
    }

    #[test]
    fn placeholder_label_is_configurable() {
        let doc = Converter::new()
            .with_placeholder_label("图片")
            .build_document(r#"<img src="nope.png" alt="示意图">"#)
            .unwrap();
        match &doc.blocks[0] {
            Block::Paragraph(p) => assert_eq!(p.text(), "[图片: 示意图]"),
            other => panic!("unexpected block {other:?}"),
        }
    }
}
