//! Recursive walk over the HTML body producing document blocks.
//!
//! The current [`Section`] travels down the recursion as a plain value; a
//! container only changes it for its own subtree.

use crate::cascade::StyleResolver;
use crate::dom::{attr_get, classes, collapse_ws, element_children, find_descendants, has_class, tag_lower, text_content};
use crate::format::apply_paragraph_style;
use crate::model::{Alignment, Block, Media, Paragraph, ParagraphKind, Picture, Rgb, Run, RunFont};
use crate::picture::{probe, ImageLoader};
use crate::table::TableBuilder;
use crate::units::UnitConverter;
use markup5ever_rcdom::{Handle, NodeData};
use tracing::{debug, info, warn};

const ABSTRACT_TITLE_FONT: &str = "黑体";
const ABSTRACT_TITLE_SIZE_PT: f32 = 16.0;
const KEYWORDS_FONT: &str = "宋体";
const LATIN_FONT: &str = "Times New Roman";

/// Logical part of a thesis a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    None,
    Cover,
    Toc,
    Abstract,
    Keywords,
    References,
    Acknowledgments,
}

impl Section {
    /// Section marked by a container's classes, checked in a fixed order.
    pub fn from_classes(classes: &[String]) -> Option<Section> {
        const MARKERS: [(&str, Section); 6] = [
            ("cover", Section::Cover),
            ("toc", Section::Toc),
            ("abstract", Section::Abstract),
            ("keywords", Section::Keywords),
            ("references", Section::References),
            ("acknowledgments", Section::Acknowledgments),
        ];
        MARKERS
            .iter()
            .find(|(marker, _)| classes.iter().any(|c| c == marker))
            .map(|(_, section)| *section)
    }
}

/// Heading level from the thesis heading classes, falling back to the tag.
fn heading_level(tag: &str, node: &Handle) -> u8 {
    let cls = classes(node);
    let has = |name: &str| cls.iter().any(|c| c == name);
    if has("chapter-title") {
        1
    } else if has("section-title") {
        2
    } else if has("subsection-title") {
        3
    } else {
        tag[1..].parse().unwrap_or(1)
    }
}

/// Centered, 16pt, CJK heading face for abstract titles.
fn abstract_title_override(p: &mut Paragraph, units: &UnitConverter<'_>) {
    p.format.alignment = Some(Alignment::Center);
    let font = units.run_font(ABSTRACT_TITLE_FONT);
    for run in p.runs_mut() {
        run.font = Some(font.clone());
        run.size_pt = Some(ABSTRACT_TITLE_SIZE_PT);
    }
}

/// Text of `node` with the subtree rooted at `skip` left out.
fn text_without(node: &Handle, skip: &Handle) -> String {
    fn walk(node: &Handle, skip: &Handle, out: &mut String) {
        if std::rc::Rc::ptr_eq(node, skip) {
            return;
        }
        match &node.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            _ => {
                for c in node.children.borrow().iter() {
                    walk(c, skip, out);
                }
            }
        }
    }
    let mut out = String::new();
    walk(node, skip, &mut out);
    collapse_ws(&out).trim().to_string()
}

/// Blocks and media collected by a walk.
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub blocks: Vec<Block>,
    pub media: Vec<Media>,
}

pub struct TreeWalker<'a> {
    resolver: StyleResolver<'a>,
    units: UnitConverter<'a>,
    images: &'a dyn ImageLoader,
    placeholder_label: &'a str,
    out: WalkOutput,
}

impl<'a> TreeWalker<'a> {
    pub fn new(
        resolver: StyleResolver<'a>,
        units: UnitConverter<'a>,
        images: &'a dyn ImageLoader,
        placeholder_label: &'a str,
    ) -> Self {
        Self {
            resolver,
            units,
            images,
            placeholder_label,
            out: WalkOutput::default(),
        }
    }

    /// Walks `root` (normally `<body>`) starting outside any section.
    pub fn walk(mut self, root: &Handle) -> WalkOutput {
        self.visit(root, Section::None);
        self.out
    }

    fn push_paragraph(&mut self, p: Paragraph) {
        self.out.blocks.push(Block::Paragraph(p));
    }

    fn visit(&mut self, node: &Handle, section: Section) {
        let Some(tag) = tag_lower(node) else {
            return;
        };

        match tag.as_str() {
            "table" => {
                info!("processing table");
                let builder = TableBuilder::new(self.resolver, self.units);
                if let Some(table) = builder.build(node) {
                    self.out.blocks.push(Block::Table(table));
                }
                return;
            }
            "div" => {
                let section = match Section::from_classes(&classes(node)) {
                    Some(entered) => {
                        info!(section = ?entered, "entering section");
                        entered
                    }
                    None => section,
                };
                for child in element_children(node) {
                    self.visit(&child, section);
                }
                return;
            }
            "h1" | "h2" | "h3" => self.heading(node, &tag, section),
            "p" => self.paragraph(node, section),
            "ul" | "ol" => self.list(node, &tag),
            "img" => self.image(node),
            _ => {}
        }

        if !matches!(tag.as_str(), "p" | "h1" | "h2" | "h3" | "ul" | "ol") {
            for child in element_children(node) {
                self.visit(&child, section);
            }
        }
    }

    fn heading(&mut self, node: &Handle, tag: &str, section: Section) {
        let level = heading_level(tag, node);
        let text = text_content(node);
        info!(level, text = %text, "heading");

        let mut p = Paragraph::with_text(ParagraphKind::Heading(level), &text);
        for run in p.runs_mut() {
            run.color = Some(Rgb::BLACK);
        }
        if section == Section::Abstract && tag == "h1" {
            debug!("abstract heading override");
            abstract_title_override(&mut p, &self.units);
        }
        apply_paragraph_style(&mut p, &self.resolver.resolve(node), &self.units);
        self.push_paragraph(p);
    }

    fn paragraph(&mut self, node: &Handle, section: Section) {
        let style = self.resolver.resolve(node);

        let keyword_title = (section == Section::Keywords)
            .then(|| {
                find_descendants(node, &["strong", "b"])
                    .into_iter()
                    .find(|n| has_class(n, "keyword-title"))
            })
            .flatten();

        let mut p = if let Some(title_node) = keyword_title {
            let title = text_content(&title_node);
            let rest = text_without(node, &title_node);
            debug!(title = %title, "keywords paragraph");
            let font = self.units.run_font(KEYWORDS_FONT);
            let mut p = Paragraph::new(ParagraphKind::Normal);
            p.runs.push(Run {
                bold: Some(true),
                font: Some(font.clone()),
                ..Run::new(title)
            });
            if !rest.is_empty() {
                p.runs.push(Run {
                    bold: Some(false),
                    font: Some(font),
                    ..Run::new(rest)
                });
            }
            p
        } else {
            let text = text_content(node);
            debug!(text = %text.chars().take(30).collect::<String>(), "paragraph");
            let mut p = Paragraph::with_text(ParagraphKind::Normal, &text);
            if section == Section::Abstract && has_class(node, "summary-title") {
                abstract_title_override(&mut p, &self.units);
            }
            if has_class(node, "english") {
                for run in p.runs_mut() {
                    run.font = Some(RunFont {
                        name: LATIN_FONT.to_string(),
                        east_asia: None,
                    });
                }
            }
            p
        };

        apply_paragraph_style(&mut p, &style, &self.units);
        self.push_paragraph(p);
    }

    fn list(&mut self, node: &Handle, tag: &str) {
        let kind = if tag == "ul" {
            ParagraphKind::ListBullet
        } else {
            ParagraphKind::ListNumber
        };
        info!(?kind, "list");
        let style = self.resolver.resolve(node);
        for li in element_children(node) {
            if tag_lower(&li).as_deref() != Some("li") {
                continue;
            }
            let mut p = Paragraph::with_text(kind, &text_content(&li));
            apply_paragraph_style(&mut p, &style, &self.units);
            self.push_paragraph(p);
        }
    }

    fn image(&mut self, node: &Handle) {
        let Some(src) = attr_get(node, "src").filter(|s| !s.trim().is_empty()) else {
            return;
        };
        let alt = attr_get(node, "alt")
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        info!(src = %src, "image");

        match self.images.load(&src).and_then(probe) {
            Ok(probed) => {
                self.out.media.push(probed.media);
                self.out.blocks.push(Block::Picture(Picture {
                    media: self.out.media.len() - 1,
                    width_emu: probed.width_emu,
                    height_emu: probed.height_emu,
                    description: alt.unwrap_or(src),
                }));
            }
            Err(e) => {
                warn!(src = %src, error = %e, "image embedding failed, using placeholder");
                let label = alt.unwrap_or(src);
                let mut p = Paragraph::with_text(
                    ParagraphKind::Normal,
                    &format!("[{}: {}]", self.placeholder_label, label),
                );
                p.format.alignment = Some(Alignment::Center);
                self.push_paragraph(p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{find_element, html5_parse};
    use crate::picture::FsImageLoader;
    use crate::stylesheet::{extract_stylesheet, StyleSheet};

    fn walk(html: &str) -> Vec<Block> {
        let dom = html5_parse(html);
        let sheet: StyleSheet = extract_stylesheet(&dom.document);
        let body = find_element(&dom.document, "body").unwrap();
        let loader = FsImageLoader::default();
        TreeWalker::new(StyleResolver::new(&sheet), UnitConverter::default(), &loader, "image")
            .walk(&body)
            .blocks
    }

    fn paragraphs(blocks: &[Block]) -> Vec<&Paragraph> {
        blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn section_from_classes_uses_fixed_order() {
        let cls = |s: &str| s.split(' ').map(str::to_string).collect::<Vec<_>>();
        assert_eq!(Section::from_classes(&cls("keywords abstract")), Some(Section::Abstract));
        assert_eq!(Section::from_classes(&cls("toc")), Some(Section::Toc));
        assert_eq!(Section::from_classes(&cls("notes")), None);
    }

    #[test]
    fn abstract_heading_without_css() {
        let blocks = walk(r#"<div class="abstract"><h1>Summary</h1></div>"#);
        let p = paragraphs(&blocks)[0];
        assert_eq!(p.kind, ParagraphKind::Heading(1));
        assert_eq!(p.text(), "Summary");
        assert_eq!(p.format.alignment, Some(Alignment::Center));
        let run = &p.runs[0];
        assert_eq!(run.font.as_ref().unwrap().name, "黑体");
        assert_eq!(run.font.as_ref().unwrap().east_asia.as_deref(), Some("黑体"));
        assert_eq!(run.size_pt, Some(16.0));
        assert_eq!(run.color, Some(Rgb::BLACK));
    }

    #[test]
    fn heading_classes_override_tag_level() {
        let blocks = walk(
            r#"<h3 class="chapter-title">C</h3><h1 class="section-title">S</h1><h2 class="subsection-title">U</h2><h2>plain</h2>"#,
        );
        let kinds: Vec<_> = paragraphs(&blocks).iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParagraphKind::Heading(1),
                ParagraphKind::Heading(2),
                ParagraphKind::Heading(3),
                ParagraphKind::Heading(2),
            ]
        );
    }

    #[test]
    fn css_applies_on_top_of_forced_black() {
        let blocks = walk(
            r#"<style>.chapter-title { color: #3366CC; font-size: 16pt; text-align: center }</style>
               <h1 class="chapter-title">第一章</h1>"#,
        );
        let p = paragraphs(&blocks)[0];
        assert_eq!(p.runs[0].color, Some(Rgb::new(51, 102, 204)));
        assert_eq!(p.runs[0].size_pt, Some(16.0));
        assert_eq!(p.format.alignment, Some(Alignment::Center));
    }

    #[test]
    fn keywords_paragraph_splits_title_and_content() {
        let blocks = walk(
            r#"<style>.keywords { font-size: 12pt }</style>
               <div class="keywords"><p><strong class="keyword-title">关键词：</strong>人工智能, 机器学习</p></div>"#,
        );
        let p = paragraphs(&blocks)[0];
        assert_eq!(p.runs.len(), 2);
        assert_eq!(p.runs[0].text, "关键词：");
        assert_eq!(p.runs[0].bold, Some(true));
        assert_eq!(p.runs[1].text, "人工智能, 机器学习");
        assert_eq!(p.runs[1].bold, Some(false));
        for run in &p.runs {
            assert_eq!(run.font.as_ref().unwrap().name, "宋体");
            assert_eq!(run.font.as_ref().unwrap().east_asia.as_deref(), Some("宋体"));
        }
    }

    #[test]
    fn keyword_title_outside_keywords_section_is_plain() {
        let blocks = walk(r#"<p><strong class="keyword-title">K:</strong> a, b</p>"#);
        let p = paragraphs(&blocks)[0];
        assert_eq!(p.runs.len(), 1);
        assert_eq!(p.text(), "K: a, b");
    }

    #[test]
    fn summary_title_and_english_paragraphs() {
        let blocks = walk(
            r#"<div class="abstract"><p class="summary-title">摘要</p><p class="english">Hello</p></div>
               <p class="summary-title">Not abstract</p>"#,
        );
        let ps = paragraphs(&blocks);
        assert_eq!(ps[0].format.alignment, Some(Alignment::Center));
        assert_eq!(ps[0].runs[0].size_pt, Some(16.0));
        assert_eq!(ps[1].runs[0].font.as_ref().unwrap().name, "Times New Roman");
        assert!(ps[1].runs[0].font.as_ref().unwrap().east_asia.is_none());
        assert_eq!(ps[2].format.alignment, None);
    }

    #[test]
    fn section_is_scoped_to_its_container() {
        let blocks = walk(
            r#"<div class="abstract"><div><h1>Inner</h1></div></div><h1>Outside</h1>"#,
        );
        let ps = paragraphs(&blocks);
        assert_eq!(ps[0].format.alignment, Some(Alignment::Center));
        assert_eq!(ps[1].format.alignment, None);
    }

    #[test]
    fn lists_take_direct_items_only() {
        let blocks = walk("<ul><li>a</li><li>b<ol><li>nested</li></ol></li></ul><ol><li>one</li></ol>");
        let ps = paragraphs(&blocks);
        assert_eq!(ps.len(), 3);
        assert_eq!(ps[0].kind, ParagraphKind::ListBullet);
        assert_eq!(ps[1].text(), "bnested");
        assert_eq!(ps[2].kind, ParagraphKind::ListNumber);
    }

    #[test]
    fn missing_image_becomes_centered_placeholder() {
        let blocks = walk(r#"<p>before</p><img src="missing.png" alt="diagram"><p>after</p>"#);
        let ps = paragraphs(&blocks);
        assert_eq!(ps.len(), 3);
        assert_eq!(ps[1].text(), "[image: diagram]");
        assert_eq!(ps[1].format.alignment, Some(Alignment::Center));
        assert_eq!(ps[2].text(), "after");
    }

    #[test]
    fn placeholder_falls_back_to_src() {
        let blocks = walk(r#"<img src="https://example.com/x.png">"#);
        assert_eq!(paragraphs(&blocks)[0].text(), "[image: https://example.com/x.png]");
    }

    #[test]
    fn embeds_data_uri_images() {
        use base64::Engine;
        let png = crate::picture::tests::tiny_png();
        let html = format!(
            r#"<img alt="red" src="data:image/png;base64,{}">"#,
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let dom = html5_parse(&html);
        let sheet = StyleSheet::new();
        let body = find_element(&dom.document, "body").unwrap();
        let loader = FsImageLoader::default();
        let out = TreeWalker::new(StyleResolver::new(&sheet), UnitConverter::default(), &loader, "image")
            .walk(&body);
        assert_eq!(out.media.len(), 1);
        match &out.blocks[0] {
            Block::Picture(pic) => {
                assert_eq!(pic.media, 0);
                assert_eq!(pic.description, "red");
            }
            other => panic!("expected picture, got {other:?}"),
        }
    }

    #[test]
    fn tables_are_emitted_in_place() {
        let blocks = walk("<p>a</p><div><table><tr><td>x</td></tr></table></div><table></table><p>b</p>");
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[1], Block::Table(_)));
    }

    #[test]
    fn generic_elements_recurse_into_element_children() {
        let blocks = walk("<section><article><p>deep</p></article>loose text</section>");
        let ps = paragraphs(&blocks);
        assert_eq!(ps.len(), 1);
        assert_eq!(ps[0].text(), "deep");
    }
}
