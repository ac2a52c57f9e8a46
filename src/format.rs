//! Application of resolved element styles onto model primitives.
//!
//! Each property is handled on its own; a missing or unparseable value leaves
//! the target untouched.

use crate::cascade::ElementStyle;
use crate::model::{Alignment, Cell, DocDefaults, Paragraph, ParagraphKind, Rgb};
use crate::units::{UnitConverter, DEFAULT_FIRST_LINE_INDENT_PT};
use tracing::{debug, warn};

fn is_bold(value: &str) -> bool {
    match value.trim() {
        "bold" | "bolder" => true,
        other => other.parse::<u32>().map(|w| w >= 600).unwrap_or(false),
    }
}

/// Applies paragraph and run level properties of `style` to `p`.
///
/// An empty style is a no-op. Otherwise runs always end up with an explicit
/// colour (black when none is declared or it does not parse) and normal body
/// paragraphs get the default first-line indent unless one is declared or
/// already set.
pub fn apply_paragraph_style(p: &mut Paragraph, style: &ElementStyle, units: &UnitConverter<'_>) {
    if style.is_empty() {
        return;
    }

    if let Some(value) = style.get("font-family") {
        match units.font_family(value) {
            Some(font) => {
                debug!(family = %value, font = %font.name, "font family");
                for run in p.runs_mut() {
                    run.font = Some(font.clone());
                }
            }
            None => debug!(family = %value, "no known font family"),
        }
    }

    if let Some(value) = style.get("font-size") {
        match units.font_size(value) {
            Some(pt) => {
                for run in p.runs_mut() {
                    run.size_pt = Some(pt);
                }
            }
            None => warn!(value = %value, "unparseable font-size"),
        }
    }

    let color = match style.get("color") {
        Some(value) => units.color(value).or_else(|| {
            warn!(value = %value, "unparseable color");
            None
        }),
        None => None,
    };
    let color = color.unwrap_or(Rgb::BLACK);
    for run in p.runs_mut() {
        run.color = Some(color);
    }

    if style.get("font-weight").is_some_and(is_bold) {
        for run in p.runs_mut() {
            run.bold = Some(true);
        }
    }

    if style.get("font-style").map(str::trim) == Some("italic") {
        for run in p.runs_mut() {
            run.italic = Some(true);
        }
    }

    if let Some(value) = style.get("text-align") {
        match units.alignment(value) {
            Some(Alignment::Left) | None => {}
            Some(align) => p.format.alignment = Some(align),
        }
    }

    if let Some(value) = style.get("line-height") {
        match units.line_spacing(value) {
            Some(multiple) => p.format.line_spacing = Some(multiple),
            None => warn!(value = %value, "unparseable line-height"),
        }
    }

    if let Some(value) = style.get("margin-top") {
        match units.space_before(value) {
            Some(pt) => p.format.space_before_pt = Some(pt),
            None => debug!(value = %value, "ignored margin-top"),
        }
    }

    match style.get("text-indent") {
        Some(value) => match units.text_indent(value) {
            Some(pt) => p.format.first_line_indent_pt = Some(pt),
            None => warn!(value = %value, "unparseable text-indent"),
        },
        None => {
            if p.kind == ParagraphKind::Normal && p.format.first_line_indent_pt.is_none() {
                p.format.first_line_indent_pt = Some(DEFAULT_FIRST_LINE_INDENT_PT);
            }
        }
    }
}

/// Cell-only properties (`background-color`, `text-align` including `left`),
/// followed by the paragraph properties.
pub fn apply_cell_style(cell: &mut Cell, style: &ElementStyle, units: &UnitConverter<'_>) {
    if style.is_empty() {
        return;
    }
    if let Some(value) = style.get("background-color") {
        match units.color(value) {
            Some(rgb) => cell.shading = Some(rgb),
            None => warn!(value = %value, "unparseable background-color"),
        }
    }
    if let Some(align) = style.get("text-align").and_then(|v| units.alignment(v)) {
        cell.paragraph.format.alignment = Some(align);
    }
    apply_paragraph_style(&mut cell.paragraph, style, units);
}

/// Table width in points, if declared and parseable.
pub fn table_width(style: &ElementStyle, units: &UnitConverter<'_>) -> Option<f32> {
    let value = style.get("width")?;
    let width = units.table_width(value);
    if width.is_none() {
        warn!(value = %value, "unparseable table width");
    }
    width
}

/// Package defaults from the `<body>` style.
pub fn document_defaults(style: &ElementStyle, units: &UnitConverter<'_>) -> DocDefaults {
    DocDefaults {
        font: style.get("font-family").and_then(|v| units.font_family(v)),
        size_pt: style.get("font-size").and_then(|v| units.font_size(v)),
        line_spacing: style.get("line-height").and_then(|v| units.line_spacing(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stylesheet::parse_declarations;

    fn para(kind: ParagraphKind, text: &str) -> Paragraph {
        Paragraph::with_text(kind, text)
    }

    #[test]
    fn empty_style_changes_nothing() {
        let mut p = para(ParagraphKind::Normal, "x");
        apply_paragraph_style(&mut p, &ElementStyle::new(), &UnitConverter::default());
        assert_eq!(p, para(ParagraphKind::Normal, "x"));
    }

    #[test]
    fn applies_every_recognised_property() {
        let style = parse_declarations(
            "font-family: SimSun; font-size: 小四; color: #3366CC; font-weight: bold; font-style: italic; \
             text-align: justify; line-height: 1.5; margin-top: 1em; text-indent: 2em",
        );
        let mut p = para(ParagraphKind::Normal, "正文");
        apply_paragraph_style(&mut p, &style, &UnitConverter::default());
        let run = &p.runs[0];
        assert_eq!(run.font.as_ref().unwrap().name, "宋体");
        assert_eq!(run.font.as_ref().unwrap().east_asia.as_deref(), Some("宋体"));
        assert_eq!(run.size_pt, Some(12.0));
        assert_eq!(run.color, Some(Rgb::new(51, 102, 204)));
        assert_eq!(run.bold, Some(true));
        assert_eq!(run.italic, Some(true));
        assert_eq!(p.format.alignment, Some(Alignment::Justify));
        assert_eq!(p.format.line_spacing, Some(1.5));
        assert_eq!(p.format.space_before_pt, Some(12.0));
        assert_eq!(p.format.first_line_indent_pt, Some(24.0));
    }

    #[test]
    fn bad_values_are_skipped_and_color_defaults_to_black() {
        let style = parse_declarations("color: nonsense; font-size: huge; line-height: normal");
        let mut p = para(ParagraphKind::Normal, "x");
        apply_paragraph_style(&mut p, &style, &UnitConverter::default());
        assert_eq!(p.runs[0].color, Some(Rgb::BLACK));
        assert_eq!(p.runs[0].size_pt, None);
        assert_eq!(p.format.line_spacing, None);
    }

    #[test]
    fn default_indent_only_for_plain_body_paragraphs() {
        let style = parse_declarations("font-size: 12pt");
        let units = UnitConverter::default();

        let mut body = para(ParagraphKind::Normal, "x");
        apply_paragraph_style(&mut body, &style, &units);
        assert_eq!(body.format.first_line_indent_pt, Some(DEFAULT_FIRST_LINE_INDENT_PT));

        let mut heading = para(ParagraphKind::Heading(2), "x");
        apply_paragraph_style(&mut heading, &style, &units);
        assert_eq!(heading.format.first_line_indent_pt, None);

        let mut preset = para(ParagraphKind::Normal, "x");
        preset.format.first_line_indent_pt = Some(0.0);
        apply_paragraph_style(&mut preset, &style, &units);
        assert_eq!(preset.format.first_line_indent_pt, Some(0.0));

        let mut zero = para(ParagraphKind::Normal, "x");
        apply_paragraph_style(&mut zero, &parse_declarations("text-indent: 0"), &units);
        assert_eq!(zero.format.first_line_indent_pt, Some(0.0));
    }

    #[test]
    fn left_alignment_is_default_for_paragraphs_but_explicit_for_cells() {
        let style = parse_declarations("text-align: left; background-color: rgb(255,204,0)");
        let units = UnitConverter::default();
        let mut p = para(ParagraphKind::Normal, "x");
        p.format.alignment = Some(Alignment::Center);
        apply_paragraph_style(&mut p, &style, &units);
        assert_eq!(p.format.alignment, Some(Alignment::Center));

        let mut cell = Cell {
            paragraph: para(ParagraphKind::Normal, "x"),
            shading: None,
        };
        cell.paragraph.format.alignment = Some(Alignment::Center);
        apply_cell_style(&mut cell, &style, &units);
        assert_eq!(cell.paragraph.format.alignment, Some(Alignment::Left));
        assert_eq!(cell.shading, Some(Rgb::new(255, 204, 0)));
    }

    #[test]
    fn body_defaults() {
        let style = parse_declarations("font-family: SimSun; font-size: 12pt; line-height: 1.5");
        let d = document_defaults(&style, &UnitConverter::default());
        assert_eq!(d.font.unwrap().name, "宋体");
        assert_eq!(d.size_pt, Some(12.0));
        assert_eq!(d.line_spacing, Some(1.5));
    }
}
