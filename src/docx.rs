//! WordprocessingML serialization and OOXML packaging of a [`Document`].

use crate::error::ConvertError;
use crate::model::{Alignment, Block, Cell, DocDefaults, Document, Paragraph, ParagraphKind, Picture, Run, Table};
use crate::units::PAGE_TEXT_WIDTH_PT;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const TWIPS_PER_PT: f32 = 20.0;
const LINE_UNITS_PER_MULTIPLE: f32 = 240.0;
/// Relationship ids of media parts start here, clear of the fixed parts.
const MEDIA_RID_BASE: usize = 100;

fn twips(pt: f32) -> i64 {
    (pt * TWIPS_PER_PT).round() as i64
}

fn half_points(pt: f32) -> i64 {
    (pt * 2.0).round() as i64
}

fn xml_escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(ch),
            c if (c as u32) < 0x20 => {}
            _ => out.push(ch),
        }
    }
    out
}

fn media_part_name(index: usize, extension: &str) -> String {
    format!("image{}.{}", index + 1, extension)
}

fn fonts_xml(name: &str, east_asia: Option<&str>) -> String {
    let name = xml_escape_text(name);
    match east_asia {
        Some(ea) => format!(
            r#"<w:rFonts w:ascii="{name}" w:hAnsi="{name}" w:cs="{name}" w:eastAsia="{}"/>"#,
            xml_escape_text(ea)
        ),
        None => format!(r#"<w:rFonts w:ascii="{name}" w:hAnsi="{name}" w:cs="{name}"/>"#),
    }
}

fn run_xml(run: &Run, out: &mut String) {
    if run.text.is_empty() {
        return;
    }
    out.push_str("<w:r>");
    let mut rpr = String::new();
    if let Some(font) = &run.font {
        rpr.push_str(&fonts_xml(&font.name, font.east_asia.as_deref()));
    }
    match run.bold {
        Some(true) => rpr.push_str("<w:b/><w:bCs/>"),
        Some(false) => rpr.push_str(r#"<w:b w:val="0"/><w:bCs w:val="0"/>"#),
        None => {}
    }
    match run.italic {
        Some(true) => rpr.push_str("<w:i/><w:iCs/>"),
        Some(false) => rpr.push_str(r#"<w:i w:val="0"/><w:iCs w:val="0"/>"#),
        None => {}
    }
    if let Some(color) = run.color {
        rpr.push_str(&format!(r#"<w:color w:val="{}"/>"#, color.hex()));
    }
    if let Some(pt) = run.size_pt {
        let hp = half_points(pt);
        rpr.push_str(&format!(r#"<w:sz w:val="{hp}"/><w:szCs w:val="{hp}"/>"#));
    }
    if !rpr.is_empty() {
        out.push_str("<w:rPr>");
        out.push_str(&rpr);
        out.push_str("</w:rPr>");
    }
    out.push_str(r#"<w:t xml:space="preserve">"#);
    out.push_str(&xml_escape_text(&run.text));
    out.push_str("</w:t></w:r>");
}

fn jc_value(align: Alignment) -> &'static str {
    match align {
        Alignment::Left => "left",
        Alignment::Center => "center",
        Alignment::Right => "right",
        Alignment::Justify => "both",
    }
}

fn paragraph_props(p: &Paragraph) -> String {
    let mut ppr = String::new();
    match p.kind {
        ParagraphKind::Normal => {}
        ParagraphKind::Heading(level) => {
            ppr.push_str(&format!(r#"<w:pStyle w:val="Heading{}"/>"#, level.clamp(1, 3)));
        }
        ParagraphKind::ListBullet => {
            ppr.push_str(r#"<w:pStyle w:val="ListBullet"/><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr>"#);
        }
        ParagraphKind::ListNumber => {
            ppr.push_str(r#"<w:pStyle w:val="ListNumber"/><w:numPr><w:ilvl w:val="0"/><w:numId w:val="2"/></w:numPr>"#);
        }
    }

    let f = &p.format;
    if f.space_before_pt.is_some() || f.line_spacing.is_some() {
        ppr.push_str("<w:spacing");
        if let Some(pt) = f.space_before_pt {
            ppr.push_str(&format!(r#" w:before="{}""#, twips(pt)));
        }
        if let Some(multiple) = f.line_spacing {
            ppr.push_str(&format!(
                r#" w:line="{}" w:lineRule="auto""#,
                (multiple * LINE_UNITS_PER_MULTIPLE).round() as i64
            ));
        }
        ppr.push_str("/>");
    }
    if let Some(pt) = f.first_line_indent_pt {
        let tw = twips(pt);
        if tw >= 0 {
            ppr.push_str(&format!(r#"<w:ind w:firstLine="{tw}"/>"#));
        } else {
            ppr.push_str(&format!(r#"<w:ind w:hanging="{}"/>"#, -tw));
        }
    }
    if let Some(align) = f.alignment {
        ppr.push_str(&format!(r#"<w:jc w:val="{}"/>"#, jc_value(align)));
    }
    ppr
}

fn paragraph_xml(p: &Paragraph, out: &mut String) {
    out.push_str("<w:p>");
    let ppr = paragraph_props(p);
    if !ppr.is_empty() {
        out.push_str("<w:pPr>");
        out.push_str(&ppr);
        out.push_str("</w:pPr>");
    }
    for run in &p.runs {
        run_xml(run, out);
    }
    out.push_str("</w:p>");
}

fn cell_xml(cell: &Cell, width: i64, grid_span: usize, v_merge: Option<&str>, with_content: bool, out: &mut String) {
    out.push_str("<w:tc><w:tcPr>");
    out.push_str(&format!(r#"<w:tcW w:w="{width}" w:type="dxa"/>"#));
    if grid_span > 1 {
        out.push_str(&format!(r#"<w:gridSpan w:val="{grid_span}"/>"#));
    }
    match v_merge {
        Some("restart") => out.push_str(r#"<w:vMerge w:val="restart"/>"#),
        Some(_) => out.push_str("<w:vMerge/>"),
        None => {}
    }
    if let Some(fill) = cell.shading {
        out.push_str(&format!(r#"<w:shd w:val="clear" w:color="auto" w:fill="{}"/>"#, fill.hex()));
    }
    out.push_str("</w:tcPr>");
    if with_content {
        paragraph_xml(&cell.paragraph, out);
    } else {
        out.push_str("<w:p/>");
    }
    out.push_str("</w:tc>");
}

/// Writes the grid row by row. A merge region becomes a `gridSpan` on every
/// row it covers plus `vMerge` restart/continue when it spans rows; covered
/// positions other than the anchor are not written as cells of their own.
fn table_xml(t: &Table, out: &mut String) {
    let total = twips(t.width_pt.unwrap_or(PAGE_TEXT_WIDTH_PT));
    let col_w = total / t.cols.max(1) as i64;

    out.push_str("<w:tbl><w:tblPr>");
    out.push_str(r#"<w:tblStyle w:val="TableGrid"/>"#);
    match t.width_pt {
        Some(_) => out.push_str(&format!(r#"<w:tblW w:w="{total}" w:type="dxa"/>"#)),
        None => out.push_str(r#"<w:tblW w:w="0" w:type="auto"/>"#),
    }
    out.push_str(r#"<w:tblLook w:val="04A0" w:firstRow="1" w:lastRow="0" w:firstColumn="1" w:lastColumn="0" w:noHBand="0" w:noVBand="1"/>"#);
    out.push_str("</w:tblPr><w:tblGrid>");
    for _ in 0..t.cols {
        out.push_str(&format!(r#"<w:gridCol w:w="{col_w}"/>"#));
    }
    out.push_str("</w:tblGrid>");

    for row in 0..t.rows {
        out.push_str("<w:tr>");
        let mut col = 0;
        while col < t.cols {
            match t.region_at(row, col) {
                Some(region) => {
                    let anchor = t.cell(region.row, region.col);
                    let v_merge = match (region.row_span > 1, region.row == row) {
                        (false, _) => None,
                        (true, true) => Some("restart"),
                        (true, false) => Some("continue"),
                    };
                    cell_xml(
                        anchor,
                        col_w * region.col_span as i64,
                        region.col_span,
                        v_merge,
                        region.row == row,
                        out,
                    );
                    col = region.col + region.col_span;
                }
                None => {
                    cell_xml(t.cell(row, col), col_w, 1, None, true, out);
                    col += 1;
                }
            }
        }
        out.push_str("</w:tr>");
    }
    out.push_str("</w:tbl>");
}

fn picture_xml(pic: &Picture, doc: &Document, id: usize, out: &mut String) {
    let rid = MEDIA_RID_BASE + pic.media;
    let name = doc
        .media
        .get(pic.media)
        .map(|m| media_part_name(pic.media, m.extension))
        .unwrap_or_default();
    let descr = xml_escape_text(&pic.description);
    let (cx, cy) = (pic.width_emu, pic.height_emu);
    out.push_str(&format!(
        r#"<w:p><w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0"><wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{id}" name="Picture {id}" descr="{descr}"/><wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr><a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:nvPicPr><pic:cNvPr id="{id}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr><pic:blipFill><a:blip r:embed="rId{rid}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
    ));
}

pub fn document_xml(doc: &Document) -> String {
    let mut body = String::new();
    let mut picture_id = 0;
    for block in &doc.blocks {
        match block {
            Block::Paragraph(p) => paragraph_xml(p, &mut body),
            Block::Table(t) => {
                table_xml(t, &mut body);
                // Word needs a paragraph between adjacent tables.
                body.push_str("<w:p/>");
            }
            Block::Picture(pic) => {
                picture_id += 1;
                picture_xml(pic, doc, picture_id, &mut body);
            }
        }
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:wpc="http://schemas.microsoft.com/office/word/2010/wordprocessingCanvas"
 xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006"
 xmlns:o="urn:schemas-microsoft-com:office:office"
 xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
 xmlns:v="urn:schemas-microsoft-com:vml"
 xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
 xmlns:w10="urn:schemas-microsoft-com:office:word"
 xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
 xmlns:w14="http://schemas.microsoft.com/office/word/2010/wordprocessingml"
 xmlns:wne="http://schemas.microsoft.com/office/word/2006/wordml"
 mc:Ignorable="w14">
  <w:body>
    {body}
    <w:sectPr>
      <w:pgSz w:w="12240" w:h="15840"/>
      <w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/>
      <w:cols w:space="708"/>
      <w:docGrid w:linePitch="360"/>
    </w:sectPr>
  </w:body>
</w:document>"#
    )
}

fn media_extensions(doc: &Document) -> Vec<&'static str> {
    let mut exts: Vec<&'static str> = doc.media.iter().map(|m| m.extension).collect();
    exts.sort_unstable();
    exts.dedup();
    exts
}

fn content_types_xml(doc: &Document, has_numbering: bool) -> String {
    let mut defaults = String::new();
    for ext in media_extensions(doc) {
        defaults.push_str(&format!(r#"<Default Extension="{ext}" ContentType="image/{ext}"/>"#));
    }
    let numbering = if has_numbering {
        r#"<Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/>"#
    } else {
        ""
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  {defaults}
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
  <Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
  {numbering}
  <Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
</Types>"#
    )
}

fn rels_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>"#
}

fn word_rels_xml(doc: &Document, has_numbering: bool) -> String {
    let mut rels = String::from(
        r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
    );
    if has_numbering {
        rels.push_str(
            r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering" Target="numbering.xml"/>"#,
        );
    }
    for (i, m) in doc.media.iter().enumerate() {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/{}"/>"#,
            MEDIA_RID_BASE + i,
            media_part_name(i, m.extension)
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
    )
}

fn doc_defaults_xml(defaults: &DocDefaults) -> String {
    let mut rpr = String::new();
    if let Some(font) = &defaults.font {
        rpr.push_str(&fonts_xml(&font.name, font.east_asia.as_deref()));
    }
    if let Some(pt) = defaults.size_pt {
        let hp = half_points(pt);
        rpr.push_str(&format!(r#"<w:sz w:val="{hp}"/><w:szCs w:val="{hp}"/>"#));
    }
    let ppr = match defaults.line_spacing {
        Some(multiple) => format!(
            r#"<w:spacing w:line="{}" w:lineRule="auto"/>"#,
            (multiple * LINE_UNITS_PER_MULTIPLE).round() as i64
        ),
        None => String::new(),
    };
    format!(
        "<w:docDefaults><w:rPrDefault><w:rPr>{rpr}</w:rPr></w:rPrDefault><w:pPrDefault><w:pPr>{ppr}</w:pPr></w:pPrDefault></w:docDefaults>"
    )
}

fn heading_style_xml(level: u8, half_points: u32, before: u32, after: u32) -> String {
    format!(
        r#"<w:style w:type="paragraph" w:styleId="Heading{level}">
    <w:name w:val="heading {level}"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:uiPriority w:val="9"/>
    <w:qFormat/>
    <w:pPr>
      <w:keepNext/>
      <w:keepLines/>
      <w:spacing w:before="{before}" w:after="{after}"/>
      <w:outlineLvl w:val="{}"/>
    </w:pPr>
    <w:rPr>
      <w:b/>
      <w:bCs/>
      <w:sz w:val="{half_points}"/>
      <w:szCs w:val="{half_points}"/>
    </w:rPr>
  </w:style>"#,
        level - 1
    )
}

fn styles_xml(defaults: &DocDefaults) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  {}
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:name w:val="Normal"/>
    <w:qFormat/>
  </w:style>
  {}
  {}
  {}
  <w:style w:type="paragraph" w:styleId="ListBullet">
    <w:name w:val="List Bullet"/>
    <w:basedOn w:val="Normal"/>
    <w:qFormat/>
  </w:style>
  <w:style w:type="paragraph" w:styleId="ListNumber">
    <w:name w:val="List Number"/>
    <w:basedOn w:val="Normal"/>
    <w:qFormat/>
  </w:style>
  <w:style w:type="table" w:default="1" w:styleId="TableNormal">
    <w:name w:val="Normal Table"/>
    <w:tblPr>
      <w:tblInd w:w="0" w:type="dxa"/>
      <w:tblCellMar>
        <w:top w:w="0" w:type="dxa"/>
        <w:left w:w="108" w:type="dxa"/>
        <w:bottom w:w="0" w:type="dxa"/>
        <w:right w:w="108" w:type="dxa"/>
      </w:tblCellMar>
    </w:tblPr>
  </w:style>
  <w:style w:type="table" w:styleId="TableGrid">
    <w:name w:val="Table Grid"/>
    <w:basedOn w:val="TableNormal"/>
    <w:tblPr>
      <w:tblBorders>
        <w:top w:val="single" w:sz="4" w:space="0" w:color="auto"/>
        <w:left w:val="single" w:sz="4" w:space="0" w:color="auto"/>
        <w:bottom w:val="single" w:sz="4" w:space="0" w:color="auto"/>
        <w:right w:val="single" w:sz="4" w:space="0" w:color="auto"/>
        <w:insideH w:val="single" w:sz="4" w:space="0" w:color="auto"/>
        <w:insideV w:val="single" w:sz="4" w:space="0" w:color="auto"/>
      </w:tblBorders>
    </w:tblPr>
  </w:style>
</w:styles>"#,
        doc_defaults_xml(defaults),
        heading_style_xml(1, 32, 240, 120),
        heading_style_xml(2, 28, 200, 100),
        heading_style_xml(3, 24, 160, 80),
    )
}

fn numbering_level_xml(format: &str, text: &str) -> String {
    format!(
        r#"<w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="{format}"/><w:lvlText w:val="{text}"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="720" w:hanging="360"/></w:pPr></w:lvl>"#
    )
}

fn numbering_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:abstractNum w:abstractNumId="1"><w:multiLevelType w:val="singleLevel"/>{}</w:abstractNum>
  <w:abstractNum w:abstractNumId="2"><w:multiLevelType w:val="singleLevel"/>{}</w:abstractNum>
  <w:num w:numId="1"><w:abstractNumId w:val="1"/></w:num>
  <w:num w:numId="2"><w:abstractNumId w:val="2"/></w:num>
</w:numbering>"#,
        numbering_level_xml("bullet", "\u{2022}"),
        numbering_level_xml("decimal", "%1."),
    )
}

fn core_xml(title: Option<&str>) -> String {
    let title = title
        .map(|t| format!("<dc:title>{}</dc:title>", xml_escape_text(t)))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">{title}<dc:creator>{}</dc:creator></cp:coreProperties>"#,
        env!("CARGO_PKG_NAME")
    )
}

/// Serializes `doc` into the bytes of a `.docx` package.
pub fn write_package(doc: &Document) -> Result<Vec<u8>, ConvertError> {
    let has_numbering = doc.has_lists();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opt = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", opt)?;
    zip.write_all(content_types_xml(doc, has_numbering).as_bytes())?;

    zip.add_directory("_rels/", opt)?;
    zip.start_file("_rels/.rels", opt)?;
    zip.write_all(rels_xml().as_bytes())?;

    zip.add_directory("docProps/", opt)?;
    zip.start_file("docProps/core.xml", opt)?;
    zip.write_all(core_xml(doc.title.as_deref()).as_bytes())?;

    zip.add_directory("word/", opt)?;
    zip.add_directory("word/_rels/", opt)?;

    zip.start_file("word/document.xml", opt)?;
    zip.write_all(document_xml(doc).as_bytes())?;

    zip.start_file("word/_rels/document.xml.rels", opt)?;
    zip.write_all(word_rels_xml(doc, has_numbering).as_bytes())?;

    zip.start_file("word/styles.xml", opt)?;
    zip.write_all(styles_xml(&doc.defaults).as_bytes())?;

    if has_numbering {
        zip.start_file("word/numbering.xml", opt)?;
        zip.write_all(numbering_xml().as_bytes())?;
    }

    if !doc.media.is_empty() {
        zip.add_directory("word/media/", opt)?;
        // Already-compressed payloads.
        let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (i, m) in doc.media.iter().enumerate() {
            zip.start_file(format!("word/media/{}", media_part_name(i, m.extension)), stored)?;
            zip.write_all(&m.bytes)?;
        }
    }

    let bytes = zip.finish()?.into_inner();
    debug!(bytes = bytes.len(), media = doc.media.len(), "package written");
    Ok(bytes)
}
