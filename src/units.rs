//! Conversion of CSS value strings into typographic units.
//!
//! Every conversion returns `None` when the value is not in a recognised
//! form; callers treat that as "leave the property alone".

use crate::model::{Alignment, Rgb, RunFont};
use lazy_static::lazy_static;
use regex::Regex;

pub const PT_PER_PX: f32 = 0.75;
pub const PT_PER_EM: f32 = 12.0;
pub const PT_PER_CM: f32 = 28.3;
/// Two CJK character widths at body size.
pub const DEFAULT_FIRST_LINE_INDENT_PT: f32 = 28.0;
/// Usable page width that percentage table widths refer to.
pub const PAGE_TEXT_WIDTH_PT: f32 = 6.0 * 72.0;
/// Font sizes Word accepts (`w:sz` 2..=3276 half-points).
pub const MIN_FONT_SIZE_PT: f32 = 1.0;
pub const MAX_FONT_SIZE_PT: f32 = 1638.0;
/// Largest automatic line spacing multiple Word accepts.
pub const MAX_LINE_MULTIPLE: f32 = 132.0;
/// Largest paragraph spacing or indent Word accepts (31680 twips).
pub const MAX_PARAGRAPH_OFFSET_PT: f32 = 1584.0;

/// Fixed lookup data consulted by [`UnitConverter`].
#[derive(Debug)]
pub struct StyleTables {
    /// Traditional Chinese size names to points.
    pub cn_sizes: &'static [(&'static str, f32)],
    /// CSS family name to the font name written into the document.
    pub families: &'static [(&'static str, &'static str)],
    /// Resolved names that also take the East-Asian font slot.
    pub cjk_families: &'static [&'static str],
}

pub static DEFAULT_TABLES: StyleTables = StyleTables {
    cn_sizes: &[
        ("初号", 42.0),
        ("小初", 36.0),
        ("一号", 26.0),
        ("小一", 24.0),
        ("二号", 22.0),
        ("小二", 18.0),
        ("三号", 16.0),
        ("小三", 15.0),
        ("四号", 14.0),
        ("小四", 12.0),
        ("五号", 10.5),
        ("小五", 9.0),
        ("六号", 7.5),
        ("小六", 6.5),
        ("七号", 5.5),
        ("八号", 5.0),
    ],
    families: &[
        ("SimSun", "宋体"),
        ("SimHei", "黑体"),
        ("KaiTi", "楷体"),
        ("FangSong", "仿宋"),
        ("Microsoft YaHei", "微软雅黑"),
        ("宋体", "宋体"),
        ("黑体", "黑体"),
        ("楷体", "楷体"),
        ("仿宋", "仿宋"),
        ("微软雅黑", "微软雅黑"),
        ("Times New Roman", "Times New Roman"),
        ("Arial", "Arial"),
    ],
    cjk_families: &["宋体", "黑体", "楷体", "仿宋", "微软雅黑"],
};

lazy_static! {
    static ref LENGTH: Regex =
        Regex::new(r"^(-?(?:\d+(?:\.\d*)?|\.\d+))\s*([a-zA-Z%]*)$").expect("length regex");
    static ref RGB_FN: Regex =
        Regex::new(r"^rgba?\(\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*(?:,\s*[\d.]+\s*)?\)$")
            .expect("rgb regex");
}

/// Splits `"12.5pt"` into `(12.5, "pt")`. The unit is lower-cased.
pub fn split_length(value: &str) -> Option<(f32, String)> {
    let caps = LENGTH.captures(value.trim())?;
    let number: f32 = caps.get(1)?.as_str().parse().ok()?;
    if !number.is_finite() {
        return None;
    }
    let unit = caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
    Some((number, unit))
}

#[derive(Debug, Clone, Copy)]
pub struct UnitConverter<'a> {
    tables: &'a StyleTables,
}

impl Default for UnitConverter<'static> {
    fn default() -> Self {
        Self::new(&DEFAULT_TABLES)
    }
}

impl<'a> UnitConverter<'a> {
    pub fn new(tables: &'a StyleTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &'a StyleTables {
        self.tables
    }

    pub fn is_cjk_family(&self, name: &str) -> bool {
        self.tables.cjk_families.contains(&name)
    }

    /// Font for a resolved family name, with the East-Asian slot filled for
    /// CJK families.
    pub fn run_font(&self, name: &str) -> RunFont {
        RunFont {
            name: name.to_string(),
            east_asia: self.is_cjk_family(name).then(|| name.to_string()),
        }
    }

    /// First candidate of a `font-family` list found in the family table.
    pub fn font_family(&self, value: &str) -> Option<RunFont> {
        value
            .split(',')
            .map(|f| f.trim().trim_matches(|c| c == '"' || c == '\''))
            .find_map(|f| {
                self.tables
                    .families
                    .iter()
                    .find(|(css, _)| *css == f)
                    .map(|(_, word)| self.run_font(word))
            })
    }

    /// `font-size` in points: a traditional size name (`小四`, `小四号`) or a
    /// number with an optional `pt`/`px` unit. Numeric sizes are clamped to
    /// the range Word can store.
    pub fn font_size(&self, value: &str) -> Option<f32> {
        let value = value.trim();
        if let Some(pt) = self.cn_size(value) {
            return Some(pt);
        }
        let (n, unit) = split_length(value)?;
        if n <= 0.0 {
            return None;
        }
        let pt = match unit.as_str() {
            "" | "pt" => n,
            "px" => n * PT_PER_PX,
            _ => return None,
        };
        Some(pt.clamp(MIN_FONT_SIZE_PT, MAX_FONT_SIZE_PT))
    }

    fn cn_size(&self, value: &str) -> Option<f32> {
        let lookup = |key: &str| {
            self.tables
                .cn_sizes
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, pt)| *pt)
        };
        lookup(value).or_else(|| value.strip_suffix('号').and_then(lookup))
    }

    /// Colour from `#RRGGBB`, `#RGB`, `rgb(r,g,b)` or a CSS colour name. Fully
    /// transparent colours count as absent.
    pub fn color(&self, value: &str) -> Option<Rgb> {
        let value = value.trim();
        if let Some(caps) = RGB_FN.captures(value) {
            let channel = |i: usize| -> Option<u8> {
                let v: u32 = caps.get(i)?.as_str().parse().ok()?;
                Some(v.min(255) as u8)
            };
            return Some(Rgb::new(channel(1)?, channel(2)?, channel(3)?));
        }
        let c = csscolorparser::parse(value).ok()?;
        if c.a <= 0.0 {
            return None;
        }
        Some(Rgb::new(
            (c.r * 255.0).round().clamp(0.0, 255.0) as u8,
            (c.g * 255.0).round().clamp(0.0, 255.0) as u8,
            (c.b * 255.0).round().clamp(0.0, 255.0) as u8,
        ))
    }

    pub fn alignment(&self, value: &str) -> Option<Alignment> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Alignment::Left),
            "center" => Some(Alignment::Center),
            "right" => Some(Alignment::Right),
            "justify" => Some(Alignment::Justify),
            _ => None,
        }
    }

    /// Bare numeric `line-height` as a multiple of single spacing, at most
    /// [`MAX_LINE_MULTIPLE`].
    pub fn line_spacing(&self, value: &str) -> Option<f32> {
        let v: f32 = value.trim().parse().ok()?;
        (v.is_finite() && v > 0.0).then(|| v.min(MAX_LINE_MULTIPLE))
    }

    /// `margin-top` in points; only `em` values are understood.
    pub fn space_before(&self, value: &str) -> Option<f32> {
        match split_length(value)? {
            (n, unit) if unit == "em" && n >= 0.0 => Some((n * PT_PER_EM).min(MAX_PARAGRAPH_OFFSET_PT)),
            _ => None,
        }
    }

    /// `text-indent` in points from `em`, `px`, `pt` or `cm`. A bare `0` is an
    /// explicit zero indent.
    pub fn text_indent(&self, value: &str) -> Option<f32> {
        let (n, unit) = split_length(value)?;
        let pt = match unit.as_str() {
            "em" => n * PT_PER_EM,
            "px" => n * PT_PER_PX,
            "pt" => n,
            "cm" => n * PT_PER_CM,
            "" if n == 0.0 => 0.0,
            _ => return None,
        };
        Some(pt.clamp(-MAX_PARAGRAPH_OFFSET_PT, MAX_PARAGRAPH_OFFSET_PT))
    }

    /// Table `width` in points: a percentage of the page text width, or
    /// pixels at 96 dpi.
    pub fn table_width(&self, value: &str) -> Option<f32> {
        let (n, unit) = split_length(value)?;
        if n <= 0.0 {
            return None;
        }
        match unit.as_str() {
            "%" => Some(PAGE_TEXT_WIDTH_PT * n / 100.0),
            "" | "px" => Some(n / 96.0 * 72.0),
            "pt" => Some(n),
            _ => None,
        }
    }
}
