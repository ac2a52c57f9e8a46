//! In-memory document model produced by the tree walk and consumed by the
//! package writer. Lengths are kept in points until serialization.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `RRGGBB`, the form WordprocessingML expects.
    pub fn hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

/// Font assignment for a run. `east_asia` fills the separate CJK font slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFont {
    pub name: String,
    pub east_asia: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Run {
    pub text: String,
    /// `None` inherits from the paragraph style; `Some(false)` is an explicit
    /// override.
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub color: Option<Rgb>,
    pub font: Option<RunFont>,
    pub size_pt: Option<f32>,
}

impl Run {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParagraphKind {
    #[default]
    Normal,
    Heading(u8),
    ListBullet,
    ListNumber,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParagraphFormat {
    pub alignment: Option<Alignment>,
    /// Multiple of single line spacing.
    pub line_spacing: Option<f32>,
    pub first_line_indent_pt: Option<f32>,
    pub space_before_pt: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    pub kind: ParagraphKind,
    pub runs: Vec<Run>,
    pub format: ParagraphFormat,
}

impl Paragraph {
    pub fn new(kind: ParagraphKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// A paragraph holding one run, or no run at all for empty text.
    pub fn with_text(kind: ParagraphKind, text: &str) -> Self {
        let mut p = Self::new(kind);
        if !text.is_empty() {
            p.runs.push(Run::new(text));
        }
        p
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn runs_mut(&mut self) -> impl Iterator<Item = &mut Run> {
        self.runs.iter_mut()
    }
}

/// A rectangular span of grid cells collapsed into its top-left anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRegion {
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
}

impl MergeRegion {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.row
            && row < self.row + self.row_span
            && col >= self.col
            && col < self.col + self.col_span
    }

    pub fn overlaps(&self, other: &MergeRegion) -> bool {
        self.row < other.row + other.row_span
            && other.row < self.row + self.row_span
            && self.col < other.col + other.col_span
            && other.col < self.col + self.col_span
    }

    pub fn cell_count(&self) -> usize {
        self.row_span * self.col_span
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub paragraph: Paragraph,
    pub shading: Option<Rgb>,
}

/// A fully placed table: `rows * cols` cells in row-major order plus the merge
/// regions. Cells covered by a region other than its anchor are ignored when
/// the table is written.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<Cell>,
    pub width_pt: Option<f32>,
    merges: Vec<MergeRegion>,
    /// Index into `merges` for every grid position a region covers.
    owners: Vec<Option<usize>>,
}

impl Table {
    /// Regions are expected not to overlap; a later region wins any position
    /// two of them share. Positions outside the grid are ignored.
    pub fn new(
        rows: usize,
        cols: usize,
        cells: Vec<Cell>,
        merges: Vec<MergeRegion>,
        width_pt: Option<f32>,
    ) -> Self {
        let mut owners = vec![None; rows * cols];
        for (i, m) in merges.iter().enumerate() {
            for r in m.row..(m.row + m.row_span).min(rows) {
                for c in m.col..(m.col + m.col_span).min(cols) {
                    owners[r * cols + c] = Some(i);
                }
            }
        }
        Self {
            rows,
            cols,
            cells,
            width_pt,
            merges,
            owners,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.cells[row * self.cols + col]
    }

    pub fn merges(&self) -> &[MergeRegion] {
        &self.merges
    }

    pub fn region_at(&self, row: usize, col: usize) -> Option<&MergeRegion> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.owners[row * self.cols + col].map(|i| &self.merges[i])
    }
}

/// A picture placed inline at a fixed size.
#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    /// Index into [`Document::media`].
    pub media: usize,
    pub width_emu: u64,
    pub height_emu: u64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub bytes: Vec<u8>,
    /// File extension, also the content-type key (`png`, `jpeg`).
    pub extension: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    Picture(Picture),
}

/// Package-wide defaults taken from the `<body>` style.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocDefaults {
    pub font: Option<RunFont>,
    pub size_pt: Option<f32>,
    pub line_spacing: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub title: Option<String>,
    pub defaults: DocDefaults,
    pub blocks: Vec<Block>,
    pub media: Vec<Media>,
}

impl Document {
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn has_lists(&self) -> bool {
        self.paragraphs()
            .any(|p| matches!(p.kind, ParagraphKind::ListBullet | ParagraphKind::ListNumber))
    }
}
