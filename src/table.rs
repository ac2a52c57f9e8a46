//! Reconstruction of HTML tables into a placed grid with merge regions.

use crate::cascade::StyleResolver;
use crate::dom::{attr_get, element_children, find_descendants, tag_lower, text_content};
use crate::format::{apply_cell_style, table_width};
use crate::model::{Alignment, Cell, MergeRegion, Paragraph, ParagraphKind, Run, Table};
use crate::units::UnitConverter;
use markup5ever_rcdom::Handle;
use std::num::IntErrorKind;
use tracing::{debug, info, warn};

/// Largest `colspan` honored, as in browsers.
pub const MAX_COLSPAN: usize = 1000;
/// Largest `rowspan` honored, as in browsers.
pub const MAX_ROWSPAN: usize = 65534;
pub const MAX_TABLE_COLS: usize = 1000;
/// Upper bound on `rows * cols`; wide tables with many rows lose columns.
pub const MAX_GRID_CELLS: usize = 1_000_000;

/// Span attribute in `1..=max`. Missing, invalid or zero values count as 1,
/// values too large to represent count as `max`.
fn span_attr(cell: &Handle, name: &str, max: usize) -> usize {
    let Some(value) = attr_get(cell, name) else {
        return 1;
    };
    match value.trim().parse::<usize>() {
        Ok(n) => n.clamp(1, max),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => max,
        Err(_) => 1,
    }
}

fn row_cells(tr: &Handle) -> Vec<Handle> {
    element_children(tr)
        .into_iter()
        .filter(|c| matches!(tag_lower(c).as_deref(), Some("td" | "th")))
        .collect()
}

/// Occupancy map used while placing cells.
struct Occupancy {
    cols: usize,
    taken: Vec<bool>,
}

impl Occupancy {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            cols,
            taken: vec![false; rows * cols],
        }
    }

    fn is_taken(&self, row: usize, col: usize) -> bool {
        self.taken[row * self.cols + col]
    }

    fn range_free(&self, row: usize, cols: std::ops::Range<usize>) -> bool {
        cols.into_iter().all(|c| !self.is_taken(row, c))
    }

    fn claim(&mut self, region: &MergeRegion) {
        for r in region.row..region.row + region.row_span {
            for c in region.col..region.col + region.col_span {
                self.taken[r * self.cols + c] = true;
            }
        }
    }
}

pub struct TableBuilder<'a> {
    resolver: StyleResolver<'a>,
    units: UnitConverter<'a>,
}

impl<'a> TableBuilder<'a> {
    pub fn new(resolver: StyleResolver<'a>, units: UnitConverter<'a>) -> Self {
        Self { resolver, units }
    }

    /// Builds the grid for `table`. Rows are collected at any depth below the
    /// table element. Tables without rows or columns yield `None`.
    pub fn build(&self, table: &Handle) -> Option<Table> {
        let rows = find_descendants(table, &["tr"]);
        if rows.is_empty() {
            warn!("table has no rows");
            return None;
        }
        let row_cells: Vec<Vec<Handle>> = rows.iter().map(row_cells).collect();
        let declared = row_cells
            .iter()
            .map(|cells| {
                cells
                    .iter()
                    .fold(0usize, |acc, c| acc.saturating_add(span_attr(c, "colspan", MAX_COLSPAN)))
            })
            .max()
            .unwrap_or(0);
        if declared == 0 {
            warn!("table has no columns");
            return None;
        }
        let row_count = rows.len();
        let limit = MAX_TABLE_COLS.min(MAX_GRID_CELLS / row_count).max(1);
        let cols = declared.min(limit);
        if cols < declared {
            warn!(declared, cols, "table too wide, dropping extra columns");
        }
        info!(rows = row_count, cols, "creating table");

        let mut grid = vec![Cell::default(); row_count * cols];
        let mut merges = Vec::new();
        let mut occupied = Occupancy::new(row_count, cols);

        for (i, cells) in row_cells.iter().enumerate() {
            let mut col = 0usize;
            for cell in cells {
                while col < cols && occupied.is_taken(i, col) {
                    col += 1;
                }
                if col >= cols {
                    debug!(row = i, "row overflows grid, dropping remaining cells");
                    break;
                }

                let region = self.place(&occupied, i, col, cell, row_count, cols);
                occupied.claim(&region);
                if region.cell_count() > 1 {
                    debug!(
                        from = ?(region.row, region.col),
                        to = ?(region.row + region.row_span - 1, region.col + region.col_span - 1),
                        "merging cells"
                    );
                    merges.push(region);
                }

                grid[i * cols + col] = self.cell_content(cell);
                col = region.col + region.col_span;
            }
        }

        let width_pt = table_width(&self.resolver.resolve(table), &self.units);
        Some(Table::new(row_count, cols, grid, merges, width_pt))
    }

    /// Region a cell at `(row, col)` claims: its declared spans clamped to the
    /// grid edge and cut short before any position an earlier cell owns.
    fn place(
        &self,
        occupied: &Occupancy,
        row: usize,
        col: usize,
        cell: &Handle,
        rows: usize,
        cols: usize,
    ) -> MergeRegion {
        let mut end_col = col.saturating_add(span_attr(cell, "colspan", MAX_COLSPAN)).min(cols);
        if let Some(first_taken) = (col..end_col).find(|c| occupied.is_taken(row, *c)) {
            end_col = first_taken;
        }
        let mut end_row = row.saturating_add(span_attr(cell, "rowspan", MAX_ROWSPAN)).min(rows);
        if let Some(blocked) = (row + 1..end_row).find(|r| !occupied.range_free(*r, col..end_col)) {
            end_row = blocked;
        }
        MergeRegion {
            row,
            col,
            row_span: end_row - row,
            col_span: end_col - col,
        }
    }

    fn cell_content(&self, cell: &Handle) -> Cell {
        let text = text_content(cell);
        let mut paragraph = Paragraph::new(ParagraphKind::Normal);
        if !text.is_empty() {
            paragraph.runs.push(Run::new(text));
        }
        if tag_lower(cell).as_deref() == Some("th") {
            for run in paragraph.runs_mut() {
                run.bold = Some(true);
            }
            paragraph.format.alignment = Some(Alignment::Center);
        }
        let mut out = Cell {
            paragraph,
            shading: None,
        };
        apply_cell_style(&mut out, &self.resolver.resolve(cell), &self.units);
        out
    }
}
