/// Results Grid Module for tabledash
///
/// Renders a payload as an HTML table. A viewport selects the page of rows
/// that is shown so large tables do not produce huge pages.

use crate::dashboard::render::escape;
use crate::payload::{Payload, Value};

/// Represents a single cell in the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub content: String,
    pub numeric: bool,
    pub null: bool,
}

impl Cell {
    fn from_value(value: &Value) -> Self {
        Cell {
            content: value.to_string(),
            numeric: value.as_f64().is_some(),
            null: value.is_null(),
        }
    }
}

/// Represents a row of cells in the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub label: String,
    pub cells: Vec<Cell>,
}

/// Represents the page of rows currently displayed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub start: usize,
    pub end: usize,
}

impl Viewport {
    pub fn new(start: usize, end: usize) -> Self {
        Viewport { start, end }
    }

    /// A page of `size` rows beginning at `offset`.
    pub fn page(offset: usize, size: usize) -> Self {
        Viewport::new(offset, offset.saturating_add(size.max(1)))
    }

    pub fn visible_rows<'a>(&self, rows: &'a [Row]) -> &'a [Row] {
        let start = self.start.min(rows.len());
        let end = self.end.min(rows.len());
        &rows[start..end]
    }

    /// Offset of the following page, if there are rows after this one.
    pub fn next_offset(&self, total_rows: usize) -> Option<usize> {
        (self.end < total_rows).then_some(self.end)
    }

    /// Offset of the preceding page, if this is not the first.
    pub fn prev_offset(&self) -> Option<usize> {
        let size = self.end - self.start;
        (self.start > 0).then(|| self.start.saturating_sub(size))
    }
}

/// Represents the entire grid structure.
#[derive(Debug, Clone)]
pub struct ResultsGrid {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub viewport: Viewport,
}

impl ResultsGrid {
    /// Builds a grid showing the first `page_size` rows of the payload.
    pub fn from_payload(payload: &Payload, page_size: usize) -> Self {
        let rows = payload
            .rows()
            .iter()
            .enumerate()
            .map(|(i, values)| Row {
                label: payload.index_label(i),
                cells: values.iter().map(Cell::from_value).collect(),
            })
            .collect();
        ResultsGrid {
            headers: payload.columns().to_vec(),
            rows,
            viewport: Viewport::page(0, page_size),
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    /// Renders the visible rows as an HTML table.
    pub fn render_html(&self) -> String {
        let mut output = String::from("<table class=\"grid\">\n<thead><tr><th></th>");
        for header in &self.headers {
            output.push_str(&format!("<th>{}</th>", escape(header)));
        }
        output.push_str("</tr></thead>\n<tbody>\n");
        for row in self.viewport.visible_rows(&self.rows) {
            output.push_str(&format!("<tr><th>{}</th>", escape(&row.label)));
            for cell in &row.cells {
                let class = if cell.null {
                    " class=\"null\""
                } else if cell.numeric {
                    " class=\"num\""
                } else {
                    ""
                };
                output.push_str(&format!("<td{}>{}</td>", class, escape(&cell.content)));
            }
            output.push_str("</tr>\n");
        }
        output.push_str("</tbody>\n</table>\n");
        output
    }

    /// "rows 1-50 of 120" style caption.
    pub fn caption(&self) -> String {
        let total = self.total_rows();
        if total == 0 {
            return "no rows".to_string();
        }
        let start = self.viewport.start.min(total);
        let end = self.viewport.end.min(total);
        if start >= end {
            return format!("no rows on this page ({} total)", total);
        }
        format!("rows {}-{} of {}", start + 1, end, total)
    }
}
