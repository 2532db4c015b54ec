//! Table model and terminal rendering

/// Rows split into header and body sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<Vec<String>>,
    pub body: Vec<Vec<String>>,
}

/// Split a row matrix into `header_rows` header rows and the rest.
pub fn build_table(rows: &[Vec<String>], header_rows: usize) -> Table {
    let split = header_rows.min(rows.len());
    Table {
        header: rows[..split].to_vec(),
        body: rows[split..].to_vec(),
    }
}

/// Keep at most `max_rows` body rows after the header rows.
pub fn limit_rows(
    mut rows: Vec<Vec<String>>,
    header_rows: usize,
    max_rows: Option<usize>,
) -> Vec<Vec<String>> {
    if let Some(max_rows) = max_rows.filter(|n| *n > 0) {
        rows.truncate(max_rows.saturating_add(header_rows));
    }
    rows
}

impl Table {
    pub fn header_cells(&self) -> usize {
        self.header.iter().map(Vec::len).sum()
    }

    pub fn body_cells(&self) -> usize {
        self.body.iter().map(Vec::len).sum()
    }

    fn width(&self) -> usize {
        self.header
            .iter()
            .chain(&self.body)
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }

    /// Render as a pipe table.
    ///
    /// The first header row becomes the table head; further header rows are
    /// emitted in bold ahead of the body. Without header rows the head is
    /// left blank.
    pub fn render_markdown(&self) -> String {
        let width = self.width();
        if width == 0 {
            return String::new();
        }

        let mut out = String::new();
        let blank = Vec::new();
        let head = self.header.first().unwrap_or(&blank);
        push_row(&mut out, head, width, false);
        out.push('|');
        for _ in 0..width {
            out.push_str(" --- |");
        }
        out.push('\n');

        for row in self.header.iter().skip(1) {
            push_row(&mut out, row, width, true);
        }
        for row in &self.body {
            push_row(&mut out, row, width, false);
        }
        out
    }
}

fn push_row(out: &mut String, row: &[String], width: usize, bold: bool) {
    out.push('|');
    for i in 0..width {
        let cell = row.get(i).map(|c| escape_cell(c)).unwrap_or_default();
        out.push(' ');
        if bold && !cell.is_empty() {
            out.push_str("**");
            out.push_str(&cell);
            out.push_str("**");
        } else {
            out.push_str(&cell);
        }
        out.push_str(" |");
    }
    out.push('\n');
}

fn escape_cell(cell: &str) -> String {
    cell.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .replace('|', "\\|")
}
