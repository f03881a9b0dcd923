//! Table rendering utilities for CLI outputs.

use regex::Regex;
use std::sync::LazyLock;
use unicode_width::UnicodeWidthStr;

static ANSI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-9;]*[mK]").expect("valid ANSI pattern"));

/// Remove ANSI color sequences.
pub fn strip_ansi(s: &str) -> String {
    ANSI.replace_all(s, "").into_owned()
}

/// Display width ignoring color codes.
pub fn visible_width(s: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(s).as_str())
}

pub struct Column {
    pub header: String,
    /// Minimum width; grows with content unless `wrap` is set.
    pub width: usize,
    /// Wrap long cells at `width` instead of widening the column.
    pub wrap: bool,
}

impl Column {
    pub fn new(header: &str, width: usize) -> Self {
        Self {
            header: header.to_string(),
            width,
            wrap: false,
        }
    }

    pub fn wrapped(header: &str, width: usize) -> Self {
        Self {
            wrap: true,
            ..Self::new(header, width)
        }
    }
}

pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<String>>,
}

fn pad(cell: &str, width: usize) -> String {
    let fill = width.saturating_sub(visible_width(cell));
    format!("{cell}{}", " ".repeat(fill))
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                if col.wrap {
                    return col.width.max(visible_width(&col.header));
                }
                self.rows
                    .iter()
                    .filter_map(|r| r.get(i))
                    .map(|c| visible_width(c))
                    .chain([col.width, visible_width(&col.header)])
                    .max()
                    .unwrap_or(col.width)
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let mut out = String::new();

        // Header
        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| pad(&c.header, *w))
            .collect();
        out.push_str(header.join(" ").trim_end());
        out.push('\n');
        out.push_str(&"-".repeat(widths.iter().sum::<usize>() + widths.len().saturating_sub(1)));
        out.push('\n');

        // Rows
        for row in &self.rows {
            let cells: Vec<Vec<String>> = self
                .columns
                .iter()
                .zip(&widths)
                .enumerate()
                .map(|(i, (col, w))| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    if col.wrap && visible_width(cell) > *w {
                        textwrap::wrap(&strip_ansi(cell), *w)
                            .into_iter()
                            .map(|l| l.into_owned())
                            .collect()
                    } else {
                        vec![cell.to_string()]
                    }
                })
                .collect();

            let height = cells.iter().map(Vec::len).max().unwrap_or(1);
            for line in 0..height {
                let parts: Vec<String> = cells
                    .iter()
                    .zip(&widths)
                    .map(|(c, w)| pad(c.get(line).map(String::as_str).unwrap_or(""), *w))
                    .collect();
                out.push_str(parts.join(" ").trim_end());
                out.push('\n');
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colored_cells_pad_by_visible_width() {
        let mut t = Table::new(vec![Column::new("ID", 2), Column::new("STATUS", 6)]);
        t.add_row(vec!["1".into(), "\x1b[32msuccess\x1b[0m".into()]);
        let out = t.render();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "ID STATUS");
        assert_eq!(strip_ansi(lines[2]), "1  success");
    }

    #[test]
    fn wrapped_column_spans_lines() {
        let mut t = Table::new(vec![Column::new("ID", 2), Column::wrapped("MESSAGE", 10)]);
        t.add_row(vec!["1".into(), "connection failed: timed out".into()]);
        let out = t.render();
        assert!(out.lines().count() > 3);
        assert!(out.lines().all(|l| visible_width(l) <= 13));
    }
}
