//! Plain ASCII tables with optional terminal colors.

use crossterm::style::{Color, Stylize};
use std::io::{self, IsTerminal, Write};

struct Column {
    header: String,
    color: Color,
}

pub struct Table {
    title: String,
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn column(mut self, header: impl Into<String>, color: Color) -> Self {
        self.columns.push(Column {
            header: header.into(),
            color,
        });
        self
    }

    /// Missing trailing cells render empty; extra cells are dropped.
    pub fn add_row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    /// Uncolored rendering.
    pub fn render(&self) -> String {
        self.render_with(false)
    }

    pub fn print(&self) -> io::Result<()> {
        let colored = io::stdout().is_terminal();
        let mut stdout = io::stdout().lock();
        stdout.write_all(self.render_with(colored).as_bytes())?;
        stdout.flush()
    }

    fn widths(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(index))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(column.header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    fn render_with(&self, colored: bool) -> String {
        let widths = self.widths();
        let border = widths
            .iter()
            .map(|width| "-".repeat(width + 2))
            .collect::<Vec<_>>()
            .join("+");
        let border = format!("+{border}+\n");

        let line = |cells: Vec<(&str, Option<Color>)>| {
            let rendered: Vec<String> = cells
                .into_iter()
                .zip(&widths)
                .map(|((text, color), width)| {
                    let padded = format!("{text:<width$}");
                    match color {
                        Some(color) if colored => padded.with(color).to_string(),
                        _ => padded,
                    }
                })
                .collect();
            format!("| {} |\n", rendered.join(" | "))
        };

        let mut out = String::new();
        if colored {
            out.push_str(&format!(" {}\n", self.title.as_str().bold()));
        } else {
            out.push_str(&format!(" {}\n", self.title));
        }
        out.push_str(&border);
        out.push_str(&line(
            self.columns
                .iter()
                .map(|column| (column.header.as_str(), None))
                .collect(),
        ));
        out.push_str(&border);
        for row in &self.rows {
            out.push_str(&line(
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(index, column)| {
                        let text = row.get(index).map(String::as_str).unwrap_or("");
                        (text, Some(column.color))
                    })
                    .collect(),
            ));
        }
        if !self.rows.is_empty() {
            out.push_str(&border);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_size_to_widest_cell() {
        let mut table = Table::new("Wi-Fi")
            .column("SSID", Color::Cyan)
            .column("Password", Color::Green);
        table.add_row(vec!["Home network".into(), "hunter2".into()]);
        table.add_row(vec!["Cafe".into()]);

        let expected = " Wi-Fi\n\
+--------------+----------+\n\
| SSID         | Password |\n\
+--------------+----------+\n\
| Home network | hunter2  |\n\
| Cafe         |          |\n\
+--------------+----------+\n";
        assert_eq!(table.render(), expected);
    }

    #[test]
    fn empty_table_has_header_only() {
        let table = Table::new("Empty").column("ISO", Color::Cyan);
        assert_eq!(table.render(), " Empty\n+-----+\n| ISO |\n+-----+\n");
    }
}
