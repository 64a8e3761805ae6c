//! Markdown table detection and flattening.

use regex::Regex;
use std::sync::LazyLock;

static SEPARATOR_ROW: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\|[\s:|-]+\|$").ok());

/// A table flattened to one `header: value, ...` line per data row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FlatTable {
    /// Position among the document's tables, counting skipped ones.
    pub index: usize,
    /// Flattened rows joined by newlines.
    pub text: String,
    /// Rows that survived flattening.
    pub row_count: usize,
}

/// Split `markdown` into its flattened tables and the remaining prose.
///
/// A table is a run of consecutive lines that start and end with `|`. Separator rows are
/// dropped, rows whose column count differs from the header are skipped, and tables without at
/// least a header and one data row produce nothing. Every table is removed from the prose, even
/// when it produced nothing.
pub(crate) fn extract_tables(markdown: &str) -> (Vec<FlatTable>, String) {
    let mut tables = Vec::new();
    let mut prose = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut index = 0;

    for line in markdown.lines() {
        if is_table_line(line) {
            block.push(line.trim());
            continue;
        }
        if !block.is_empty() {
            if let Some(table) = flatten(index, &block) {
                tables.push(table);
            }
            index += 1;
            block.clear();
        }
        prose.push(line);
    }
    if !block.is_empty()
        && let Some(table) = flatten(index, &block)
    {
        tables.push(table);
    }

    (tables, collapse_blank_lines(&prose))
}

fn is_table_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 2 && trimmed.starts_with('|') && trimmed.ends_with('|')
}

fn is_separator(row: &str) -> bool {
    if row.contains("---") {
        return true;
    }
    SEPARATOR_ROW
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(row))
}

fn cells(row: &str) -> Vec<&str> {
    row.split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .collect()
}

fn flatten(index: usize, block: &[&str]) -> Option<FlatTable> {
    let rows: Vec<&str> = block.iter().copied().filter(|row| !is_separator(row)).collect();
    if rows.len() < 2 {
        tracing::warn!(table = index, "Skipping table without data rows");
        return None;
    }

    let headers = cells(rows[0]);
    let mut lines = Vec::with_capacity(rows.len() - 1);
    for (row_index, row) in rows.iter().enumerate().skip(1) {
        let values = cells(row);
        if values.len() != headers.len() {
            tracing::warn!(
                table = index,
                row = row_index,
                columns = values.len(),
                expected = headers.len(),
                "Skipping table row with mismatched columns"
            );
            continue;
        }
        let line = headers
            .iter()
            .zip(values)
            .map(|(header, value)| format!("{header}: {value}"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(line);
    }

    if lines.is_empty() {
        return None;
    }
    Some(FlatTable {
        index,
        row_count: lines.len(),
        text: lines.join("\n"),
    })
}

fn collapse_blank_lines(lines: &[&str]) -> String {
    let mut out = Vec::with_capacity(lines.len());
    let mut blank_run = 0;
    for line in lines {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(*line);
    }
    out.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Trial report\n\nFoliarMax was applied at V6.\n\n| Plot | Yield | Moisture |\n|------|:-----:|----------|\n| Treated | 212 | 15.1 |\n| Control | 198 |\n| Check | 190 | 15.4 |\n\n\n\nTreated plots out-yielded control.\n";

    #[test]
    fn tables_flatten_to_header_value_rows() {
        let (tables, prose) = extract_tables(DOC);

        assert_eq!(tables.len(), 1);
        assert_eq!(
            tables[0].text,
            "Plot: Treated, Yield: 212, Moisture: 15.1\nPlot: Check, Yield: 190, Moisture: 15.4"
        );
        assert_eq!(tables[0].row_count, 2);
        assert!(!prose.contains('|'));
        assert!(prose.contains("FoliarMax was applied"));
        assert!(!prose.contains("\n\n\n"));
    }

    #[test]
    fn header_only_tables_are_skipped_but_removed() {
        let (tables, prose) = extract_tables("Intro\n| A | B |\n|---|---|\nOutro");
        assert!(tables.is_empty());
        assert_eq!(prose, "Intro\nOutro");
    }

    #[test]
    fn table_indices_count_skipped_tables() {
        let doc = "| A |\n|---|\n\n| X | Y |\n| 1 | 2 |\n";
        let (tables, _) = extract_tables(doc);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].index, 1);
        assert_eq!(tables[0].text, "X: 1, Y: 2");
    }
}
