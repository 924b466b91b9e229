//! Schema resolution (text to records).
//!
//! Turns raw delimited text into ordered [`Record`]s keyed by canonical
//! [`Field`]. The input is whatever a person exported from a spreadsheet, so
//! the reader is deliberately tolerant:
//!
//! - a leading byte-order mark is dropped;
//! - the delimiter is sniffed from the first non-empty line (comma,
//!   semicolon or tab; comma wins ties);
//! - fields follow RFC4180 quoting: quoted fields may hold the delimiter or
//!   line breaks, and `""` inside quotes is a literal quote;
//! - `\n` and `\r\n` line endings are both accepted;
//! - header cells are matched through an alias table that ignores case,
//!   whitespace and punctuation (`Territory ID`, `territory_id` and
//!   `TERRITORY-ID` are the same column).
//!
//! Only a missing required column is fatal ([`SchemaInvalid`]). Everything
//! else degrades to empty values and is dealt with by the rule compiler.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Canonical columns understood by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Id,
    Tokens,
    Region,
    Population,
    BusinessCount,
    Income,
    Status,
}

impl Field {
    pub const COUNT: usize = 7;
    pub const ALL: [Field; Field::COUNT] = [
        Field::Id,
        Field::Tokens,
        Field::Region,
        Field::Population,
        Field::BusinessCount,
        Field::Income,
        Field::Status,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Tokens => "tokens",
            Field::Region => "region",
            Field::Population => "population",
            Field::BusinessCount => "business_count",
            Field::Income => "income",
            Field::Status => "status",
        }
    }

    /// Accepted header spellings, before normalization.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::Id => &["territory_id", "id"],
            Field::Tokens => &["postcode_prefixes", "postcodes", "prefixes"],
            Field::Region => &["region"],
            Field::Population => &["estimated_population", "population", "pop"],
            Field::BusinessCount => &["indicative_business_count", "businesses", "biz", "business_count"],
            Field::Income => &["average_household_income", "income", "avg_income"],
            Field::Status => &["status"],
        }
    }

    pub fn is_required(self) -> bool {
        matches!(self, Field::Id | Field::Tokens)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The header lacks one or more required columns. Fatal to the load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema invalid: missing required column(s): {}", field_list(.missing))]
pub struct SchemaInvalid {
    pub missing: Vec<Field>,
}

fn field_list(fields: &[Field]) -> String {
    fields.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ")
}

/// One data row, keyed by canonical field. Absent columns read as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// 1-based line of the source text where the row starts.
    pub line: usize,
    values: [String; Field::COUNT],
}

impl Record {
    pub fn new(line: usize) -> Self {
        Record { line, ..Record::default() }
    }

    pub fn get(&self, field: Field) -> &str {
        &self.values[field.index()]
    }

    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.values[field.index()] = value.into();
        self
    }
}

/// Records resolved from one source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub delimiter: char,
    pub records: Vec<Record>,
}

/// Normalized alias -> field. Built once.
static ALIASES: Lazy<HashMap<String, Field>> = Lazy::new(|| {
    Field::ALL
        .iter()
        .flat_map(|&field| field.aliases().iter().map(move |alias| (normalize_header(alias), field)))
        .collect()
});

impl Table {
    /// Resolve `text` into records.
    ///
    /// ```text
    /// text ─ strip BOM ─ sniff delimiter ─ split rows ─ drop blank rows
    ///                                                   │
    ///                          header ◀── first row ────┘
    ///                            │ alias match
    ///                            v
    ///                  [Option<column>; Field::COUNT] ──▶ Vec<Record>
    /// ```
    pub fn resolve(text: &str) -> Result<Table, SchemaInvalid> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let delimiter = detect_delimiter(text);

        let mut rows = split_rows(text, delimiter).into_iter().filter(|(_, cells)| !is_blank_row(cells));

        let Some((_, header)) = rows.next() else {
            return Err(SchemaInvalid { missing: Field::ALL.into_iter().filter(|f| f.is_required()).collect() });
        };

        let columns = resolve_header(&header);
        let missing: Vec<Field> =
            Field::ALL.into_iter().filter(|f| f.is_required() && columns[f.index()].is_none()).collect();
        if !missing.is_empty() {
            tracing::warn!(header = ?header, missing = %field_list(&missing), "header lacks required columns");
            return Err(SchemaInvalid { missing });
        }

        let records: Vec<Record> = rows
            .map(|(line, cells)| {
                let mut record = Record::new(line);
                for field in Field::ALL {
                    if let Some(value) = columns[field.index()].and_then(|col| cells.get(col)) {
                        record.values[field.index()] = value.trim().to_string();
                    }
                }
                record
            })
            .collect();

        tracing::debug!(delimiter = ?delimiter, rows = records.len(), "resolved table");
        Ok(Table { delimiter, records })
    }
}

/// Lowercase and drop everything that is not a letter or digit.
fn normalize_header(cell: &str) -> String {
    regex!(r"[^\p{L}\p{N}]+").replace_all(&cell.to_lowercase(), "").into_owned()
}

/// Map each canonical field to the first header column that spells it.
fn resolve_header(header: &[String]) -> [Option<usize>; Field::COUNT] {
    let mut columns = [None; Field::COUNT];
    for (col, cell) in header.iter().enumerate() {
        if let Some(field) = ALIASES.get(&normalize_header(cell)) {
            columns[field.index()].get_or_insert(col);
        }
    }
    columns
}

fn is_blank_row(cells: &[String]) -> bool {
    cells.iter().all(|cell| cell.trim().is_empty())
}

/// Pick the delimiter from the first non-empty line, ignoring quoted spans.
///
/// The highest count among comma, semicolon and tab wins; comma on a tie or
/// when the line has none of them. Quotes follow the same rule as
/// [`split_rows`]: they open a span only at the start of a cell, where any
/// candidate delimiter ends a cell.
pub(crate) fn detect_delimiter(text: &str) -> char {
    let mut in_quotes = false;
    let mut has_content = false;
    let mut cell_start = true;
    let mut counts = [(',', 0usize), (';', 0), ('\t', 0)];

    for ch in text.chars() {
        if in_quotes {
            if ch == '"' {
                in_quotes = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_quotes = cell_start;
                cell_start = false;
                has_content = true;
            }
            '\n' | '\r' => {
                if has_content {
                    break;
                }
                counts.iter_mut().for_each(|(_, n)| *n = 0);
                cell_start = true;
            }
            _ => {
                if let Some((_, n)) = counts.iter_mut().find(|(d, _)| *d == ch) {
                    *n += 1;
                    cell_start = true;
                } else if !ch.is_whitespace() {
                    cell_start = false;
                }
                if !ch.is_whitespace() {
                    has_content = true;
                }
            }
        }
    }

    let mut best = counts[0];
    for candidate in &counts[1..] {
        if candidate.1 > best.1 {
            best = *candidate;
        }
    }
    best.0
}

/// Split `text` into rows of cells, tracking the line each row starts on.
///
/// A quote only opens a quoted span at the start of a cell (leading blanks
/// allowed); anywhere else it is a literal character.
pub(crate) fn split_rows(text: &str, delimiter: char) -> Vec<(usize, Vec<String>)> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut row_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                '\r' if chars.peek() == Some(&'\n') => {}
                '\n' => {
                    line += 1;
                    cell.push('\n');
                }
                _ => cell.push(ch),
            }
            continue;
        }

        match ch {
            '"' if cell.trim().is_empty() => {
                cell.clear();
                in_quotes = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\r' | '\n' => {
                row.push(std::mem::take(&mut cell));
                rows.push((row_line, std::mem::take(&mut row)));
                line += 1;
                row_line = line;
            }
            _ if ch == delimiter => row.push(std::mem::take(&mut cell)),
            _ => cell.push(ch),
        }
    }

    if !cell.is_empty() || !row.is_empty() || in_quotes {
        row.push(cell);
        rows.push((row_line, row));
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cells(row: &[&str]) -> Vec<String> {
        row.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn delimiter_prefers_highest_count() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a;b,c;d"), ';');
    }

    #[test]
    fn delimiter_defaults_to_comma() {
        assert_eq!(detect_delimiter(""), ',');
        assert_eq!(detect_delimiter("single"), ',');
        assert_eq!(detect_delimiter("a;b,c"), ',');
    }

    #[test]
    fn delimiter_ignores_quoted_spans_and_blank_lines() {
        assert_eq!(detect_delimiter("\n\n\"a,b,c\";d;e\n"), ';');
        assert_eq!(detect_delimiter("   \r\nid;prefixes\n1,2,3,4,5"), ';');
    }

    #[test]
    fn delimiter_only_skips_quotes_that_open_a_cell() {
        assert_eq!(detect_delimiter("id; \"a,b,c\";prefixes\n"), ';');
        // A mid-cell quote is literal, so the commas after it count.
        let text = "id;size 5\"x,y,z,w\";prefixes\n";
        assert_eq!(detect_delimiter(text), ',');
        assert_eq!(split_rows(text, ',')[0].1.len(), 4);
    }

    #[test]
    fn split_handles_quotes_and_line_endings() {
        let rows = split_rows("id,p\r\nT1,\"A|B,\"\"x\"\"\"\r\nT2,\"multi\nline\"\n", ',');
        assert_eq!(
            rows,
            vec![
                (1, cells(&["id", "p"])),
                (2, cells(&["T1", "A|B,\"x\""])),
                (3, cells(&["T2", "multi\nline"])),
            ]
        );
    }

    #[test]
    fn split_keeps_last_row_without_newline() {
        let rows = split_rows("a;b\n1;", ';');
        assert_eq!(rows, vec![(1, cells(&["a", "b"])), (2, cells(&["1", ""]))]);
    }

    #[test]
    fn stray_quote_mid_cell_is_literal() {
        let rows = split_rows("a,5\"x\n", ',');
        assert_eq!(rows, vec![(1, cells(&["a", "5\"x"]))]);
    }

    #[test]
    fn header_aliases_are_tolerant() {
        let text = "\u{feff}Territory ID;Postcode-Prefixes;POP;Avg Income;Biz\nT1;W1+;1 200;£40k;12\n";
        let table = Table::resolve(text).unwrap();

        assert_eq!(table.delimiter, ';');
        assert_eq!(table.records.len(), 1);
        let record = &table.records[0];
        assert_eq!(record.line, 2);
        assert_eq!(record.get(Field::Id), "T1");
        assert_eq!(record.get(Field::Tokens), "W1+");
        assert_eq!(record.get(Field::Population), "1 200");
        assert_eq!(record.get(Field::Income), "£40k");
        assert_eq!(record.get(Field::BusinessCount), "12");
        assert_eq!(record.get(Field::Region), "");
        assert_eq!(record.get(Field::Status), "");
    }

    #[test]
    fn first_matching_column_wins() {
        let table = Table::resolve("id,territory_id,postcodes\nA,B,W1\n").unwrap();
        assert_eq!(table.records[0].get(Field::Id), "A");
    }

    #[test]
    fn blank_rows_are_dropped() {
        let table = Table::resolve("id,postcodes\n\n , \nT1,W1\n,,\n").unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.records[0].line, 4);
    }

    #[test]
    fn missing_required_columns_are_reported() {
        let err = Table::resolve("id,region\nT1,London\n").unwrap_err();
        assert_eq!(err.missing, vec![Field::Tokens]);
        assert_eq!(err.to_string(), "schema invalid: missing required column(s): tokens");

        let err = Table::resolve("").unwrap_err();
        assert_eq!(err.missing, vec![Field::Id, Field::Tokens]);
    }
}
