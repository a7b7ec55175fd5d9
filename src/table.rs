//! Tabular text decoder.
//!
//! LSF commands print a header row followed by one row per entity, padded
//! for human eyes. [`TableDecoder`] turns that text into [`RawRecord`]s whose
//! columns are looked up by header name, so reordered or added columns in a
//! newer LSF release do not shift values.
//!
//! Two layouts are supported:
//!
//! - [`Layout::Delimited`]: a single delimiter character separates fields.
//!   Quoted fields may contain the delimiter (lazy CSV quoting). With
//!   `trim_leading_space` the padding before each field is dropped, which
//!   is how space-aligned output is read.
//! - [`Layout::TrailingText`]: fields are separated by runs of whitespace and
//!   the last header column receives the remainder of the line verbatim,
//!   for free-text columns such as `RESOURCES` or `JOB_NAME`.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced while decoding tabular output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The output did not contain a header row.
    #[error("missing header row")]
    MissingHeader,

    /// A data row had the wrong number of fields.
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// A required column was absent from a row.
    #[error("line {line}: missing column '{column}'")]
    MissingColumn { line: usize, column: String },
}

/// How fields are separated on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Fields separated by a single delimiter character.
    Delimited(char),
    /// Whitespace-separated fields; the last column takes the rest of the line.
    TrailingText,
}

/// Decoder settings for one command's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFormat {
    pub layout: Layout,
    /// Skip whitespace before each delimited field.
    pub trim_leading_space: bool,
    /// Accept rows with fewer fields than the header.
    pub allow_short_rows: bool,
}

impl TableFormat {
    /// Space-aligned columns, as printed by `bhosts -w` and friends.
    pub const fn space_delimited() -> Self {
        Self {
            layout: Layout::Delimited(' '),
            trim_leading_space: true,
            allow_short_rows: false,
        }
    }

    /// Strict single-character delimiter; consecutive delimiters yield empty fields.
    pub const fn delimited(delimiter: char) -> Self {
        Self {
            layout: Layout::Delimited(delimiter),
            trim_leading_space: false,
            allow_short_rows: false,
        }
    }

    /// Whitespace-run columns with a free-text last column.
    pub const fn trailing_text() -> Self {
        Self {
            layout: Layout::TrailingText,
            trim_leading_space: true,
            allow_short_rows: false,
        }
    }

    /// Accept rows that stop before the last header column.
    pub const fn allow_short_rows(mut self) -> Self {
        self.allow_short_rows = true;
        self
    }
}

/// One decoded data row, keyed by header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    line: usize,
    header: Arc<[String]>,
    values: Vec<String>,
}

impl RawRecord {
    /// 1-based line number in the command output.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Value of `column`, or `None` if the header lacks it or the row is short.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.header
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Value of `column`, failing with [`DecodeError::MissingColumn`].
    pub fn require(&self, column: &str) -> Result<&str, DecodeError> {
        self.get(column).ok_or_else(|| DecodeError::MissingColumn {
            line: self.line,
            column: column.to_string(),
        })
    }

    /// Column name to value mapping for every present column.
    pub fn to_map(&self) -> HashMap<&str, &str> {
        self.header
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
            .collect()
    }
}

/// Single-pass decoder over a command's text output.
pub struct TableDecoder<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    format: TableFormat,
    header: Arc<[String]>,
}

impl<'a> TableDecoder<'a> {
    /// Read the header row and prepare to decode the data rows.
    ///
    /// # Errors
    /// Returns [`DecodeError::MissingHeader`] if `text` has no non-blank line.
    pub fn new(text: &'a str, format: TableFormat) -> Result<Self, DecodeError> {
        let mut lines = text.lines().enumerate();
        let header = loop {
            match lines.next() {
                Some((_, line)) if line.trim().is_empty() => continue,
                Some((_, line)) => break split_header(line.trim_end(), format),
                None => return Err(DecodeError::MissingHeader),
            }
        };

        Ok(Self {
            lines,
            format,
            header: header.into(),
        })
    }

    /// Column names in header order.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    fn decode_line(&self, line_no: usize, line: &str) -> Result<RawRecord, DecodeError> {
        let expected = self.header.len();
        let values = match self.format.layout {
            Layout::Delimited(delimiter) => {
                split_delimited(line, delimiter, self.format.trim_leading_space)
            }
            Layout::TrailingText => split_trailing(line, expected),
        };

        let found = values.len();
        if found > expected || (found < expected && !self.format.allow_short_rows) {
            return Err(DecodeError::FieldCount {
                line: line_no,
                expected,
                found,
            });
        }

        Ok(RawRecord {
            line: line_no,
            header: Arc::clone(&self.header),
            values,
        })
    }
}

impl Iterator for TableDecoder<'_> {
    type Item = Result<RawRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (idx, line) = self.lines.next()?;
            let line = line.trim_end();
            if line.trim_start().is_empty() {
                continue;
            }
            return Some(self.decode_line(idx + 1, line));
        }
    }
}

fn split_header(line: &str, format: TableFormat) -> Vec<String> {
    match format.layout {
        Layout::Delimited(delimiter) => {
            split_delimited(line, delimiter, format.trim_leading_space)
        }
        Layout::TrailingText => line.split_whitespace().map(str::to_string).collect(),
    }
}

/// Split a whitespace-separated line into at most `columns` fields, the last
/// of which keeps any inner whitespace.
fn split_trailing(line: &str, columns: usize) -> Vec<String> {
    let mut fields = Vec::with_capacity(columns);
    let mut rest = line.trim_start();

    while !rest.is_empty() {
        if fields.len() + 1 == columns {
            fields.push(rest.to_string());
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        fields.push(rest[..end].to_string());
        rest = rest[end..].trim_start();
    }
    fields
}

/// Split one line on `delimiter` following lazy CSV quoting rules.
fn split_delimited(line: &str, delimiter: char, trim_leading_space: bool) -> Vec<String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        if trim_leading_space {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
        }

        let mut field = String::new();
        let mut closed_by_delimiter = false;

        if chars.next_if_eq(&'"').is_some() {
            // Quoted field: runs until a quote followed by the delimiter or end of line.
            while let Some(c) = chars.next() {
                if c != '"' {
                    field.push(c);
                    continue;
                }
                match chars.peek() {
                    Some('"') => {
                        chars.next();
                        field.push('"');
                    }
                    Some(&next) if next == delimiter => {
                        chars.next();
                        closed_by_delimiter = true;
                        break;
                    }
                    None => break,
                    // Lazy quoting: a stray quote is kept literally.
                    Some(_) => field.push('"'),
                }
            }
        } else {
            for c in chars.by_ref() {
                if c == delimiter {
                    closed_by_delimiter = true;
                    break;
                }
                field.push(c);
            }
        }

        fields.push(field);
        if !closed_by_delimiter {
            return fields;
        }
    }
}

/// A typed row decoded from a [`RawRecord`].
pub trait FromRecord: Sized {
    /// Extract the typed row, failing if a required column is absent.
    fn from_record(record: &RawRecord) -> Result<Self, DecodeError>;
}

/// Decode every well-formed row of `output`.
///
/// Malformed rows are logged against `collector` and skipped; the call only
/// fails when the output has no header at all.
pub fn decode_rows<T: FromRecord>(
    collector: &str,
    output: &[u8],
    format: TableFormat,
) -> Result<Vec<T>, DecodeError> {
    let text = String::from_utf8_lossy(output);
    let decoder = TableDecoder::new(&text, format)?;

    let mut rows = Vec::new();
    for record in decoder {
        match record.and_then(|r| T::from_record(&r)) {
            Ok(row) => rows.push(row),
            Err(e) => {
                tracing::warn!(collector = %collector, error = %e, "Skipping malformed record");
            }
        }
    }
    Ok(rows)
}
