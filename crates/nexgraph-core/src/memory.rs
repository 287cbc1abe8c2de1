//! Memory dump parsing
//!
//! The `Download` command returns the gauge's stored readings as lines of
//! space-separated tokens. There is no fixed schema; a line is chartable when
//! it has more than three tokens, with the label first and the value fourth.

use crate::export::{ChartPoint, ExportError};

/// One line of a memory dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    /// Whitespace-separated tokens in order
    pub fields: Vec<String>,
}

impl MemoryRecord {
    /// Tokenize a single dump line
    pub fn parse(line: &str) -> Self {
        Self {
            fields: line.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Check if the line has enough tokens to be charted
    pub fn is_chartable(&self) -> bool {
        self.fields.len() > 3
    }
}

/// Decode a dump byte for byte as single-byte text.
///
/// Sessions return dumps already decoded; this is for dumps captured some
/// other way, such as a terminal log saved to disk.
pub fn parse_raw(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Tokenize every line of a dump, blank lines included
pub fn parse_records(raw: &str) -> Vec<MemoryRecord> {
    raw.lines().map(MemoryRecord::parse).collect()
}

/// Replace each run of spaces with `delimiter`, line by line.
///
/// A blank line comes out as a line holding only the delimiter; downstream
/// spreadsheets rely on that to keep row positions.
pub fn to_delimited(raw: &str, delimiter: char) -> String {
    let delim = delimiter.to_string();
    let mut out = String::with_capacity(raw.len());

    for record in parse_records(raw) {
        if record.fields.is_empty() {
            out.push(delimiter);
        } else {
            out.push_str(&record.fields.join(&delim));
        }
        out.push('\n');
    }

    out
}

/// `(token 0, token 3)` of every line with more than three tokens.
///
/// Lines that are too short are skipped, but a fourth token that is not a
/// number fails the whole conversion.
pub fn to_chart_series(raw: &str) -> Result<Vec<ChartPoint>, ExportError> {
    let mut points = Vec::new();

    for (index, record) in parse_records(raw).into_iter().enumerate() {
        if !record.is_chartable() {
            continue;
        }

        let token = &record.fields[3];
        let value: f64 = token.parse().map_err(|_| ExportError::Parse {
            line: index + 1,
            token: token.clone(),
        })?;
        points.push(ChartPoint::new(record.fields[0].clone(), value));
    }

    Ok(points)
}
