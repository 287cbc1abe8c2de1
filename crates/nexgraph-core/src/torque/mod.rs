//! Torque Stream Parsing
//!
//! Turns the live output of a DFT gauge into discrete records and converts
//! them to delimited text or chart series.

pub mod grammar;
mod stitch;

pub use grammar::{matches_flat_grammar, matches_paren_grammar, Grammar};
pub use stitch::StreamStitcher;

use chrono::NaiveDateTime;

use crate::export::{self, ChartPoint, Export, ExportError, ExportFormat};

/// Timestamp layouts seen in parenthesized records
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
];

/// One reconstructed torque event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorqueRecord {
    /// `label sign magnitude unit`
    Flat(String),
    /// `(label, sign, magnitude, unit[, timestamp][, extra...])`
    Parenthesized(String),
}

impl TorqueRecord {
    /// Build a record if `text` satisfies either grammar
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match grammar::classify(text)? {
            Grammar::Flat => Some(TorqueRecord::Flat(text.to_string())),
            Grammar::Parenthesized => Some(TorqueRecord::Parenthesized(text.to_string())),
        }
    }

    /// The record as received
    pub fn text(&self) -> &str {
        match self {
            TorqueRecord::Flat(text) | TorqueRecord::Parenthesized(text) => text,
        }
    }

    /// Which grammar the record was recognised by
    pub fn grammar(&self) -> Grammar {
        match self {
            TorqueRecord::Flat(_) => Grammar::Flat,
            TorqueRecord::Parenthesized(_) => Grammar::Parenthesized,
        }
    }

    /// Record fields: whitespace tokens for flat records, comma fields otherwise
    pub fn fields(&self) -> Vec<&str> {
        match self {
            TorqueRecord::Flat(text) => grammar::flat_tokens(text),
            TorqueRecord::Parenthesized(text) => grammar::paren_fields(text),
        }
    }

    /// Name of the reading, first field
    pub fn label(&self) -> &str {
        self.fields().first().copied().unwrap_or_default()
    }

    /// `+` or `-`
    pub fn sign(&self) -> &str {
        self.fields().get(1).copied().unwrap_or_default()
    }

    /// Unsigned value as sent
    pub fn magnitude(&self) -> &str {
        self.fields().get(2).copied().unwrap_or_default()
    }

    /// Unit token, or the description field of a parenthesized record
    pub fn unit(&self) -> &str {
        self.fields().get(3).copied().unwrap_or_default()
    }

    /// Magnitude with its sign applied, if the magnitude is a valid number
    pub fn signed_value(&self) -> Option<f64> {
        let value: f64 = self.magnitude().parse().ok()?;
        Some(if self.sign() == "-" { -value } else { value })
    }

    /// First field after the unit that reads as a date and time
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        if self.grammar() != Grammar::Parenthesized {
            return None;
        }
        self.fields().into_iter().skip(4).find_map(|field| {
            TIMESTAMP_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(field, fmt).ok())
        })
    }
}

/// Result of one capture run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureSummary {
    /// Records in arrival order
    pub records: Vec<TorqueRecord>,
    /// Trailing fragments that never completed a record
    pub unmatched: Option<String>,
    /// Number of chunks received
    pub chunks: usize,
    /// Transport error that ended the capture early
    pub fault: Option<String>,
}

impl CaptureSummary {
    /// Render the captured records as `format`
    pub fn export(&self, format: &str, delimiter: char) -> Result<Export, ExportError> {
        let format: ExportFormat = format.parse()?;
        export::export_torque(&self.records, format, delimiter)
    }
}

/// Records joined by newlines
pub fn to_raw(records: &[TorqueRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{}\n", r.text()))
        .collect()
}

/// One delimited line per record.
///
/// Parenthesized records lose their parentheses and commas become the
/// delimiter; flat records have each space replaced by it.
pub fn to_delimited(records: &[TorqueRecord], delimiter: char) -> String {
    let mut out = String::new();
    let delim = delimiter.to_string();
    for record in records {
        let line = match record {
            TorqueRecord::Parenthesized(text) => text
                .chars()
                .filter(|&c| c != '(' && c != ')')
                .collect::<String>()
                .replace(',', &delim),
            TorqueRecord::Flat(text) => text.replace(' ', &delim),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Chart series labelled by arrival index (1-based), valued by magnitude.
///
/// Charts are ordered by arrival, so the record's own label is not used.
/// A magnitude that is not a valid number fails the whole conversion.
pub fn to_chart_series(records: &[TorqueRecord]) -> Result<Vec<ChartPoint>, ExportError> {
    let mut points = Vec::new();
    let mut index = 0usize;

    for (line, record) in records.iter().enumerate() {
        let fields = record.fields();
        if fields.len() <= 3 {
            continue;
        }

        let token = fields[2];
        let value: f64 = token.parse().map_err(|_| ExportError::Parse {
            line: line + 1,
            token: token.to_string(),
        })?;

        index += 1;
        points.push(ChartPoint::new(index.to_string(), value));
    }

    Ok(points)
}
