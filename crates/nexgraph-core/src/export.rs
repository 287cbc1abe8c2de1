//! Export formats
//!
//! Maps a format selector to the matching memory or torque conversion. Chart
//! rendering happens elsewhere; this module only produces the label/value
//! pairs, which serialize to JSON for external renderers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{memory, torque};

/// Errors produced while rendering an export
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    /// Selector names no known format
    #[error("Unsupported export format: '{0}'")]
    UnsupportedFormat(String),

    /// A chart value is not a number
    #[error("Parse error at line {line}: '{token}' is not a number")]
    Parse {
        /// 1-based line of the failing record
        line: usize,
        /// Offending token
        token: String,
    },
}

/// Output representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    /// Decoded text, unchanged
    Raw,
    /// One delimited line per input line or record
    Delimited,
    /// Label/value pairs
    ChartSeries,
}

impl ExportFormat {
    /// Canonical selector string
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Raw => "raw",
            ExportFormat::Delimited => "delimited",
            ExportFormat::ChartSeries => "chart-series",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(ExportFormat::Raw),
            "delimited" | "csv" => Ok(ExportFormat::Delimited),
            "chart-series" | "chart" => Ok(ExportFormat::ChartSeries),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chart bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// Bar label
    pub label: String,
    /// Bar height
    pub value: f64,
}

impl ChartPoint {
    /// Create a point
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// A rendered export
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum Export {
    /// Raw or delimited text
    Text(String),
    /// Chart series
    Series(Vec<ChartPoint>),
}

impl Export {
    /// Text content, if this is a text export
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Export::Text(text) => Some(text),
            Export::Series(_) => None,
        }
    }

    /// Chart points, if this is a series export
    pub fn as_series(&self) -> Option<&[ChartPoint]> {
        match self {
            Export::Text(_) => None,
            Export::Series(points) => Some(points),
        }
    }

    /// Serialize for an external renderer
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Render a downloaded memory dump
pub fn export_memory(raw: &str, format: ExportFormat, delimiter: char) -> Result<Export, ExportError> {
    Ok(match format {
        ExportFormat::Raw => Export::Text(raw.to_string()),
        ExportFormat::Delimited => Export::Text(memory::to_delimited(raw, delimiter)),
        ExportFormat::ChartSeries => Export::Series(memory::to_chart_series(raw)?),
    })
}

/// Render captured torque records
pub fn export_torque(
    records: &[torque::TorqueRecord],
    format: ExportFormat,
    delimiter: char,
) -> Result<Export, ExportError> {
    Ok(match format {
        ExportFormat::Raw => Export::Text(torque::to_raw(records)),
        ExportFormat::Delimited => Export::Text(torque::to_delimited(records, delimiter)),
        ExportFormat::ChartSeries => Export::Series(torque::to_chart_series(records)?),
    })
}
