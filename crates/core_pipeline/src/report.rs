//! Result reporting
//!
//! Emits each entry's label followed by its text (or failure) in report
//! order. No ranking: choosing the best text is left to the reader.

use crate::types::{EnsembleReport, OcrOutcome};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::str::FromStr;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human readable blocks, one per entry
    #[default]
    Text,
    /// The full report as pretty-printed JSON
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{}' (expected text or json)", other)),
        }
    }
}

/// Writes ensemble reports to an output stream
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn report<W: Write>(&self, report: &EnsembleReport, out: &mut W) -> io::Result<()> {
        match self.format {
            ReportFormat::Text => write_text(report, out),
            ReportFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, report)?;
                writeln!(out)
            }
        }
    }
}

fn write_text<W: Write>(report: &EnsembleReport, out: &mut W) -> io::Result<()> {
    for result in &report.results {
        match result.dimensions {
            Some((w, h)) => writeln!(out, "=== {} ({}x{}) ===", result.label, w, h)?,
            None => writeln!(out, "=== {} ===", result.label)?,
        }
        if let Some(path) = &result.artifact {
            writeln!(out, "{}", path.display())?;
        }
        match &result.outcome {
            OcrOutcome::Recognized { text } => writeln!(out, "{}", text.trim_end())?,
            OcrOutcome::Failed { kind, message } => {
                writeln!(out, "[failed: {}] {}", kind, message)?
            }
        }
        writeln!(out)?;
    }
    out.flush()
}
