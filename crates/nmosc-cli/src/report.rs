//! Machine-readable compile report for the `--json` flag.
//!
//! The report mirrors what the timestamped log lines say: which subsongs
//! were compiled, where each one landed in the ROM, and the parse warnings.

use nmosc_furnace::ParseWarning;
use serde::Serialize;

/// Top-level report printed to stdout when `--json` is given.
#[derive(Debug, Serialize)]
pub struct CompileReport {
    /// Absolute path of the input export.
    pub input: String,
    /// Path of the written `.bin` file.
    pub output: String,
    /// One entry per compiled subsong, in ROM order.
    pub subsongs: Vec<SubsongReport>,
    /// Total ROM size in bytes.
    pub total_size: usize,
    /// Parse warnings, in the order they were raised.
    pub warnings: Vec<WarningReport>,
}

/// Placement of one compiled subsong inside the ROM.
#[derive(Debug, Serialize)]
pub struct SubsongReport {
    /// The subsong index that was compiled.
    pub index: u8,
    /// The assembled song title.
    pub name: String,
    /// Byte offset of this subsong in the ROM.
    pub address: usize,
    /// Size of this subsong's byte stream.
    pub size: usize,
}

/// A parse warning in report form.
#[derive(Debug, Serialize)]
pub struct WarningReport {
    /// 1-based input line number.
    pub line: usize,
    /// Human-readable description.
    pub message: String,
}

impl From<&ParseWarning> for WarningReport {
    fn from(warning: &ParseWarning) -> Self {
        Self {
            line: warning.line,
            message: warning.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serialises() {
        let report = CompileReport {
            input: "song.txt".into(),
            output: "song.bin".into(),
            subsongs: vec![SubsongReport {
                index: 0,
                name: "Song".into(),
                address: 0,
                size: 16,
            }],
            total_size: 16,
            warnings: vec![WarningReport {
                line: 3,
                message: "something advisory".into(),
            }],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"total_size\":16"));
        assert!(json.contains("\"address\":0"));
        assert!(json.contains("something advisory"));
    }
}
