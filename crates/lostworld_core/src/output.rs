use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::csv_utils::write_records;
use crate::errors::TrackerError;
use crate::models::AggregatedRecord;

pub const OUTPUT_JSON: &str = "output.json";
pub const OUTPUT_CSV: &str = "output.csv";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl OutputFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            OutputFormat::Json => OUTPUT_JSON,
            OutputFormat::Csv => OUTPUT_CSV,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = TrackerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(TrackerError::InvalidConfig(format!(
                "output_format `{other}` is invalid (expected json or csv)"
            ))),
        }
    }
}

pub fn render_json(records: &[AggregatedRecord]) -> Result<String, TrackerError> {
    serde_json::to_string_pretty(records)
        .map_err(|err| TrackerError::Other(format!("failed to serialize report: {err}")))
}

pub fn write_json(path: &Path, records: &[AggregatedRecord]) -> Result<usize, TrackerError> {
    let json = render_json(records)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(records.len())
}

/// Writes the report in the selected format into `dir` and returns the file
/// path. `csv_encoding` only applies to CSV.
pub fn write_report(
    dir: &Path,
    format: OutputFormat,
    csv_encoding: &str,
    records: &[AggregatedRecord],
) -> Result<PathBuf, TrackerError> {
    let path = dir.join(format.file_name());
    match format {
        OutputFormat::Json => write_json(&path, records)?,
        OutputFormat::Csv => write_records(&path, csv_encoding, records)?,
    };
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats_only() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(" CSV ".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        let err = "xml".parse::<OutputFormat>().unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn serde_rejects_unknown_format() {
        assert!(serde_json::from_str::<OutputFormat>("\"yaml\"").is_err());
        assert_eq!(
            serde_json::from_str::<OutputFormat>("\"csv\"").unwrap(),
            OutputFormat::Csv
        );
    }

    #[test]
    fn empty_json_report_is_an_empty_array() {
        assert_eq!(render_json(&[]).unwrap(), "[]");
    }
}
