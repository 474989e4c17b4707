//! Data types produced by the meter pipeline.

use crate::error::Result;
use crate::parse::ParsedReading;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One timestamped meter reading.
///
/// Serializes to the snapshot JSON object with exactly these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub meter_id: String,
    /// Absent when the recognized text had no usable number.
    pub reading: Option<f64>,
    pub unit: Option<String>,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub raw_text: String,
}

impl MeasurementRecord {
    /// Build a record from a parse result.
    ///
    /// Without a parsed reading the configured default unit is still reported.
    pub fn new(
        meter_id: &str,
        parsed: Option<ParsedReading>,
        default_unit: Option<&str>,
        raw_text: String,
        at: DateTime<Utc>,
    ) -> Self {
        let (reading, unit) = match parsed {
            Some(parsed) => (Some(parsed.value), parsed.unit),
            None => (None, default_unit.map(str::to_string)),
        };
        Self {
            meter_id: meter_id.to_string(),
            reading,
            unit,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Micros, true),
            raw_text,
        }
    }

    /// Compact single-line JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Write the record as pretty-printed JSON, creating parent directories.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Snapshot file name used by periodic mode: `<meter_id>_<unix_seconds>.json`.
pub fn snapshot_file_name(meter_id: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.json", meter_id, at.timestamp())
}
