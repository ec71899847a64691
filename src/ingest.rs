//! Import file boundary: raw text in, parsed payload plus detected format out

use crate::detect::{self, Confidence, DataFormat, Detection};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The blob is an absolute URL; register it as a remote dataset instead
    #[error("input is a URL ({0}), not raw data")]
    RemoteInput(String),
    #[error("failed to parse {format} input: {reason}")]
    Parse { format: DataFormat, reason: String },
}

/// A parsed data payload with its classification
#[derive(Debug, Clone)]
pub struct ParsedData {
    pub format: DataFormat,
    pub confidence: Confidence,
    pub data: Value,
}

/// Detect the format of a raw text blob and parse it into a JSON payload.
///
/// Tabular formats become an array of row objects keyed by the header line;
/// cell values stay strings (type classification is the column inferencer's
/// job, not the parser's).
pub fn parse_data_text(text: &str, filename: Option<&str>) -> Result<ParsedData, IngestError> {
    match detect::detect(text, filename) {
        Detection::Remote { url } => Err(IngestError::RemoteInput(url)),
        Detection::Data { format, confidence } => {
            let data = parse_as(format, text)?;
            Ok(ParsedData {
                format,
                confidence,
                data,
            })
        }
    }
}

/// Parse text as a known format
pub fn parse_as(format: DataFormat, text: &str) -> Result<Value, IngestError> {
    match format {
        DataFormat::Json | DataFormat::Topojson => {
            serde_json::from_str(text.trim()).map_err(|e| IngestError::Parse {
                format,
                reason: e.to_string(),
            })
        }
        DataFormat::Csv => parse_delimited(text, b',', format),
        DataFormat::Tsv => parse_delimited(text, b'\t', format),
    }
}

fn parse_delimited(text: &str, delimiter: u8, format: DataFormat) -> Result<Value, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::Parse {
            format,
            reason: e.to_string(),
        })?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| IngestError::Parse {
            format,
            reason: e.to_string(),
        })?;

        let mut row = Map::new();
        for (index, field) in record.iter().enumerate() {
            if let Some(header) = headers.get(index) {
                row.insert(header.clone(), Value::String(field.to_string()));
            }
        }
        rows.push(Value::Object(row));
    }

    Ok(Value::Array(rows))
}
