//! Format detection for raw ingested data
//!
//! Classifies a text blob as a JSON array, CSV, TSV, or TopoJSON with a
//! coarse confidence grade. Detection degrades gracefully; it never errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use url::Url;

/// Number of non-empty lines sampled when sniffing a field separator
const SAMPLE_LINES: usize = 10;

/// Data formats a dataset payload can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Json,
    Csv,
    Tsv,
    Topojson,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Json => "json",
            DataFormat::Csv => "csv",
            DataFormat::Tsv => "tsv",
            DataFormat::Topojson => "topojson",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse certainty grade attached to a format classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        f.write_str(label)
    }
}

/// Outcome of classifying a raw input blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// The input is an absolute URL; the format is decided later from the
    /// response, not from the URL string.
    Remote { url: String },
    /// The input is data in a recognized (or assumed) format
    Data {
        format: DataFormat,
        confidence: Confidence,
    },
}

/// Classify a raw text blob, optionally using a filename hint.
///
/// URL detection precedes format detection.
pub fn detect(text: &str, hint: Option<&str>) -> Detection {
    let trimmed = text.trim();

    if let Some(url) = as_absolute_url(trimmed) {
        return Detection::Remote { url };
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return detect_json(&value);
    }

    detect_separated(trimmed, hint)
}

/// Accept a single-line http(s) URL; anything else is treated as data
fn as_absolute_url(text: &str) -> Option<String> {
    if text.is_empty() || text.lines().count() > 1 {
        return None;
    }
    let parsed = Url::parse(text).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| text.to_string())
}

fn detect_json(value: &Value) -> Detection {
    match value {
        Value::Array(_) => Detection::Data {
            format: DataFormat::Json,
            confidence: Confidence::High,
        },
        Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("Topology") => {
            Detection::Data {
                format: DataFormat::Topojson,
                confidence: Confidence::High,
            }
        }
        // Valid JSON that is neither a row array nor a topology
        _ => Detection::Data {
            format: DataFormat::Json,
            confidence: Confidence::Medium,
        },
    }
}

fn detect_separated(text: &str, hint: Option<&str>) -> Detection {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SAMPLE_LINES)
        .collect();

    if !lines.is_empty() {
        if uniform_column_count(&lines, '\t').is_some() {
            return Detection::Data {
                format: DataFormat::Tsv,
                confidence: Confidence::High,
            };
        }
        if uniform_column_count(&lines, ',').is_some() {
            return Detection::Data {
                format: DataFormat::Csv,
                confidence: Confidence::High,
            };
        }
    }

    // Ambiguous separators: let a filename hint decide at medium confidence
    if let Some(format) = hint.and_then(format_from_hint) {
        if matches!(format, DataFormat::Csv | DataFormat::Tsv) {
            return Detection::Data {
                format,
                confidence: Confidence::Medium,
            };
        }
    }

    // Fallback default, never a hard failure
    Detection::Data {
        format: DataFormat::Csv,
        confidence: Confidence::Low,
    }
}

/// Column count if every sampled line splits into the same number (>= 2) of
/// fields on the separator
fn uniform_column_count(lines: &[&str], separator: char) -> Option<usize> {
    let first = lines.first()?.split(separator).count();
    if first < 2 {
        return None;
    }
    lines
        .iter()
        .all(|line| line.split(separator).count() == first)
        .then_some(first)
}

/// Map a filename (or URL path) extension hint to a format
pub fn format_from_hint(hint: &str) -> Option<DataFormat> {
    let extension = hint.rsplit('.').next()?.to_lowercase();
    match extension.as_str() {
        "json" => Some(DataFormat::Json),
        "csv" => Some(DataFormat::Csv),
        "tsv" => Some(DataFormat::Tsv),
        "topojson" => Some(DataFormat::Topojson),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_data(detection: Detection) -> (DataFormat, Confidence) {
        match detection {
            Detection::Data { format, confidence } => (format, confidence),
            Detection::Remote { url } => panic!("expected data, got url {}", url),
        }
    }

    #[test]
    fn test_csv_high_confidence() {
        let (format, confidence) = expect_data(detect("a,b,c\n1,2,3\n4,5,6", None));
        assert_eq!(format, DataFormat::Csv);
        assert_eq!(confidence, Confidence::High);
    }

    #[test]
    fn test_tsv_high_confidence() {
        let (format, confidence) = expect_data(detect("a\tb\n1\t2", None));
        assert_eq!(format, DataFormat::Tsv);
        assert_eq!(confidence, Confidence::High);
    }

    #[test]
    fn test_json_array_high_confidence() {
        let (format, confidence) = expect_data(detect(r#"[{"a":1}]"#, None));
        assert_eq!(format, DataFormat::Json);
        assert_eq!(confidence, Confidence::High);
    }

    #[test]
    fn test_topojson_object() {
        let blob = r#"{"type":"Topology","objects":{},"arcs":[]}"#;
        let (format, confidence) = expect_data(detect(blob, None));
        assert_eq!(format, DataFormat::Topojson);
        assert_eq!(confidence, Confidence::High);
    }

    #[test]
    fn test_plain_json_object_is_medium() {
        let (format, confidence) = expect_data(detect(r#"{"a":1}"#, None));
        assert_eq!(format, DataFormat::Json);
        assert_eq!(confidence, Confidence::Medium);
    }

    #[test]
    fn test_url_detection_precedes_format() {
        let detection = detect("https://example.com/data.csv", None);
        assert_eq!(
            detection,
            Detection::Remote {
                url: "https://example.com/data.csv".to_string()
            }
        );
    }

    #[test]
    fn test_ragged_columns_fall_back_to_csv_low() {
        let (format, confidence) = expect_data(detect("a,b,c\n1,2\nplain text", None));
        assert_eq!(format, DataFormat::Csv);
        assert_eq!(confidence, Confidence::Low);
    }

    #[test]
    fn test_hint_decides_ambiguous_input() {
        let (format, confidence) = expect_data(detect("one\ntwo\nthree", Some("values.tsv")));
        assert_eq!(format, DataFormat::Tsv);
        assert_eq!(confidence, Confidence::Medium);
    }

    #[test]
    fn test_detection_never_errors_on_noise() {
        let (format, confidence) = expect_data(detect("%%% ???", None));
        assert_eq!(format, DataFormat::Csv);
        assert_eq!(confidence, Confidence::Low);
    }
}
