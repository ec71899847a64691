//! Column type inference over sampled raw values

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Maximum number of non-null values sampled per column
pub const SAMPLE_SIZE: usize = 100;

/// Fraction of the sample a candidate type must reach to win
const MATCH_THRESHOLD: f64 = 0.8;

/// Exact recognized boolean vocabulary (lowercased); looser coercions are
/// excluded so numeric 0/1 columns are not misread as boolean
const BOOLEAN_VOCABULARY: [&str; 4] = ["true", "false", "yes", "no"];

/// Calendar date layouts accepted by the permissive date parse
const DATE_LAYOUTS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Classification of a column's values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    Date,
    Boolean,
    Text,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ColumnType::Number => "number",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
        };
        f.write_str(label)
    }
}

/// Classify a column by sampling its values.
///
/// The fraction parseable as each candidate is computed over the first
/// [`SAMPLE_SIZE`] non-null values; candidates are tried in the fixed
/// precedence order number, date, boolean, and the first one reaching the
/// threshold wins. Below threshold everywhere means text.
pub fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut sampled = 0usize;
    let mut numbers = 0usize;
    let mut dates = 0usize;
    let mut booleans = 0usize;

    for value in values.into_iter().filter(|v| !v.is_null()).take(SAMPLE_SIZE) {
        sampled += 1;
        if is_number_like(value) {
            numbers += 1;
        }
        if is_date_like(value) {
            dates += 1;
        }
        if is_boolean_like(value) {
            booleans += 1;
        }
    }

    if sampled == 0 {
        return ColumnType::Text;
    }

    let total = sampled as f64;
    if numbers as f64 / total >= MATCH_THRESHOLD {
        ColumnType::Number
    } else if dates as f64 / total >= MATCH_THRESHOLD {
        ColumnType::Date
    } else if booleans as f64 / total >= MATCH_THRESHOLD {
        ColumnType::Boolean
    } else {
        ColumnType::Text
    }
}

fn is_number_like(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

/// A value counts as a date only if it is a string that does NOT parse as a
/// number. Permissive date parsers accept bare integers as epoch-like
/// values; excluding numerics keeps numeric columns out of the date bucket.
fn is_date_like(value: &Value) -> bool {
    let Value::String(s) = value else {
        return false;
    };
    let s = s.trim();
    if s.parse::<f64>().is_ok() {
        return false;
    }
    DATE_LAYOUTS
        .iter()
        .any(|layout| NaiveDate::parse_from_str(s, layout).is_ok())
        || chrono::DateTime::parse_from_rfc3339(s).is_ok()
}

fn is_boolean_like(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::String(s) => BOOLEAN_VOCABULARY.contains(&s.trim().to_lowercase().as_str()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn infer(values: &[Value]) -> ColumnType {
        infer_column_type(values.iter())
    }

    #[test]
    fn test_numeric_strings_are_number() {
        let values: Vec<Value> = ["1", "2", "3", "4", "5"].iter().map(|v| json!(v)).collect();
        assert_eq!(infer(&values), ColumnType::Number);
    }

    #[test]
    fn test_boolean_vocabulary_at_threshold() {
        let values: Vec<Value> = ["true", "false", "yes", "no", "maybe"]
            .iter()
            .map(|v| json!(v))
            .collect();
        assert_eq!(infer(&values), ColumnType::Boolean);
    }

    #[test]
    fn test_dates_below_threshold_are_text() {
        let values: Vec<Value> = ["2024-01-01", "not a date", "2024-01-03"]
            .iter()
            .map(|v| json!(v))
            .collect();
        assert_eq!(infer(&values), ColumnType::Text);
    }

    #[test]
    fn test_dates_above_threshold() {
        let values: Vec<Value> = ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04", "x"]
            .iter()
            .map(|v| json!(v))
            .collect();
        assert_eq!(infer(&values), ColumnType::Date);
    }

    #[test]
    fn test_numeric_strings_never_count_as_dates() {
        // Bare integers would satisfy a permissive epoch-accepting parser
        let values: Vec<Value> = ["20240101", "20240102", "20240103"]
            .iter()
            .map(|v| json!(v))
            .collect();
        assert_eq!(infer(&values), ColumnType::Number);
    }

    #[test]
    fn test_native_json_values() {
        let values = vec![json!(1), json!(2.5), json!(3)];
        assert_eq!(infer(&values), ColumnType::Number);

        let values = vec![json!(true), json!(false), json!(true)];
        assert_eq!(infer(&values), ColumnType::Boolean);
    }

    #[test]
    fn test_nulls_are_skipped() {
        let values = vec![json!(null), json!(null), json!("7"), json!("8")];
        assert_eq!(infer(&values), ColumnType::Number);
    }

    #[test]
    fn test_empty_sample_is_text() {
        let values = vec![json!(null)];
        assert_eq!(infer(&values), ColumnType::Text);
        assert_eq!(infer(&[]), ColumnType::Text);
    }

    #[test]
    fn test_zero_one_columns_are_number_not_boolean() {
        let values: Vec<Value> = ["0", "1", "1", "0"].iter().map(|v| json!(v)).collect();
        assert_eq!(infer(&values), ColumnType::Number);
    }

    #[test]
    fn test_mixed_prose_is_text() {
        let values: Vec<Value> = ["alpha", "beta", "gamma"].iter().map(|v| json!(v)).collect();
        assert_eq!(infer(&values), ColumnType::Text);
    }
}
