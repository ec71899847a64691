//! Persistence layer for snippet and dataset records

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod datasets;
pub mod snippets;

pub use datasets::{Dataset, DatasetContent, DatasetPatch, DatasetStore, RefreshError};
pub use snippets::{Snippet, SnippetPatch, SnippetStore, StoreUsage};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a dataset named '{0}' already exists")]
    DuplicateName(String),
    #[error("no record with id {0}")]
    NotFound(i64),
    #[error("snippet store quota exceeded: write needs {needed} bytes but capacity is {capacity}")]
    QuotaExceeded { needed: usize, capacity: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sort key for store listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Name,
    Created,
    Modified,
    Size,
}

/// Sort direction for store listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Generate a record id from the current time plus a random salt.
///
/// Collisions on rapid creation are unlikely but not excluded; callers that
/// insert into a keyed collection retry while the id is taken.
pub fn generate_record_id() -> i64 {
    Utc::now().timestamp_millis() + rand::rng().random_range(0..10_000)
}

/// Case-insensitive substring match over a record's name and comment
pub fn matches_search(search: &str, name: &str, comment: &str) -> bool {
    if search.is_empty() {
        return true;
    }
    let needle = search.to_lowercase();
    name.to_lowercase().contains(&needle) || comment.to_lowercase().contains(&needle)
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else if size >= 10.0 {
        format!("{:.1} {}", size, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_is_time_anchored() {
        let before = Utc::now().timestamp_millis();
        let id = generate_record_id();
        let after = Utc::now().timestamp_millis();

        assert!(id >= before);
        assert!(id < after + 10_000);
    }

    #[test]
    fn test_search_matches_name_and_comment() {
        assert!(matches_search("", "anything", ""));
        assert!(matches_search("SALES", "monthly sales", ""));
        assert!(matches_search("quarterly", "revenue", "Quarterly rollup"));
        assert!(!matches_search("missing", "revenue", "rollup"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }
}
