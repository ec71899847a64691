//! Dataset records and the high-capacity dataset store

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detect::DataFormat;
use crate::fetch::{FetchClient, FetchError};
use crate::infer::{infer_column_type, ColumnType};
use crate::ingest;
use crate::store::{generate_record_id, matches_search, SortKey, SortOrder, StoreError};

/// Payload carried by a dataset record.
///
/// A closed variant per source so the resolver's substitution is a total
/// match, not a chain of shape checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "data", rename_all = "lowercase")]
pub enum DatasetContent {
    /// Inline payload: an array of row objects for tabular formats, or an
    /// arbitrary JSON value for TopoJSON
    Inline(Value),
    /// Remote payload referenced by URL; consumers fetch it lazily
    Url(String),
}

impl DatasetContent {
    pub fn source(&self) -> &'static str {
        match self {
            DatasetContent::Inline(_) => "inline",
            DatasetContent::Url(_) => "url",
        }
    }
}

/// A stored, named, reusable data payload or URL reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,

    /// Second, store-enforced-unique identifier used for symbolic reference
    /// from snippet specs
    pub name: String,

    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,

    #[serde(flatten)]
    pub content: DatasetContent,

    pub format: DataFormat,

    #[serde(default)]
    pub comment: String,

    // Advisory caches, recomputed after any payload mutation. Never
    // authoritative for correctness.
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub column_count: usize,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub column_types: Vec<ColumnType>,
    /// Byte length of the canonical serialization of the payload
    #[serde(default)]
    pub size: usize,

    /// Opaque extensibility bag
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl Dataset {
    /// Recompute the advisory metadata from the inline payload. URL
    /// datasets are only refreshed through [`DatasetStore::refresh_metadata`].
    fn recompute_metadata(&mut self) {
        let inline = match &self.content {
            DatasetContent::Inline(value) => Some(value.clone()),
            DatasetContent::Url(_) => None,
        };
        if let Some(value) = inline {
            self.size = serde_json::to_string(&value).map(|s| s.len()).unwrap_or(0);
            self.apply_shape(&value);
        }
    }

    /// Derive row/column metadata from a parsed payload
    fn apply_shape(&mut self, value: &Value) {
        match value.as_array() {
            Some(rows) => {
                self.row_count = rows.len();
                let first_row = rows.iter().find_map(Value::as_object);
                self.columns = first_row
                    .map(|row| row.keys().cloned().collect())
                    .unwrap_or_default();
                self.column_count = self.columns.len();
                self.column_types = self
                    .columns
                    .iter()
                    .map(|column| {
                        infer_column_type(
                            rows.iter()
                                .filter_map(|row| row.as_object().and_then(|o| o.get(column))),
                        )
                    })
                    .collect();
            }
            None => {
                // Non-tabular payload (TopoJSON or a bare JSON value)
                self.row_count = 1;
                self.column_count = 0;
                self.columns = Vec::new();
                self.column_types = Vec::new();
            }
        }
    }
}

/// Field-level patch applied by [`DatasetStore::update`]
#[derive(Debug, Clone, Default)]
pub struct DatasetPatch {
    pub name: Option<String>,
    pub content: Option<DatasetContent>,
    pub format: Option<DataFormat>,
    pub comment: Option<String>,
    pub meta: Option<Map<String, Value>>,
}

/// Error surface of a metadata refresh: the fetch can fail without touching
/// the stored record, or the write-back can fail like any other mutation
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// CRUD store over dataset records, one JSON file per record.
///
/// Effectively unbounded; quota enforcement lives in the snippet store only.
pub struct DatasetStore {
    base_path: PathBuf,
    records: BTreeMap<i64, Dataset>,
}

impl DatasetStore {
    /// Open the store, loading every record file under the base directory.
    /// Corrupt record files are skipped with a warning, not fatal.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        let mut records = BTreeMap::new();
        for entry in fs::read_dir(&base_path)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(dataset) => {
                    records.insert(dataset.id, dataset);
                }
                Err(e) => {
                    warn!("Skipping unreadable dataset file {}: {}", path.display(), e);
                }
            }
        }

        debug!("Opened dataset store with {} records", records.len());
        Ok(Self { base_path, records })
    }

    fn read_record(path: &Path) -> anyhow::Result<Dataset> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset file: {}", path.display()))?;
        let dataset: Dataset = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse dataset file: {}", path.display()))?;
        Ok(dataset)
    }

    fn record_path(&self, id: i64) -> PathBuf {
        self.base_path.join(format!("{}.json", id))
    }

    fn persist(&self, dataset: &Dataset) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(dataset)?;
        fs::write(self.record_path(dataset.id), json)?;
        Ok(())
    }

    /// Create a dataset. Fails with [`StoreError::DuplicateName`] when the
    /// name collides with an existing record.
    pub fn create(
        &mut self,
        name: impl Into<String>,
        content: DatasetContent,
        format: DataFormat,
        comment: impl Into<String>,
    ) -> Result<Dataset, StoreError> {
        let name = name.into();
        if self.get_by_name(&name).is_some() {
            return Err(StoreError::DuplicateName(name));
        }

        let mut id = generate_record_id();
        while self.records.contains_key(&id) {
            id = generate_record_id();
        }

        let now = Utc::now();
        let mut dataset = Dataset {
            id,
            name,
            created: now,
            modified: now,
            content,
            format,
            comment: comment.into(),
            row_count: 0,
            column_count: 0,
            columns: Vec::new(),
            column_types: Vec::new(),
            size: 0,
            meta: Map::new(),
        };
        dataset.recompute_metadata();

        self.persist(&dataset)?;
        info!("Created dataset '{}' (id {})", dataset.name, dataset.id);
        self.records.insert(id, dataset.clone());
        Ok(dataset)
    }

    /// Insert a fully-formed record (import path). The caller is
    /// responsible for id and name freshness; metadata caches are
    /// recomputed rather than trusted.
    pub(crate) fn insert_record(&mut self, mut dataset: Dataset) -> Result<Dataset, StoreError> {
        dataset.recompute_metadata();
        self.persist(&dataset)?;
        self.records.insert(dataset.id, dataset.clone());
        Ok(dataset)
    }

    pub fn get(&self, id: i64) -> Option<&Dataset> {
        self.records.get(&id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Dataset> {
        self.records.values().find(|d| d.name == name)
    }

    /// Apply a patch. Metadata is recomputed whenever the payload or format
    /// changed; the store is left untouched if the write fails.
    pub fn update(&mut self, id: i64, patch: DatasetPatch) -> Result<Dataset, StoreError> {
        let existing = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let mut updated = existing.clone();

        if let Some(name) = patch.name {
            if name != updated.name {
                if self.get_by_name(&name).is_some() {
                    return Err(StoreError::DuplicateName(name));
                }
                updated.name = name;
            }
        }

        let payload_mutated = patch.content.is_some() || patch.format.is_some();
        if let Some(content) = patch.content {
            updated.content = content;
        }
        if let Some(format) = patch.format {
            updated.format = format;
        }
        if let Some(comment) = patch.comment {
            updated.comment = comment;
        }
        if let Some(meta) = patch.meta {
            updated.meta = meta;
        }

        updated.modified = Utc::now();
        if payload_mutated {
            updated.recompute_metadata();
        }

        self.persist(&updated)?;
        debug!("Updated dataset '{}' (id {})", updated.name, id);
        self.records.insert(id, updated.clone());
        Ok(updated)
    }

    /// Delete a dataset. Does not cascade into snippets that reference it
    /// by name; a dangling reference surfaces at resolve time.
    pub fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let dataset = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let name = dataset.name.clone();

        let path = self.record_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        self.records.remove(&id);
        info!("Deleted dataset '{}' (id {})", name, id);
        Ok(())
    }

    /// List records matching the search term, sorted by the requested key
    /// with a stable tie-break on id ascending.
    pub fn list(&self, sort: SortKey, order: SortOrder, search: &str) -> Vec<&Dataset> {
        let mut items: Vec<&Dataset> = self
            .records
            .values()
            .filter(|d| matches_search(search, &d.name, &d.comment))
            .collect();

        items.sort_by(|a, b| {
            let primary = match sort {
                SortKey::Name => a.name.cmp(&b.name),
                SortKey::Created => a.created.cmp(&b.created),
                SortKey::Modified => a.modified.cmp(&b.modified),
                SortKey::Size => a.size.cmp(&b.size),
            };
            let primary = match order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            primary.then(a.id.cmp(&b.id))
        });
        items
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Re-fetch a URL dataset and recompute its metadata from the remote
    /// payload. Fetch or parse failure leaves the stored metadata untouched
    /// and surfaces a recoverable error. Inline datasets just recompute.
    pub async fn refresh_metadata(
        &mut self,
        id: i64,
        client: &mut FetchClient,
    ) -> Result<Dataset, RefreshError> {
        let existing = self
            .records
            .get(&id)
            .ok_or(StoreError::NotFound(id))?
            .clone();

        let mut updated = existing;
        let remote_url = match &updated.content {
            DatasetContent::Inline(_) => None,
            DatasetContent::Url(url) => Some(url.clone()),
        };
        match remote_url {
            None => updated.recompute_metadata(),
            Some(url) => {
                client.invalidate(&url);
                let body = client.fetch_text(&url).await?;
                let value =
                    ingest::parse_as(updated.format, &body).map_err(|e| FetchError::Parse {
                        url: url.clone(),
                        reason: e.to_string(),
                    })?;
                updated.size = body.len();
                updated.apply_shape(&value);
                info!("Refreshed metadata for dataset '{}' from {}", updated.name, url);
            }
        }

        updated.modified = Utc::now();
        self.persist(&updated).map_err(RefreshError::Store)?;
        self.records.insert(id, updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rows() -> DatasetContent {
        DatasetContent::Inline(json!([
            {"x": 1, "y": "2024-01-01"},
            {"x": 2, "y": "2024-01-02"}
        ]))
    }

    #[test]
    fn test_create_computes_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = DatasetStore::open(temp_dir.path()).unwrap();

        let dataset = store
            .create("sales", rows(), DataFormat::Json, "")
            .unwrap();

        assert_eq!(dataset.row_count, 2);
        assert_eq!(dataset.column_count, 2);
        assert_eq!(dataset.columns, vec!["x", "y"]);
        assert_eq!(
            dataset.column_types,
            vec![ColumnType::Number, ColumnType::Date]
        );
        assert!(dataset.size > 0);
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = DatasetStore::open(temp_dir.path()).unwrap();

        store.create("sales", rows(), DataFormat::Json, "").unwrap();
        let result = store.create("sales", rows(), DataFormat::Json, "");

        assert!(matches!(result, Err(StoreError::DuplicateName(name)) if name == "sales"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_rename_collision_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = DatasetStore::open(temp_dir.path()).unwrap();

        store.create("first", rows(), DataFormat::Json, "").unwrap();
        let second = store.create("second", rows(), DataFormat::Json, "").unwrap();

        let patch = DatasetPatch {
            name: Some("first".to_string()),
            ..Default::default()
        };
        let result = store.update(second.id, patch);
        assert!(matches!(result, Err(StoreError::DuplicateName(_))));
        assert_eq!(store.get(second.id).unwrap().name, "second");
    }

    #[test]
    fn test_update_payload_recomputes_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = DatasetStore::open(temp_dir.path()).unwrap();

        let dataset = store.create("d", rows(), DataFormat::Json, "").unwrap();

        let patch = DatasetPatch {
            content: Some(DatasetContent::Inline(json!([{"only": "one"}]))),
            ..Default::default()
        };
        let updated = store.update(dataset.id, patch).unwrap();

        assert_eq!(updated.row_count, 1);
        assert_eq!(updated.columns, vec!["only"]);
        assert_eq!(updated.column_types, vec![ColumnType::Text]);
    }

    #[test]
    fn test_topojson_is_non_tabular() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = DatasetStore::open(temp_dir.path()).unwrap();

        let content = DatasetContent::Inline(json!({"type": "Topology", "objects": {}}));
        let dataset = store
            .create("shapes", content, DataFormat::Topojson, "")
            .unwrap();

        assert_eq!(dataset.row_count, 1);
        assert_eq!(dataset.column_count, 0);
        assert!(dataset.columns.is_empty());
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let id = {
            let mut store = DatasetStore::open(temp_dir.path()).unwrap();
            store.create("kept", rows(), DataFormat::Json, "").unwrap().id
        };

        let store = DatasetStore::open(temp_dir.path()).unwrap();
        let loaded = store.get(id).unwrap();
        assert_eq!(loaded.name, "kept");
        assert_eq!(loaded.row_count, 2);
    }

    #[test]
    fn test_delete_removes_record_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = DatasetStore::open(temp_dir.path()).unwrap();

        let dataset = store.create("gone", rows(), DataFormat::Json, "").unwrap();
        store.delete(dataset.id).unwrap();

        assert!(store.get(dataset.id).is_none());
        assert!(!temp_dir.path().join(format!("{}.json", dataset.id)).exists());
        assert!(matches!(
            store.delete(dataset.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_search_and_sort() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = DatasetStore::open(temp_dir.path()).unwrap();

        store
            .create("beta", rows(), DataFormat::Json, "quarterly numbers")
            .unwrap();
        store.create("alpha", rows(), DataFormat::Json, "").unwrap();
        store.create("gamma", rows(), DataFormat::Json, "").unwrap();

        let by_name: Vec<&str> = store
            .list(SortKey::Name, SortOrder::Asc, "")
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(by_name, vec!["alpha", "beta", "gamma"]);

        let desc: Vec<&str> = store
            .list(SortKey::Name, SortOrder::Desc, "")
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(desc, vec!["gamma", "beta", "alpha"]);

        // Search hits comments too, case-insensitively
        let found = store.list(SortKey::Name, SortOrder::Asc, "QUARTERLY");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "beta");
    }

    #[tokio::test]
    async fn test_refresh_metadata_from_remote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n3,4"))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let mut store = DatasetStore::open(temp_dir.path()).unwrap();
        let mut client = FetchClient::new().unwrap();

        let dataset = store
            .create(
                "remote",
                DatasetContent::Url(format!("{}/data.csv", server.uri())),
                DataFormat::Csv,
                "",
            )
            .unwrap();

        // URL datasets carry no metadata until refreshed
        assert_eq!(dataset.row_count, 0);

        let refreshed = store.refresh_metadata(dataset.id, &mut client).await.unwrap();
        assert_eq!(refreshed.row_count, 2);
        assert_eq!(refreshed.columns, vec!["a", "b"]);
        assert_eq!(refreshed.size, "a,b\n1,2\n3,4".len());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_prior_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.csv"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let mut store = DatasetStore::open(temp_dir.path()).unwrap();
        let mut client = FetchClient::new().unwrap();

        let dataset = store
            .create(
                "flaky",
                DatasetContent::Url(format!("{}/flaky.csv", server.uri())),
                DataFormat::Csv,
                "",
            )
            .unwrap();

        let result = store.refresh_metadata(dataset.id, &mut client).await;
        assert!(matches!(result, Err(RefreshError::Fetch(FetchError::Status { .. }))));

        let kept = store.get(dataset.id).unwrap();
        assert_eq!(kept.row_count, 0);
        assert_eq!(kept.modified, dataset.modified);
    }
}
