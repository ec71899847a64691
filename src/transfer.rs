//! Additive import and export of record sets
//!
//! Imports merge a foreign record set into a store without ever
//! overwriting local state: colliding ids are regenerated and colliding
//! dataset names are suffixed. Malformed payloads abort before any write;
//! once writes begin, per-record failures are skipped and counted.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::resolve::{walk_nodes, walk_nodes_mut};
use crate::store::datasets::{Dataset, DatasetContent, DatasetStore};
use crate::store::snippets::{Snippet, SnippetStore};
use crate::store::{generate_record_id, StoreError};

const EXPORT_VERSION: u32 = 1;

/// Tag applied to snippets that arrived in a non-native shape
const IMPORTED_TAG: &str = "imported";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unrecognized import payload: {0}")]
    Malformed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which store an export envelope belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Snippets,
    Datasets,
}

/// Versioned wrapper around an exported record set
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportEnvelope {
    pub kind: ExportKind,
    pub version: u32,
    pub exported: DateTime<Utc>,
    pub records: Vec<Value>,
}

/// Outcome counts of an additive import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub inserted: usize,
    pub skipped: usize,
    pub renamed: usize,
}

/// Serialize every snippet into an export envelope
pub fn export_snippets(store: &SnippetStore) -> Result<String, StoreError> {
    use crate::store::{SortKey, SortOrder};

    let records = store
        .list(SortKey::Created, SortOrder::Asc, "")
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    envelope_to_string(ExportKind::Snippets, records)
}

/// Serialize every dataset into an export envelope
pub fn export_datasets(store: &DatasetStore) -> Result<String, StoreError> {
    use crate::store::{SortKey, SortOrder};

    let records = store
        .list(SortKey::Created, SortOrder::Asc, "")
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    envelope_to_string(ExportKind::Datasets, records)
}

fn envelope_to_string(kind: ExportKind, records: Vec<Value>) -> Result<String, StoreError> {
    let envelope = ExportEnvelope {
        kind,
        version: EXPORT_VERSION,
        exported: Utc::now(),
        records,
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Merge a foreign snippet set into the store.
///
/// Accepts the native export envelope or, as a non-native fallback, a bare
/// JSON array of specification objects; the latter are auto-tagged so
/// provenance stays visible.
pub fn import_snippets(store: &mut SnippetStore, text: &str) -> Result<MergeReport, ImportError> {
    let payload: Value = serde_json::from_str(text)?;
    let mut report = MergeReport::default();

    match classify_snippet_payload(payload)? {
        SnippetPayload::Native(records) => {
            for record in records {
                match serde_json::from_value::<Snippet>(record) {
                    Ok(mut snippet) => {
                        if store.contains(snippet.id) {
                            snippet.id = fresh_snippet_id(store);
                            report.renamed += 1;
                        }
                        insert_snippet(store, snippet, &mut report);
                    }
                    Err(e) => {
                        warn!("Skipping corrupt snippet record: {}", e);
                        report.skipped += 1;
                    }
                }
            }
        }
        SnippetPayload::Foreign(specs) => {
            let now = Utc::now();
            for (index, spec) in specs.into_iter().enumerate() {
                let spec_text = match serde_json::to_string(&spec) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Skipping unserializable spec object: {}", e);
                        report.skipped += 1;
                        continue;
                    }
                };
                let mut snippet = Snippet {
                    id: fresh_snippet_id(store),
                    name: format!("{}_{}", now.format("%Y-%m-%dT%H:%M:%S"), index + 1),
                    created: now,
                    modified: now,
                    spec: spec_text,
                    draft_spec: None,
                    comment: String::new(),
                    tags: vec![IMPORTED_TAG.to_string()],
                    dataset_refs: Vec::new(),
                    meta: serde_json::Map::new(),
                };
                snippet.dataset_refs = crate::resolve::extract_refs(&spec).into_iter().collect();
                insert_snippet(store, snippet, &mut report);
            }
        }
    }

    info!(
        "Snippet import finished: {} inserted, {} skipped, {} renamed",
        report.inserted, report.skipped, report.renamed
    );
    Ok(report)
}

enum SnippetPayload {
    Native(Vec<Value>),
    Foreign(Vec<Value>),
}

fn classify_snippet_payload(payload: Value) -> Result<SnippetPayload, ImportError> {
    match payload {
        Value::Object(_) => {
            let envelope: ExportEnvelope = serde_json::from_value(payload)
                .map_err(|e| ImportError::Malformed(format!("not an export envelope: {}", e)))?;
            if envelope.kind != ExportKind::Snippets {
                return Err(ImportError::Malformed(
                    "envelope holds datasets, not snippets".to_string(),
                ));
            }
            Ok(SnippetPayload::Native(envelope.records))
        }
        Value::Array(items) => {
            if items.iter().any(|item| !item.is_object()) {
                return Err(ImportError::Malformed(
                    "array items must be specification objects".to_string(),
                ));
            }
            Ok(SnippetPayload::Foreign(items))
        }
        _ => Err(ImportError::Malformed(
            "expected an export envelope or an array of specification objects".to_string(),
        )),
    }
}

fn fresh_snippet_id(store: &SnippetStore) -> i64 {
    let mut id = generate_record_id();
    while store.contains(id) {
        id = generate_record_id();
    }
    id
}

fn insert_snippet(store: &mut SnippetStore, snippet: Snippet, report: &mut MergeReport) {
    match store.insert_record(snippet) {
        Ok(_) => report.inserted += 1,
        Err(e) => {
            warn!("Skipping snippet record that failed to persist: {}", e);
            report.skipped += 1;
        }
    }
}

/// Merge a foreign dataset set into the store. Name collisions are
/// resolved with a numeric suffix rather than rejecting the batch.
pub fn import_datasets(store: &mut DatasetStore, text: &str) -> Result<MergeReport, ImportError> {
    let payload: Value = serde_json::from_str(text)?;
    let Value::Object(_) = payload else {
        return Err(ImportError::Malformed(
            "expected a dataset export envelope".to_string(),
        ));
    };

    let envelope: ExportEnvelope = serde_json::from_value(payload)
        .map_err(|e| ImportError::Malformed(format!("not an export envelope: {}", e)))?;
    if envelope.kind != ExportKind::Datasets {
        return Err(ImportError::Malformed(
            "envelope holds snippets, not datasets".to_string(),
        ));
    }

    let mut report = MergeReport::default();
    for record in envelope.records {
        match serde_json::from_value::<Dataset>(record) {
            Ok(mut dataset) => {
                let mut adjusted = false;
                if store.get(dataset.id).is_some() {
                    dataset.id = fresh_dataset_id(store);
                    adjusted = true;
                }
                let unique = unique_dataset_name(store, &dataset.name);
                if unique != dataset.name {
                    dataset.name = unique;
                    adjusted = true;
                }
                if adjusted {
                    report.renamed += 1;
                }
                match store.insert_record(dataset) {
                    Ok(_) => report.inserted += 1,
                    Err(e) => {
                        warn!("Skipping dataset record that failed to persist: {}", e);
                        report.skipped += 1;
                    }
                }
            }
            Err(e) => {
                warn!("Skipping corrupt dataset record: {}", e);
                report.skipped += 1;
            }
        }
    }

    info!(
        "Dataset import finished: {} inserted, {} skipped, {} renamed",
        report.inserted, report.skipped, report.renamed
    );
    Ok(report)
}

fn fresh_dataset_id(store: &DatasetStore) -> i64 {
    let mut id = generate_record_id();
    while store.get(id).is_some() {
        id = generate_record_id();
    }
    id
}

/// First free name among `base`, `base_2`, `base_3`, ...
fn unique_dataset_name(store: &DatasetStore, base: &str) -> String {
    if store.get_by_name(base).is_none() {
        return base.to_string();
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{}_{}", base, counter);
        if store.get_by_name(&candidate).is_none() {
            return candidate;
        }
        counter += 1;
    }
}

/// Pull inline `data.values` payloads out of a snippet spec into named
/// datasets and rewrite the spec to reference them. The rewritten text
/// lands in the snippet's draft slot; returns the created dataset names.
pub fn extract_inline_data(
    snippets: &mut SnippetStore,
    datasets: &mut DatasetStore,
    snippet_id: i64,
) -> anyhow::Result<Vec<String>> {
    let snippet = snippets
        .get(snippet_id)
        .ok_or(StoreError::NotFound(snippet_id))?
        .clone();

    let mut tree: Value = serde_json::from_str(snippet.current_spec())
        .context("snippet spec is not valid JSON")?;

    // First pass: collect every inline payload in traversal order
    let mut payloads: Vec<Value> = Vec::new();
    walk_nodes(&tree, &mut |node| {
        if let Some(data) = node.get("data") {
            if data.get("values").is_some() && data.get("name").is_none() {
                if let Some(values) = data.get("values") {
                    payloads.push(values.clone());
                }
            }
        }
    });

    if payloads.is_empty() {
        return Ok(Vec::new());
    }

    // Create one dataset per payload before touching the spec
    let mut created = Vec::new();
    for (index, payload) in payloads.into_iter().enumerate() {
        let base = if index == 0 {
            format!("{}-data", snippet.name)
        } else {
            format!("{}-data-{}", snippet.name, index + 1)
        };
        let name = unique_dataset_name(datasets, &base);
        datasets.create(
            name.clone(),
            DatasetContent::Inline(payload),
            crate::detect::DataFormat::Json,
            format!("Extracted from snippet '{}'", snippet.name),
        )?;
        created.push(name);
    }

    // Second pass: same traversal order, swap each payload for a reference
    let mut cursor = 0usize;
    walk_nodes_mut(&mut tree, &mut |node| {
        let is_inline = node
            .get("data")
            .map(|data| data.get("values").is_some() && data.get("name").is_none())
            .unwrap_or(false);
        if is_inline {
            if let Some(name) = created.get(cursor) {
                node.insert("data".to_string(), json!({"name": name}));
            }
            cursor += 1;
        }
    });

    let rewritten =
        serde_json::to_string_pretty(&tree).context("failed to serialize rewritten spec")?;
    snippets.update_draft(snippet_id, &rewritten)?;

    info!(
        "Extracted {} inline payload(s) from snippet '{}'",
        created.len(),
        snippet.name
    );
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DataFormat;
    use serde_json::json;
    use tempfile::TempDir;

    fn snippet_store(temp_dir: &TempDir) -> SnippetStore {
        SnippetStore::open(temp_dir.path().join("snippets.json")).unwrap()
    }

    fn dataset_store(temp_dir: &TempDir) -> DatasetStore {
        DatasetStore::open(temp_dir.path().join("datasets")).unwrap()
    }

    #[test]
    fn test_snippet_export_import_round_trip() {
        let source_dir = TempDir::new().unwrap();
        let target_dir = TempDir::new().unwrap();
        let mut source = snippet_store(&source_dir);
        let mut target = snippet_store(&target_dir);

        let id = source.create(Some("chart".to_string())).unwrap().id;
        source
            .update_draft(id, r#"{"data": {"name": "sales"}}"#)
            .unwrap();

        let exported = export_snippets(&source).unwrap();
        let report = import_snippets(&mut target, &exported).unwrap();

        assert_eq!(
            report,
            MergeReport {
                inserted: 1,
                skipped: 0,
                renamed: 0
            }
        );
        let imported = target.get(id).unwrap();
        assert_eq!(imported.name, "chart");
        assert!(imported.is_dirty());
    }

    #[test]
    fn test_id_collision_keeps_local_record() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = snippet_store(&temp_dir);

        let local = store.create(Some("local".to_string())).unwrap();
        let exported = export_snippets(&store).unwrap();

        // Importing the export back collides on every id
        let report = import_snippets(&mut store, &exported).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.renamed, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(local.id).unwrap().name, "local");
    }

    #[test]
    fn test_foreign_spec_array_is_tagged_imported() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = snippet_store(&temp_dir);

        let payload = r#"[{"data": {"name": "sales"}, "mark": "bar"}]"#;
        let report = import_snippets(&mut store, payload).unwrap();

        assert_eq!(report.inserted, 1);
        let snippets = store.list(crate::store::SortKey::Name, crate::store::SortOrder::Asc, "");
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].tags.contains(&"imported".to_string()));
        assert_eq!(snippets[0].dataset_refs, vec!["sales"]);
    }

    #[test]
    fn test_malformed_input_aborts_before_writes() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = snippet_store(&temp_dir);

        assert!(matches!(
            import_snippets(&mut store, "{ not json"),
            Err(ImportError::Parse(_))
        ));
        assert!(matches!(
            import_snippets(&mut store, r#""just a string""#),
            Err(ImportError::Malformed(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_wrong_kind_envelope_is_rejected() {
        let snippet_dir = TempDir::new().unwrap();
        let dataset_dir = TempDir::new().unwrap();
        let mut snippets = snippet_store(&snippet_dir);
        let mut datasets = dataset_store(&dataset_dir);

        snippets.create(None).unwrap();
        let exported = export_snippets(&snippets).unwrap();

        assert!(matches!(
            import_datasets(&mut datasets, &exported),
            Err(ImportError::Malformed(_))
        ));
        assert!(datasets.is_empty());
    }

    #[test]
    fn test_corrupt_record_is_skipped_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = snippet_store(&temp_dir);

        let envelope = json!({
            "kind": "snippets",
            "version": 1,
            "exported": "2024-01-01T00:00:00Z",
            "records": [
                {"bogus": true},
                {
                    "id": 42,
                    "name": "valid",
                    "created": "2024-01-01T00:00:00Z",
                    "modified": "2024-01-01T00:00:00Z",
                    "spec": "{}"
                }
            ]
        });

        let report = import_snippets(&mut store, &envelope.to_string()).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.get(42).unwrap().name, "valid");
    }

    #[test]
    fn test_dataset_name_collision_is_suffixed() {
        let source_dir = TempDir::new().unwrap();
        let target_dir = TempDir::new().unwrap();
        let mut source = dataset_store(&source_dir);
        let mut target = dataset_store(&target_dir);

        source
            .create("sales", DatasetContent::Inline(json!([{"x": 1}])), DataFormat::Json, "")
            .unwrap();
        target
            .create("sales", DatasetContent::Inline(json!([{"x": 9}])), DataFormat::Json, "")
            .unwrap();

        let exported = export_datasets(&source).unwrap();
        let report = import_datasets(&mut target, &exported).unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.renamed, 1);
        assert!(target.get_by_name("sales").is_some());
        let suffixed = target.get_by_name("sales_2").unwrap();
        assert_eq!(suffixed.row_count, 1);
    }

    #[test]
    fn test_extract_inline_data_rewrites_spec() {
        let snippet_dir = TempDir::new().unwrap();
        let dataset_dir = TempDir::new().unwrap();
        let mut snippets = snippet_store(&snippet_dir);
        let mut datasets = dataset_store(&dataset_dir);

        let id = snippets.create(Some("chart".to_string())).unwrap().id;
        snippets
            .update_draft(id, r#"{"data": {"values": [{"x": 1}]}, "mark": "bar"}"#)
            .unwrap();

        let created = extract_inline_data(&mut snippets, &mut datasets, id).unwrap();
        assert_eq!(created, vec!["chart-data"]);

        let dataset = datasets.get_by_name("chart-data").unwrap();
        assert_eq!(dataset.row_count, 1);

        let snippet = snippets.get(id).unwrap();
        let tree: Value = serde_json::from_str(snippet.current_spec()).unwrap();
        assert_eq!(tree["data"], json!({"name": "chart-data"}));
        assert_eq!(snippet.dataset_refs, vec!["chart-data"]);
    }

    #[test]
    fn test_extract_inline_data_without_payloads_is_noop() {
        let snippet_dir = TempDir::new().unwrap();
        let dataset_dir = TempDir::new().unwrap();
        let mut snippets = snippet_store(&snippet_dir);
        let mut datasets = dataset_store(&dataset_dir);

        let id = snippets.create(None).unwrap().id;
        let created = extract_inline_data(&mut snippets, &mut datasets, id).unwrap();
        assert!(created.is_empty());
        assert!(datasets.is_empty());
    }
}
