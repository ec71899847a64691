//! Reference resolution over specification trees
//!
//! A specification may reference datasets symbolically via `data.name`
//! nodes. Resolution substitutes every such node with a concrete data node
//! read from the dataset store; extraction collects the referenced names
//! without touching them. Both share one traversal rule.

use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::detect::DataFormat;
use crate::store::datasets::{Dataset, DatasetContent, DatasetStore};

/// Keys whose value is an ordered list of sub-views
const LIST_CHILD_KEYS: [&str; 4] = ["layer", "concat", "hconcat", "vconcat"];

/// Key whose value is a single nested sub-view (facet pattern)
const NESTED_CHILD_KEY: &str = "spec";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("dataset '{0}' is referenced by the specification but does not exist")]
    DatasetNotFound(String),
    #[error("specification is not valid JSON: {0}")]
    InvalidSpec(#[from] serde_json::Error),
}

/// The dataset name a `data` node refers to, if it is a symbolic reference
fn reference_name(data: &Value) -> Option<&str> {
    data.as_object()?.get("name")?.as_str()
}

/// Visit every view node in a specification tree, depth-first, following
/// the child-locations table (no fixed depth limit).
pub(crate) fn walk_nodes<'a>(node: &'a Value, visit: &mut impl FnMut(&'a Map<String, Value>)) {
    let Some(object) = node.as_object() else {
        return;
    };
    visit(object);

    for key in LIST_CHILD_KEYS {
        if let Some(children) = object.get(key).and_then(Value::as_array) {
            for child in children {
                walk_nodes(child, visit);
            }
        }
    }
    if let Some(child) = object.get(NESTED_CHILD_KEY) {
        walk_nodes(child, visit);
    }
}

/// Mutable twin of [`walk_nodes`], same traversal table
pub(crate) fn walk_nodes_mut(node: &mut Value, visit: &mut impl FnMut(&mut Map<String, Value>)) {
    let Some(object) = node.as_object_mut() else {
        return;
    };
    visit(object);

    for key in LIST_CHILD_KEYS {
        if let Some(children) = object.get_mut(key).and_then(Value::as_array_mut) {
            for child in children {
                walk_nodes_mut(child, visit);
            }
        }
    }
    if let Some(child) = object.get_mut(NESTED_CHILD_KEY) {
        walk_nodes_mut(child, visit);
    }
}

/// Collect every distinct dataset name referenced anywhere in the tree
pub fn extract_refs(tree: &Value) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    walk_nodes(tree, &mut |node| {
        if let Some(name) = node.get("data").and_then(reference_name) {
            refs.insert(name.to_string());
        }
    });
    refs
}

/// Best-effort extraction from serialized spec text. Mid-edit text is often
/// not valid JSON; that yields an empty set, not an error.
pub fn extract_refs_from_text(text: &str) -> BTreeSet<String> {
    serde_json::from_str(text)
        .map(|tree| extract_refs(&tree))
        .unwrap_or_default()
}

/// Resolve every symbolic dataset reference in the tree, returning an
/// equivalent tree with literal data nodes.
///
/// All-or-nothing: the first missing reference aborts the whole resolution.
/// Resolving a tree with no remaining references returns it unchanged.
pub fn resolve(tree: &Value, datasets: &DatasetStore) -> Result<Value, ResolveError> {
    let mut resolved = tree.clone();
    resolve_in_place(&mut resolved, datasets)?;
    Ok(resolved)
}

/// Parse serialized spec text and resolve it
pub fn resolve_spec_text(text: &str, datasets: &DatasetStore) -> Result<Value, ResolveError> {
    let tree: Value = serde_json::from_str(text)?;
    resolve(&tree, datasets)
}

fn resolve_in_place(node: &mut Value, datasets: &DatasetStore) -> Result<(), ResolveError> {
    let Some(object) = node.as_object_mut() else {
        return Ok(());
    };

    let referenced = object
        .get("data")
        .and_then(reference_name)
        .map(str::to_string);
    if let Some(name) = referenced {
        let dataset = datasets
            .get_by_name(&name)
            .ok_or(ResolveError::DatasetNotFound(name))?;
        object.insert("data".to_string(), substitute(dataset));
    }

    for key in LIST_CHILD_KEYS {
        if let Some(children) = object.get_mut(key).and_then(Value::as_array_mut) {
            for child in children {
                resolve_in_place(child, datasets)?;
            }
        }
    }
    if let Some(child) = object.get_mut(NESTED_CHILD_KEY) {
        resolve_in_place(child, datasets)?;
    }
    Ok(())
}

/// Substitution policy, total over source and format.
///
/// URL datasets stay lazy: the consumer fetches. Inline JSON inlines bare
/// values; the remaining formats carry a format tag for the consumer's
/// parser.
fn substitute(dataset: &Dataset) -> Value {
    match (&dataset.content, dataset.format) {
        (DatasetContent::Url(url), format) => json!({
            "url": url,
            "format": {"type": format.as_str()},
        }),
        (DatasetContent::Inline(data), DataFormat::Json) => json!({"values": data}),
        (
            DatasetContent::Inline(data),
            DataFormat::Csv | DataFormat::Tsv | DataFormat::Topojson,
        ) => json!({
            "values": data,
            "format": {"type": dataset.format.as_str()},
        }),
    }
}
