//! imock core types: records, resource collections and the normalized dataset.
//!
//! A dataset is a single JSON object. Each top-level array becomes a collection,
//! each top-level object a one-element collection; scalars are dropped.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub mod record;

pub use record::{ensure_id, matches_id, new_id, record_id, stringify, ID_FIELD};

/// One JSON-object-shaped entity. Field order is insertion order.
pub type Record = Map<String, Value>;

/// Ordered records of a single resource. Position is used for in-place replace/delete.
pub type Collection = Vec<Record>;

/// Resource name -> collection.
pub type Resources = BTreeMap<String, Collection>;

/// Immutable view of the whole store at one epoch.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StoreSnapshot {
    pub epoch: u64,
    pub resources: Resources,
}

impl StoreSnapshot {
    pub fn resource_names(&self) -> Vec<String> { self.resources.keys().cloned().collect() }

    pub fn record_count(&self) -> usize { self.resources.values().map(Vec::len).sum() }
}

/// Normalize a raw dataset into resources, assigning ids to records that lack one.
pub fn normalize(raw: Map<String, Value>) -> Resources {
    let mut out = Resources::new();
    for (name, value) in raw {
        let collection = match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(mut rec) => {
                        ensure_id(&mut rec);
                        Some(rec)
                    }
                    _ => None,
                })
                .collect(),
            Value::Object(mut rec) => {
                ensure_id(&mut rec);
                vec![rec]
            }
            other => {
                debug!(resource = %name, kind = value_kind(&other), "skipping scalar top-level value");
                continue;
            }
        };
        out.insert(name, collection);
    }
    out
}

/// Short type name of a JSON value, used in logs and error messages.
pub fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
