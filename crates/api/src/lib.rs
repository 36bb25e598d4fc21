//! imock resource API façade (in-process).
//!
//! Defines the behavior of every CRUD endpoint against a named resource. Transports
//! (the HTTP server, tests) depend on the [`ResourceApi`] trait only.
//!
//! Request bodies are decoded before the store lock is taken and responses are cloned
//! out of it, so the lock is never held across JSON encoding or decoding.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use imock_core::{ensure_id, matches_id, Record, StoreSnapshot, ID_FIELD};
use imock_query::{ListQuery, ListResult};
use imock_store::{SharedStore, Store};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

mod error;

pub use error::{ApiError, ApiResult, ErrorBody, CHAOS_STATUSES};

/// `GET /health` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub resources: Vec<String>,
}

/// Resource operations. Implementations may be in-process or remote.
#[async_trait::async_trait]
pub trait ResourceApi: Send + Sync {
    /// Search, filter, sort and paginate a resource's records.
    async fn list(&self, resource: &str, query: &ListQuery) -> ApiResult<ListResult>;

    /// First record whose `id` stringifies equal to `id`.
    async fn get(&self, resource: &str, id: &str) -> ApiResult<Record>;

    /// Append a record, generating an `id` if the body has none. Client ids are not checked
    /// for uniqueness.
    async fn create(&self, resource: &str, body: &[u8]) -> ApiResult<Record>;

    /// Overwrite a whole record, keeping its original `id`.
    async fn replace(&self, resource: &str, id: &str, body: &[u8]) -> ApiResult<Record>;

    /// Merge body keys (except `id`) into an existing record.
    async fn patch(&self, resource: &str, id: &str, body: &[u8]) -> ApiResult<Record>;

    /// Remove a record, preserving the order of the rest.
    async fn delete(&self, resource: &str, id: &str) -> ApiResult<()>;

    async fn health(&self) -> ApiResult<Health>;

    /// Whole-store dump.
    async fn db(&self) -> ApiResult<StoreSnapshot>;
}

/// Decode a request body that must be a single JSON object.
pub fn parse_body(body: &[u8]) -> ApiResult<Record> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ApiError::InvalidBody(format!(
            "Request body must be a JSON object, got {}",
            imock_core::value_kind(&other)
        ))),
        Err(e) => Err(ApiError::InvalidBody(format!("Request body must be valid JSON: {}", e))),
    }
}

/// Overwrite `existing` with `body`, except that `id` keeps its stored value.
pub fn replace_record(existing: &Record, mut body: Record) -> Record {
    if let Some(id) = existing.get(ID_FIELD) {
        body.insert(ID_FIELD.to_string(), id.clone());
    }
    body
}

/// Copy every key of `body` except `id` onto `existing`.
pub fn merge_record(existing: &mut Record, body: Record) {
    for (k, v) in body {
        if k != ID_FIELD {
            existing.insert(k, v);
        }
    }
}

/// In-process implementation backed by the shared store.
pub struct InProcApi {
    store: SharedStore,
}

impl InProcApi {
    pub fn new(store: SharedStore) -> Self { Self { store } }

    pub fn with_store(store: Store) -> Self { Self::new(Arc::new(store)) }

    pub fn store(&self) -> &SharedStore { &self.store }

    fn write_metric(op: &'static str) { metrics::counter!("store_write_total", 1u64, "op" => op); }
}

#[async_trait::async_trait]
impl ResourceApi for InProcApi {
    async fn list(&self, resource: &str, query: &ListQuery) -> ApiResult<ListResult> {
        let t0 = Instant::now();
        let items = self.store.read(resource, |c| c.clone()).ok_or_else(|| ApiError::unknown_resource(resource))?;
        let out = imock_query::run(items, query);
        metrics::histogram!("query_list_ms", t0.elapsed().as_secs_f64() * 1000.0);
        debug!(resource, explain = ?out.explain, took_ms = %t0.elapsed().as_millis(), "api: list");
        Ok(out)
    }

    async fn get(&self, resource: &str, id: &str) -> ApiResult<Record> {
        self.store
            .read(resource, |collection| collection.iter().find(|r| matches_id(r, id)).cloned())
            .flatten()
            .ok_or_else(|| ApiError::not_found(resource, id))
    }

    async fn create(&self, resource: &str, body: &[u8]) -> ApiResult<Record> {
        let mut record = parse_body(body)?;
        ensure_id(&mut record);
        let stored = record.clone();
        self.store
            .with_lock(resource, move |collection| collection.push(record))
            .ok_or_else(|| ApiError::unknown_resource(resource))?;
        Self::write_metric("create");
        debug!(resource, id = ?stored.get(ID_FIELD), "api: created");
        Ok(stored)
    }

    async fn replace(&self, resource: &str, id: &str, body: &[u8]) -> ApiResult<Record> {
        let body = parse_body(body)?;
        let out = self
            .store
            .with_lock(resource, |collection| {
                let slot = collection.iter_mut().find(|r| matches_id(r, id))?;
                let next = replace_record(slot, body);
                *slot = next.clone();
                Some(next)
            })
            .flatten()
            .ok_or_else(|| ApiError::not_found(resource, id))?;
        Self::write_metric("replace");
        debug!(resource, id, "api: replaced");
        Ok(out)
    }

    async fn patch(&self, resource: &str, id: &str, body: &[u8]) -> ApiResult<Record> {
        let body = parse_body(body)?;
        let out = self
            .store
            .with_lock(resource, |collection| {
                let slot = collection.iter_mut().find(|r| matches_id(r, id))?;
                merge_record(slot, body);
                Some(slot.clone())
            })
            .flatten()
            .ok_or_else(|| ApiError::not_found(resource, id))?;
        Self::write_metric("patch");
        debug!(resource, id, "api: patched");
        Ok(out)
    }

    async fn delete(&self, resource: &str, id: &str) -> ApiResult<()> {
        self.store
            .with_lock(resource, |collection| {
                let idx = collection.iter().position(|r| matches_id(r, id))?;
                Some(collection.remove(idx))
            })
            .flatten()
            .ok_or_else(|| ApiError::not_found(resource, id))?;
        Self::write_metric("delete");
        debug!(resource, id, "api: deleted");
        Ok(())
    }

    async fn health(&self) -> ApiResult<Health> {
        Ok(Health { status: "ok", resources: self.store.resources() })
    }

    async fn db(&self) -> ApiResult<StoreSnapshot> { Ok(self.store.dump()) }
}
