//! imock store: the authoritative in-RAM resource collections.
//!
//! One process-wide reader-writer lock guards every resource. Readers clone what they
//! need and release the lock before any serialization happens; writers hold it only for
//! the in-memory mutation. A full reload builds the next resource map outside the lock
//! and swaps it in as one transition, so no reader ever sees a mix of old and new data.
//!
//! The single lock is a throughput ceiling: writers to different resources still
//! exclude each other. A per-resource lock map would not change observable behavior.

#![forbid(unsafe_code)]

use std::sync::Arc;

use imock_core::{normalize, Collection, StoreSnapshot};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info};

pub type SharedStore = Arc<Store>;

/// Result of one [`Store::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingested {
    pub epoch: u64,
    pub resources: usize,
    pub records: usize,
}

pub struct Store {
    state: RwLock<StoreSnapshot>,
    epoch_tx: watch::Sender<u64>,
}

impl Default for Store {
    fn default() -> Self { Self::new() }
}

impl Store {
    pub fn new() -> Self {
        let (epoch_tx, _) = watch::channel(0u64);
        Self { state: RwLock::new(StoreSnapshot::default()), epoch_tx }
    }

    /// Build a store and ingest `raw` as its first epoch.
    pub fn from_dataset(raw: Map<String, Value>) -> Self {
        let store = Self::new();
        store.ingest(raw);
        store
    }

    /// Replace every resource with the normalized contents of `raw`.
    ///
    /// The returned counts describe exactly the dataset swapped in, even if writers
    /// touch the store right after the lock is released.
    pub fn ingest(&self, raw: Map<String, Value>) -> Ingested {
        let next = normalize(raw);
        let resources = next.len();
        let records: usize = next.values().map(Vec::len).sum();
        let epoch = {
            let mut state = self.state.write();
            state.epoch = state.epoch.saturating_add(1);
            state.resources = next;
            state.epoch
        };
        self.epoch_tx.send_replace(epoch);
        metrics::counter!("store_ingest_total", 1u64);
        metrics::gauge!("store_resources", resources as f64);
        metrics::gauge!("store_records", records as f64);
        info!(epoch, resources, records, "store: ingested dataset");
        Ingested { epoch, resources, records }
    }

    /// Copy of one resource's records. Unknown resources yield an empty collection.
    pub fn snapshot(&self, resource: &str) -> Collection {
        self.state.read().resources.get(resource).cloned().unwrap_or_default()
    }

    /// Copy of the whole store, taken under a single shared acquisition.
    pub fn dump(&self) -> StoreSnapshot { self.state.read().clone() }

    pub fn contains(&self, resource: &str) -> bool { self.state.read().resources.contains_key(resource) }

    pub fn resources(&self) -> Vec<String> { self.state.read().resources.keys().cloned().collect() }

    pub fn epoch(&self) -> u64 { self.state.read().epoch }

    /// Subscribe to epoch changes (one per completed ingest).
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_tx.subscribe() }

    /// Run `f` against one collection under a shared lock. `None` when the resource is unknown.
    pub fn read<T>(&self, resource: &str, f: impl FnOnce(&Collection) -> T) -> Option<T> {
        self.state.read().resources.get(resource).map(f)
    }

    /// Run `f` against the live collection under exclusive access.
    ///
    /// Returns `None` without calling `f` when the resource is unknown; resources are
    /// only created by ingestion.
    pub fn with_lock<T>(&self, resource: &str, f: impl FnOnce(&mut Collection) -> T) -> Option<T> {
        let mut state = self.state.write();
        match state.resources.get_mut(resource) {
            Some(collection) => Some(f(collection)),
            None => {
                debug!(resource, "store: write against unknown resource");
                None
            }
        }
    }
}
