//! Adapter Directory
//!
//! Tracks the streaming adapters created by callers so diagnostics can
//! report their state. Adapters are keyed by the broker session that
//! owns them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use super::adapter::{AdapterSnapshot, StreamingAdapter};

/// Live adapters by session id.
#[derive(Debug, Default)]
pub struct AdapterDirectory {
    adapters: RwLock<HashMap<Uuid, Arc<StreamingAdapter>>>,
}

impl AdapterDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an adapter, replacing any adapter for the same session.
    pub fn insert(&self, adapter: Arc<StreamingAdapter>) -> Option<Arc<StreamingAdapter>> {
        let session_id = adapter.broker_session().session_id;
        self.adapters.write().insert(session_id, adapter)
    }

    /// Stop tracking an adapter.
    pub fn remove(&self, session_id: &Uuid) -> Option<Arc<StreamingAdapter>> {
        self.adapters.write().remove(session_id)
    }

    /// Adapter for a session.
    #[must_use]
    pub fn get(&self, session_id: &Uuid) -> Option<Arc<StreamingAdapter>> {
        self.adapters.read().get(session_id).cloned()
    }

    /// Number of tracked adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.read().len()
    }

    /// Whether no adapter is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.read().is_empty()
    }

    /// Snapshots of every tracked adapter, sorted by broker.
    #[must_use]
    pub fn snapshots(&self) -> Vec<AdapterSnapshot> {
        let adapters: Vec<_> = self.adapters.read().values().cloned().collect();
        let mut snapshots: Vec<_> = adapters.iter().map(|a| a.snapshot()).collect();
        snapshots.sort_by(|a, b| a.broker.cmp(&b.broker));
        snapshots
    }
}
