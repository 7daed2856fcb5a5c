//! Optional observability hooks (low-cardinality counters and spans).
//!
//! By default these are no-ops; embedding applications may register a
//! global observer to forward them to whatever metrics backend they use.
//! Shape is carried over from `blob_store`'s `BlobStoreObserver`/`BlobSpan`.

use std::any::Any;
use std::sync::OnceLock;

/// Observer invoked at key points of the store/tag/delete/retrieve pipeline.
pub trait HashStoreObserver: Send + Sync {
    /// A `store_object` call produced a fresh object (not a dedup hit).
    fn object_created(&self, _size_bytes: u64) {}
    /// A `store_object` call hit an existing object (dedup).
    fn dedup_hit(&self) {}
    /// A pid was tagged (new pid-refs file or idempotent retag).
    fn tagged(&self) {}
    /// A pid was untagged via `delete_object`.
    fn untagged(&self) {}
    /// Start an optional span; dropping ends it.
    fn span(&self, _name: &'static str) -> HashStoreSpan {
        HashStoreSpan::noop()
    }
}

/// Guard object for optional spans. Holds a type-erased guard that exits on drop.
pub struct HashStoreSpan {
    _guard: Option<Box<dyn Any + 'static>>,
}

impl HashStoreSpan {
    /// Create a no-op span guard.
    pub fn noop() -> Self {
        Self { _guard: None }
    }
    /// Create a span guard from an arbitrary guard object; dropping this will drop the guard.
    pub fn from_guard<G: 'static>(guard: G) -> Self {
        Self { _guard: Some(Box::new(guard)) }
    }
}

struct NoopObserver;
impl HashStoreObserver for NoopObserver {}

static NOOP_OBSERVER: NoopObserver = NoopObserver;
static OBSERVER: OnceLock<&'static dyn HashStoreObserver> = OnceLock::new();

/// Register a global observer for store metrics/spans (optional).
/// Safe to call at most once; subsequent calls are ignored.
pub fn set_observer(observer: &'static dyn HashStoreObserver) {
    let _ = OBSERVER.set(observer);
}

/// The currently registered observer, or a no-op if none was set.
pub fn observer() -> &'static dyn HashStoreObserver {
    if let Some(o) = OBSERVER.get() {
        *o
    } else {
        &NOOP_OBSERVER
    }
}
