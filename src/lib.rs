//! A content-addressed object store with a crash-safe pid<->cid reference
//! graph.
//!
//! Objects are addressed by the digest of their bytes under a single
//! configured algorithm (the "store algorithm"); every object additionally
//! carries digests under a fixed set of common algorithms so later callers
//! can verify integrity without re-reading the whole object. Arbitrary
//! caller-chosen identifiers ("pids") can be tagged onto a stored object;
//! many pids may point at the same cid, and the store tracks that graph with
//! plain files rather than a database so it survives a crash mid-write.
//!
//! ```no_run
//! use hashstore::{Algorithm, HashStore};
//! use std::io::Cursor;
//!
//! # fn main() -> hashstore::Result<()> {
//! let dir = tempfile::tempdir().unwrap();
//! let store = HashStore::open(dir.path(), 3, 2, Algorithm::Sha256, "https://example.org/ns")?;
//!
//! let metadata = store.store_object(
//!     Cursor::new(b"hello world".to_vec()),
//!     Some("pid.example.1"),
//!     None,
//!     None,
//!     None,
//!     hashstore::NO_SIZE_CHECK,
//! )?;
//! assert_eq!(store.find_object("pid.example.1")?, metadata.cid);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod algorithm;
pub mod atomic;
pub mod config;
pub mod digest_stream;
pub mod error;
pub mod layout;
pub mod locks;
pub mod observer;
pub mod pipeline;
pub mod refs;

pub use algorithm::Algorithm;
pub use config::StoreConfig;
pub use digest_stream::DigestOutcome;
pub use error::{Error, Result};
pub use observer::{set_observer, HashStoreObserver, HashStoreSpan};
pub use pipeline::{HashStore, ObjectMetadata, NO_SIZE_CHECK};
