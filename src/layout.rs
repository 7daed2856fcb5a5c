//! Layout: mapping hex digests to sharded relative paths, and pids/cids to
//! their absolute locations under a store root.

use std::path::{Path, PathBuf};

use crate::algorithm::Algorithm;

/// Slice a hex string into `depth` groups of `width` characters each,
/// followed by whatever remains as the filename.
///
/// If `hex` is too short to supply a full group, that group (and all
/// subsequent ones) is silently dropped and the remaining suffix — possibly
/// the whole string — becomes the filename. The filename component is never
/// empty: a group is only taken if at least one hex character remains
/// afterward, so a hex string whose length is an exact multiple of the
/// requested depth/width (e.g. an MD5 digest with depth=16, width=2) stops
/// one group early rather than producing a trailing empty path component.
/// This never panics: `depth` and `width` are store-wide constants validated
/// once at init time (see [`crate::config`]), not re-validated on every call.
pub fn shard(depth: usize, width: usize, hex: &str) -> PathBuf {
    let bytes = hex.as_bytes();
    let mut path = PathBuf::new();
    let mut pos = 0usize;
    for _ in 0..depth {
        // `>=` (not `>`) so a group that would consume every remaining
        // character is dropped rather than taken, guaranteeing the final
        // `path.push` below always has something non-empty to push.
        if width == 0 || pos + width >= bytes.len() {
            break;
        }
        path.push(&hex[pos..pos + width]);
        pos += width;
    }
    path.push(&hex[pos..]);
    path
}

/// Parameters that determine every on-disk path in the store. Copied by
/// value wherever needed; cheap and immutable for the store's lifetime.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
    /// Number of sharding directory levels.
    pub depth: usize,
    /// Width (in hex characters) of each sharding level.
    pub width: usize,
}

impl Layout {
    /// Build a layout from validated depth/width.
    pub fn new(depth: usize, width: usize) -> Self {
        Self { depth, width }
    }

    /// Relative path of the pid-refs file for `pid`, under `refs/pids/`.
    ///
    /// Per spec.md §3, pid hashing for path-derivation purposes always uses
    /// SHA-256, independent of the store's configured content-addressing
    /// algorithm (see `SPEC_FULL.md` §3.1).
    pub fn pid_refs_relpath(&self, pid: &str) -> PathBuf {
        let hex = Algorithm::Sha256.digest_hex(pid.as_bytes());
        shard(self.depth, self.width, &hex)
    }

    /// Absolute path of the pid-refs file for `pid` under `root`.
    pub fn pid_refs_path(&self, root: &Path, pid: &str) -> PathBuf {
        root.join("refs").join("pids").join(self.pid_refs_relpath(pid))
    }

    /// Relative path of the cid-refs file for `cid`, under `refs/cids/`.
    pub fn cid_refs_relpath(&self, cid: &str) -> PathBuf {
        shard(self.depth, self.width, cid)
    }

    /// Absolute path of the cid-refs file for `cid` under `root`.
    pub fn cid_refs_path(&self, root: &Path, cid: &str) -> PathBuf {
        root.join("refs").join("cids").join(self.cid_refs_relpath(cid))
    }

    /// Absolute path of the data object for `cid` under `root`.
    pub fn object_path(&self, root: &Path, cid: &str) -> PathBuf {
        root.join("objects").join(shard(self.depth, self.width, cid))
    }

    /// Directory (under `metadata/`) holding every namespace document for `pid`.
    pub fn metadata_pid_dir(&self, root: &Path, pid: &str) -> PathBuf {
        root.join("metadata").join(self.pid_refs_relpath(pid))
    }

    /// Absolute path of the metadata document for `(pid, namespace)`.
    pub fn metadata_path(&self, root: &Path, pid: &str, namespace: &str) -> PathBuf {
        let ns_hex = Algorithm::Sha256.digest_hex(namespace.as_bytes());
        self.metadata_pid_dir(root, pid).join(ns_hex)
    }
}
