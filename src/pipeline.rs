//! ObjectPipeline: orchestrates layout, digesting, atomic moves, the
//! reference graph, and the lock table into the store's public contract —
//! store, tag, verify-or-delete, delete, retrieve, find.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::algorithm::{hex_eq_ignore_case, Algorithm};
use crate::atomic::{move_into_place, MoveOutcome};
use crate::config::{self, StoreConfig};
use crate::digest_stream;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::locks::{cid_key, pid_key, pid_namespace_key, LockTable};
use crate::observer::observer;
use crate::refs;

const MAX_PID_LEN: usize = 8 * 1024;

/// Sentinel for "no size check requested", per spec.md §4.F.
pub const NO_SIZE_CHECK: i64 = -1;

/// Everything a successful `store_object` call reports back to the caller.
#[derive(Clone, Debug)]
pub struct ObjectMetadata {
    /// Pid this store call tagged, if one was supplied.
    pub pid: Option<String>,
    /// Content identifier: lowercase hex digest under the store algorithm.
    pub cid: String,
    /// Size of the stored object in bytes.
    pub size_in_bytes: u64,
    /// Canonical algorithm name -> lowercase hex digest, for every algorithm
    /// computed on this stream (at least the five defaults).
    pub digest_map: BTreeMap<String, String>,
}

/// A content-addressed object store with a crash-safe pid<->cid reference
/// graph and per-identifier concurrency control.
pub struct HashStore {
    root: PathBuf,
    layout: Layout,
    config: StoreConfig,
    algorithm: Algorithm,
    locks: LockTable,
}

fn validate_pid(pid: &str) -> Result<()> {
    if pid.is_empty() {
        return Err(Error::InvalidArgument("pid must not be empty".into()));
    }
    if pid.len() > MAX_PID_LEN {
        return Err(Error::InvalidArgument(format!("pid exceeds {MAX_PID_LEN} bytes")));
    }
    if pid.contains('\n') || pid.contains('\t') {
        return Err(Error::InvalidArgument("pid must not contain newline or tab".into()));
    }
    Ok(())
}

fn validate_expected_size(expected_size: i64) -> Result<()> {
    if expected_size == NO_SIZE_CHECK || expected_size > 0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "expected_size must be {NO_SIZE_CHECK} (no check) or > 0, got {expected_size}"
        )))
    }
}

impl HashStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn open(
        root: impl Into<PathBuf>,
        depth: usize,
        width: usize,
        algorithm: Algorithm,
        metadata_namespace: &str,
    ) -> Result<Self> {
        let root = root.into();
        let config = config::open_or_init(&root, depth, width, algorithm, metadata_namespace)?;
        Ok(Self {
            root,
            layout: Layout::new(depth, width),
            config,
            algorithm,
            locks: LockTable::new(),
        })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The persisted config document for this store.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn objects_tmp_dir(&self) -> PathBuf {
        self.root.join("objects").join("tmp")
    }

    fn refs_tmp_dir(&self) -> PathBuf {
        self.root.join("refs").join("tmp")
    }

    fn unique_object_tmp_path(&self) -> PathBuf {
        // Mirrors the create-new retry loop used elsewhere for temp names.
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        self.objects_tmp_dir().join(format!("{}-{}.tmp", std::process::id(), n))
    }

    /// Validate, stream, digest, and (if `pid` is given) tag `stream` into
    /// the store. See spec.md §4.F for the full state machine.
    #[instrument(skip(self, stream, expected_checksum), fields(pid))]
    pub fn store_object(
        &self,
        stream: impl Read,
        pid: Option<&str>,
        extra_algo: Option<&str>,
        expected_checksum: Option<&str>,
        checksum_algo: Option<&str>,
        expected_size: i64,
    ) -> Result<ObjectMetadata> {
        // --- VALIDATING ---
        if let Some(pid) = pid {
            validate_pid(pid)?;
        }
        validate_expected_size(expected_size)?;
        let extra_algo = extra_algo.map(Algorithm::parse).transpose()?;
        let checksum_algo = checksum_algo.map(Algorithm::parse).transpose()?;
        if expected_checksum.is_some() && checksum_algo.is_none() {
            return Err(Error::InvalidArgument(
                "checksum_algo is required when expected_checksum is supplied".into(),
            ));
        }
        if let Some(sum) = expected_checksum {
            if sum.is_empty() {
                return Err(Error::InvalidArgument("expected_checksum must be non-empty".into()));
            }
        }

        // pid lock is held for the whole call when a pid is supplied.
        let _pid_guard = pid.map(|p| self.locks.acquire(pid_key(p)));

        // --- STREAMING / VERIFYING ---
        let tmp_path = self.unique_object_tmp_path();
        let mut needed_extra: Vec<Algorithm> = Vec::new();
        if let Some(a) = extra_algo {
            needed_extra.push(a);
        }
        if let Some(a) = checksum_algo {
            needed_extra.push(a);
        }
        if !Algorithm::DEFAULTS.contains(&self.algorithm) {
            needed_extra.push(self.algorithm);
        }

        let size_hint = if expected_size == NO_SIZE_CHECK { None } else { Some(expected_size) };
        let outcome = digest_stream::consume_to_file(&tmp_path, stream, &needed_extra, size_hint);
        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, "store_object: stream digesting failed");
                return Err(e);
            }
        };

        if expected_size != NO_SIZE_CHECK && outcome.size != expected_size as u64 {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::SizeMismatch { expected: expected_size as u64, actual: outcome.size });
        }

        if let (Some(sum), Some(algo)) = (expected_checksum, checksum_algo) {
            let computed = outcome
                .digests
                .get(algo.canonical_name())
                .expect("checksum_algo was added to the computed set above");
            if !hex_eq_ignore_case(computed, sum) {
                let _ = fs::remove_file(&tmp_path);
                return Err(Error::ChecksumMismatch { algorithm: algo.canonical_name().to_string() });
            }
        }

        let cid = outcome
            .digests
            .get(self.algorithm.canonical_name())
            .cloned()
            .expect("store algorithm was added to the computed set above");

        // --- MOVED ---
        let object_path = self.layout.object_path(&self.root, &cid);
        match move_into_place(&tmp_path, &object_path)? {
            MoveOutcome::Moved => {
                debug!(%cid, size = outcome.size, "store_object: new object persisted");
                observer().object_created(outcome.size);
            }
            MoveOutcome::AlreadyExists => {
                let _ = fs::remove_file(&tmp_path);
                debug!(%cid, "store_object: dedup hit");
                observer().dedup_hit();
            }
        }

        let metadata = ObjectMetadata {
            pid: pid.map(str::to_string),
            cid: cid.clone(),
            size_in_bytes: outcome.size,
            digest_map: outcome.digests,
        };

        // --- TAGGED ---
        if let Some(pid) = pid {
            self.tag_locked(pid, &cid)?;
            observer().tagged();
        }

        // --- DONE ---
        Ok(metadata)
    }

    /// Acquire the cid lock and write/update refs tagging `pid` to `cid`.
    /// Caller must already hold the pid lock (enforced by every public
    /// entry point that calls this).
    fn tag_locked(&self, pid: &str, cid: &str) -> Result<()> {
        let _cid_guard = self.locks.acquire(cid_key(cid));

        let pid_refs_path = self.layout.pid_refs_path(&self.root, pid);
        let cid_refs_path = self.layout.cid_refs_path(&self.root, cid);

        match refs::write_pid_refs(&self.refs_tmp_dir(), &pid_refs_path, cid) {
            Ok(()) => {}
            // `pid` is already tagged to a different cid. Surface the
            // pipeline-boundary error spec.md §5/§7 name for this case rather
            // than the internal refs-layer signal.
            Err(Error::PidRefsFileExists) => return Err(Error::PidAlreadyTagged),
            Err(e) => return Err(e),
        }

        match refs::write_cid_refs_create(&self.refs_tmp_dir(), &cid_refs_path, pid) {
            Ok(()) => Ok(()),
            Err(Error::AlreadyExists(_)) => {
                refs::update_cid_refs(&self.refs_tmp_dir(), &cid_refs_path, pid, refs::UpdateMode::Add)
            }
            Err(e) => Err(e),
        }
        // `_cid_guard` is dropped here, releasing the cid lock before the
        // pid lock (acquired by the caller) is released — reverse order of
        // acquisition, per spec.md §4.E.
    }

    /// Tag `pid` to `cid`. Idempotent if `(pid, cid)` already holds; fails
    /// with [`Error::PidAlreadyTagged`] if `pid` is already tagged to a
    /// different cid.
    #[instrument(skip(self))]
    pub fn tag_object(&self, pid: &str, cid: &str) -> Result<()> {
        validate_pid(pid)?;
        if cid.is_empty() {
            return Err(Error::InvalidArgument("cid must not be empty".into()));
        }

        let _pid_guard = self.locks.acquire(pid_key(pid));
        let pid_refs_path = self.layout.pid_refs_path(&self.root, pid);

        if let Some(existing) = refs::read_pid_refs(&pid_refs_path)? {
            if existing == cid {
                return Ok(()); // already exactly this tag
            }
            return Err(Error::PidAlreadyTagged);
        }

        self.tag_locked(pid, cid)
    }

    /// Re-validate a stored object's checksum/size; optionally delete it on
    /// failure. Refs are never touched here — untagging, if desired, is the
    /// caller's responsibility.
    #[instrument(skip(self, expected_checksum))]
    pub fn verify_or_delete(
        &self,
        object_metadata: &ObjectMetadata,
        expected_checksum: Option<&str>,
        checksum_algo: Option<&str>,
        expected_size: i64,
        delete_on_failure: bool,
    ) -> Result<()> {
        validate_expected_size(expected_size)?;
        let checksum_algo = checksum_algo.map(Algorithm::parse).transpose()?;

        let result = (|| -> Result<()> {
            if expected_size != NO_SIZE_CHECK
                && object_metadata.size_in_bytes != expected_size as u64
            {
                return Err(Error::SizeMismatch {
                    expected: expected_size as u64,
                    actual: object_metadata.size_in_bytes,
                });
            }
            if let (Some(sum), Some(algo)) = (expected_checksum, checksum_algo) {
                let computed = match object_metadata.digest_map.get(algo.canonical_name()) {
                    Some(computed) => computed.clone(),
                    None => {
                        // Not in the original call's computed set (the
                        // algorithm is supported, it just wasn't requested
                        // up front) — re-read the stored object and hash it
                        // now, mirroring the "engine adds the algorithm to
                        // the computed set if needed" behavior store_object
                        // gets for free from DigestStream.
                        let object_path = self.layout.object_path(&self.root, &object_metadata.cid);
                        digest_stream::digest_existing_file(&object_path, algo)?
                    }
                };
                if !hex_eq_ignore_case(&computed, sum) {
                    return Err(Error::ChecksumMismatch {
                        algorithm: algo.canonical_name().to_string(),
                    });
                }
            }
            Ok(())
        })();

        if result.is_err() && delete_on_failure {
            let object_path = self.layout.object_path(&self.root, &object_metadata.cid);
            let _ = fs::remove_file(object_path);
        }
        result
    }

    /// Untag `pid`, deleting its object/cid-refs once no pid references it.
    #[instrument(skip(self))]
    pub fn delete_object(&self, pid: &str) -> Result<()> {
        validate_pid(pid)?;

        let _pid_guard = self.locks.acquire(pid_key(pid));
        let pid_refs_path = self.layout.pid_refs_path(&self.root, pid);

        let cid = match refs::read_pid_refs(&pid_refs_path)? {
            Some(cid) => cid,
            None => return Err(Error::NotFound(format!("no pid-refs for pid {pid:?}"))),
        };

        let _cid_guard = self.locks.acquire(cid_key(&cid));
        let cid_refs_path = self.layout.cid_refs_path(&self.root, &cid);

        if !refs::is_pid_in_cid_refs(pid, &cid_refs_path)? {
            // Orphan pid-refs: cid-refs missing or doesn't list us. Clean up
            // only the pid-refs file; there is no valid tag to unwind.
            refs::delete_pid_refs(&pid_refs_path)?;
            return Ok(());
        }

        refs::update_cid_refs(&self.refs_tmp_dir(), &cid_refs_path, pid, refs::UpdateMode::Remove)?;

        if refs::cid_refs_is_empty(&cid_refs_path)? {
            let object_path = self.layout.object_path(&self.root, &cid);
            let _ = fs::remove_file(object_path);
            refs::delete_cid_refs(&cid_refs_path)?;
        }

        refs::delete_pid_refs(&pid_refs_path)?;

        // best-effort metadata cleanup for this pid, across every namespace
        // it has a document under.
        let meta_dir = self.layout.metadata_pid_dir(&self.root, pid);
        if meta_dir.is_dir() {
            let _ = fs::remove_dir_all(&meta_dir);
        }

        observer().untagged();
        Ok(())
    }

    /// Delete the object for `cid`, but only if no pid still references it.
    #[instrument(skip(self))]
    pub fn delete_object_by_cid(&self, cid: &str) -> Result<()> {
        if cid.is_empty() {
            return Err(Error::InvalidArgument("cid must not be empty".into()));
        }
        let _cid_guard = self.locks.acquire(cid_key(cid));
        let cid_refs_path = self.layout.cid_refs_path(&self.root, cid);
        if cid_refs_path.exists() {
            // Some cid-refs file exists (even if empty): per the latest
            // source contract, do not delete. See SPEC_FULL.md §9(c).
            return Ok(());
        }
        let object_path = self.layout.object_path(&self.root, cid);
        let _ = fs::remove_file(object_path);
        Ok(())
    }

    /// Stream `stream` to the metadata document for `(pid, namespace)`,
    /// overwriting any existing document at that address.
    #[instrument(skip(self, stream))]
    pub fn store_metadata(&self, stream: impl Read, pid: &str, namespace: Option<&str>) -> Result<()> {
        validate_pid(pid)?;
        let namespace = namespace.unwrap_or(&self.config.store_metadata_namespace);

        let _ns_guard = self.locks.acquire(pid_namespace_key(pid, namespace));

        let tmp_path = self.objects_tmp_dir().join(format!(
            "meta-{}-{}.tmp",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        ));
        // Integrity logging only: the store-algorithm digest is computed but
        // not persisted as part of the metadata document's own content.
        let outcome = digest_stream::consume_to_file(&tmp_path, stream, &[], None)?;
        debug!(
            pid,
            namespace,
            size = outcome.size,
            digest = %outcome.digests.get(self.algorithm.canonical_name()).cloned().unwrap_or_default(),
            "store_metadata: wrote document"
        );

        let final_path = self.layout.metadata_path(&self.root, pid, namespace);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Overwrite semantics: metadata documents replace any prior document
        // at the same address, unlike object/refs files.
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    /// Open the data object tagged by `pid` for reading.
    pub fn retrieve_object(&self, pid: &str) -> Result<File> {
        validate_pid(pid)?;
        let pid_refs_path = self.layout.pid_refs_path(&self.root, pid);
        let cid = refs::read_pid_refs(&pid_refs_path)?
            .ok_or_else(|| Error::NotFound(format!("no pid-refs for pid {pid:?}")))?;
        let object_path = self.layout.object_path(&self.root, &cid);
        File::open(&object_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::OrphanRefs(cid.clone())
            } else {
                Error::Io(e)
            }
        })
    }

    /// Open the metadata document for `(pid, namespace)` for reading.
    pub fn retrieve_metadata(&self, pid: &str, namespace: Option<&str>) -> Result<File> {
        validate_pid(pid)?;
        let namespace = namespace.unwrap_or(&self.config.store_metadata_namespace);
        let path = self.layout.metadata_path(&self.root, pid, namespace);
        File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("no metadata document for pid {pid:?}, namespace {namespace:?}"))
            } else {
                Error::Io(e)
            }
        })
    }

    /// Resolve `pid` to its cid, verifying the reference graph along the way.
    pub fn find_object(&self, pid: &str) -> Result<String> {
        validate_pid(pid)?;
        let pid_refs_path = self.layout.pid_refs_path(&self.root, pid);
        let cid = refs::read_pid_refs(&pid_refs_path)?
            .ok_or_else(|| Error::NotFound(format!("no pid-refs for pid {pid:?}")))?;

        let cid_refs_path = self.layout.cid_refs_path(&self.root, &cid);
        if !cid_refs_path.exists() {
            return Err(Error::OrphanPidRefs(pid.to_string()));
        }
        let object_path = self.layout.object_path(&self.root, &cid);
        if !object_path.exists() {
            return Err(Error::OrphanRefs(cid));
        }
        if !refs::is_pid_in_cid_refs(pid, &cid_refs_path)? {
            return Err(Error::PidNotInCidRefs);
        }
        Ok(cid)
    }
}
