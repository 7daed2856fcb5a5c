//! DigestStream: consume a byte stream into a temp file while computing a
//! fixed set of digests plus an optional extra, in a single pass.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use crate::algorithm::Algorithm;
use crate::error::{Error, Result};

const CHUNK_SIZE: usize = 8 * 1024;

/// Outcome of a successful [`consume_to_file`] call.
#[derive(Debug)]
pub struct DigestOutcome {
    /// Total bytes read from the source stream.
    pub size: u64,
    /// Canonical algorithm name -> lowercase hex digest.
    pub digests: BTreeMap<String, String>,
}

/// Read `source` to EOF in 8 KiB chunks, writing each chunk to `tmp_path`
/// (a fresh file this function creates) while feeding it to hashers for the
/// five default algorithms plus every algorithm listed in `extra` that isn't
/// already a default (the checksum engine uses this to fold in a
/// non-default store algorithm or checksum algorithm alongside a caller's
/// own requested extra — see `SPEC_FULL.md` §4.B.1).
///
/// `requested_size`, when `Some(n)` with `n > 0`, makes an immediate (zero
/// byte) EOF fail with [`Error::EmptyStream`] rather than succeeding as a
/// legitimate empty object. Pass `None` or `Some(n)` with `n <= 0` to store
/// zero-byte streams successfully.
///
/// On any I/O error mid-stream, `tmp_path` is unlinked before the error is
/// returned, so a failed call never leaves a partial file behind.
pub fn consume_to_file(
    tmp_path: &Path,
    mut source: impl Read,
    extra: &[Algorithm],
    requested_size: Option<i64>,
) -> Result<DigestOutcome> {
    if let Some(parent) = tmp_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut algorithms: Vec<Algorithm> = Algorithm::DEFAULTS.to_vec();
    for extra in extra {
        if !algorithms.contains(extra) {
            algorithms.push(*extra);
        }
    }
    let mut hashers: Vec<(Algorithm, Box<dyn digest::DynDigest>)> =
        algorithms.iter().map(|a| (*a, a.new_hasher())).collect();

    let mut file = File::create(tmp_path)?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;
    let wants_nonempty = requested_size.map(|n| n > 0).unwrap_or(false);

    let run = (|| -> Result<()> {
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                if total == 0 && wants_nonempty {
                    return Err(Error::EmptyStream);
                }
                break;
            }
            file.write_all(&buf[..n])?;
            for (_, hasher) in hashers.iter_mut() {
                hasher.update(&buf[..n]);
            }
            total += n as u64;
        }
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = run {
        let _ = fs::remove_file(tmp_path);
        return Err(err);
    }

    let mut digests = BTreeMap::new();
    for (algo, hasher) in hashers {
        digests.insert(algo.canonical_name().to_string(), hex::encode(hasher.finalize()));
    }

    Ok(DigestOutcome { size: total, digests })
}

/// Re-read an already-stored file and compute its digest under `algorithm`.
///
/// Used when verifying a stored object under an algorithm that wasn't part
/// of the original `store_object` call's computed set (the checksum engine
/// only adds an algorithm to that set up front — see spec.md §4.H — so a
/// caller asking `verify_or_delete` to check a different algorithm after
/// the fact needs the object re-hashed rather than looked up).
pub fn digest_existing_file(path: &Path, algorithm: Algorithm) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = algorithm.new_hasher();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
