//! RefStore: read/write the pid-refs and cid-refs files that track the
//! many-to-one pid -> cid mapping, with crash-safe rewrite via
//! write-to-tmp-then-atomic-rename (never mutate the final file in place).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::atomic::{move_into_place, MoveOutcome};
use crate::error::{Error, Result};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Whether an `update_cid_refs` call is adding or removing a pid line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateMode {
    /// Append the pid if not already present.
    Add,
    /// Remove the pid's line if present.
    Remove,
}

/// Create a uniquely-named, empty file under `tmp_dir`, retrying on name
/// collision (mirrors the create-new retry loop used for object temp files).
fn create_unique_tmp(tmp_dir: &Path) -> io::Result<(PathBuf, fs::File)> {
    fs::create_dir_all(tmp_dir)?;
    loop {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = tmp_dir.join(format!("{}-{}.tmp", std::process::id(), n));
        match fs::OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(f) => return Ok((candidate, f)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}

fn write_tmp_and_move(refs_tmp_dir: &Path, contents: &[u8], target: &Path) -> Result<MoveOutcome> {
    let (tmp, mut f) = create_unique_tmp(refs_tmp_dir)?;
    f.write_all(contents)?;
    f.sync_all()?;
    drop(f);
    let outcome = move_into_place(&tmp, target);
    if !matches!(outcome, Ok(MoveOutcome::Moved)) {
        let _ = fs::remove_file(&tmp);
    }
    outcome
}

/// Write the pid-refs file naming `cid` for `pid`.
///
/// If the destination already exists and names the same cid, this is a
/// no-op success (idempotent tag). If it exists and names a different cid,
/// fails with [`Error::PidRefsFileExists`] — the caller must untag first.
pub fn write_pid_refs(refs_tmp_dir: &Path, pid_refs_path: &Path, cid: &str) -> Result<()> {
    if let Some(existing) = read_pid_refs(pid_refs_path)? {
        return if existing == cid { Ok(()) } else { Err(Error::PidRefsFileExists) };
    }
    match write_tmp_and_move(refs_tmp_dir, cid.as_bytes(), pid_refs_path)? {
        MoveOutcome::Moved => Ok(()),
        MoveOutcome::AlreadyExists => {
            // Lost a race with a concurrent writer; re-check content.
            match read_pid_refs(pid_refs_path)? {
                Some(existing) if existing == cid => Ok(()),
                _ => Err(Error::PidRefsFileExists),
            }
        }
    }
}

/// Read the cid a pid-refs file names, if the file exists.
pub fn read_pid_refs(pid_refs_path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(pid_refs_path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Delete a pid-refs file. A missing file is not an error.
pub fn delete_pid_refs(pid_refs_path: &Path) -> Result<()> {
    match fs::remove_file(pid_refs_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Create a cid-refs file containing exactly `pid\n`.
///
/// Fails with [`Error::AlreadyExists`] if the destination exists — callers
/// use [`update_cid_refs`] instead in that case.
pub fn write_cid_refs_create(refs_tmp_dir: &Path, cid_refs_path: &Path, pid: &str) -> Result<()> {
    if cid_refs_path.exists() {
        return Err(Error::AlreadyExists(cid_refs_path.to_path_buf()));
    }
    let mut contents = pid.as_bytes().to_vec();
    contents.push(b'\n');
    match write_tmp_and_move(refs_tmp_dir, &contents, cid_refs_path)? {
        MoveOutcome::Moved => Ok(()),
        MoveOutcome::AlreadyExists => Err(Error::AlreadyExists(cid_refs_path.to_path_buf())),
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s.lines().map(|l| l.to_string()).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Add or remove `pid` in the cid-refs file at `cid_refs_path`, rewriting it
/// atomically (temp file + rename) so a crash mid-write leaves either the
/// pre-image or the post-image on disk, never a torn file.
///
/// Both directions are no-ops when the target state already holds: adding an
/// already-present pid, or removing an absent one, does not touch the file.
pub fn update_cid_refs(
    refs_tmp_dir: &Path,
    cid_refs_path: &Path,
    pid: &str,
    mode: UpdateMode,
) -> Result<()> {
    let mut lines = read_lines(cid_refs_path)?;
    let present = lines.iter().any(|l| l == pid);
    let changed = match mode {
        UpdateMode::Add => {
            if present {
                false
            } else {
                lines.push(pid.to_string());
                true
            }
        }
        UpdateMode::Remove => {
            if present {
                lines.retain(|l| l != pid);
                true
            } else {
                false
            }
        }
    };
    if !changed {
        return Ok(());
    }

    let mut contents = String::new();
    for line in &lines {
        contents.push_str(line);
        contents.push('\n');
    }

    let (tmp, mut f) = create_unique_tmp(refs_tmp_dir)?;
    f.write_all(contents.as_bytes())?;
    f.sync_all()?;
    drop(f);
    // Overwrite is intentional here (unlike object/pid-refs creation): the
    // destination legitimately already exists and we are replacing its
    // content wholesale with the new post-image.
    fs::rename(&tmp, cid_refs_path)?;
    Ok(())
}

/// Exact line-match membership check.
pub fn is_pid_in_cid_refs(pid: &str, cid_refs_path: &Path) -> Result<bool> {
    let lines = read_lines(cid_refs_path)?;
    Ok(lines.iter().any(|l| l == pid))
}

/// Whether a cid-refs file lists zero pids (missing file counts as empty).
pub fn cid_refs_is_empty(cid_refs_path: &Path) -> Result<bool> {
    Ok(read_lines(cid_refs_path)?.is_empty())
}

/// Verify that `pid_refs_path` names exactly `cid` and that `cid_refs_path`
/// lists `pid` on its own line.
pub fn verify_refs(pid: &str, cid: &str, pid_refs_path: &Path, cid_refs_path: &Path) -> Result<()> {
    match read_pid_refs(pid_refs_path)? {
        Some(named) if named == cid => {}
        _ => return Err(Error::CidMismatch),
    }
    if !is_pid_in_cid_refs(pid, cid_refs_path)? {
        return Err(Error::PidNotInCidRefs);
    }
    Ok(())
}

/// Delete a cid-refs file. A missing file is not an error.
pub fn delete_cid_refs(cid_refs_path: &Path) -> Result<()> {
    match fs::remove_file(cid_refs_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
