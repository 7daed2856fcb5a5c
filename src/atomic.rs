//! AtomicMover: rename a temp file into its final content-addressed
//! location, creating parent directories as needed and treating a
//! pre-existing destination as the dedup/conflict signal rather than an error
//! to propagate blindly.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Result of attempting to move a temp file into place.
#[derive(Debug, Eq, PartialEq)]
pub enum MoveOutcome {
    /// `source` is now at `target`; `source` no longer exists.
    Moved,
    /// `target` already existed. `source` is untouched; the caller decides
    /// whether that means "dedup hit" (objects) or "conflict" (refs).
    AlreadyExists,
}

/// Rename `source` to `target`, creating `target`'s parent directories first.
///
/// No content comparison is performed: two files that hash to the same
/// address are assumed equal by construction of that address. If the
/// underlying filesystem doesn't support atomic rename this falls back to a
/// plain rename with the same externally observable semantics — `fs::rename`
/// is already atomic-or-nothing on every platform Rust targets for same
/// filesystem moves, so no extra fallback code is needed here.
pub fn move_into_place(source: &Path, target: &Path) -> Result<MoveOutcome> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    if target.exists() {
        return Ok(MoveOutcome::AlreadyExists);
    }
    match fs::rename(source, target) {
        Ok(()) => Ok(MoveOutcome::Moved),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            // Lost a race with a concurrent mover; treat like the pre-check.
            Ok(MoveOutcome::AlreadyExists)
        }
        Err(e) => {
            // Another rename-target-exists race on platforms that surface it
            // as a generic error rather than `AlreadyExists`.
            if target.exists() {
                Ok(MoveOutcome::AlreadyExists)
            } else {
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &Path, content: &[u8]) {
        let mut f = fs::File::create(path).unwrap();
        f.write_all(content).unwrap();
    }

    #[test]
    fn moves_into_place_creating_parents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.tmp");
        write_file(&src, b"hi");
        let dst = dir.path().join("a").join("b").join("c").join("dst");

        let outcome = move_into_place(&src, &dst).unwrap();
        assert_eq!(outcome, MoveOutcome::Moved);
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"hi");
    }

    #[test]
    fn already_existing_target_is_reported_not_errored() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.tmp");
        write_file(&src, b"new");
        let dst = dir.path().join("dst");
        write_file(&dst, b"old");

        let outcome = move_into_place(&src, &dst).unwrap();
        assert_eq!(outcome, MoveOutcome::AlreadyExists);
        // source untouched, destination untouched
        assert_eq!(fs::read(&src).unwrap(), b"new");
        assert_eq!(fs::read(&dst).unwrap(), b"old");
    }
}
