use hashstore::{Algorithm, HashStore, NO_SIZE_CHECK};
use proptest::prelude::*;
use std::io::Cursor;

fn open(dir: &std::path::Path) -> HashStore {
    HashStore::open(dir, 2, 2, Algorithm::Sha256, "ns").unwrap()
}

proptest! {
    // P1: one object file per distinct payload, cid-refs lists every tagging
    // pid exactly once, in insertion order.
    #[test]
    fn p1_dedup_collects_every_pid_once(bytes in prop::collection::vec(any::<u8>(), 0..2048), pid_count in 1usize..6) {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());

        let pids: Vec<String> = (0..pid_count).map(|i| format!("pid.{i}")).collect();
        let mut last_cid = None;
        for pid in &pids {
            let meta = store
                .store_object(Cursor::new(bytes.clone()), Some(pid.as_str()), None, None, None, NO_SIZE_CHECK)
                .unwrap();
            if let Some(prev) = &last_cid {
                prop_assert_eq!(prev, &meta.cid);
            }
            last_cid = Some(meta.cid);
        }

        let cid = last_cid.unwrap();
        let cid_refs_path = {
            let mut p = dir.path().join("refs").join("cids");
            let shard = hashstore::layout::shard(2, 2, &cid);
            p.push(shard);
            p
        };
        let contents = std::fs::read_to_string(&cid_refs_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        prop_assert_eq!(lines, pids);
    }

    // P2: shard is deterministic and sensitive to any prefix difference.
    #[test]
    fn p2_shard_is_deterministic(hex in "[0-9a-f]{16}", depth in 1usize..4, width in 1usize..4) {
        let a = hashstore::layout::shard(depth, width, &hex);
        let b = hashstore::layout::shard(depth, width, &hex);
        prop_assert_eq!(a, b);
    }

    // P3: every successful store reports at least the five default digests,
    // each of canonical length.
    #[test]
    fn p3_digest_map_has_all_defaults(bytes in prop::collection::vec(any::<u8>(), 0..4096)) {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let meta = store
            .store_object(Cursor::new(bytes), None, None, None, None, NO_SIZE_CHECK)
            .unwrap();
        for algo in Algorithm::DEFAULTS {
            let hex = meta.digest_map.get(algo.canonical_name()).unwrap();
            prop_assert_eq!(hex.len(), algo.hex_len());
        }
    }
}

// L2: storing the same bytes under the same pid twice does not duplicate
// the pid line in cid-refs.
#[test]
fn l2_repeat_store_same_pid_is_not_duplicated() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    let m1 = store
        .store_object(Cursor::new(b"same".to_vec()), Some("p"), None, None, None, NO_SIZE_CHECK)
        .unwrap();
    let m2 = store
        .store_object(Cursor::new(b"same".to_vec()), Some("p"), None, None, None, NO_SIZE_CHECK)
        .unwrap();
    assert_eq!(m1.cid, m2.cid);

    let cid_refs_path = {
        let mut p = dir.path().join("refs").join("cids");
        p.push(hashstore::layout::shard(2, 2, &m1.cid));
        p
    };
    let contents = std::fs::read_to_string(&cid_refs_path).unwrap();
    assert_eq!(contents, "p\n");
}

// L3: re-tagging the same (pid, cid) pair is a no-op success.
#[test]
fn l3_retag_same_pair_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let cid = Algorithm::Sha256.digest_hex(b"payload");
    store.store_object(Cursor::new(b"payload".to_vec()), None, None, None, None, NO_SIZE_CHECK).unwrap();
    store.tag_object("p", &cid).unwrap();
    store.tag_object("p", &cid).unwrap();
    assert_eq!(store.find_object("p").unwrap(), cid);
}

// L4: deleting the only pid referencing an object restores the store to its
// pre-store state (net of the object/tmp subtree existing at all).
#[test]
fn l4_delete_after_store_leaves_no_object_or_refs() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    store
        .store_object(Cursor::new(b"temporary".to_vec()), Some("p"), None, None, None, NO_SIZE_CHECK)
        .unwrap();
    store.delete_object("p").unwrap();

    let cid = Algorithm::Sha256.digest_hex(b"temporary");
    assert!(store.find_object("p").is_err());
    let object_path = {
        let mut p = dir.path().join("objects");
        p.push(hashstore::layout::shard(2, 2, &cid));
        p
    };
    assert!(!object_path.exists());
}

// Boundary: a zero-byte stream with no size check stores successfully.
#[test]
fn boundary_zero_byte_stream_with_no_size_check_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let meta =
        store.store_object(Cursor::new(Vec::new()), Some("empty"), None, None, None, NO_SIZE_CHECK).unwrap();
    assert_eq!(meta.size_in_bytes, 0);
}

// Boundary: interrupting a store mid-stream (I/O error) leaves zero files
// under objects/tmp/.
#[test]
fn boundary_io_error_mid_stream_leaves_tmp_dir_empty() {
    struct FlakyReader {
        served: bool,
    }
    impl std::io::Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.served {
                self.served = true;
                buf[0] = b'x';
                Ok(1)
            } else {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
            }
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let err = store
        .store_object(FlakyReader { served: false }, Some("p"), None, None, None, NO_SIZE_CHECK)
        .unwrap_err();
    assert!(matches!(err, hashstore::Error::Io(_)));
    assert_eq!(std::fs::read_dir(dir.path().join("objects").join("tmp")).unwrap().count(), 0);
}
