//! Config/Init: validate layout parameters, persist them once at store root,
//! and refuse re-opens that disagree with the persisted configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::algorithm::Algorithm;
use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "hashstore.json";

/// The config document persisted at `<root>/hashstore.json`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store root, recorded for operator sanity (not re-validated against
    /// the actual directory location the store was opened from).
    #[serde(rename = "storePath")]
    pub store_path: String,
    /// Sharding depth (see [`crate::layout`]).
    #[serde(rename = "storeDepth")]
    pub store_depth: usize,
    /// Sharding width (see [`crate::layout`]).
    #[serde(rename = "storeWidth")]
    pub store_width: usize,
    /// Canonical name of the content-addressing algorithm.
    #[serde(rename = "storeAlgorithm")]
    pub store_algorithm: String,
    /// Default metadata namespace, an arbitrary URI-like string.
    #[serde(rename = "storeMetadataNamespace")]
    pub store_metadata_namespace: String,
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.store_depth < 1 {
            return Err(Error::Config("storeDepth must be >= 1".into()));
        }
        if self.store_width < 1 {
            return Err(Error::Config("storeWidth must be >= 1".into()));
        }
        Algorithm::parse(&self.store_algorithm)?;
        if self.store_metadata_namespace.is_empty() {
            return Err(Error::Config("storeMetadataNamespace must be non-empty".into()));
        }
        Ok(())
    }

    fn config_path(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE_NAME)
    }

    /// The store algorithm, parsed.
    pub fn algorithm(&self) -> Result<Algorithm> {
        Algorithm::parse(&self.store_algorithm)
    }
}

/// Required subtrees under a store root (spec.md §3).
const SUBDIRS: [&str; 5] = ["objects", "objects/tmp", "metadata", "refs/pids", "refs/cids"];

fn ensure_subdirs(root: &Path) -> Result<()> {
    for rel in SUBDIRS {
        fs::create_dir_all(root.join(rel))?;
    }
    fs::create_dir_all(root.join("refs").join("tmp"))?;
    Ok(())
}

fn dir_is_empty(root: &Path) -> Result<bool> {
    match fs::read_dir(root) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Open (creating if necessary) a store root with the given layout
/// parameters, returning the config that is now durably persisted there.
///
/// - If no config document exists and the root is empty (or absent),
///   writes a fresh one and creates the required subdirectories.
/// - If no config document exists but the root is non-empty, refuses to
///   initialize (spec.md §4.G: "Refuse to initialize a store at a
///   pre-existing non-empty root that lacks a config document").
/// - If a config document exists, reloads it and rejects the call if any
///   field differs from what the caller requested (spec.md I5).
pub fn open_or_init(
    root: &Path,
    depth: usize,
    width: usize,
    algorithm: Algorithm,
    metadata_namespace: &str,
) -> Result<StoreConfig> {
    let requested = StoreConfig {
        store_path: root.to_string_lossy().into_owned(),
        store_depth: depth,
        store_width: width,
        store_algorithm: algorithm.canonical_name().to_string(),
        store_metadata_namespace: metadata_namespace.to_string(),
    };
    requested.validate()?;

    let config_path = StoreConfig::config_path(root);
    if config_path.exists() {
        let existing = load(root)?;
        if existing.store_depth != requested.store_depth
            || existing.store_width != requested.store_width
            || existing.store_algorithm != requested.store_algorithm
            || existing.store_metadata_namespace != requested.store_metadata_namespace
        {
            return Err(Error::Config(format!(
                "store at {:?} was initialized with different parameters: {:?} != requested {:?}",
                root, existing, requested
            )));
        }
        ensure_subdirs(root)?;
        return Ok(existing);
    }

    if !dir_is_empty(root)? {
        return Err(Error::Config(format!(
            "refusing to initialize non-empty root {:?} without an existing config document",
            root
        )));
    }

    fs::create_dir_all(root)?;
    ensure_subdirs(root)?;
    let json = serde_json::to_string_pretty(&requested)?;
    fs::write(&config_path, json)?;
    Ok(requested)
}

/// Load the config document at `root`, failing if it does not exist or
/// fails to parse.
pub fn load(root: &Path) -> Result<StoreConfig> {
    let config_path = StoreConfig::config_path(root);
    let contents = fs::read_to_string(&config_path)
        .map_err(|e| Error::Config(format!("failed to read {:?}: {e}", config_path)))?;
    let config: StoreConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
