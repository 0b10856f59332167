//! Two-generation lock store.
//!
//! The store holds two maps of resolved pins keyed by `"name@constraint"`:
//! `old` is loaded from the lock file at startup and only ever read, while
//! `new` is rebuilt from scratch during resolution and is the sole content
//! written back. A dependency removed from the project simply never makes
//! it into `new`, so no diffing or deletion pass is needed.

use crate::error::PmError;
use crate::registry::{Dist, PackageManifest, VersionMeta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

/// Lock file name at the project root.
pub const LOCKFILE_NAME: &str = "tinypm.lock";

/// One pinned resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LockEntry {
    /// Exact resolved version.
    pub version: String,
    /// Tarball URL for the resolved version.
    pub url: String,
    /// Registry-reported checksum. Recorded, never verified.
    #[serde(default)]
    pub shasum: String,
    /// Declared dependencies of the resolved version.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
}

/// The two-generation store.
#[derive(Debug, Default)]
pub struct LockStore {
    old: BTreeMap<String, LockEntry>,
    new: Mutex<BTreeMap<String, LockEntry>>,
}

impl LockStore {
    /// Load the lock file at `path` into the old generation, if it exists.
    pub fn load(path: &Path) -> Result<Self, PmError> {
        let old = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| PmError::lockfile(format!("Failed to read {}: {e}", path.display())))?;
            serde_json::from_str(&content)
                .map_err(|e| PmError::lockfile(format!("Invalid lock file {}: {e}", path.display())))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            old,
            new: Mutex::new(BTreeMap::new()),
        })
    }

    /// Look up a pin by exact `name@constraint` in the old generation.
    ///
    /// A hit is reshaped into a single-version [`PackageManifest`] so the
    /// resolution engine consumes lock hits and registry responses through
    /// the same code path. A miss is normal, not an error.
    #[must_use]
    pub fn get(&self, name: &str, constraint: &str) -> Option<PackageManifest> {
        let entry = self.old.get(&format!("{name}@{constraint}"))?;

        let mut manifest = PackageManifest::new();
        manifest.insert(
            entry.version.clone(),
            VersionMeta {
                dependencies: entry.dependencies.clone(),
                dist: Dist {
                    shasum: entry.shasum.clone(),
                    tarball: entry.url.clone(),
                },
            },
        );
        Some(manifest)
    }

    /// Unconditionally upsert a pin into the new generation.
    ///
    /// Called once per resolution regardless of cache hit or miss, so the
    /// written lock file always reflects the current run. Branches write
    /// concurrently but to distinct keys; a coincidental duplicate carries
    /// the same data either way.
    pub fn put(&self, key: String, entry: LockEntry) {
        let mut new = self.new.lock().expect("lock store poisoned");
        new.insert(key, entry);
    }

    /// Number of pins in the new generation.
    #[must_use]
    pub fn pinned(&self) -> usize {
        self.new.lock().expect("lock store poisoned").len()
    }

    /// Write the new generation to `path`, replacing any previous content.
    ///
    /// Keys are emitted sorted (BTreeMap order) for deterministic output.
    pub fn flush(&self, path: &Path) -> Result<(), PmError> {
        let new = self.new.lock().expect("lock store poisoned");
        let mut content = serde_json::to_string_pretty(&*new)
            .map_err(|e| PmError::lockfile(format!("Failed to serialize lock file: {e}")))?;
        content.push('\n');
        fs::write(path, content)
            .map_err(|e| PmError::lockfile(format!("Failed to write {}: {e}", path.display())))
    }
}
