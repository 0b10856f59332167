//! Project manifest (package.json) reading and editing.

use crate::error::PmError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Project manifest file name.
pub const MANIFEST_NAME: &str = "package.json";

/// The project's own manifest.
///
/// Only the two dependency maps are interpreted; every other field is
/// carried through untouched so editing the manifest never loses data.
/// The maps are BTreeMaps, so keys come out sorted on write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,

    #[serde(rename = "devDependencies", skip_serializing_if = "Option::is_none")]
    pub dev_dependencies: Option<BTreeMap<String, String>>,

    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl RootManifest {
    /// Read and parse the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, PmError> {
        let content = fs::read_to_string(path)
            .map_err(|e| PmError::manifest_invalid(format!("Failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| PmError::manifest_invalid(format!("Invalid {}: {e}", path.display())))
    }

    /// Write the manifest back with fixed two-space indentation.
    pub fn save(&self, path: &Path) -> Result<(), PmError> {
        let mut content = serde_json::to_string_pretty(self)
            .map_err(|e| PmError::manifest_invalid(format!("Failed to serialize manifest: {e}")))?;
        content.push('\n');
        fs::write(path, content)
            .map_err(|e| PmError::manifest_invalid(format!("Failed to write {}: {e}", path.display())))
    }

    /// Register a package requested on the command line.
    ///
    /// The range starts out empty; the resolution engine fills in a
    /// caret range once it knows which version "latest" is.
    pub fn add_package(&mut self, name: &str, dev: bool) {
        let map = if dev {
            self.dev_dependencies.get_or_insert_with(BTreeMap::new)
        } else {
            self.dependencies.get_or_insert_with(BTreeMap::new)
        };
        map.entry(name.to_string()).or_default();
    }

    /// Take dev dependencies out of the manifest (`--production`).
    ///
    /// Returns the removed map so the caller can put it back before
    /// writing the manifest; stripping is a resolution-time view, not
    /// an edit.
    pub fn strip_dev(&mut self) -> Option<BTreeMap<String, String>> {
        self.dev_dependencies.take()
    }
}

/// Find the project root by walking up from `cwd` looking for `package.json`.
pub fn find_project_root(cwd: &Path) -> Result<PathBuf, PmError> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join(MANIFEST_NAME).exists() {
            return Ok(current);
        }

        if !current.pop() {
            return Err(PmError::ManifestMissing);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_and_save_preserves_other_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_NAME);
        fs::write(
            &path,
            r#"{
                "name": "my-app",
                "version": "0.1.0",
                "scripts": { "start": "node index.js" },
                "dependencies": { "react": "^18.0.0" }
            }"#,
        )
        .unwrap();

        let manifest = RootManifest::load(&path).unwrap();
        manifest.save(&path).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["name"], "my-app");
        assert_eq!(written["scripts"]["start"], "node index.js");
        assert_eq!(written["dependencies"]["react"], "^18.0.0");
    }

    #[test]
    fn test_dependency_keys_written_sorted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_NAME);
        fs::write(
            &path,
            r#"{ "dependencies": { "zebra": "^1.0.0", "apple": "^1.0.0", "mango": "^1.0.0" } }"#,
        )
        .unwrap();

        let manifest = RootManifest::load(&path).unwrap();
        manifest.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let apple = content.find("apple").unwrap();
        let mango = content.find("mango").unwrap();
        let zebra = content.find("zebra").unwrap();
        assert!(apple < mango && mango < zebra);
    }

    #[test]
    fn test_add_package_with_empty_range() {
        let mut manifest = RootManifest::default();
        manifest.add_package("lodash", false);
        manifest.add_package("typescript", true);

        assert_eq!(
            manifest.dependencies.as_ref().unwrap().get("lodash"),
            Some(&String::new())
        );
        assert_eq!(
            manifest.dev_dependencies.as_ref().unwrap().get("typescript"),
            Some(&String::new())
        );
    }

    #[test]
    fn test_add_package_keeps_existing_range() {
        let mut manifest = RootManifest::default();
        manifest
            .dependencies
            .get_or_insert_with(BTreeMap::new)
            .insert("react".to_string(), "^18.0.0".to_string());

        manifest.add_package("react", false);
        assert_eq!(
            manifest.dependencies.as_ref().unwrap().get("react"),
            Some(&"^18.0.0".to_string())
        );
    }

    #[test]
    fn test_strip_dev_returns_removed_map() {
        let mut manifest = RootManifest::default();
        manifest.add_package("typescript", true);

        let stripped = manifest.strip_dev();
        assert!(manifest.dev_dependencies.is_none());
        assert!(stripped.as_ref().unwrap().contains_key("typescript"));

        // Putting it back restores the manifest for saving
        manifest.dev_dependencies = stripped;
        assert!(manifest.dev_dependencies.is_some());
    }

    #[test]
    fn test_find_project_root_walks_up() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_NAME), "{}").unwrap();
        let nested = dir.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        let root = find_project_root(&nested).unwrap();
        assert_eq!(root, dir.path());
    }

    #[test]
    fn test_find_project_root_missing() {
        let dir = tempdir().unwrap();
        let result = find_project_root(dir.path());
        assert!(matches!(result, Err(PmError::ManifestMissing)));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_NAME);
        fs::write(&path, "not json {{{").unwrap();
        assert!(matches!(
            RootManifest::load(&path),
            Err(PmError::ManifestInvalid(_))
        ));
    }
}
