//! npm registry client with a per-run manifest cache.

use crate::error::PmError;
use indexmap::IndexMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment variable to override registry URL.
pub const REGISTRY_ENV: &str = "TINYPM_REGISTRY";

/// Distribution metadata for one published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    /// SHA-1 checksum of the tarball. Carried through to the lock file,
    /// never verified.
    #[serde(default)]
    pub shasum: String,
    /// URL of the package tarball.
    pub tarball: String,
}

/// Metadata for one published version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMeta {
    /// Declared runtime dependencies (name -> version range).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    pub dist: Dist,
}

/// A package's full version manifest as returned by the registry.
///
/// Keyed by version string. An `IndexMap` keeps the registry's key order:
/// the last entry is what the registry considers current, which is the
/// version picked when no range is given.
pub type PackageManifest = IndexMap<String, VersionMeta>;

/// Shape of the registry's packument response, reduced to what we read.
#[derive(Debug, Deserialize)]
struct RegistryResponse {
    #[serde(default)]
    versions: Option<PackageManifest>,
    #[serde(default)]
    error: Option<String>,
}

/// Registry client for fetching package manifests.
///
/// Manifests are cached by package name for the lifetime of the client,
/// so repeated lookups for the same name (even under different
/// constraints) hit the registry at most once.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
    cache: Arc<RwLock<HashMap<String, Arc<PackageManifest>>>>,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot
    /// be created.
    pub fn new(base_url: &str) -> Result<Self, PmError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PmError::registry(format!("Invalid registry URL '{base_url}': {e}")))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("tinypm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PmError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Create a client using the registry URL from environment or default.
    pub fn from_env() -> Result<Self, PmError> {
        let url = std::env::var(REGISTRY_ENV).unwrap_or_else(|_| DEFAULT_REGISTRY.to_string());
        Self::new(&url)
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the HTTP client (for reuse in tarball downloads).
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Fetch the version manifest for a package, consulting the cache first.
    ///
    /// # Errors
    /// Returns `PackageNotFound` when the registry has no such package,
    /// or a registry error on any transport failure. No retries.
    pub async fn resolve(&self, name: &str) -> Result<Arc<PackageManifest>, PmError> {
        {
            let cache = self.cache.read().await;
            if let Some(manifest) = cache.get(name) {
                return Ok(Arc::clone(manifest));
            }
        }

        let manifest = Arc::new(self.fetch(name).await?);

        let mut cache = self.cache.write().await;
        Ok(Arc::clone(
            cache.entry(name.to_string()).or_insert(manifest),
        ))
    }

    async fn fetch(&self, name: &str) -> Result<PackageManifest, PmError> {
        // URL-encode the name for scoped packages
        let encoded_name = if name.starts_with('@') {
            name.replace('/', "%2F")
        } else {
            name.to_string()
        };

        let url = self
            .base_url
            .join(&encoded_name)
            .map_err(|e| PmError::registry(format!("Failed to build URL for '{name}': {e}")))?;

        tracing::debug!(package = name, url = %url, "fetching manifest");

        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PmError::not_found(name));
        }

        if !response.status().is_success() {
            return Err(PmError::registry(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        let json: RegistryResponse = response.json().await?;

        if json.error.is_some() {
            return Err(PmError::not_found(name));
        }

        json.versions
            .ok_or_else(|| PmError::registry(format!("Registry response for '{name}' has no versions")))
    }
}
