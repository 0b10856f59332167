use std::io;
use thiserror::Error;

/// Core error type for tinypm operations.
///
/// Every variant is fatal for the run; a cyclical version conflict is
/// deliberately not represented here because the resolver handles it
/// locally by pruning the branch.
#[derive(Error, Debug)]
pub enum PmError {
    #[error("No package.json found in the current directory or any parent")]
    ManifestMissing,

    #[error("Invalid package.json: {0}")]
    ManifestInvalid(String),

    #[error("Package not found: {name}")]
    PackageNotFound { name: String },

    #[error("No version of {name} satisfies range: {range}")]
    VersionNotFound { name: String, range: String },

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Extraction failed: {0}")]
    Extract(String),

    #[error("Lock file error: {0}")]
    Lockfile(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PmError {
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self::PackageNotFound {
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn version_not_found(name: &str, range: &str) -> Self {
        Self::VersionNotFound {
            name: name.to_string(),
            range: range.to_string(),
        }
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    pub fn extract(msg: impl Into<String>) -> Self {
        Self::Extract(msg.into())
    }

    pub fn lockfile(msg: impl Into<String>) -> Self {
        Self::Lockfile(msg.into())
    }

    pub fn manifest_invalid(msg: impl Into<String>) -> Self {
        Self::ManifestInvalid(msg.into())
    }
}

impl From<reqwest::Error> for PmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Registry(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::Registry(format!("Connection failed: {e}"))
        } else {
            Self::Registry(e.to_string())
        }
    }
}
