//! Tarball download and installation into `node_modules`.

use crate::error::PmError;
use crate::report::Reporter;
use crate::resolve::{Resolution, INSTALL_DIR};
use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::Client;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tar::Archive;

/// Maximum tarball size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

/// Download timeout in seconds.
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Download and extract one package.
///
/// The target directory is `<project_root>/<nested_path>/node_modules/<name>`
/// (`nested_path` empty for top-level installs), created along with any
/// missing parents. Registry tarballs wrap their contents in a single
/// top-level directory, which is stripped during extraction.
///
/// Any download or extraction failure is fatal for the run; there is no
/// retry and no partial-install cleanup.
pub async fn install(
    client: &Client,
    project_root: &Path,
    name: &str,
    url: &str,
    nested_path: &str,
) -> Result<(), PmError> {
    let mut dest = project_root.to_path_buf();
    if !nested_path.is_empty() {
        dest.push(nested_path);
    }
    let dest = dest.join(INSTALL_DIR).join(name);
    fs::create_dir_all(&dest)?;

    tracing::debug!(package = name, url, dest = %dest.display(), "installing");

    let bytes = download_tarball(client, url, MAX_TARBALL_SIZE).await?;
    extract_tarball(&bytes, &dest)
}

/// Install every resolved package, strictly one at a time: the whole
/// top-level set first, then each nested conflict under its parent
/// chain. Sequential on purpose, so the progress count stays meaningful
/// and overlapping directories are never written concurrently.
pub async fn install_all(
    client: &Client,
    project_root: &Path,
    resolution: &Resolution,
    reporter: &dyn Reporter,
) -> Result<(), PmError> {
    reporter.start_install(resolution.count());

    for (name, pkg) in &resolution.top_level {
        install(client, project_root, name, &pkg.url, "").await?;
        reporter.tick_install();
    }

    for pkg in &resolution.unsatisfied {
        let nested_path = if pkg.parent.is_empty() {
            String::new()
        } else {
            format!("{INSTALL_DIR}/{}", pkg.parent)
        };
        install(client, project_root, &pkg.name, &pkg.url, &nested_path).await?;
        reporter.tick_install();
    }

    Ok(())
}

/// Download a tarball from a URL, capped at `max_bytes`.
pub async fn download_tarball(client: &Client, url: &str, max_bytes: u64) -> Result<Bytes, PmError> {
    let response = client
        .get(url)
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| PmError::download(format!("Failed to download '{url}': {e}")))?;

    if !response.status().is_success() {
        return Err(PmError::download(format!(
            "Download failed with status {} for '{url}'",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(PmError::download(format!(
                "Tarball too large: {len} bytes (max: {max_bytes})"
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PmError::download(format!("Failed to read response body: {e}")))?;

    if bytes.len() as u64 > max_bytes {
        return Err(PmError::download(format!(
            "Tarball too large: {} bytes (max: {max_bytes})",
            bytes.len()
        )));
    }

    Ok(bytes)
}

/// Extract a gzipped tarball into `dest`, stripping each entry's first
/// path component (the registry's single wrapper directory).
pub fn extract_tarball(bytes: &[u8], dest: &Path) -> Result<(), PmError> {
    let gz = GzDecoder::new(bytes);
    let mut archive = Archive::new(gz);

    for entry in archive
        .entries()
        .map_err(|e| PmError::extract(format!("Failed to read tarball entries: {e}")))?
    {
        let mut entry =
            entry.map_err(|e| PmError::extract(format!("Failed to read tarball entry: {e}")))?;

        let path = entry
            .path()
            .map_err(|e| PmError::extract(format!("Failed to read entry path: {e}")))?;
        let path_str = path.to_string_lossy().into_owned();

        if path.is_absolute() {
            return Err(PmError::extract(format!(
                "Tarball contains absolute path: {path_str}"
            )));
        }

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PmError::extract(format!(
                "Tarball contains path traversal: {path_str}"
            )));
        }

        // Strip the wrapper directory; the wrapper entry itself has
        // nothing left and is skipped.
        let stripped: PathBuf = path.components().skip(1).collect();
        if stripped.as_os_str().is_empty() {
            continue;
        }

        let dest_path = dest.join(&stripped);
        if !dest_path.starts_with(dest) {
            return Err(PmError::extract(format!(
                "Tarball entry escapes destination: {path_str}"
            )));
        }

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry.header().entry_type().is_file() {
            let mut file = File::create(&dest_path)?;
            io::copy(&mut entry, &mut file)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    let perms = fs::Permissions::from_mode(mode);
                    let _ = fs::set_permissions(&dest_path, perms);
                }
            }
        }
        // Symlinks and other special entries are skipped
    }

    Ok(())
}
