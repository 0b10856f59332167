//! `tinypm install` command implementation.

use crate::progress::ConsoleReporter;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tinypm_core::{
    find_project_root, install_all, LockStore, RegistryClient, Reporter, Resolver, RootManifest,
    LOCKFILE_NAME, MANIFEST_NAME,
};

/// Install command action.
#[derive(Debug, Clone)]
pub struct InstallAction {
    pub cwd: PathBuf,
    pub packages: Vec<String>,
    pub production: bool,
    pub save_dev: bool,
}

pub async fn run(action: InstallAction) -> Result<()> {
    let root = find_project_root(&action.cwd).into_diagnostic()?;
    let manifest_path = root.join(MANIFEST_NAME);
    let lock_path = root.join(LOCKFILE_NAME);

    let mut manifest = RootManifest::load(&manifest_path).into_diagnostic()?;
    for name in &action.packages {
        manifest.add_package(name, action.save_dev);
    }
    // --production is a resolution-time view: hold the dev map aside and
    // put it back before the manifest is written.
    let stripped_dev = if action.production {
        manifest.strip_dev()
    } else {
        None
    };

    let registry = RegistryClient::from_env().into_diagnostic()?;
    let lock = LockStore::load(&lock_path).into_diagnostic()?;
    let reporter: Arc<dyn Reporter> = Arc::new(ConsoleReporter::new());
    let resolver = Resolver::new(registry, lock, Arc::clone(&reporter));

    tracing::info!(root = %root.display(), "resolving dependencies");
    let resolution = resolver
        .resolve_project(
            manifest.dependencies.as_mut(),
            manifest.dev_dependencies.as_mut(),
        )
        .await
        .into_diagnostic()?;

    install_all(
        resolver.registry().http(),
        &root,
        &resolution,
        reporter.as_ref(),
    )
    .await
    .into_diagnostic()?;

    // Persist state only after every package landed on disk.
    resolver.lock_store().flush(&lock_path).into_diagnostic()?;
    if stripped_dev.is_some() {
        manifest.dev_dependencies = stripped_dev;
    }
    if !action.packages.is_empty() {
        manifest.save(&manifest_path).into_diagnostic()?;
    }

    println!("Installed {} packages", resolution.count());
    Ok(())
}
