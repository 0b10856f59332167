#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod error;
pub mod install;
pub mod lock;
pub mod manifest;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod version;

pub use error::PmError;
pub use install::{install, install_all, MAX_TARBALL_SIZE};
pub use lock::{LockEntry, LockStore, LOCKFILE_NAME};
pub use manifest::{find_project_root, RootManifest, MANIFEST_NAME};
pub use registry::{Dist, PackageManifest, RegistryClient, VersionMeta, DEFAULT_REGISTRY, REGISTRY_ENV};
pub use report::{NullReporter, Reporter};
pub use resolve::{Resolution, Resolver, TopLevelPackage, UnsatisfiedPackage};
pub use version::{max_satisfying, satisfies};
