//! Dependency resolution: the recursive walk that turns declared ranges
//! into a flattened install layout.
//!
//! Every package claims the shared top-level `node_modules` slot for its
//! name if it can (first claim wins); a version that conflicts with the
//! claimed one is recorded as "unsatisfied" and later installed nested
//! under the ancestor that forced the conflict. Sibling dependencies are
//! resolved concurrently with a bounded fan-out; each branch carries its
//! own copy of the ancestor stack so cycle checks always see the true
//! path from the root.

use crate::error::PmError;
use crate::lock::{LockEntry, LockStore};
use crate::registry::{PackageManifest, RegistryClient};
use crate::report::Reporter;
use crate::version::{max_satisfying, satisfies};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Maximum concurrently resolving sibling branches per fan-out.
const MAX_CONCURRENT_RESOLVES: usize = 16;

/// Directory name packages are installed into.
pub const INSTALL_DIR: &str = "node_modules";

/// A package that claimed the top-level slot for its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevelPackage {
    pub url: String,
    pub version: String,
}

/// A package whose resolved version conflicts with the top-level claim
/// for its name and must be installed nested under `parent`.
///
/// `parent` is a `/node_modules/`-joined ancestor chain, e.g.
/// `webpack/node_modules/acorn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatisfiedPackage {
    pub name: String,
    pub parent: String,
    pub url: String,
}

/// The two artifacts of a resolution run.
#[derive(Debug, Default)]
pub struct Resolution {
    pub top_level: BTreeMap<String, TopLevelPackage>,
    pub unsatisfied: Vec<UnsatisfiedPackage>,
}

impl Resolution {
    /// Total number of packages to install.
    #[must_use]
    pub fn count(&self) -> usize {
        self.top_level.len() + self.unsatisfied.len()
    }
}

/// One ancestor on the active resolution path.
#[derive(Debug, Clone)]
struct DepFrame {
    name: String,
    version: String,
    dependencies: BTreeMap<String, String>,
}

/// A caret range to write back into the root manifest for a package
/// that was requested without a version.
#[derive(Debug)]
struct SavedRange {
    name: String,
    range: String,
}

#[derive(Debug, Default)]
struct PlacementState {
    top_level: BTreeMap<String, TopLevelPackage>,
    unsatisfied: Vec<UnsatisfiedPackage>,
}

/// The resolution engine. One instance per run.
pub struct Resolver {
    registry: RegistryClient,
    lock: LockStore,
    reporter: Arc<dyn Reporter>,
    state: Mutex<PlacementState>,
}

impl Resolver {
    #[must_use]
    pub fn new(registry: RegistryClient, lock: LockStore, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            registry,
            lock,
            reporter,
            state: Mutex::new(PlacementState::default()),
        }
    }

    /// The lock store, for flushing once install completes.
    #[must_use]
    pub fn lock_store(&self) -> &LockStore {
        &self.lock
    }

    /// The registry client, whose HTTP client the installer reuses.
    #[must_use]
    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    /// Resolve everything the root manifest declares.
    ///
    /// Packages requested without a version get their resolved caret
    /// range written back into the corresponding map. Returns the
    /// flattened top-level set and the nested conflict list.
    pub async fn resolve_project(
        &self,
        dependencies: Option<&mut BTreeMap<String, String>>,
        dev_dependencies: Option<&mut BTreeMap<String, String>>,
    ) -> Result<Resolution, PmError> {
        if let Some(deps) = dependencies {
            self.collect_map(deps).await?;
        }
        if let Some(deps) = dev_dependencies {
            self.collect_map(deps).await?;
        }

        let mut state = self.state.lock().await;
        Ok(Resolution {
            top_level: std::mem::take(&mut state.top_level),
            unsatisfied: std::mem::take(&mut state.unsatisfied),
        })
    }

    /// Resolve one root-level dependency map, fanning out concurrently.
    async fn collect_map(&self, map: &mut BTreeMap<String, String>) -> Result<(), PmError> {
        // Owned pairs, so the collect futures don't borrow the iteration.
        let pairs: Vec<(String, String)> = map
            .iter()
            .map(|(name, range)| (name.clone(), range.clone()))
            .collect();

        let tasks = pairs
            .into_iter()
            .map(|(name, range)| self.collect(name, range, Vec::new()));

        let saved: Vec<Option<SavedRange>> = stream::iter(tasks)
            .buffer_unordered(MAX_CONCURRENT_RESOLVES)
            .try_collect()
            .await?;

        for item in saved.into_iter().flatten() {
            map.insert(item.name, item.range);
        }
        Ok(())
    }

    /// Recursively collect a package and its dependency subtree.
    ///
    /// `stack` is this branch's private copy of the ancestor chain.
    /// Returns a range to write back when `constraint` was empty.
    fn collect<'a>(
        &'a self,
        name: String,
        constraint: String,
        stack: Vec<DepFrame>,
    ) -> BoxFuture<'a, Result<Option<SavedRange>, PmError>> {
        Box::pin(async move {
            // A lock hit (exact name@constraint) short-circuits the registry.
            let manifest: Arc<PackageManifest> = match self.lock.get(&name, &constraint) {
                Some(pinned) => {
                    tracing::debug!(package = %name, constraint = %constraint, "lock hit");
                    Arc::new(pinned)
                }
                None => self.registry.resolve(&name).await?,
            };
            self.reporter.resolving(&name);

            // An empty constraint means "whatever the registry lists last",
            // i.e. the current release; anything else is a semver match.
            let matched = if constraint.is_empty() {
                manifest
                    .keys()
                    .next_back()
                    .cloned()
                    .ok_or_else(|| PmError::version_not_found(&name, "latest"))?
            } else {
                max_satisfying(manifest.keys().map(String::as_str), &constraint)
                    .ok_or_else(|| PmError::version_not_found(&name, &constraint))?
                    .to_string()
            };

            let meta = manifest
                .get(&matched)
                .ok_or_else(|| PmError::version_not_found(&name, &constraint))?;
            let url = meta.dist.tarball.clone();

            // Placement. One mutex guards the whole decision so two
            // branches cannot race a claim for the same name.
            {
                let mut state = self.state.lock().await;

                if let Some(claimed) = state.top_level.get(&name) {
                    // An empty constraint accepts any version, so whatever
                    // claimed the slot satisfies it.
                    if constraint.is_empty() || satisfies(&claimed.version, &constraint) {
                        // The top-level slot works for this constraint, but an
                        // ancestor on this path may pin an incompatible version
                        // of the same name.
                        let Some(index) = first_compatible_ancestor(&name, &matched, &stack)
                        else {
                            // Every ancestor pins an incompatible version:
                            // an unresolvable cyclical requirement. Drop the
                            // branch without installing or recursing.
                            tracing::debug!(
                                package = %name,
                                version = %matched,
                                "cyclical conflict, pruning branch"
                            );
                            return Ok(None);
                        };

                        state.unsatisfied.push(UnsatisfiedPackage {
                            name: name.clone(),
                            parent: nesting_parent(&stack, index),
                            url: url.clone(),
                        });
                    } else {
                        // Straightforward conflict: nest under the immediate
                        // parent.
                        state.unsatisfied.push(UnsatisfiedPackage {
                            name: name.clone(),
                            parent: stack.last().map(|f| f.name.clone()).unwrap_or_default(),
                            url: url.clone(),
                        });
                    }
                } else {
                    state.top_level.insert(
                        name.clone(),
                        TopLevelPackage {
                            url: url.clone(),
                            version: matched.clone(),
                        },
                    );
                }
            }

            // Refresh the new lock generation on every resolution, hit or
            // miss, so the written lock file reflects this run.
            self.lock.put(
                format!("{name}@{constraint}"),
                LockEntry {
                    version: matched.clone(),
                    url,
                    shasum: meta.dist.shasum.clone(),
                    dependencies: meta.dependencies.clone(),
                },
            );

            let dependencies = meta.dependencies.clone();
            if !dependencies.is_empty() {
                let mut stack = stack;
                stack.push(DepFrame {
                    name: name.clone(),
                    version: matched.clone(),
                    dependencies: dependencies.clone(),
                });

                // A dependency already on the stack at a satisfying version
                // would revisit an ancestor; skip it entirely.
                let children: Vec<(String, String)> = dependencies
                    .iter()
                    .filter(|(dep, range)| !closes_cycle(dep, range, &stack))
                    .map(|(dep, range)| (dep.clone(), range.clone()))
                    .collect();

                let tasks = children
                    .into_iter()
                    .map(|(dep, range)| self.collect(dep, range, stack.clone()));

                let mut results = stream::iter(tasks).buffer_unordered(MAX_CONCURRENT_RESOLVES);
                while let Some(result) = results.next().await {
                    result?;
                }
            }

            if constraint.is_empty() {
                // Requested without a version: hand the caller a caret
                // range to write into the manifest.
                return Ok(Some(SavedRange {
                    name,
                    range: format!("^{matched}"),
                }));
            }
            Ok(None)
        })
    }
}

/// Find the first ancestor (root to leaf) that does not conflict with
/// `name` at `version`: it either declares no dependency on `name`, or
/// declares a range `version` satisfies. `None` means every ancestor
/// pins an incompatible version.
fn first_compatible_ancestor(name: &str, version: &str, stack: &[DepFrame]) -> Option<usize> {
    stack.iter().position(|frame| {
        frame
            .dependencies
            .get(name)
            .map_or(true, |range| satisfies(version, range))
    })
}

/// Build the nesting parent path for an unsatisfied package found
/// compatible at ancestor `index`.
///
/// The chain starts two frames above the compatible ancestor (the
/// conflicting ancestor's own parent; the compatible frame and its
/// immediate child are the pair in conflict), saturating at the stack
/// head, and joins frame names with the install directory.
fn nesting_parent(stack: &[DepFrame], index: usize) -> String {
    stack[index.saturating_sub(2)..]
        .iter()
        .map(|frame| frame.name.as_str())
        .collect::<Vec<_>>()
        .join(&format!("/{INSTALL_DIR}/"))
}

/// Whether depending on `name` at `range` from the current path would
/// close a cycle: `name` already appears on the stack at a version that
/// satisfies `range`.
fn closes_cycle(name: &str, range: &str, stack: &[DepFrame]) -> bool {
    stack
        .iter()
        .any(|frame| frame.name == name && satisfies(&frame.version, range))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str, version: &str, deps: &[(&str, &str)]) -> DepFrame {
        DepFrame {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: deps
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_first_compatible_ancestor_ignores_unrelated_frames() {
        let stack = [
            frame("a", "1.0.0", &[("x", "^2.0.0")]),
            frame("b", "1.0.0", &[]),
        ];
        // `a` pins x@^2, but `b` doesn't mention x at all
        assert_eq!(first_compatible_ancestor("x", "1.0.0", &stack), Some(1));
    }

    #[test]
    fn test_first_compatible_ancestor_accepts_satisfying_range() {
        let stack = [
            frame("a", "1.0.0", &[("x", "^1.0.0")]),
            frame("b", "1.0.0", &[("x", "^2.0.0")]),
        ];
        assert_eq!(first_compatible_ancestor("x", "1.2.0", &stack), Some(0));
    }

    #[test]
    fn test_first_compatible_ancestor_none_when_all_conflict() {
        let stack = [
            frame("a", "1.0.0", &[("x", "^2.0.0")]),
            frame("b", "1.0.0", &[("x", "^3.0.0")]),
        ];
        assert_eq!(first_compatible_ancestor("x", "1.0.0", &stack), None);
    }

    #[test]
    fn test_nesting_parent_steps_back_two_frames() {
        let stack = [
            frame("a", "1.0.0", &[]),
            frame("b", "1.0.0", &[]),
            frame("c", "1.0.0", &[]),
            frame("d", "1.0.0", &[]),
        ];
        // Compatible ancestor at index 3: chain starts at index 1
        assert_eq!(
            nesting_parent(&stack, 3),
            "b/node_modules/c/node_modules/d"
        );
    }

    #[test]
    fn test_nesting_parent_saturates_at_stack_head() {
        let stack = [frame("a", "1.0.0", &[]), frame("b", "1.0.0", &[])];
        assert_eq!(nesting_parent(&stack, 0), "a/node_modules/b");
        assert_eq!(nesting_parent(&stack, 1), "a/node_modules/b");
    }

    #[test]
    fn test_nesting_parent_deep_chain() {
        let stack = [
            frame("p1", "1.0.0", &[]),
            frame("p2", "1.0.0", &[]),
            frame("p3", "1.0.0", &[]),
            frame("p4", "1.0.0", &[]),
            frame("p5", "1.0.0", &[]),
        ];
        assert_eq!(
            nesting_parent(&stack, 4),
            "p3/node_modules/p4/node_modules/p5"
        );
        assert_eq!(
            nesting_parent(&stack, 2),
            "p1/node_modules/p2/node_modules/p3/node_modules/p4/node_modules/p5"
        );
    }

    #[test]
    fn test_closes_cycle_requires_satisfying_version() {
        let stack = [frame("a", "1.2.0", &[])];
        assert!(closes_cycle("a", "^1.0.0", &stack));
        // Same name but the stacked version doesn't satisfy the range:
        // not a cycle, the child is a genuinely different version
        assert!(!closes_cycle("a", "^2.0.0", &stack));
        assert!(!closes_cycle("b", "^1.0.0", &stack));
    }
}
