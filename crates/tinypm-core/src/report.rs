//! Progress-reporting seam between the engine and the console.
//!
//! The resolver and installer only ever talk to this trait; the CLI
//! plugs in a console implementation, tests use [`NullReporter`].

/// Receives progress notifications during a run.
pub trait Reporter: Send + Sync {
    /// A package name is being resolved.
    fn resolving(&self, name: &str);

    /// Resolution finished; `total` packages will be installed.
    fn start_install(&self, total: usize);

    /// One package finished installing.
    fn tick_install(&self);
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn resolving(&self, _name: &str) {}
    fn start_install(&self, _total: usize) {}
    fn tick_install(&self) {}
}
