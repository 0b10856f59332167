//! Console progress output for the two install phases.

use std::sync::atomic::{AtomicUsize, Ordering};
use tinypm_core::Reporter;

/// Prints `[1/2] Resolving: <name>` per resolution and
/// `[2/2] Installing [n/total]` per installed package, npm style.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    total: AtomicUsize,
    done: AtomicUsize,
}

impl ConsoleReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reporter for ConsoleReporter {
    fn resolving(&self, name: &str) {
        println!("[1/2] Resolving: {name}");
    }

    fn start_install(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.done.store(0, Ordering::SeqCst);
    }

    fn tick_install(&self) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        println!("[2/2] Installing [{done}/{total}]");
    }
}
