//! Process-wide try-locks keyed by name
//!
//! Spooler workers race for spool files by name. The loser of a race never
//! waits; it moves on to the next file.

use std::collections::HashSet;
use std::sync::Mutex;

/// Registry of currently held names
#[derive(Debug, Default)]
pub struct NamedLock {
    held: Mutex<HashSet<String>>,
}

impl NamedLock {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` without blocking
    ///
    /// Returns `None` if another holder owns it. The claim is released when
    /// the returned guard is dropped, including during unwinding.
    pub fn try_lock(&self, name: &str) -> Option<NamedLockGuard<'_>> {
        let inserted = self
            .held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string());

        inserted.then(|| NamedLockGuard {
            registry: self,
            name: name.to_string(),
        })
    }

    /// True if `name` is currently claimed
    pub fn is_locked(&self, name: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
    }

    fn release(&self, name: &str) {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }
}

/// Releases its name on drop
#[derive(Debug)]
#[must_use = "the name is released as soon as the guard is dropped"]
pub struct NamedLockGuard<'a> {
    registry: &'a NamedLock,
    name: String,
}

impl NamedLockGuard<'_> {
    /// The claimed name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NamedLockGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.name);
    }
}
