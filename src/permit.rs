//! Scoped exclusion flags
//!
//! An [`ExclusionFlag`] is held through a [`FlagGuard`]; dropping the guard
//! releases the flag on every exit path, including `?` returns and panics
//! unwinding through the holder.

use std::sync::atomic::{AtomicBool, Ordering};

/// Non-blocking, non-queueing exclusion flag
#[derive(Debug, Default)]
pub struct ExclusionFlag(AtomicBool);

impl ExclusionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the flag, or `None` if it is already held
    pub fn try_acquire(&self) -> Option<FlagGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlagGuard(&self.0))
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases its flag when dropped
#[derive(Debug)]
pub struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
