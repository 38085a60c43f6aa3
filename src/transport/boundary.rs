//! Partition identity.
//!
//! Every thread gets its own boundary the first time it asks for one. A
//! group of threads can share a boundary by entering it explicitly, which
//! is how a worker pool looks like a single subscriber set.

use std::{
    cell::Cell,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_BOUNDARY: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Cell<Option<BoundaryId>> = const { Cell::new(None) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundaryId(u64);

#[allow(clippy::new_without_default)]
impl BoundaryId {
    /// Allocates a boundary no thread belongs to yet.
    pub fn new() -> Self {
        Self(NEXT_BOUNDARY.fetch_add(1, Ordering::Relaxed))
    }

    /// Boundary of the calling thread, allocated on first use.
    pub fn current() -> Self {
        CURRENT.with(|cell| match cell.get() {
            Some(id) => id,
            None => {
                let id = Self::new();
                cell.set(Some(id));
                id
            }
        })
    }

    /// Makes `self` the calling thread's boundary until the guard drops.
    pub fn enter(self) -> BoundaryGuard {
        let previous = CURRENT.with(|cell| cell.replace(Some(self)));
        BoundaryGuard { previous }
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BoundaryId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "boundary-{}", self.0)
    }
}

/// Restores the previous boundary of the thread on drop.
#[must_use = "the boundary is left as soon as the guard is dropped"]
pub struct BoundaryGuard {
    previous: Option<BoundaryId>,
}

impl Drop for BoundaryGuard {
    fn drop(&mut self) {
        CURRENT.with(|cell| cell.set(self.previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_stable_per_thread() {
        let a = BoundaryId::current();
        let b = BoundaryId::current();
        assert_eq!(a, b);

        let other = std::thread::spawn(BoundaryId::current).join().unwrap();
        assert_ne!(a, other);
    }

    /// Threads inside one boundary share its id and get their own back on exit.
    #[test]
    fn test_enter_shares_boundary_across_threads() {
        let shared = BoundaryId::new();
        let own = BoundaryId::current();
        {
            let _guard = shared.enter();
            assert_eq!(BoundaryId::current(), shared);
            let seen = std::thread::spawn(move || {
                let _guard = shared.enter();
                BoundaryId::current()
            })
            .join()
            .unwrap();
            assert_eq!(seen, shared);
        }
        assert_eq!(BoundaryId::current(), own);
    }

    #[test]
    fn test_nested_enter_restores_in_order() {
        let outer = BoundaryId::new();
        let inner = BoundaryId::new();
        let _a = outer.enter();
        {
            let _b = inner.enter();
            assert_eq!(BoundaryId::current(), inner);
        }
        assert_eq!(BoundaryId::current(), outer);
    }
}
