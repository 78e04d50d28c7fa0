//! Byte budget shared by transport endpoints

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Default budget of [`MemoryResource::default`]
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024;

struct Budget {
    limit: usize,
    used: AtomicUsize,
}

/// A cloneable handle to a shared byte budget.
///
/// Endpoints charge long-lived state (such as per-subscription buffers) against the
/// budget. Clones share the same budget.
#[derive(Clone)]
pub struct MemoryResource {
    budget: Arc<Budget>,
}

impl MemoryResource {
    /// Create a budget of `limit` bytes
    pub fn new(limit: usize) -> Self {
        Self {
            budget: Arc::new(Budget {
                limit,
                used: AtomicUsize::new(0),
            }),
        }
    }

    /// A budget that never runs out
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Reserve `bytes`; the bytes are returned when the reservation is dropped.
    pub fn reserve(&self, bytes: usize) -> Result<Reservation> {
        let limit = self.budget.limit;
        self.budget
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= limit)
            })
            .map_err(|used| Error::MemoryExhausted {
                requested: bytes,
                available: limit - used,
            })?;
        debug!("Reserved {} bytes ({} in use)", bytes, self.used());
        Ok(Reservation {
            budget: Arc::clone(&self.budget),
            bytes,
        })
    }

    pub fn limit(&self) -> usize {
        self.budget.limit
    }

    pub fn used(&self) -> usize {
        self.budget.used.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.budget.limit - self.used()
    }
}

impl Default for MemoryResource {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT)
    }
}

impl std::fmt::Debug for MemoryResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryResource")
            .field("limit", &self.limit())
            .field("used", &self.used())
            .finish()
    }
}

/// Bytes held against a [`MemoryResource`]
#[derive(Debug)]
pub struct Reservation {
    budget: Arc<Budget>,
    bytes: usize,
}

impl Reservation {
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl std::fmt::Debug for Budget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.used.load(Ordering::Relaxed), self.limit)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.budget.used.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_within_limit() {
        let memory = MemoryResource::new(100);
        let a = memory.reserve(60).unwrap();
        assert_eq!(memory.used(), 60);
        assert_eq!(memory.available(), 40);
        assert_eq!(a.bytes(), 60);

        match memory.reserve(50) {
            Err(Error::MemoryExhausted {
                requested,
                available,
            }) => {
                assert_eq!(requested, 50);
                assert_eq!(available, 40);
            }
            other => panic!("Unexpected result: {:?}", other),
        }
        assert_eq!(memory.used(), 60);
    }

    #[test]
    fn test_release_on_drop() {
        let memory = MemoryResource::new(64);
        let shared = memory.clone();
        {
            let _held = shared.reserve(64).unwrap();
            assert_eq!(memory.available(), 0);
        }
        assert_eq!(memory.available(), 64);
    }

    #[test]
    fn test_unbounded_does_not_overflow() {
        let memory = MemoryResource::unbounded();
        let _a = memory.reserve(usize::MAX - 1).unwrap();
        assert!(memory.reserve(2).is_err());
    }
}
