//! Connection registry for admission control and drain supervision.
//!
//! Two process-wide counters: `active` (sessions currently holding a slot) and
//! `total` (sessions ever admitted). They are the only state shared by all
//! sessions and are mutated exclusively with atomic operations.
//!
//! Admission hands out a [`ConnectionGuard`]. The guard gives its slot back
//! exactly once, either through [`ConnectionGuard::release`] or on drop, so a
//! session that is closed twice, or abandoned at force-stop, can never
//! double-decrement the count.

use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistrySnapshot {
    /// Sessions currently admitted
    pub active: usize,
    /// Sessions admitted since the registry was created
    pub total: u64,
}

/// Admission refused because the registry is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDenied {
    /// Active count observed at the refusal
    pub active: usize,
    /// Limit that was enforced
    pub limit: usize,
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    total: AtomicU64,
}

/// Shared active/total connection counters.
///
/// Clones share the same counters. Construct a fresh registry per server (or
/// per test); there is no global instance.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    counters: Arc<Counters>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a slot if fewer than `limit` sessions are active.
    ///
    /// The check and the increment are a single compare-and-swap, so
    /// concurrent callers can never push `active` past `limit`. Rejections do
    /// not count towards `total`.
    pub fn try_admit(&self, limit: usize) -> Result<ConnectionGuard, AdmissionDenied> {
        self.counters
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < limit).then_some(active + 1)
            })
            .map_err(|active| AdmissionDenied { active, limit })?;

        self.counters.total.fetch_add(1, Ordering::AcqRel);
        Ok(ConnectionGuard { counters: Arc::clone(&self.counters), released: false })
    }

    /// Sessions currently admitted.
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::Acquire)
    }

    /// Sessions admitted since creation.
    pub fn total(&self) -> u64 {
        self.counters.total.load(Ordering::Acquire)
    }

    /// Both counters.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot { active: self.active(), total: self.total() }
    }
}

/// One admitted slot in a [`ConnectionRegistry`].
#[derive(Debug)]
pub struct ConnectionGuard {
    counters: Arc<Counters>,
    released: bool,
}

impl ConnectionGuard {
    /// Give the slot back.
    ///
    /// Returns the counters after the decrement, or `None` if the slot was
    /// already released.
    pub fn release(&mut self) -> Option<RegistrySnapshot> {
        if self.released {
            return None;
        }
        self.released = true;

        let before = self.counters.active.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(before > 0, "active count underflow");

        Some(RegistrySnapshot {
            active: before - 1,
            total: self.counters.total.load(Ordering::Acquire),
        })
    }

    /// Whether the slot has been given back.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.release();
    }
}
