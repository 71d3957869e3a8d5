//! Fuzz target for ConnectionRegistry
//!
//! Interleave admissions, releases, and guard drops against a model.
//!
//! # Invariants
//!
//! - active never exceeds the limit
//! - active equals the number of unreleased guards
//! - total counts admissions only
//! - release reports a snapshot exactly once per guard

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ncrelay_core::{ConnectionGuard, ConnectionRegistry};

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Admit,
    Release(u8),
    Drop(u8),
}

#[derive(Debug, Arbitrary)]
struct Input {
    limit: u8,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let limit = usize::from(input.limit % 32);
    let registry = ConnectionRegistry::new();
    let mut guards: Vec<ConnectionGuard> = Vec::new();
    let mut open = 0usize;
    let mut admitted = 0u64;

    for op in input.ops {
        match op {
            Op::Admit => match registry.try_admit(limit) {
                Ok(guard) => {
                    assert!(open < limit);
                    open += 1;
                    admitted += 1;
                    guards.push(guard);
                },
                Err(denied) => {
                    assert_eq!(open, limit);
                    assert_eq!(denied.limit, limit);
                },
            },
            Op::Release(i) if !guards.is_empty() => {
                let index = usize::from(i) % guards.len();
                let guard = &mut guards[index];
                let was_released = guard.is_released();
                let snapshot = guard.release();
                assert_eq!(snapshot.is_some(), !was_released);
                assert!(guard.release().is_none());
                if !was_released {
                    open -= 1;
                    if let Some(snapshot) = snapshot {
                        assert_eq!(snapshot.active, open);
                    }
                }
            },
            Op::Drop(i) if !guards.is_empty() => {
                let index = usize::from(i) % guards.len();
                let guard = guards.swap_remove(index);
                if !guard.is_released() {
                    open -= 1;
                }
                drop(guard);
            },
            _ => {},
        }

        assert!(registry.active() <= limit);
        assert_eq!(registry.active(), open);
        assert_eq!(registry.total(), admitted);
    }
});
