//! Environment abstraction for deterministic testing.
//!
//! Decouples drain supervision from the system clock. Production uses the
//! runtime clock; tests substitute paused or virtual time so that shutdown
//! deadlines can be asserted exactly.

use std::{ops::Add, time::Duration};

/// Abstract environment providing time and async sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `sleep(d)` resolves no earlier than `now() + d`
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production uses `tokio::time::Instant` so that a paused test runtime
    /// controls it; pure unit tests can use `std::time::Instant`.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + std::fmt::Debug
        + std::ops::Sub<Output = Duration>
        + Add<Duration, Output = Self::Instant>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the only suspension point of the shutdown supervisor.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}
