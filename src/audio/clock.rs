//! Process-monotonic timestamps for diagnostics.
//!
//! The epoch is the first call. [`build_stream`](super::controller::build_stream)
//! touches the clock on the control thread so the audio callback only ever
//! reads an already-initialized epoch.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds since the process-local epoch.
#[inline]
pub fn now_micros() -> u64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_micros() as u64
}

/// Microseconds elapsed since `earlier` (a value from [`now_micros`]).
#[inline]
pub fn micros_since(earlier: u64) -> u64 {
    now_micros().saturating_sub(earlier)
}
