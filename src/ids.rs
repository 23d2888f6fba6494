//! Identifier types for continuations.
//!
//! Ids are lightweight Copy newtypes. Unlike global VM counters, continuation ids are
//! handed out by the owning scheduler's table so two schedulers never share a sequence.

use std::fmt;

/// Unique identifier for a continuation within one scheduler.
///
/// `ContinuationId::MAIN` (0) names the continuation that runs the main entry; spawned
/// continuations are numbered from 1 upward and ids are never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ContinuationId(pub u64);

impl ContinuationId {
    /// The implicit main continuation.
    pub const MAIN: ContinuationId = ContinuationId(0);

    /// First id handed out by `spawn`.
    pub const FIRST_SPAWNED: ContinuationId = ContinuationId(1);

    pub fn from_raw(value: u64) -> Self {
        ContinuationId(value)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn is_main(&self) -> bool {
        *self == Self::MAIN
    }

    pub(crate) fn next(&self) -> Self {
        ContinuationId(self.0 + 1)
    }
}

impl fmt::Display for ContinuationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
