//! Validity time ranges.

use serde::{Deserialize, Serialize};

/// A validity time range with nullable nanosecond bounds.
///
/// Encoded in snapshot files as two nullable integer columns rather than one
/// opaque blob; a `None` bound is unbounded. Bounds stay raw nanoseconds
/// since the epoch end to end; no wall-clock conversion happens in the
/// pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timespan {
    /// Inclusive begin bound, nanoseconds since the epoch.
    pub begin_nsec: Option<i64>,
    /// Exclusive end bound, nanoseconds since the epoch.
    pub end_nsec: Option<i64>,
}

impl Timespan {
    /// New timespan from raw nanosecond bounds.
    #[must_use]
    pub const fn new(begin_nsec: Option<i64>, end_nsec: Option<i64>) -> Self {
        Self {
            begin_nsec,
            end_nsec,
        }
    }
}
