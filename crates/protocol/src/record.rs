use serde::{Deserialize, Serialize};

/// One line of a raw trace file: a path-keyed aggregate of every return
/// recorded at that call path within a single process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Call path key (display form once finalized).
    pub path: String,
    /// Number of returns recorded at this path.
    pub count: u64,
    /// Inclusive elapsed seconds accumulated at this path.
    pub time: f64,
}

impl RawRecord {
    pub fn new(path: impl Into<String>, count: u64, time: f64) -> Self {
        Self {
            path: path.into(),
            count,
            time,
        }
    }
}
