use serde::{Deserialize, Serialize};

use crate::path;

/// One entry in the aggregated call tree, keyed by its full call path.
///
/// This is the interchange representation consumed by the visualization
/// front end: the node set serializes as a JSON array and must round-trip
/// losslessly. Percentages use `None` as the "undefined" sentinel for
/// zero-denominator cases (serialized as `null`), never a NaN and never a
/// silently wrong zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfNode {
    /// Full display path from the profiling root.
    pub name: String,
    /// Trailing path segment (the function this node represents).
    pub short_name: String,
    /// Inclusive elapsed seconds accumulated directly at this exact path.
    pub time: f64,
    /// Number of returns recorded at this path.
    pub count: u64,
    /// Inclusive time summed across every tree node sharing this trailing
    /// segment, regardless of ancestry.
    pub tot_time: f64,
    /// Call count summed across every tree node sharing this trailing
    /// segment.
    pub tot_count: u64,
    /// `time / root.time`.
    pub pct_total: Option<f64>,
    /// `tot_time / root.time`.
    pub tot_pct_total: Option<f64>,
    /// `time / parent.time`.
    pub pct_parent: Option<f64>,
    /// Sum of direct children's inclusive time. Transient bookkeeping for
    /// the exclusive-self transform; excluded from the interchange format.
    #[serde(skip)]
    pub child_time: f64,
}

impl ProfNode {
    /// A zeroed node for the given path key.
    pub fn new(path: impl Into<String>) -> Self {
        let name = path.into();
        let short_name = path::last_segment(&name).to_string();
        Self {
            name,
            short_name,
            time: 0.0,
            count: 0,
            tot_time: 0.0,
            tot_count: 0,
            pct_total: None,
            tot_pct_total: None,
            pct_parent: None,
            child_time: 0.0,
        }
    }

    /// Exclusive (self) time: inclusive time minus time spent in direct
    /// children. Only meaningful after child times have been computed.
    pub fn self_time(&self) -> f64 {
        self.time - self.child_time
    }
}
