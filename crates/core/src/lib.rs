//! Per-instance method call profiling: live call-stack tracking, raw trace
//! persistence, multi-process merge, and layout-safe view transforms.
//!
//! ```text
//!   host events ──▶ Session ──▶ finalize ──▶ raw trace file (one per process)
//!                                                    │
//!                              process_profiles ◀────┘ (one or more files)
//!                                    │
//!                 ┌──────────────────┼──────────────────┐
//!            totals table      JSON node array     partition layout ──▶ SVG
//! ```

pub mod matcher;
pub mod merge;
pub mod raw;
pub mod report;
pub mod resolver;
pub mod session;
pub mod svg;
pub mod viz;

pub use matcher::{CallMatcher, MatchRule, MatchSet, TraceAll};
pub use merge::{MergedProfile, process_profiles};
pub use resolver::{NameResolver, QualifiedName, TableResolver};
pub use session::{CallSite, Session};
