//! Scan Analysis Pipeline
//!
//! ```text
//! RECEIVED -> VALIDATED -> CLASSIFIED -> (TRIAGED || RENDERED)
//!                                     -> ASSEMBLED -> PERSISTED -> DONE
//!                                                              \-> FAILED(reason)
//! ```
//!
//! The orchestrator owns the state machine. Guarantees it enforces:
//! - replayed content (same hash) returns the stored result without
//!   re-invoking the classifier
//! - a classification timeout is retried exactly once, then the scan fails
//! - rendering failures degrade the result (no heatmap), never fail it
//! - artifact persistence retries asynchronously and never blocks a
//!   response once the result is computed
//! - the caller disconnecting does not cancel an admitted analysis

mod orchestrator;

pub use orchestrator::{Orchestrator, PipelineStats, StatsSnapshot};
