//! Inbound email triage pipeline.
//!
//! `orchestrator` drives a run end to end; `filter` drops messages that
//! should never reach the model; `policy` turns an analysis into an
//! action decision; `executor` performs the side effects.

pub mod executor;
pub mod filter;
pub mod orchestrator;
pub mod policy;
pub mod types;

pub use orchestrator::TriagePipeline;
pub use types::{RunResults, RunSummary};
