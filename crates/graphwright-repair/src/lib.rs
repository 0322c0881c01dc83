//! Fix, validate and patch producer-generated workflow graphs.
//!
//! The deterministic pieces live in `graphwright-core`; this crate adds the
//! producer seam and the bounded repair loop around it.

pub mod config;
mod orchestrator;
mod producer;
mod request;

pub use config::RepairConfig;
pub use orchestrator::*;
pub use producer::*;
pub use request::{
    GraphSummary, NodeSummary, PatchRequest, RequestKind, fix_instruction, with_patch_feedback,
    with_validation_feedback,
};
