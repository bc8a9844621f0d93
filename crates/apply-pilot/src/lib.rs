//! Autonomous job application pipeline.
//!
//! The crate turns a priority-ordered queue of ranked job listings into
//! submitted (or rejected) applications under policy, grounding, pacing,
//! and mutual-exclusion constraints, recording every decision in an
//! append-only audit trail.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;
