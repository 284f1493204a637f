//! End-to-end scenarios.
//!
//! Each scenario wires real TEMPER components (gate, router, dispatcher,
//! debug loop, retriever, audit log) to scripted agents and fixed data,
//! and exercises one part of the pipeline.

pub mod approval;
pub mod context_lookup;
pub mod debug_repair;
pub mod feature_routing;
pub mod spec_refinement;
