//! # temper-contracts
//!
//! The agent communication contract and shared data model for the TEMPER
//! refinement core.
//!
//! All crates in the workspace import from here. Apart from the invariant
//! checks the types enforce on themselves, no business logic lives in this
//! crate: only data definitions and error types.

pub mod agent;
pub mod approval;
pub mod capability;
pub mod context;
pub mod debug;
pub mod error;
pub mod record;
pub mod refinement;
pub mod routing;
pub mod verify;
