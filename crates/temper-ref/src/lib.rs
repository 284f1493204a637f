//! # temper-ref
//!
//! Reference runtime for TEMPER. Five scenarios run the real components
//! against scripted agents:
//!
//! 1. **Spec refinement**: an incomplete draft is rejected by the gate and
//!    completed from its feedback.
//! 2. **Feature routing**: a multi-domain task is decomposed into waves
//!    that respect the API contract dependency.
//! 3. **Debug and repair**: a syntax error is routed to the auto-debug
//!    loop and fixed within the same round.
//! 4. **Context lookup**: semantic retrieval over project history, with
//!    the keyword fallback when embeddings are unavailable.
//! 5. **Finalization approval**: an irreversible write waits for an
//!    explicit grant.
//!
//! All data is hardcoded and fictional. No external services are called.

pub mod agents;
pub mod mock_data;
pub mod scenarios;
