//! # temper-router
//!
//! Routing for TEMPER: which agents handle a task, in what order, and how
//! to recover when a round falls short.
//!
//! - `Router::route` selects agents from a TOML routing table and picks a
//!   sequential, parallel, or dag execution strategy from capability
//!   dependencies.
//! - `Router::select_strategy` (also the `StrategySelector` impl) picks the
//!   refinement strategy for a failed round.
//! - `Dispatcher` runs a routing decision in waves on a rayon pool.
//! - `RoutedProducer` ties the two together as a refinement-loop
//!   `Producer`.
//!
//! ## Routing table
//!
//! ```toml
//! [[routes]]
//! agent = "backend-agent"
//! domain = "backend"
//! keywords = ["api", "endpoint"]
//! provides = ["api:contract"]
//!
//! [[routes]]
//! agent = "frontend-agent"
//! domain = "frontend"
//! requires = ["api:contract"]
//! ```

pub mod dispatch;
pub mod engine;
pub mod producer;
pub mod strategy;
pub mod table;

pub use dispatch::{AgentRegistry, Dispatcher};
pub use engine::Router;
pub use producer::RoutedProducer;
pub use strategy::select_strategy;
