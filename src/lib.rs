//! Agent execution substrate: a configurable, resilient, observable
//! dispatch layer for a population of heterogeneous AI-backed worker
//! agents. See `DESIGN.md` for the grounding ledger behind each module.

pub mod agents;
pub mod config;
pub mod error;
pub mod external;
pub mod meter;
pub mod observability;
pub mod providers;
pub mod resilience;
pub mod substrate;

pub use agents::{Agent, AgentKind, AgentResult, AgentTask};
pub use error::{AgentError, ErrorKind, Result};
pub use substrate::Substrate;
