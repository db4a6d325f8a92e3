//! Application layer - runs intake turns on top of the domain rules and the ports.
//!
//! - `orchestrator` - per-message pipeline plus the document and admin operations
//! - `idle_sweeper` - background eviction of idle sessions

mod idle_sweeper;
mod orchestrator;

pub use idle_sweeper::{IdleSweeper, DEFAULT_SWEEP_INTERVAL};
pub use orchestrator::{IntakeError, IntakeOrchestrator, IntakeSettings, RESET_CONFIRMATION};
