//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, state machines, errors)
//! - `intake` - Client intake workflow, extraction, escalation and prompt assembly

pub mod foundation;
pub mod intake;
