//! Intake Orchestrator - conversational client intake for a law office.
//!
//! This crate runs the first contact with a prospective client over a chat
//! transport: it collects identity and counterpart data for a power of
//! attorney, keeps technical legal questions contained until the client is
//! identified, and hands generated documents over for signature.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
