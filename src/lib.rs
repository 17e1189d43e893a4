//! db-gate - A read-only SQL execution gateway for LLM agents.
//!
//! Agent-generated SQL passes through a lexical gate (normalize, classify,
//! enforce, bound) before it reaches a pooled connection. Results come back
//! as column-labeled rows; every failure comes back as a value.

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod safety;

pub use gateway::{CandidateStatement, ErrorKind, ExecutionError, ExecutionOutcome, SqlGateway};
