//! # FieldSync App
//!
//! Application layer - commands and wiring for the `fieldsync` binary.
//!
//! This crate contains:
//! - CLI commands (queue inspection, submission, flush, run)
//! - Application context (dependency injection)
//!
//! ## Architecture
//! - Depends on `common`, `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod commands;
pub mod context;
pub mod utils;

// Re-export for convenience
pub use commands::*;
pub use context::*;
