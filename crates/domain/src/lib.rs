//! # FieldSync Domain
//!
//! Business domain types for the offline write queue.
//!
//! This crate contains:
//! - The persisted pending-write record and its patch/filter types
//! - Conflict and notification contracts
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other FieldSync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
