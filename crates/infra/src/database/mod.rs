//! Database implementations

pub mod manager;
pub mod pending_write_repository;
pub mod pool;

pub use manager::*;
pub use pending_write_repository::*;
pub use pool::*;
