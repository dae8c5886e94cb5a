//! Storage services built on top of the repository layer.
//!
//! # Responsibility
//! - Expose the storage facade consumed by the distribution service.
//! - Keep SQLite and filesystem details out of caller code.

pub mod health;
pub mod storage;
