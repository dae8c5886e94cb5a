//! Backing-store contracts and their local implementations.
//!
//! # Responsibility
//! - Define the document store and blob store seams the facade depends on.
//! - Isolate SQLite and filesystem details from authorization logic.
//!
//! # Invariants
//! - Stores report failures as `BackendError`; translation into the storage
//!   taxonomy happens in the facade.
//! - Stores know nothing about ownership or visibility.

pub mod blob_store;
pub mod entity_store;
