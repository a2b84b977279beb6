//! Core data types for the nupak restore engine.
//!
//! This crate defines the fundamental types the restore pipeline shares:
//! package versions, version ranges with floating behaviors, library kinds
//! and identities, and dependency keys.
//!
//! This crate is intentionally free of async code and I/O.

pub mod library;
pub mod range;
pub mod version;
