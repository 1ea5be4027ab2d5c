//! Core domain layer for the proxy fleet control plane.
//!
//! Holds the domain types shared by the storage, API and agent crates,
//! the rule validation applied on every configuration write, and the
//! pure compiler that turns a rule set into the three Traffic Server
//! artifacts plus their fingerprint.
//!
//! This crate performs no I/O: the compiler and validators are plain
//! functions over values, which is what allows the storage layer to
//! call them inside a transaction.

pub mod compile;
pub mod error;
pub mod types;
pub mod validate;

pub use error::{Error, Result};
