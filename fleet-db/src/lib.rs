//! Storage layer for the fleet control plane.
//!
//! Built on `sqlx` over SQLite. The crate is split the same way the
//! domain is: `entities` are the row shapes, `repos` are inline-SQL
//! query modules usable both on the pool and inside transactions, and
//! `services` carry the domain logic (configuration lifecycle, sync
//! protocol, fleet registry, auth, audit, janitor).

pub mod entities;
pub mod error;
pub mod repos;
pub mod schema;
pub mod services;
pub mod store;

pub use schema::init_schema;
pub use store::{connect, connect_memory};
