//! DarkWatch Store
//!
//! Persistence for targets, snapshots, entities and link relationships,
//! plus the correlation graph builder that reads them back.

pub mod store;
pub mod sqlite;
pub mod graph;

pub use store::*;
pub use sqlite::*;
pub use graph::*;
