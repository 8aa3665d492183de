//! Persistence module for population history.
//!
//! Keeps one JSON document in memory and flushes it through a pluggable backend.

mod file;
mod models;
mod store;

pub use file::*;
pub use models::*;
pub use store::*;
