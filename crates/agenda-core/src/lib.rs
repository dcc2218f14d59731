//! agenda-core - Core library for agenda
//!
//! This crate contains the item and conflict models, the `SQLite` store, the
//! remote provider interface, and the reconciliation engine that mirrors
//! scheduled items into an external calendar exactly once.

pub mod config;
pub mod db;
pub mod digest;
pub mod error;
pub mod models;
pub mod remote;
pub mod sync;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use models::{Conflict, ConflictId, Item, ItemId};
