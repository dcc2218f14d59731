//! Database layer for agenda

mod connection;
mod conflict_repository;
mod item_repository;
mod migrations;

pub use connection::Database;
pub use conflict_repository::{ConflictLedger, SqliteConflictLedger};
pub use item_repository::{ItemRepository, SqliteItemRepository, SyncStatusCounts};
