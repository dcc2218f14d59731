//! Data models for agenda

mod conflict;
mod item;

pub use conflict::{
    Conflict, ConflictDraft, ConflictFilter, ConflictId, ConflictSource, ConflictStatus,
    Resolution, FIELD_EXISTENCE, FIELD_TIME,
};
pub use item::{Item, ItemId, ItemStatus, NewItem, SyncStatus};
