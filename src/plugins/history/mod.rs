//! Conversation history kept by the backend's `/api/history` store.
//!
//! The session controller drives it; see `crate::services::session`.

mod sync;
mod title;
mod types;

pub use sync::{HistorySync, SyncOutcome};
pub use title::{DEFAULT_TITLE, MAX_TITLE_CHARS, derive_title, truncate_title};
pub use types::{HistoryEntry, HistoryListItem, list_items};
