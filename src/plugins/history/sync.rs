//! Best-effort synchronization of the active session with the history store.
//!
//! Failures never reach the chat flow: they are logged, surfaced as a
//! transient notice, and reported to the caller as [`SyncOutcome::Failed`].

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::services::backend::{Backend, ClientError, HistoryRecord, Message};
use crate::services::events::{ClientEvent, EventSink};

use super::title::DEFAULT_TITLE;
use super::types::{HistoryEntry, list_items};

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Saved,
    Refreshed,
    Deleted,
    /// Preconditions not met; nothing was sent.
    Skipped,
    Failed(ClientError),
}

impl SyncOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

pub struct HistorySync<B, S> {
    backend: Arc<B>,
    sink: Arc<S>,
    /// Last list fetched successfully; kept as-is when a refresh fails.
    entries: ArcSwap<Vec<HistoryEntry>>,
}

impl<B: Backend, S: EventSink> HistorySync<B, S> {
    pub fn new(backend: Arc<B>, sink: Arc<S>) -> Self {
        Self {
            backend,
            sink,
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn entries(&self) -> Arc<Vec<HistoryEntry>> {
        self.entries.load_full()
    }

    fn notify_failure(&self, what: &str, err: &ClientError) {
        log::warn!("History {} failed: {}", what, err);
        self.sink.emit(ClientEvent::Notice {
            message: format!("Could not {} history: {}", what, err.message()),
        });
    }

    /// Upsert a session. Skipped without an id or without messages.
    pub async fn save(
        &self,
        id: Option<&str>,
        title: Option<&str>,
        messages: &[Message],
    ) -> SyncOutcome {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return SyncOutcome::Skipped;
        };
        if messages.is_empty() {
            return SyncOutcome::Skipped;
        }

        let record = HistoryRecord {
            id: id.to_string(),
            title: title.unwrap_or(DEFAULT_TITLE).to_string(),
            messages: messages.to_vec(),
        };
        match self.backend.save_history(&record).await {
            Ok(()) => {
                log::debug!("Saved session {} ({} messages)", id, record.messages.len());
                SyncOutcome::Saved
            }
            Err(err) => {
                self.notify_failure("save", &err);
                SyncOutcome::Failed(err)
            }
        }
    }

    /// Fetch the list and re-render it with the active session highlighted.
    ///
    /// `active_id` is read once the list has arrived, so a session switch
    /// during the fetch is reflected in the rendered list.
    pub async fn refresh_list<F>(&self, active_id: F) -> SyncOutcome
    where
        F: FnOnce() -> Option<String>,
    {
        match self.backend.list_history().await {
            Ok(entries) => {
                let items = list_items(&entries, active_id().as_deref());
                self.entries.store(Arc::new(entries));
                self.sink.emit(ClientEvent::HistoryList { items });
                SyncOutcome::Refreshed
            }
            Err(err) => {
                self.notify_failure("refresh", &err);
                SyncOutcome::Failed(err)
            }
        }
    }

    /// Delete on the server only; the cached list changes on the next refresh.
    pub async fn delete_entry(&self, id: &str) -> SyncOutcome {
        match self.backend.delete_history(id).await {
            Ok(()) => {
                log::info!("Deleted session {}", id);
                SyncOutcome::Deleted
            }
            Err(err) => {
                self.notify_failure("delete", &err);
                SyncOutcome::Failed(err)
            }
        }
    }

    pub async fn load(&self, id: &str) -> Result<HistoryEntry, ClientError> {
        self.backend.get_history(id).await.inspect_err(|err| {
            self.notify_failure("load", err);
        })
    }
}
