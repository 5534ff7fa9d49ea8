//! HTTP contract with the InfoSage backend.
//!
//! Notes:
//! - [`Backend`] is the seam the session controller, status poller and history
//!   synchronizer are written against; [`HttpBackend`] is the reqwest client.
//! - Futures are `Send` so controller work can run on spawned tasks.

mod client;
mod error;
#[cfg(test)]
pub(crate) mod mock;
mod retry_policy;
mod types;

use std::future::Future;

use crate::plugins::history::HistoryEntry;

pub use client::HttpBackend;
pub use error::ClientError;
pub use types::{
    ChatRequest, ChatResponse, HistoryRecord, Message, Role, SourceKind, SourceTag,
    StatusResponse, normalize_source, split_source,
};

pub trait Backend: Send + Sync + 'static {
    /// `GET /api/model/status`
    fn model_status(&self) -> impl Future<Output = Result<StatusResponse, ClientError>> + Send;

    /// `POST /api/model/start`. Only transport failures are reported.
    fn start_model(&self) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// `POST /api/model/stop`. Only transport failures are reported.
    fn stop_model(&self) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// `POST /api/chat`
    fn chat(&self, message: &str) -> impl Future<Output = Result<ChatResponse, ClientError>> + Send;

    /// `GET /api/history`
    fn list_history(&self) -> impl Future<Output = Result<Vec<HistoryEntry>, ClientError>> + Send;

    /// `GET /api/history/{id}`
    fn get_history(&self, id: &str) -> impl Future<Output = Result<HistoryEntry, ClientError>> + Send;

    /// `POST /api/history`
    fn save_history(
        &self,
        record: &HistoryRecord,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// `DELETE /api/history/{id}`
    fn delete_history(&self, id: &str) -> impl Future<Output = Result<(), ClientError>> + Send;
}
