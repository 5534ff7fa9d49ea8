//! Scripted in-memory backend for controller and poller tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::plugins::history::HistoryEntry;

use super::{Backend, ChatResponse, ClientError, HistoryRecord, StatusResponse};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Status,
    Start,
    Stop,
    Chat(String),
    ListHistory,
    GetHistory(String),
    SaveHistory(HistoryRecord),
    DeleteHistory(String),
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    statuses: VecDeque<Result<StatusResponse, ClientError>>,
    fallback_status: Option<Result<StatusResponse, ClientError>>,
    chat_replies: VecDeque<Result<ChatResponse, ClientError>>,
    start_result: Option<ClientError>,
    history: HashMap<String, HistoryEntry>,
    history_order: Vec<String>,
    history_down: bool,
    /// Held by the next `list_history` call only.
    list_gate: Option<Arc<Notify>>,
}

#[derive(Clone, Default)]
pub(crate) struct MockBackend {
    state: Arc<Mutex<MockState>>,
    /// When set, `chat` and `start_model` wait for a notification before answering.
    pub(crate) gate: Option<Arc<Notify>>,
}

pub(crate) fn status(name: &str) -> StatusResponse {
    StatusResponse {
        status: Some(name.to_string()),
        ..StatusResponse::default()
    }
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn gated() -> (Self, Arc<Notify>) {
        let notify = Arc::new(Notify::new());
        let backend = Self {
            gate: Some(notify.clone()),
            ..Self::default()
        };
        (backend, notify)
    }

    pub(crate) fn push_status(&self, status: Result<StatusResponse, ClientError>) {
        self.state.lock().unwrap().statuses.push_back(status);
    }

    /// Answer used once the scripted queue is drained.
    pub(crate) fn set_fallback_status(&self, status: Result<StatusResponse, ClientError>) {
        self.state.lock().unwrap().fallback_status = Some(status);
    }

    pub(crate) fn push_chat(&self, reply: Result<ChatResponse, ClientError>) {
        self.state.lock().unwrap().chat_replies.push_back(reply);
    }

    pub(crate) fn fail_start(&self, err: ClientError) {
        self.state.lock().unwrap().start_result = Some(err);
    }

    pub(crate) fn set_history_down(&self, down: bool) {
        self.state.lock().unwrap().history_down = down;
    }

    /// Make the next `list_history` call wait for the returned notification.
    pub(crate) fn hold_next_list(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.state.lock().unwrap().list_gate = Some(notify.clone());
        notify
    }

    pub(crate) fn insert_history(&self, entry: HistoryEntry) {
        let mut state = self.state.lock().unwrap();
        if !state.history_order.contains(&entry.id) {
            state.history_order.push(entry.id.clone());
        }
        state.history.insert(entry.id.clone(), entry);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn saves(&self) -> Vec<HistoryRecord> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SaveHistory(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn history_guard(&self) -> Result<(), ClientError> {
        if self.state.lock().unwrap().history_down {
            return Err(ClientError::transport("connection refused"));
        }
        Ok(())
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

impl Backend for MockBackend {
    async fn model_status(&self) -> Result<StatusResponse, ClientError> {
        self.record(Call::Status);
        let mut state = self.state.lock().unwrap();
        if let Some(next) = state.statuses.pop_front() {
            return next;
        }
        state
            .fallback_status
            .clone()
            .unwrap_or_else(|| Err(ClientError::transport("connection refused")))
    }

    async fn start_model(&self) -> Result<(), ClientError> {
        self.record(Call::Start);
        self.wait_gate().await;
        match self.state.lock().unwrap().start_result.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn stop_model(&self) -> Result<(), ClientError> {
        self.record(Call::Stop);
        Ok(())
    }

    async fn chat(&self, message: &str) -> Result<ChatResponse, ClientError> {
        self.record(Call::Chat(message.to_string()));
        self.wait_gate().await;
        self.state
            .lock()
            .unwrap()
            .chat_replies
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::transport("no scripted reply")))
    }

    async fn list_history(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        self.record(Call::ListHistory);
        let gate = self.state.lock().unwrap().list_gate.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.history_guard()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .history_order
            .iter()
            .filter_map(|id| state.history.get(id).cloned())
            .collect())
    }

    async fn get_history(&self, id: &str) -> Result<HistoryEntry, ClientError> {
        self.record(Call::GetHistory(id.to_string()));
        self.history_guard()?;
        self.state
            .lock()
            .unwrap()
            .history
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::backend("HTTP 404 Not Found"))
    }

    async fn save_history(&self, record: &HistoryRecord) -> Result<(), ClientError> {
        self.record(Call::SaveHistory(record.clone()));
        self.history_guard()?;
        self.insert_history(HistoryEntry {
            id: record.id.clone(),
            title: record.title.clone(),
            created_at: None,
            messages: record.messages.clone(),
        });
        Ok(())
    }

    async fn delete_history(&self, id: &str) -> Result<(), ClientError> {
        self.record(Call::DeleteHistory(id.to_string()));
        self.history_guard()?;
        let mut state = self.state.lock().unwrap();
        state.history.remove(id);
        state.history_order.retain(|h| h != id);
        Ok(())
    }
}
