//! The active chat session: transcript, single in-flight guard, history sync.
//!
//! State lives behind a `std::sync::Mutex` that is never held across `.await`.
//! Anything decided before a suspension point is re-checked afterwards: the
//! session may have been reset or replaced while a chat request was pending,
//! which `epoch` detects.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use uuid::Uuid;

use crate::plugins::history::{DEFAULT_TITLE, HistorySync, SyncOutcome, derive_title};
use crate::services::backend::{Backend, ClientError, Message};
use crate::services::events::{ClientEvent, EventSink};

#[derive(Debug, Default)]
struct SessionState {
    id: Option<String>,
    title: Option<String>,
    messages: Vec<Message>,
    in_flight: bool,
    /// Bumped whenever the transcript is replaced wholesale.
    epoch: u64,
}

/// A copy of the session at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: Option<String>,
    pub title: Option<String>,
    pub messages: Vec<Message>,
    pub in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyInput,
    InFlight,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Refused before anything was sent.
    Rejected(RejectReason),
    Answered,
    /// The backend replied with an `error` field.
    BackendError(String),
    /// The request failed or the reply could not be decoded.
    TransportError(ClientError),
    /// A reply arrived after the session was reset or replaced; it was dropped.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    NoSession,
    Declined,
    Deleted(SyncOutcome),
}

fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

struct SessionInner<B, S> {
    backend: Arc<B>,
    sink: Arc<S>,
    history: HistorySync<B, S>,
    state: Mutex<SessionState>,
}

pub struct SessionController<B, S> {
    inner: Arc<SessionInner<B, S>>,
}

impl<B, S> Clone for SessionController<B, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: Backend, S: EventSink> SessionController<B, S> {
    pub fn new(backend: Arc<B>, sink: Arc<S>) -> Self {
        let history = HistorySync::new(backend.clone(), sink.clone());
        Self {
            inner: Arc::new(SessionInner {
                backend,
                sink,
                history,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    pub fn history(&self) -> &HistorySync<B, S> {
        &self.inner.history
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        // A panic while holding the lock leaves the data consistent enough to
        // keep chatting; recover the guard instead of propagating the poison.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ClientEvent) {
        self.inner.sink.emit(event);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            id: state.id.clone(),
            title: state.title.clone(),
            messages: state.messages.clone(),
            in_flight: state.in_flight,
        }
    }

    pub fn current_id(&self) -> Option<String> {
        self.state().id.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.state().in_flight
    }

    /// Send one user message and append the reply.
    ///
    /// Empty input and a send while another is outstanding are refused
    /// silently. Every accepted call clears the in-flight flag before it
    /// returns, whatever the outcome.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Rejected(RejectReason::EmptyInput);
        }

        let (user_message, epoch) = {
            let mut state = self.state();
            if state.in_flight {
                log::debug!("Submit refused: a reply is still pending");
                return SubmitOutcome::Rejected(RejectReason::InFlight);
            }
            if state.id.is_none() {
                state.id = Some(new_session_id());
                state.title = None;
                state.messages.clear();
            }
            let message = Message::user(text);
            state.messages.push(message.clone());
            state.in_flight = true;
            (message, state.epoch)
        };

        self.emit(ClientEvent::MessageAppended {
            message: user_message,
        });
        self.emit(ClientEvent::Thinking { active: true });

        let result = self.inner.backend.chat(text).await;
        self.emit(ClientEvent::Thinking { active: false });

        let (reply, outcome) = match result {
            Ok(response) => match (response.error, response.response) {
                (Some(error), _) => (
                    Message::bot(format!("Error: {}", error), None),
                    SubmitOutcome::BackendError(error),
                ),
                (None, Some(answer)) => (
                    Message::bot(answer, response.source),
                    SubmitOutcome::Answered,
                ),
                (None, None) => {
                    let error = "Empty response from backend".to_string();
                    (
                        Message::bot(format!("Error: {}", error), None),
                        SubmitOutcome::BackendError(error),
                    )
                }
            },
            Err(err) => (
                Message::bot(format!("Connection failure: {}", err.message()), None),
                SubmitOutcome::TransportError(err),
            ),
        };
        let completed = !matches!(outcome, SubmitOutcome::TransportError(_));

        let (snapshot, new_title) = {
            let mut state = self.state();
            state.in_flight = false;
            if state.epoch != epoch {
                log::debug!("Dropping reply for a session that is no longer active");
                return SubmitOutcome::Superseded;
            }
            state.messages.push(reply.clone());

            let mut new_title = None;
            if completed && state.title.is_none() {
                state.title = derive_title(&state.messages);
                new_title = state.title.clone();
            }
            (
                SessionSnapshot {
                    id: state.id.clone(),
                    title: state.title.clone(),
                    messages: state.messages.clone(),
                    in_flight: false,
                },
                new_title,
            )
        };

        self.emit(ClientEvent::MessageAppended { message: reply });
        if let Some(title) = new_title {
            self.emit(ClientEvent::TitleChanged { title });
        }

        if completed {
            self.inner
                .history
                .save(
                    snapshot.id.as_deref(),
                    snapshot.title.as_deref(),
                    &snapshot.messages,
                )
                .await;
            self.refresh_history().await;
        }

        outcome
    }

    /// Re-render the history list, highlighting whichever session is active
    /// when the list arrives.
    pub async fn refresh_history(&self) -> SyncOutcome {
        self.inner.history.refresh_list(|| self.current_id()).await
    }

    /// Reset to an empty, unsaved session.
    pub async fn start_new_session(&self) -> SyncOutcome {
        {
            let mut state = self.state();
            state.id = None;
            state.title = None;
            state.messages.clear();
            state.epoch += 1;
        }
        self.emit(ClientEvent::SessionCleared {
            title: DEFAULT_TITLE.to_string(),
        });
        self.refresh_history().await
    }

    /// Delete the active session from history once `confirm` agrees, then
    /// start a new one whatever the delete returned.
    pub async fn delete_current_session<F>(&self, confirm: F) -> DeleteOutcome
    where
        F: FnOnce() -> bool,
    {
        let Some(id) = self.current_id() else {
            return DeleteOutcome::NoSession;
        };
        if !confirm() {
            return DeleteOutcome::Declined;
        }

        let outcome = self.inner.history.delete_entry(&id).await;
        self.start_new_session().await;
        DeleteOutcome::Deleted(outcome)
    }

    /// Replace the active session with a stored one.
    ///
    /// On failure the active session is left as it was.
    pub async fn load_session(&self, id: &str) -> Result<(), ClientError> {
        let entry = self.inner.history.load(id).await?;

        let messages = entry.messages.clone();
        let title = if entry.title.trim().is_empty() {
            derive_title(&messages).unwrap_or_else(|| DEFAULT_TITLE.to_string())
        } else {
            entry.title.clone()
        };

        {
            let mut state = self.state();
            state.id = Some(entry.id.clone());
            state.title = Some(title.clone());
            state.messages = messages.clone();
            state.epoch += 1;
        }

        self.emit(ClientEvent::SessionLoaded {
            session_id: entry.id.clone(),
            title,
            messages,
        });
        self.refresh_history().await;
        Ok(())
    }
}
