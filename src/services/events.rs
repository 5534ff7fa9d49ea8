//! Render events and the sink that presents them.
//!
//! The controller and poller never draw anything themselves; every visible
//! change goes through an [`EventSink`] as a [`ClientEvent`].

use serde::Serialize;
use tokio::sync::mpsc;

use crate::plugins::history::HistoryListItem;
use crate::services::backend::Message;
use crate::services::model_status::StatusView;

pub const EVT_MESSAGE_APPENDED: &str = "message-appended";
pub const EVT_THINKING: &str = "thinking";
pub const EVT_TITLE_CHANGED: &str = "title-changed";
pub const EVT_SESSION_CLEARED: &str = "session-cleared";
pub const EVT_SESSION_LOADED: &str = "session-loaded";
pub const EVT_HISTORY_LIST: &str = "history-list";
pub const EVT_MODEL_STATUS: &str = "model-status";
pub const EVT_NOTICE: &str = "notice";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    /// A single turn was added to the active transcript.
    MessageAppended { message: Message },
    /// The typing indicator while a chat request is outstanding.
    Thinking { active: bool },
    TitleChanged { title: String },
    /// The transcript was reset to the empty/welcome view.
    SessionCleared { title: String },
    /// Replace the whole transcript with these turns, in order.
    #[serde(rename_all = "camelCase")]
    SessionLoaded {
        session_id: String,
        title: String,
        messages: Vec<Message>,
    },
    HistoryList { items: Vec<HistoryListItem> },
    ModelStatus { view: StatusView },
    /// Transient, non-blocking notification (the toast).
    Notice { message: String },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageAppended { .. } => EVT_MESSAGE_APPENDED,
            Self::Thinking { .. } => EVT_THINKING,
            Self::TitleChanged { .. } => EVT_TITLE_CHANGED,
            Self::SessionCleared { .. } => EVT_SESSION_CLEARED,
            Self::SessionLoaded { .. } => EVT_SESSION_LOADED,
            Self::HistoryList { .. } => EVT_HISTORY_LIST,
            Self::ModelStatus { .. } => EVT_MODEL_STATUS,
            Self::Notice { .. } => EVT_NOTICE,
        }
    }
}

pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: ClientEvent);
}

/// Forwards events to a receiver task. Events emitted after the receiver is
/// gone are dropped.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }
}

/// Writes events to the log; for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: ClientEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => log::info!("{}: {}", event.name(), payload),
            Err(err) => log::warn!("{}: unserializable event: {}", event.name(), err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_shape() {
        let event = ClientEvent::SessionLoaded {
            session_id: "abc".to_string(),
            title: "Hello".to_string(),
            messages: vec![Message::user("Hello")],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "sessionLoaded");
        assert_eq!(value["sessionId"], "abc");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(event.name(), EVT_SESSION_LOADED);
    }

    #[test]
    fn test_log_sink_accepts_every_event() {
        LogSink.emit(ClientEvent::Thinking { active: true });
        LogSink.emit(ClientEvent::Notice {
            message: "saved".to_string(),
        });
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(ClientEvent::Thinking { active: true });
        sink.emit(ClientEvent::Thinking { active: false });
        assert_eq!(rx.recv().await, Some(ClientEvent::Thinking { active: true }));
        assert_eq!(rx.recv().await, Some(ClientEvent::Thinking { active: false }));

        drop(rx);
        // Receiver gone: must not panic.
        sink.emit(ClientEvent::Notice {
            message: "late".to_string(),
        });
    }
}
