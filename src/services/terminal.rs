//! Line-oriented terminal front-end: prints [`ClientEvent`]s and turns input
//! lines into controller and poller operations.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

use crate::plugins::history::HistoryEntry;
use crate::services::backend::{Backend, Role, SourceKind};
use crate::services::events::{ClientEvent, EventSink};
use crate::services::model_status::{ModelStatusPoller, StatusView, ToggleOutcome};
use crate::services::session::{RejectReason, SessionController, SubmitOutcome};

pub const HELP: &str = "\
Commands:
  /new            start a new conversation
  /delete         delete the current conversation
  /load <id|#>    open a stored conversation (by id or list position)
  /history        refresh the conversation list
  /model          start or stop the model
  /status         poll the model status now
  /help           show this help
  /quit           exit
Anything else is sent as a chat message.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    New,
    Delete,
    Load(String),
    History,
    Model,
    Status,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Chat(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        Some(match name.to_ascii_lowercase().as_str() {
            "new" => Self::New,
            "delete" | "del" => Self::Delete,
            "load" | "open" if !arg.is_empty() => Self::Load(arg.to_string()),
            "history" | "list" => Self::History,
            "model" | "toggle" => Self::Model,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        })
    }
}

/// `/load 2` addresses the second row of the last list; anything else is an id.
pub fn resolve_load_target(target: &str, entries: &[HistoryEntry]) -> String {
    match target.parse::<usize>() {
        Ok(n) if n >= 1 && n <= entries.len() => entries[n - 1].id.clone(),
        _ => target.to_string(),
    }
}

fn format_status(view: &StatusView) -> String {
    let mut line = format!("[model] {}", view.label);
    if let Some(error) = &view.error {
        line.push_str(&format!(" ({})", error));
    }
    if let Some(vram) = &view.vram {
        line.push_str(&format!(" | VRAM {} ({:.0}%)", vram.text, vram.percent));
    }
    line.push_str(&format!(
        " | /model: {}{}",
        view.action_label,
        if view.action_enabled { "" } else { " (busy)" }
    ));
    line
}

pub fn render_event(event: &ClientEvent) -> Option<String> {
    Some(match event {
        ClientEvent::MessageAppended { message } => {
            let who = match message.role {
                Role::User => "You",
                Role::Bot => "AI",
            };
            let mut out = format!("{}: {}", who, message.content);
            let tags = message.source_tags();
            if !tags.is_empty() {
                let pills = tags
                    .iter()
                    .map(|t| match t.kind {
                        SourceKind::Local => format!("[local: {}]", t.label),
                        SourceKind::Live => format!("[live: {}]", t.label),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                out.push_str("\n    ");
                out.push_str(&pills);
            }
            out
        }
        ClientEvent::Thinking { active: true } => "AI: Thinking...".to_string(),
        ClientEvent::Thinking { active: false } => return None,
        ClientEvent::TitleChanged { title } => format!("== {} ==", title),
        ClientEvent::SessionCleared { title } => {
            format!("== {} ==\nWelcome! Ask anything, or /help for commands.", title)
        }
        ClientEvent::SessionLoaded {
            title, messages, ..
        } => {
            let mut out = format!("== {} ==", title);
            for message in messages {
                if let Some(line) = render_event(&ClientEvent::MessageAppended {
                    message: message.clone(),
                }) {
                    out.push('\n');
                    out.push_str(&line);
                }
            }
            out
        }
        ClientEvent::HistoryList { items } => {
            if items.is_empty() {
                "[history] no saved conversations".to_string()
            } else {
                let rows = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        format!(
                            "{} {:>2}. {}  ({})",
                            if item.is_active { "*" } else { " " },
                            i + 1,
                            item.title,
                            item.id
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("[history]\n{}", rows)
            }
        }
        ClientEvent::ModelStatus { view } => format_status(view),
        ClientEvent::Notice { message } => format!("[!] {}", message),
    })
}

/// Print events until the channel closes. Repeated identical status lines are
/// collapsed so the baseline poll does not flood the terminal.
pub async fn render_loop(mut rx: mpsc::UnboundedReceiver<ClientEvent>) {
    let mut last_status: Option<StatusView> = None;
    while let Some(event) = rx.recv().await {
        if let ClientEvent::ModelStatus { view } = &event {
            if last_status.as_ref() == Some(view) {
                continue;
            }
            last_status = Some(view.clone());
        }
        if let Some(text) = render_event(&event) {
            println!("{}", text);
        }
    }
}

async fn confirm_delete(lines: &mut Lines<BufReader<Stdin>>) -> bool {
    print!("Delete this chat? [y/N] ");
    let _ = std::io::stdout().flush();
    match lines.next_line().await {
        Ok(Some(answer)) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        _ => false,
    }
}

/// Read commands from stdin until `/quit` or end of input.
pub async fn input_loop<B, S>(
    session: SessionController<B, S>,
    poller: ModelStatusPoller<B, S>,
    sink: Arc<S>,
) where
    B: Backend,
    S: EventSink,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                log::warn!("stdin read failed: {}", err);
                break;
            }
        };
        let Some(command) = Command::parse(&line) else {
            continue;
        };

        match command {
            Command::Chat(text) => {
                // Runs in the background so input stays live; a second message
                // before the reply is refused by the controller.
                let session = session.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    let outcome = session.submit(&text).await;
                    if outcome == SubmitOutcome::Rejected(RejectReason::InFlight) {
                        sink.emit(ClientEvent::Notice {
                            message: "Still waiting for the previous reply".to_string(),
                        });
                    }
                });
            }
            Command::New => {
                session.start_new_session().await;
            }
            Command::Delete => {
                if session.current_id().is_none() {
                    continue;
                }
                let confirmed = confirm_delete(&mut lines).await;
                session.delete_current_session(|| confirmed).await;
            }
            Command::Load(target) => {
                let id = resolve_load_target(&target, &session.history().entries());
                // Failures are already reported as a notice.
                let _ = session.load_session(&id).await;
            }
            Command::History => {
                session.refresh_history().await;
            }
            Command::Model => {
                let poller = poller.clone();
                tokio::spawn(async move {
                    if let ToggleOutcome::StartFailed(err) = poller.toggle().await {
                        log::warn!("Model start failed: {}", err);
                    }
                });
            }
            Command::Status => {
                poller.poll().await;
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
            Command::Unknown(raw) => {
                println!("Unknown command: {} (try /help)", raw);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::history::HistoryListItem;
    use crate::services::backend::Message;
    use crate::services::model_status::{DisplayStatus, Lifecycle, ModelStatus};

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   "), None);
        assert_eq!(Command::parse("hello"), Some(Command::Chat("hello".to_string())));
        assert_eq!(Command::parse("/NEW"), Some(Command::New));
        assert_eq!(
            Command::parse("/load  abc123 "),
            Some(Command::Load("abc123".to_string()))
        );
        assert_eq!(
            Command::parse("/load"),
            Some(Command::Unknown("/load".to_string()))
        );
        assert_eq!(Command::parse("/quit"), Some(Command::Quit));
    }

    #[test]
    fn test_resolve_load_target() {
        let entries = vec![HistoryEntry {
            id: "k3j9".to_string(),
            title: "t".to_string(),
            created_at: None,
            messages: Vec::new(),
        }];
        assert_eq!(resolve_load_target("1", &entries), "k3j9");
        assert_eq!(resolve_load_target("2", &entries), "2");
        assert_eq!(resolve_load_target("abc", &entries), "abc");
    }

    #[test]
    fn test_render_bot_message_with_pills() {
        let event = ClientEvent::MessageAppended {
            message: Message::bot("42", Some("Local FAISS + Live Web".to_string())),
        };
        let text = render_event(&event).unwrap();
        assert!(text.starts_with("AI: 42"));
        assert!(text.contains("[local: Local FAISS]"));
        assert!(text.contains("[live: Live Web]"));
    }

    #[test]
    fn test_render_history_marks_active() {
        let event = ClientEvent::HistoryList {
            items: vec![HistoryListItem {
                id: "a".to_string(),
                title: "First".to_string(),
                is_active: true,
            }],
        };
        assert_eq!(render_event(&event).unwrap(), "[history]\n*  1. First  (a)");
    }

    #[test]
    fn test_render_status() {
        let mut status = ModelStatus::new(Lifecycle::Ready);
        status.vram_free_mb = Some(2048.0);
        status.vram_total_mb = Some(8192.0);
        let view = StatusView::from_display(&DisplayStatus::Confirmed(status));
        assert_eq!(
            render_event(&ClientEvent::ModelStatus { view }).unwrap(),
            "[model] Ready | VRAM 6.0 / 8 GB (75%) | /model: Stop Engine"
        );
    }

    #[tokio::test]
    async fn test_render_loop_drains_queue_once_senders_drop() {
        let (sink, rx) = crate::services::events::ChannelSink::new();
        sink.emit(ClientEvent::Notice {
            message: "saved".to_string(),
        });
        sink.emit(ClientEvent::MessageAppended {
            message: Message::bot("last reply", None),
        });
        let renderer = tokio::spawn(render_loop(rx));
        drop(sink);

        let finished =
            tokio::time::timeout(std::time::Duration::from_secs(1), renderer).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }
}
