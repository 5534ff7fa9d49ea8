use crate::services::backend::{Message, Role};

/// Title shown before the first exchange completes.
pub const DEFAULT_TITLE: &str = "New Conversation";
pub const MAX_TITLE_CHARS: usize = 60;
const ELLIPSIS: &str = "...";

/// Truncate a message into a display title, counting chars rather than bytes.
/// Line breaks and runs of whitespace collapse to single spaces first.
pub fn truncate_title(source: &str) -> String {
    let flat = source.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_TITLE_CHARS {
        return flat;
    }
    flat.chars().take(MAX_TITLE_CHARS).collect::<String>() + ELLIPSIS
}

/// Title for a session, derived from its first user message.
pub fn derive_title(messages: &[Message]) -> Option<String> {
    let first = messages.iter().find(|m| m.role == Role::User)?;
    let title = truncate_title(&first.content);
    if title.is_empty() { None } else { Some(title) }
}
