use serde::{Deserialize, Serialize};

use crate::services::backend::Message;

/// A stored conversation as the history endpoint returns it.
///
/// The backend owns the authoritative copy; the client only caches the last
/// list it fetched and the session it last loaded or sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(
        default,
        rename = "created",
        alias = "created_at",
        alias = "createdAt",
        deserialize_with = "deserialize_created",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// One row of the sidebar list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryListItem {
    pub id: String,
    pub title: String,
    pub is_active: bool,
}

/// Timestamps arrive as ISO strings or epoch numbers depending on the server.
fn deserialize_created<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

pub fn list_items(entries: &[HistoryEntry], active_id: Option<&str>) -> Vec<HistoryListItem> {
    entries
        .iter()
        .map(|entry| HistoryListItem {
            id: entry.id.clone(),
            title: entry.title.clone(),
            is_active: active_id == Some(entry.id.as_str()),
        })
        .collect()
}
