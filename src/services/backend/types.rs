use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Body of `GET /api/model/status`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub vram_free_mb: Option<f64>,
    #[serde(default)]
    pub vram_total_mb: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
}

/// Reply of `POST /api/chat`. Either `response` or `error` is expected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// One transcript turn. Never mutated once appended to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_source"
    )]
    pub source: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            source: None,
        }
    }

    pub fn bot(content: impl Into<String>, source: Option<String>) -> Self {
        Self {
            role: Role::Bot,
            content: content.into(),
            source: normalize_source(source),
        }
    }

    /// Provenance tags of a bot answer, in the order the backend listed them.
    pub fn source_tags(&self) -> SmallVec<[SourceTag; 2]> {
        match (self.role, self.source.as_deref()) {
            (Role::Bot, Some(source)) => split_source(source),
            _ => SmallVec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTag {
    pub label: String,
    pub kind: SourceKind,
}

/// The backend writes `"none"` when an answer has no provenance.
pub fn normalize_source(source: Option<String>) -> Option<String> {
    source
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
}

fn deserialize_source<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(normalize_source(raw))
}

pub fn split_source(source: &str) -> SmallVec<[SourceTag; 2]> {
    source
        .split(" + ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|label| SourceTag {
            kind: if label.to_ascii_lowercase().contains("local") {
                SourceKind::Local
            } else {
                SourceKind::Live
            },
            label: label.to_string(),
        })
        .collect()
}

/// Body of `POST /api/history` (create-or-replace by `id`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
}
