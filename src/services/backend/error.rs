use serde::{Deserialize, Serialize};

/// Failure of a backend call.
///
/// Empty input, a duplicate send or an unconfirmed delete are not represented
/// here: those are refused by the caller and reported through typed outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientError {
    /// Network failure, timeout, or a body that could not be decoded.
    Transport { message: String },
    /// A well-formed response that carried an `error` field or a failing status.
    Backend { message: String },
}

impl ClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message } | Self::Backend { message } => message,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::transport(format!("request timed out: {}", err));
        }
        Self::transport(err.to_string())
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { message } => write!(f, "Transport: {}", message),
            Self::Backend { message } => write!(f, "Backend: {}", message),
        }
    }
}

impl std::error::Error for ClientError {}
