//! Keyword classification of sync failure messages.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    AuthFailed,
    NotFound,
    Timeout,
    NetworkError,
    DiskError,
    Unknown,
}

impl ErrorType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::AuthFailed => "auth_failed",
            ErrorType::NotFound => "not_found",
            ErrorType::Timeout => "timeout",
            ErrorType::NetworkError => "network_error",
            ErrorType::DiskError => "disk_error",
            ErrorType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; the first matching row wins.
const RULES: &[(&[&str], ErrorType)] = &[
    (&["authentication", "unauthorized"], ErrorType::AuthFailed),
    (&["not found", "404"], ErrorType::NotFound),
    (&["timeout"], ErrorType::Timeout),
    (&["network", "connection"], ErrorType::NetworkError),
    (&["disk", "space"], ErrorType::DiskError),
];

/// Classify a failure message by case-insensitive keyword match.
pub fn classify(message: &str) -> ErrorType {
    let lower = message.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(ErrorType::Unknown, |(_, kind)| *kind)
}
