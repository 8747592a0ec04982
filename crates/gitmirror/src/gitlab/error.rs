//! GitLab API error types.
//!
//! Display strings intentionally contain the keywords the scheduler's error
//! classifier looks for ("authentication", "not found", "timeout", "network").

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur when interacting with the GitLab API.
#[derive(Debug, Clone, Error)]
pub enum GitLabError {
    #[error("GitLab API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("JSON deserialization error: {0}")]
    Deserialize(String),
}

impl GitLabError {
    /// Create an API error without an HTTP status.
    #[inline]
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api {
            status: 0,
            message: msg.into(),
        }
    }

    /// Classify an HTTP status code and response body into a typed error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        match status {
            401 | 403 => Self::Auth(format!("{status}: {body}")),
            404 => Self::NotFound(body.to_string()),
            408 | 504 => Self::Timeout(format!("{status}: {body}")),
            429 => Self::RateLimited {
                reset_at: Utc::now() + chrono::Duration::minutes(1),
            },
            _ => Self::Api {
                status,
                message: body.to_string(),
            },
        }
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Auth(_) | Self::NotFound(_) | Self::Deserialize(_) => false,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<HttpError> for GitLabError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout(msg) => Self::Timeout(msg),
            HttpError::Connect(msg) | HttpError::Transport(msg) => Self::Network(msg),
            HttpError::Decode(msg) => Self::Deserialize(msg),
            HttpError::Encode(msg) => Self::api(msg),
            other @ HttpError::NoMockResponse { .. } => Self::Network(other.to_string()),
        }
    }
}

/// Check if an error indicates a rate limit.
pub fn is_rate_limit_error(e: &GitLabError) -> bool {
    match e {
        GitLabError::RateLimited { .. } => true,
        GitLabError::Api { status, message } => *status == 429 || message.contains("rate limit"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_maps_categories() {
        assert!(matches!(
            GitLabError::from_status(401, "bad token"),
            GitLabError::Auth(_)
        ));
        assert!(matches!(
            GitLabError::from_status(403, "forbidden"),
            GitLabError::Auth(_)
        ));
        assert!(matches!(
            GitLabError::from_status(404, "{\"message\":\"404 Project Not Found\"}"),
            GitLabError::NotFound(_)
        ));
        assert!(matches!(
            GitLabError::from_status(429, "slow down"),
            GitLabError::RateLimited { .. }
        ));
        assert!(matches!(
            GitLabError::from_status(504, "gateway"),
            GitLabError::Timeout(_)
        ));
        assert!(matches!(
            GitLabError::from_status(500, "boom"),
            GitLabError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn transient_errors_are_identified() {
        assert!(GitLabError::from_status(502, "").is_transient());
        assert!(GitLabError::Network("reset".into()).is_transient());
        assert!(!GitLabError::from_status(401, "").is_transient());
        assert!(!GitLabError::from_status(404, "").is_transient());
        assert!(!GitLabError::from_status(422, "invalid").is_transient());
    }

    #[test]
    fn http_errors_convert_to_matching_categories() {
        let err: GitLabError = HttpError::Timeout("deadline".into()).into();
        assert!(matches!(err, GitLabError::Timeout(_)));

        let err: GitLabError = HttpError::Connect("refused".into()).into();
        assert!(matches!(err, GitLabError::Network(_)));

        let err: GitLabError = HttpError::Decode("eof".into()).into();
        assert!(matches!(err, GitLabError::Deserialize(_)));
    }

    #[test]
    fn display_contains_classifier_keywords() {
        let lower = |e: GitLabError| e.to_string().to_lowercase();
        assert!(lower(GitLabError::Auth("x".into())).contains("authentication"));
        assert!(lower(GitLabError::NotFound("x".into())).contains("not found"));
        assert!(lower(GitLabError::Timeout("x".into())).contains("timeout"));
        assert!(lower(GitLabError::Network("x".into())).contains("network"));
    }

    #[test]
    fn rate_limit_detection() {
        assert!(is_rate_limit_error(&GitLabError::RateLimited {
            reset_at: Utc::now()
        }));
        assert!(is_rate_limit_error(&GitLabError::Api {
            status: 429,
            message: String::new()
        }));
        assert!(!is_rate_limit_error(&GitLabError::Auth("no".into())));
    }
}
