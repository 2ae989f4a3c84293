use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure raised by a provider adapter while fetching usage.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to execute request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    NotImplemented(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotConfigured,
    CredentialExpired,
    FetchFailed,
    NotImplemented,
}

/// Per-provider failure recorded on a `Usage` entry.
///
/// The message is already prefixed with the provider's display name, so
/// renderers can print it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageError {
    pub kind: ErrorKind,
    pub message: String,
}

impl UsageError {
    pub fn not_configured(provider_name: &str) -> Self {
        Self {
            kind: ErrorKind::NotConfigured,
            message: format!("{}: not configured", provider_name),
        }
    }

    pub fn credential_expired(provider_name: &str) -> Self {
        Self {
            kind: ErrorKind::CredentialExpired,
            message: format!(
                "{}: credential expired, run 'llm-usage setup' to update it",
                provider_name
            ),
        }
    }

    /// The account exists but its stored secret could not be read.
    pub fn credential_unreadable(provider_name: &str, reason: &str) -> Self {
        Self {
            kind: ErrorKind::NotConfigured,
            message: format!("{}: stored credential unreadable: {}", provider_name, reason),
        }
    }

    pub fn fetch_failed(provider_name: &str, err: &FetchError) -> Self {
        let kind = match err {
            FetchError::NotImplemented(_) => ErrorKind::NotImplemented,
            _ => ErrorKind::FetchFailed,
        };

        Self {
            kind,
            message: format!("{}: {}", provider_name, err),
        }
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for UsageError {}
