use std::time::Duration;

use thiserror::Error;

use crate::search::FilterError;

/// Failure of a single listings request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API key rejected (HTTP {status})")]
    Auth { status: u16 },

    #[error("rate limited by marketplace{}", retry_hint(.retry_after))]
    RateLimit { retry_after: Option<Duration> },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode listings response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl ApiError {
    /// Only a rejected key halts tracking; everything else is retried next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ApiError::RateLimit { .. })
    }
}
