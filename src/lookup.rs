//! Seams for the two unreliable network sources the extractor consults.
//!
//! Each adapter reports an explicit `Result`; the mapping from a failed lookup
//! to a feature value lives in `features`, not here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{future::Future, time::Duration};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("lookup timed out")]
    Timeout,

    #[error("invalid host: {0}")]
    InvalidHost(String),

    #[error("no record found")]
    NotFound,

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no whois server for {0}")]
    NoServer(String),
}

impl LookupError {
    /// Label used for the `lookup_failures_total` metric.
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::Timeout => "timeout",
            LookupError::InvalidHost(_) => "invalid_host",
            LookupError::NotFound => "not_found",
            LookupError::Network(_) => "network",
            LookupError::Parse(_) => "parse",
            LookupError::NoServer(_) => "no_server",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub server: String,
    /// Creation dates in the order the registry returned them.
    pub creation_dates: Vec<DateTime<Utc>>,
}

impl RegistrationRecord {
    pub fn first_creation_date(&self) -> Option<DateTime<Utc>> {
        self.creation_dates.first().copied()
    }
}

#[async_trait]
pub trait RegistrationLookup: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<RegistrationRecord, LookupError>;
}

#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// `Ok(())` when at least one A record resolves for `host`.
    async fn resolve_a(&self, host: &str) -> Result<(), LookupError>;
}

/// Runs `fut`, turning an elapsed deadline into `LookupError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, LookupError>
where
    F: Future<Output = Result<T, LookupError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(LookupError::Timeout))
}
