//! Registration lookups. The host is cut down to its registrable domain with
//! the public suffix list, then queried through `whois_service`, which owns
//! server discovery, referrals and response parsing.

use crate::{
    artifact,
    config::WhoisConfig,
    lookup::{with_timeout, LookupError, RegistrationLookup, RegistrationRecord},
};
use async_trait::async_trait;
use publicsuffix::{List, Psl};
use std::{net::IpAddr, path::Path, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info};
use whois_service::{ParsedWhoisData, WhoisError};

#[derive(Error, Debug)]
pub enum WhoisSetupError {
    #[error("public suffix list unavailable: {0}")]
    SuffixList(String),

    #[error("whois client: {0}")]
    Client(#[from] WhoisError),
}

/// Reads the suffix list from `suffix_list_path`, downloading it there first
/// when it is missing.
pub async fn load_suffix_list(config: &WhoisConfig) -> Result<List, WhoisSetupError> {
    let path = Path::new(&config.suffix_list_path);
    let io_err = |e: std::io::Error| WhoisSetupError::SuffixList(format!("{}: {}", path.display(), e));

    if !tokio::fs::try_exists(path).await.map_err(io_err)? {
        info!("Downloading public suffix list from {}", config.suffix_list_url);
        let bytes = artifact::fetch_bytes(&config.suffix_list_url, config.suffix_list_timeout())
            .await
            .map_err(|e| WhoisSetupError::SuffixList(e.to_string()))?;
        parse_suffix_list(&bytes)?;
        artifact::store(path, &bytes).await.map_err(io_err)?;
    }

    let bytes = tokio::fs::read(path).await.map_err(io_err)?;
    parse_suffix_list(&bytes)
}

fn parse_suffix_list(bytes: &[u8]) -> Result<List, WhoisSetupError> {
    List::from_bytes(bytes).map_err(|e| WhoisSetupError::SuffixList(e.to_string()))
}

pub struct WhoisLookup {
    client: whois_service::WhoisClient,
    suffixes: Arc<List>,
    timeout: Duration,
}

impl WhoisLookup {
    pub async fn new(suffixes: Arc<List>, config: &WhoisConfig, timeout: Duration) -> Result<Self, WhoisSetupError> {
        let mut service_config = whois_service::Config::load().map_err(WhoisError::from)?;
        let secs = timeout.as_secs().max(1);
        service_config.whois_timeout_seconds = secs;
        service_config.discovery_timeout_seconds = secs;
        service_config.max_response_size = config.max_response_bytes;

        let client = whois_service::WhoisClient::new_with_config(Arc::new(service_config)).await?;
        Ok(Self { client, suffixes, timeout })
    }

    async fn lookup_domain(&self, host: &str) -> Result<RegistrationRecord, LookupError> {
        let domain = registrable_domain(&self.suffixes, host)?;

        // Registration age must reflect the registry now, not a cached answer.
        let response = self.client.lookup_fresh(&domain).await?;
        debug!(
            "whois {} via {} in {}ms",
            domain, response.whois_server, response.query_time_ms
        );

        registration_record(response.whois_server, response.parsed_data.as_ref())
    }
}

#[async_trait]
impl RegistrationLookup for WhoisLookup {
    async fn lookup(&self, host: &str) -> Result<RegistrationRecord, LookupError> {
        with_timeout(self.timeout, self.lookup_domain(host)).await
    }
}

/// Reduces a host name to the domain a registry knows about
/// (`www.example.ne.jp` becomes `example.ne.jp`).
pub fn registrable_domain(suffixes: &List, host: &str) -> Result<String, LookupError> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    if host.starts_with('[') || host.parse::<IpAddr>().is_ok() || host.split('.').any(str::is_empty) {
        return Err(LookupError::InvalidHost(host));
    }

    suffixes
        .domain(host.as_bytes())
        .and_then(|domain| std::str::from_utf8(domain.as_bytes()).ok())
        .map(str::to_string)
        .ok_or_else(|| LookupError::InvalidHost(host.clone()))
}

fn registration_record(server: String, parsed: Option<&ParsedWhoisData>) -> Result<RegistrationRecord, LookupError> {
    let raw = parsed
        .and_then(|data| data.creation_date.as_deref())
        .ok_or(LookupError::NotFound)?;

    let created = whois_service::parse_date(raw)
        .ok_or_else(|| LookupError::Parse(format!("unrecognised creation date {:?}", raw)))?;

    Ok(RegistrationRecord {
        server,
        creation_dates: vec![created],
    })
}

impl From<WhoisError> for LookupError {
    fn from(err: WhoisError) -> Self {
        match err {
            WhoisError::Timeout => LookupError::Timeout,
            WhoisError::InvalidDomain(msg)
            | WhoisError::InvalidIpAddress(msg)
            | WhoisError::UnsupportedIpAddress(msg) => LookupError::InvalidHost(msg),
            WhoisError::UnsupportedTld(tld) => LookupError::NoServer(tld),
            other => LookupError::Network(other.to_string()),
        }
    }
}
