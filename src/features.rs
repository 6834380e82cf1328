use crate::lookup::{DnsLookup, LookupError, RegistrationLookup, RegistrationRecord};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{ser::SerializeMap, Serialize, Serializer};
use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};
use tracing::debug;
use url::Url;

/// Column order of the data set the classifier was trained on.
pub const TRAINING_COLUMNS: [&str; 30] = [
    "having_IP_Address",
    "URL_Length",
    "Shortining_Service",
    "having_At_Symbol",
    "double_slash_redirecting",
    "Prefix_Suffix",
    "having_Sub_Domain",
    "SSLfinal_State",
    "Domain_registeration_length",
    "Favicon",
    "port",
    "HTTPS_token",
    "Request_URL",
    "URL_of_Anchor",
    "Links_in_tags",
    "SFH",
    "Submitting_to_email",
    "Abnormal_URL",
    "Redirect",
    "on_mouseover",
    "RightClick",
    "popUpWidnow",
    "Iframe",
    "age_of_domain",
    "DNSRecord",
    "web_traffic",
    "Page_Rank",
    "Google_Index",
    "Links_pointing_to_page",
    "Statistical_report",
];

const SHORTENING_SERVICES: &[&str] = &["bit.ly", "goo.gl", "t.co", "tinyurl.com"];

// Page-content features this service never fetches; fixed at their "legitimate" value.
const CONTENT_DEFAULTS: &[(&str, i8)] = &[
    ("Favicon", 1),
    ("port", 1),
    ("HTTPS_token", 1),
    ("Request_URL", 1),
    ("URL_of_Anchor", 1),
    ("Links_in_tags", 1),
    ("SFH", 1),
    ("Submitting_to_email", 1),
    ("Abnormal_URL", 1),
    ("Redirect", 0),
    ("on_mouseover", 1),
    ("RightClick", 1),
    ("popUpWidnow", 1),
    ("Iframe", 1),
    // Ranking/traffic data would need a paid API.
    ("web_traffic", -1),
    ("Page_Rank", -1),
    ("Google_Index", 1),
    ("Links_pointing_to_page", 1),
    ("Statistical_report", 1),
];

const MIN_DOMAIN_AGE_DAYS: i64 = 180;
const MIN_REGISTRATION_DAYS: i64 = 365;

fn ipv4_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("valid regex"))
}

/// Values in {-1, 0, 1}, indexed by `TRAINING_COLUMNS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureVector {
    values: [i8; 30],
}

impl FeatureVector {
    pub fn zeroed() -> Self {
        Self { values: [0; 30] }
    }

    /// Reindexes computed features onto the training schema: missing columns
    /// become 0 and names outside the schema are dropped.
    pub fn from_computed(features: &HashMap<&str, i8>) -> Self {
        let mut values = [0; 30];
        for (slot, name) in values.iter_mut().zip(TRAINING_COLUMNS) {
            *slot = features.get(name).copied().unwrap_or(0);
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<i8> {
        TRAINING_COLUMNS
            .iter()
            .position(|column| *column == name)
            .map(|i| self.values[i])
    }

    pub fn values(&self) -> &[i8; 30] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, i8)> + '_ {
        TRAINING_COLUMNS.iter().copied().zip(self.values.iter().copied())
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(TRAINING_COLUMNS.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

/// The pieces of a URL the lexical features look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: String,
    pub host: String,
    pub path: String,
}

impl ParsedUrl {
    /// `None` when the string is not an absolute URL with a host.
    pub fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        let host = url.host_str().filter(|h| !h.is_empty())?.to_string();
        Some(Self {
            scheme: url.scheme().to_string(),
            host,
            path: url.path().to_string(),
        })
    }
}

pub struct FeatureExtractor {
    registration: Arc<dyn RegistrationLookup>,
    dns: Arc<dyn DnsLookup>,
}

impl FeatureExtractor {
    pub fn new(registration: Arc<dyn RegistrationLookup>, dns: Arc<dyn DnsLookup>) -> Self {
        Self { registration, dns }
    }

    pub async fn extract(&self, url: &str) -> FeatureVector {
        self.extract_at(url, Utc::now()).await
    }

    /// Like `extract`, with domain ages measured against `now`.
    pub async fn extract_at(&self, url: &str, now: DateTime<Utc>) -> FeatureVector {
        let Some(parsed) = ParsedUrl::parse(url) else {
            debug!("Unparseable URL, using zeroed features: {:?}", url);
            return FeatureVector::zeroed();
        };

        debug!("Extracting features for {}://{}", parsed.scheme, parsed.host);
        let mut features = lexical_features(url, &parsed);

        let (registration, dns) = tokio::join!(
            self.registration.lookup(&parsed.host),
            self.dns.resolve_a(&parsed.host),
        );
        record_failure("whois", &parsed.host, registration.as_ref().err());
        record_failure("dns", &parsed.host, dns.as_ref().err());

        let (age_of_domain, registration_length) = registration_features(&registration, now);
        features.insert("age_of_domain", age_of_domain);
        features.insert("Domain_registeration_length", registration_length);
        features.insert("DNSRecord", dns_feature(&dns));

        features.extend(CONTENT_DEFAULTS.iter().copied());

        FeatureVector::from_computed(&features)
    }
}

fn record_failure(lookup: &'static str, host: &str, err: Option<&LookupError>) {
    if let Some(err) = err {
        debug!("{} lookup for {} failed: {}", lookup, host, err);
        metrics::counter!("lookup_failures_total", "lookup" => lookup, "kind" => err.kind()).increment(1);
    }
}

/// The eight features computed from the URL text alone.
pub fn lexical_features(url: &str, parsed: &ParsedUrl) -> HashMap<&'static str, i8> {
    let host = parsed.host.as_str();
    let mut features = HashMap::new();

    features.insert("having_IP_Address", if ipv4_pattern().is_match(host) { -1 } else { 1 });
    features.insert("URL_Length", url_length_feature(url.chars().count()));
    features.insert(
        "Shortining_Service",
        if SHORTENING_SERVICES.iter().any(|s| host.contains(s)) { -1 } else { 1 },
    );
    features.insert("having_At_Symbol", if url.contains('@') { -1 } else { 1 });
    features.insert("double_slash_redirecting", if parsed.path.contains("//") { -1 } else { 1 });
    features.insert("Prefix_Suffix", if host.contains('-') { -1 } else { 1 });
    features.insert("having_Sub_Domain", sub_domain_feature(host));
    features.insert("SSLfinal_State", if url.starts_with("https") { 1 } else { -1 });

    features
}

pub fn url_length_feature(len: usize) -> i8 {
    match len {
        0..=53 => 1,
        54..=75 => 0,
        _ => -1,
    }
}

pub fn sub_domain_feature(host: &str) -> i8 {
    let mut dots = host.matches('.').count();
    if host.starts_with("www.") {
        dots -= 1;
    }
    match dots {
        0..=1 => 1,
        2 => 0,
        _ => -1,
    }
}

/// `(age_of_domain, Domain_registeration_length)` from a registration lookup.
/// Anything short of a creation date counts as suspicious.
pub fn registration_features(
    result: &Result<RegistrationRecord, LookupError>,
    now: DateTime<Utc>,
) -> (i8, i8) {
    let Some(created) = result.as_ref().ok().and_then(RegistrationRecord::first_creation_date) else {
        return (-1, -1);
    };

    let age_days = (now - created).num_days();
    let age = if age_days >= MIN_DOMAIN_AGE_DAYS { 1 } else { -1 };
    let registration = if age_days >= MIN_REGISTRATION_DAYS { 1 } else { -1 };
    (age, registration)
}

pub fn dns_feature(result: &Result<(), LookupError>) -> i8 {
    if result.is_ok() {
        1
    } else {
        -1
    }
}
