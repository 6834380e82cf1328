//! Phishing URL classification service.
//!
//! A URL is mapped to the 30-column feature vector of the phishing-websites
//! data set (lexical checks plus WHOIS and DNS lookups) and scored by a
//! pre-trained random forest.

pub mod artifact;
pub mod config;
pub mod dns;
pub mod error;
pub mod features;
pub mod lookup;
pub mod model;
pub mod routes;
pub mod telemetry;
pub mod types;
pub mod whois;
