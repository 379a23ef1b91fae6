//! # KZ Whois Library
//!
//! Answers "who owns this domain and when does it expire?" for domains
//! registered through the ps.kz WHOIS portal.
//!
//! ## Features
//!
//! - Read-through lookup: in-memory TTL cache, then a durable SQLite log,
//!   then the origin result page
//! - Label-driven extraction of the WHOIS table into typed fields
//! - Configurable classification of origin pages (free / registered / outage)
//! - Optional per-domain request coalescing on the miss path
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kz_whois::{Config, LookupService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::load()?);
//!     let service = LookupService::connect(config).await?;
//!     let result = service.lookup("example.kz").await?;
//!
//!     println!("Registrar: {}", result.registrar);
//!     println!("Expires: {}", result.expiration_date);
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod extractor;
pub mod lookup;
#[cfg(feature = "server")]
pub mod metrics;
pub mod origin;
pub mod store;

// Re-export main types for easy access
pub use cache::{MokaCache, VolatileCache};
pub use classifier::{Classification, ResponseClassifier};
pub use config::{Config, MarkerPolarity};
pub use errors::WhoisError;
pub use extractor::{ExtractedFields, FieldExtractor};
pub use lookup::{Lookup, LookupService, LookupSource};
pub use origin::{HttpOrigin, OriginClient, OriginResponse};
pub use store::{DurableStore, LookupRecord, SqliteStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fallback value for any field that could not be extracted.
pub const NOT_AVAILABLE: &str = "N/A";

/// Status reported when the origin says the domain is registered but its
/// page carries no structured WHOIS block.
pub const OCCUPIED_STATUS: &str = "occupied";

/// Name servers of a domain.
///
/// On the wire this keeps the shape clients already consume: a JSON array
/// when servers were found, the string `"N/A"` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NameServers {
    Present(Vec<String>),
    #[default]
    Absent,
}

impl NameServers {
    pub fn from_list(servers: Vec<String>) -> Self {
        if servers.is_empty() {
            NameServers::Absent
        } else {
            NameServers::Present(servers)
        }
    }

    /// Parse the comma-joined column form used by the durable store.
    pub fn from_joined(joined: &str) -> Self {
        if joined.trim() == NOT_AVAILABLE {
            return NameServers::Absent;
        }
        Self::from_list(
            joined
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn to_joined(&self) -> String {
        match self {
            NameServers::Present(servers) => servers.join(","),
            NameServers::Absent => NOT_AVAILABLE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn as_slice(&self) -> &[String] {
        match self {
            NameServers::Present(servers) => servers,
            NameServers::Absent => &[],
        }
    }
}

impl Serialize for NameServers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NameServers::Present(servers) => servers.serialize(serializer),
            NameServers::Absent => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl<'de> Deserialize<'de> for NameServers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            List(Vec<String>),
            Text(String),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::List(servers) => NameServers::from_list(servers),
            Wire::Text(text) => NameServers::from_joined(&text),
        })
    }
}

/// The canonical output of a lookup.
///
/// `timestamp` is only set on records read back from the durable store; the
/// cache representation never carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResult {
    pub domain_name: String,
    pub status: String,
    pub registrar: String,
    pub name_servers: NameServers,
    pub created_on: String,
    pub last_updated_on: String,
    pub expiration_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LookupResult {
    /// Result for a registered domain whose page had no structured block.
    pub fn occupied_placeholder(domain_name: &str) -> Self {
        Self {
            domain_name: domain_name.to_string(),
            status: OCCUPIED_STATUS.to_string(),
            registrar: NOT_AVAILABLE.to_string(),
            name_servers: NameServers::Absent,
            created_on: NOT_AVAILABLE.to_string(),
            last_updated_on: NOT_AVAILABLE.to_string(),
            expiration_date: NOT_AVAILABLE.to_string(),
            timestamp: None,
        }
    }

    pub fn from_fields(fields: ExtractedFields) -> Self {
        let or_na = |value: Option<String>| value.unwrap_or_else(|| NOT_AVAILABLE.to_string());

        Self {
            domain_name: fields.domain_name,
            status: fields.status,
            registrar: or_na(fields.registrar),
            name_servers: NameServers::from_list(fields.name_servers),
            created_on: or_na(fields.created_on),
            last_updated_on: or_na(fields.last_updated_on),
            expiration_date: or_na(fields.expiration_date),
            timestamp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_name_servers_wire_shape() {
        let present = NameServers::Present(vec!["ns1.example".into(), "ns2.example".into()]);
        assert_eq!(serde_json::to_value(&present).unwrap(), json!(["ns1.example", "ns2.example"]));
        assert_eq!(serde_json::to_value(NameServers::Absent).unwrap(), json!("N/A"));

        let parsed: NameServers = serde_json::from_value(json!("N/A")).unwrap();
        assert_eq!(parsed, NameServers::Absent);
        let parsed: NameServers = serde_json::from_value(json!([])).unwrap();
        assert_eq!(parsed, NameServers::Absent);
    }

    #[test]
    fn test_joined_column_form() {
        let servers = NameServers::from_joined("ns1.example, ns2.example");
        assert_eq!(servers.as_slice(), ["ns1.example", "ns2.example"]);
        assert_eq!(servers.to_joined(), "ns1.example,ns2.example");
        assert_eq!(NameServers::from_joined("N/A"), NameServers::Absent);
        assert_eq!(NameServers::Absent.to_joined(), "N/A");
    }

    #[test]
    fn test_placeholder_only_sets_status() {
        let result = LookupResult::occupied_placeholder("example.kz");
        assert_eq!(result.domain_name, "example.kz");
        assert_eq!(result.status, "occupied");
        assert_eq!(result.registrar, NOT_AVAILABLE);
        assert_eq!(result.name_servers, NameServers::Absent);
        assert_eq!(result.expiration_date, NOT_AVAILABLE);
    }

    #[test]
    fn test_cache_form_has_no_timestamp() {
        let value = serde_json::to_value(LookupResult::occupied_placeholder("example.kz")).unwrap();
        assert!(value.get("timestamp").is_none());
        assert_eq!(value["name_servers"], json!("N/A"));
    }
}
