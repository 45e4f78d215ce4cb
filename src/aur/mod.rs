/*
 * aurb - A small Arch User Repository client.
 * Copyright (C) 2025  aurb contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! AUR (Arch User Repository) support module.
//!
//! - RPC client for the `search` and `info` queries
//! - Search aggregation with bounded concurrent detail lookups
//! - Upgrade detection for installed foreign packages
//! - Snapshot download and unpacking

pub mod aggregate;
pub mod client;
pub mod download;
pub mod upgrade;

pub use aggregate::search_and_filter;
pub use client::AurClient;
pub use download::Downloader;
pub use upgrade::{check_upgrades, parse_installed, InstalledPackage};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::error::AurbResult;

/// Remote package identifier. Older RPC versions send it as a string,
/// newer ones as an integer; both end up as the same text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(from = "RawId")]
pub struct PackageId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl From<RawId> for PackageId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => PackageId(n.to_string()),
            RawId::Text(s) => PackageId(s),
        }
    }
}

#[cfg(test)]
impl PackageId {
    pub fn new(id: impl Into<String>) -> Self {
        PackageId(id.into())
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimal record from a search response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchCandidate {
    #[serde(rename = "ID")]
    pub id: PackageId,
    pub name: String,
}

/// Package details from an info response
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageSummary {
    #[serde(rename = "ID")]
    pub id: PackageId,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub package_base: Option<String>,
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
    #[serde(default)]
    pub num_votes: u32,
    #[serde(default)]
    pub out_of_date: Option<u64>,
    #[serde(default)]
    pub maintainer: Option<String>,
}

impl PackageSummary {
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// Package base, which names the snapshot archive. Falls back to the
    /// package name for payloads that do not carry it.
    pub fn base(&self) -> &str {
        self.package_base.as_deref().unwrap_or(&self.name)
    }

    /// True if the name or description contains any of `terms` verbatim.
    /// Case-sensitive, no trimming.
    pub fn matches_any<S: AsRef<str>>(&self, terms: &[S]) -> bool {
        terms.iter().any(|term| {
            let term = term.as_ref();
            self.name.contains(term) || self.description().contains(term)
        })
    }

    /// Snapshot download URL built from a `{name}` template
    pub fn snapshot_url(&self, template: &str) -> String {
        template.replace("{name}", &urlencoding::encode(self.base()))
    }
}

/// Which RPC operation a response answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Search,
    Info,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Search => "search",
            QueryType::Info => "info",
        }
    }
}

/// AUR RPC API response wrapper, straight off the wire
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    response_type: String,
    #[serde(default)]
    results: Value,
    #[serde(default)]
    error: Option<String>,
}

/// A decoded RPC response. The `type` field decides the variant here so that
/// nothing downstream has to look at raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Error(String),
    SearchResults(Vec<SearchCandidate>),
    InfoResult(PackageSummary),
}

impl Envelope {
    /// Decode a response body for the given query type. A JSON error here
    /// means the body is not an envelope at all.
    pub fn decode(body: &str, query: QueryType) -> Result<Self, serde_json::Error> {
        let raw: RawEnvelope = serde_json::from_str(body)?;

        if raw.response_type == "error" {
            let message = match (raw.error, raw.results) {
                (Some(message), _) => message,
                (None, Value::String(message)) => message,
                (None, Value::Null) => "unknown error".to_string(),
                (None, other) => other.to_string(),
            };
            return Ok(Envelope::Error(message));
        }

        match query {
            QueryType::Search => {
                let candidates = match raw.results {
                    Value::Null => Vec::new(),
                    results => serde_json::from_value(results)?,
                };
                Ok(Envelope::SearchResults(candidates))
            }
            QueryType::Info => match raw.results {
                Value::Array(mut items) => {
                    if items.is_empty() {
                        Ok(Envelope::Error("package not found".to_string()))
                    } else {
                        let first = items.swap_remove(0);
                        Ok(Envelope::InfoResult(serde_json::from_value(first)?))
                    }
                }
                Value::Null => Ok(Envelope::Error("package not found".to_string())),
                results => Ok(Envelope::InfoResult(serde_json::from_value(results)?)),
            },
        }
    }
}

/// The two queries the AUR answers. Implemented over HTTP by [`AurClient`];
/// tests substitute an in-memory index.
#[async_trait]
pub trait RemoteIndex: Send + Sync {
    /// Fuzzy search; candidates sorted by name, one per identifier
    async fn search(&self, term: &str) -> AurbResult<Vec<SearchCandidate>>;

    /// Full details for one package
    async fn info(&self, identifier: &str) -> AurbResult<PackageSummary>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_search() {
        let body = r#"{
            "version": 5,
            "type": "search",
            "resultcount": 2,
            "results": [
                {"ID": 1001, "Name": "aurb", "Version": "0.8.2.1"},
                {"ID": "1002", "Name": "aurb-git"}
            ]
        }"#;

        let envelope = Envelope::decode(body, QueryType::Search).unwrap();
        assert_eq!(
            envelope,
            Envelope::SearchResults(vec![
                SearchCandidate {
                    id: PackageId::new("1001"),
                    name: "aurb".to_string()
                },
                SearchCandidate {
                    id: PackageId::new("1002"),
                    name: "aurb-git".to_string()
                },
            ])
        );
    }

    #[test]
    fn test_decode_error_envelope() {
        let legacy = r#"{"type": "error", "results": "No results found"}"#;
        assert_eq!(
            Envelope::decode(legacy, QueryType::Search).unwrap(),
            Envelope::Error("No results found".to_string())
        );

        let v5 = r#"{"version": 5, "type": "error", "resultcount": 0, "results": [], "error": "Too many package results."}"#;
        assert_eq!(
            Envelope::decode(v5, QueryType::Info).unwrap(),
            Envelope::Error("Too many package results.".to_string())
        );
    }

    #[test]
    fn test_decode_info_object_and_array() {
        let object = r#"{"type": "info", "results": {"ID": "7", "Name": "foo", "Version": "1.0-1", "Description": null}}"#;
        let array = r#"{"type": "multiinfo", "results": [{"ID": 7, "Name": "foo", "Version": "1.0-1", "PackageBase": "foo-base"}]}"#;

        match Envelope::decode(object, QueryType::Info).unwrap() {
            Envelope::InfoResult(pkg) => {
                assert_eq!(pkg.id, PackageId::new("7"));
                assert_eq!(pkg.description(), "");
                assert_eq!(pkg.base(), "foo");
            }
            other => panic!("unexpected envelope: {:?}", other),
        }

        match Envelope::decode(array, QueryType::Info).unwrap() {
            Envelope::InfoResult(pkg) => {
                assert_eq!(pkg.version, "1.0-1");
                assert_eq!(pkg.base(), "foo-base");
            }
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn test_decode_info_empty_is_not_found() {
        let body = r#"{"version": 5, "type": "multiinfo", "resultcount": 0, "results": []}"#;
        assert_eq!(
            Envelope::decode(body, QueryType::Info).unwrap(),
            Envelope::Error("package not found".to_string())
        );
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Envelope::decode("<html>502 Bad Gateway</html>", QueryType::Search).is_err());
        assert!(Envelope::decode(r#"{"results": []}"#, QueryType::Search).is_err());
    }

    #[test]
    fn test_matches_any_is_literal() {
        let pkg = testing::summary(1, "ruby-aurb", "0.1", "A Ruby AUR utility");
        assert!(pkg.matches_any(&["aurb"]));
        assert!(pkg.matches_any(&["nothing", "Ruby AUR"]));
        assert!(!pkg.matches_any(&["AURB"]));
        assert!(!pkg.matches_any(&[" aurb"]));
        assert!(!pkg.matches_any::<&str>(&[]));
    }

    #[test]
    fn test_snapshot_url() {
        let mut pkg = testing::summary(1, "test-pkg", "1.0.0", "");
        pkg.package_base = Some("test-pkg-base".to_string());
        assert_eq!(
            pkg.snapshot_url("https://aur.archlinux.org/cgit/aur.git/snapshot/{name}.tar.gz"),
            "https://aur.archlinux.org/cgit/aur.git/snapshot/test-pkg-base.tar.gz"
        );
    }
}
