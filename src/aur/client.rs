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

//! AUR RPC API client.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use super::{Envelope, PackageSummary, QueryType, RemoteIndex, SearchCandidate};
use crate::config::Config;
use crate::error::{AurbError, AurbResult};

/// AUR RPC client. Every call is a fresh request; callers decide how much
/// to run in parallel.
#[derive(Clone)]
pub struct AurClient {
    client: reqwest::Client,
    base_url: String,
}

impl AurClient {
    /// Create a client from the loaded configuration
    pub fn from_config(config: &Config) -> AurbResult<Self> {
        Self::with_settings(
            config.aur.rpc_url.clone(),
            &config.aur.user_agent,
            config.request_timeout(),
            config.connect_timeout(),
        )
    }

    /// Create a client with explicit endpoint and timeouts
    pub fn with_settings(
        base_url: String,
        user_agent: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> AurbResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(8)
            .user_agent(user_agent)
            .build()
            .map_err(|e| AurbError::from_reqwest(&base_url, e))?;

        Ok(Self { client, base_url })
    }

    /// The underlying HTTP client, shared with the downloader
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    fn query_url(&self, query: QueryType, arg: &str) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}v=5&type={}&arg={}",
            self.base_url,
            separator,
            query.as_str(),
            urlencoding::encode(arg)
        )
    }

    /// Send one query and decode the envelope. Anything that is not a
    /// decodable envelope is a transport failure.
    async fn fetch(&self, query: QueryType, arg: &str) -> AurbResult<Envelope> {
        let url = self.query_url(query, arg);
        debug!(%url, "querying AUR");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AurbError::from_reqwest(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AurbError::from_reqwest(&url, e))?;

        match Envelope::decode(&body, query) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => {
                Err(AurbError::transport(url, format!("HTTP {}", status)))
            }
            Err(e) => Err(AurbError::transport(url, format!("malformed response: {}", e))),
        }
    }
}

#[async_trait]
impl RemoteIndex for AurClient {
    async fn search(&self, term: &str) -> AurbResult<Vec<SearchCandidate>> {
        match self.fetch(QueryType::Search, term).await? {
            Envelope::SearchResults(mut candidates) => {
                candidates.sort_by(|a, b| a.name.cmp(&b.name));
                let mut seen = HashSet::new();
                candidates.retain(|c| seen.insert(c.id.clone()));
                debug!(term, count = candidates.len(), "search finished");
                Ok(candidates)
            }
            Envelope::Error(message) => Err(AurbError::query(message)),
            Envelope::InfoResult(_) => Err(AurbError::transport(
                self.query_url(QueryType::Search, term),
                "unexpected info payload for a search query",
            )),
        }
    }

    async fn info(&self, identifier: &str) -> AurbResult<PackageSummary> {
        match self.fetch(QueryType::Info, identifier).await? {
            Envelope::InfoResult(pkg) => Ok(pkg),
            Envelope::Error(message) => Err(AurbError::query(message)),
            Envelope::SearchResults(_) => Err(AurbError::transport(
                self.query_url(QueryType::Info, identifier),
                "unexpected search payload for an info query",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aur::PackageId;
    use mockito::{Matcher, Server};
    use std::io::Write;

    fn client_for(server: &Server) -> AurClient {
        AurClient::with_settings(
            format!("{}/rpc/", server.url()),
            "aurb-test",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn query(kind: &str, arg: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("v".into(), "5".into()),
            Matcher::UrlEncoded("type".into(), kind.into()),
            Matcher::UrlEncoded("arg".into(), arg.into()),
        ])
    }

    #[tokio::test]
    async fn test_search_sorts_by_name_and_drops_duplicate_ids() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rpc/")
            .match_query(query("search", "ruby aur"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "version": 5,
                    "type": "search",
                    "resultcount": 3,
                    "results": [
                        {"ID": 3, "Name": "zeta"},
                        {"ID": 1, "Name": "aurb"},
                        {"ID": "1", "Name": "aurb"}
                    ]
                }"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let results = client.search("ruby aur").await.unwrap();

        mock.assert_async().await;
        let names: Vec<_> = results.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["aurb", "zeta"]);
        assert_eq!(results[0].id, PackageId::new("1"));
    }

    #[tokio::test]
    async fn test_search_error_envelope_is_query_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/rpc/")
            .match_query(query("search", "zzzz"))
            .with_status(200)
            .with_body(r#"{"type": "error", "results": "No results found"}"#)
            .create_async()
            .await;

        let err = client_for(&server).search("zzzz").await.unwrap_err();
        match err {
            AurbError::Query { message } => assert_eq!(message, "No results found"),
            other => panic!("expected query error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_info_decodes_single_record() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/rpc/")
            .match_query(query("info", "aurb"))
            .with_status(200)
            .with_body(
                r#"{"version": 5, "type": "multiinfo", "resultcount": 1, "results": [
                    {"ID": 42, "Name": "aurb", "PackageBase": "aurb", "Version": "0.8.2.1",
                     "Description": "An AUR utility", "NumVotes": 12, "OutOfDate": null,
                     "Maintainer": "gigamo", "URL": "https://example.org/aurb"}
                ]}"#,
            )
            .create_async()
            .await;

        let pkg = client_for(&server).info("aurb").await.unwrap();
        assert_eq!(pkg.id, PackageId::new("42"));
        assert_eq!(pkg.version, "0.8.2.1");
        assert_eq!(pkg.description(), "An AUR utility");
        assert_eq!(pkg.num_votes, 12);
        assert_eq!(pkg.maintainer.as_deref(), Some("gigamo"));
    }

    #[tokio::test]
    async fn test_info_for_unknown_package_is_query_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/rpc/")
            .match_query(query("info", "missing"))
            .with_status(200)
            .with_body(r#"{"version": 5, "type": "multiinfo", "resultcount": 0, "results": []}"#)
            .create_async()
            .await;

        let err = client_for(&server).info("missing").await.unwrap_err();
        assert!(matches!(err, AurbError::Query { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_body_is_transport_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/rpc/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("this is not json")
            .create_async()
            .await;

        let err = client_for(&server).info("aurb").await.unwrap_err();
        assert!(matches!(err, AurbError::Transport { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_without_envelope_is_transport_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/rpc/")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("<html>Service Unavailable</html>")
            .create_async()
            .await;

        let err = client_for(&server).search("aurb").await.unwrap_err();
        match err {
            AurbError::Transport { message, .. } => assert!(message.contains("503")),
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = AurClient::with_settings(
            "http://127.0.0.1:1/rpc/".to_string(),
            "aurb-test",
            Duration::from_secs(2),
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client.search("aurb").await.unwrap_err();
        assert!(matches!(err, AurbError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/rpc/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_secs(1));
                w.write_all(br#"{"type":"search","resultcount":0,"results":[]}"#)
            })
            .create_async()
            .await;

        let client = AurClient::with_settings(
            format!("{}/rpc/", server.url()),
            "aurb-test",
            Duration::from_millis(200),
            Duration::from_secs(1),
        )
        .unwrap();

        let err = client.search("aurb").await.unwrap_err();
        assert!(matches!(err, AurbError::Transport { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_query_url_encodes_argument() {
        let client = AurClient::with_settings(
            "https://aur.archlinux.org/rpc/".to_string(),
            "aurb-test",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            client.query_url(QueryType::Search, "c++ & more"),
            "https://aur.archlinux.org/rpc/?v=5&type=search&arg=c%2B%2B%20%26%20more"
        );
    }
}
