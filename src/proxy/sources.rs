//! Proxy discovery sources.
//!
//! A source is a URL returning raw proxy-list text. Sources are fetched in
//! shuffled order during a refresh; a failing source is retried with
//! backoff, then logged and skipped so the rest of the refresh proceeds.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio_retry::Retry;

use crate::error_handling::{get_retry_strategy, PoolError};

use super::record::{ProxyKind, ProxyRecord};

/// One discovery source: a short tag (used for logging and kind inference)
/// plus the URL that serves the list.
#[derive(Debug, Clone)]
pub struct ProxySource {
    /// Short identifier, e.g. `"proxyscrape-http"`
    pub name: String,
    /// URL returning raw proxy-list text
    pub url: String,
}

impl ProxySource {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        ProxySource {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// The built-in public source list.
pub fn default_sources() -> Vec<ProxySource> {
    vec![
        ProxySource::new(
            "proxyscrape-http",
            "https://api.proxyscrape.com/v2/?request=displayproxies&protocol=http&timeout=10000",
        ),
        ProxySource::new(
            "speedx-http",
            "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt",
        ),
        ProxySource::new(
            "speedx-socks5",
            "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/socks5.txt",
        ),
        ProxySource::new(
            "clarketm-raw",
            "https://raw.githubusercontent.com/clarketm/proxy-list/master/proxy-list-raw.txt",
        ),
    ]
}

/// Last-resort proxies used when every source fails.
///
/// These are long-lived community endpoints; they are handed to validation
/// like any other candidate, so a dead entry costs one test, nothing more.
pub fn emergency_proxies() -> Vec<ProxyRecord> {
    [
        ("165.225.8.74", 10605, ProxyKind::Http),
        ("138.68.60.8", 8080, ProxyKind::Http),
        ("184.178.172.18", 15280, ProxyKind::Socks5),
        ("192.111.139.163", 19404, ProxyKind::Socks5),
    ]
    .into_iter()
    .map(|(host, port, kind)| ProxyRecord::new(host, port, kind).with_source_tag("emergency"))
    .collect()
}

/// Fetches one source's raw text, retrying transient failures with
/// exponential backoff.
///
/// # Errors
///
/// Returns `PoolError::SourceFetch` once the retry budget is exhausted.
pub async fn fetch_source(
    client: &Arc<reqwest::Client>,
    source: &ProxySource,
    timeout: Duration,
) -> Result<String, PoolError> {
    let attempt = || async {
        let response = client
            .get(&source.url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        response.text().await
    };

    match Retry::spawn(get_retry_strategy(), attempt).await {
        Ok(text) => {
            debug!(
                "Source '{}' returned {} bytes",
                source.name,
                text.len()
            );
            Ok(text)
        }
        Err(e) => {
            warn!("Source '{}' failed after retries: {}", source.name, e);
            Err(PoolError::SourceFetch {
                source_name: source.name.clone(),
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sources_have_distinct_names() {
        use std::collections::HashSet;
        let sources = default_sources();
        let names: HashSet<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), sources.len());
    }

    #[test]
    fn test_emergency_proxies_are_tagged() {
        let proxies = emergency_proxies();
        assert!(!proxies.is_empty());
        for proxy in &proxies {
            assert_eq!(proxy.source_tag, "emergency");
            assert!(!proxy.working, "emergency entries still need validation");
        }
    }

    #[tokio::test]
    async fn test_fetch_source_against_mock_server() {
        use httptest::{matchers::*, responders::*, Expectation, Server};

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/list.txt"))
                .respond_with(status_code(200).body("1.2.3.4:8080\n5.6.7.8:3128\n")),
        );

        let client = Arc::new(reqwest::Client::new());
        let source = ProxySource::new("mock", server.url("/list.txt").to_string());
        let text = fetch_source(&client, &source, Duration::from_secs(5))
            .await
            .expect("fetch should succeed");
        assert!(text.contains("1.2.3.4:8080"));
    }

    #[tokio::test]
    async fn test_fetch_source_surfaces_failure() {
        use httptest::{matchers::*, responders::*, Expectation, Server};

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/list.txt"))
                .times(1..)
                .respond_with(status_code(500)),
        );

        let client = Arc::new(reqwest::Client::new());
        let source = ProxySource::new("mock", server.url("/list.txt").to_string());
        let result = fetch_source(&client, &source, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(PoolError::SourceFetch { .. })));
    }
}
