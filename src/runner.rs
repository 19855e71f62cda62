//! Session execution contract.
//!
//! The scheduler drives session execution through the [`SessionRunner`]
//! trait and never learns what a session actually does. Two operations
//! matter to it: `run` (any error means the attempt failed) and
//! `list_active` (a point-in-time status query the completion watch polls,
//! since runners expose no completion event).
//!
//! [`HttpProbeRunner`] is the reference implementation used by the binary:
//! one GET of the session target through the assigned proxy.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;

use crate::batch::SessionConfig;
use crate::proxy::ProxyRecord;

/// A session the runner currently considers in flight.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    /// Session id
    pub id: String,
    /// Runner-defined status label
    pub status: String,
}

/// Executes sessions on behalf of the scheduler.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    /// Runs one attempt of a session through the given proxy.
    ///
    /// # Errors
    ///
    /// Any error is treated by the scheduler as attempt failure and fed to
    /// the retry policy.
    async fn run(
        &self,
        session_id: &str,
        config: &SessionConfig,
        proxy: &ProxyRecord,
    ) -> Result<String>;

    /// Point-in-time list of sessions the runner still considers active.
    async fn list_active(&self) -> Vec<ActiveSession>;
}

/// Reference runner: performs a single GET of the session target through
/// the assigned proxy, presenting the session's User-Agent.
pub struct HttpProbeRunner {
    timeout: Duration,
    active: Mutex<HashMap<String, String>>,
}

impl HttpProbeRunner {
    /// Creates a probe runner with the given per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        HttpProbeRunner {
            timeout,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn set_active(&self, session_id: &str, status: &str) {
        self.active
            .lock()
            .expect("active map poisoned")
            .insert(session_id.to_string(), status.to_string());
    }

    fn clear_active(&self, session_id: &str) {
        self.active
            .lock()
            .expect("active map poisoned")
            .remove(session_id);
    }
}

#[async_trait]
impl SessionRunner for HttpProbeRunner {
    async fn run(
        &self,
        session_id: &str,
        config: &SessionConfig,
        proxy: &ProxyRecord,
    ) -> Result<String> {
        self.set_active(session_id, "probing");
        let result = probe(config, proxy, self.timeout).await;
        self.clear_active(session_id);
        result
    }

    async fn list_active(&self) -> Vec<ActiveSession> {
        self.active
            .lock()
            .expect("active map poisoned")
            .iter()
            .map(|(id, status)| ActiveSession {
                id: id.clone(),
                status: status.clone(),
            })
            .collect()
    }
}

async fn probe(config: &SessionConfig, proxy: &ProxyRecord, timeout: Duration) -> Result<String> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(config.user_agent.clone());

    if let Some(url) = proxy.proxy_url() {
        builder = builder.proxy(reqwest::Proxy::all(&url).context("Invalid proxy URL")?);
    }

    let client = builder.build().context("Failed to build probe client")?;
    let response = client
        .get(&config.target_url)
        .send()
        .await
        .context("Probe request failed")?
        .error_for_status()
        .context("Probe target returned an error status")?;

    let status = response.status();
    let bytes = response.bytes().await.map(|b| b.len()).unwrap_or(0);
    debug!(
        "Probe of {} via {} -> HTTP {} ({} bytes)",
        config.target_url,
        proxy.describe(),
        status,
        bytes
    );
    Ok(format!("HTTP {} ({} bytes)", status.as_u16(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyKind;
    use httptest::{matchers::*, responders::*, Expectation, Server};

    fn probe_config(target: String) -> SessionConfig {
        SessionConfig {
            target_url: target,
            user_agent: crate::user_agent::default_user_agent().into(),
            kind_preference: ProxyKind::Http,
            max_retries: 0,
            retry_delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_probe_direct_success() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/"))
                .respond_with(status_code(200).body("hello")),
        );

        let runner = HttpProbeRunner::new(Duration::from_secs(5));
        let config = probe_config(server.url("/").to_string());
        let result = runner
            .run("s1", &config, &ProxyRecord::direct())
            .await
            .unwrap();
        assert!(result.contains("HTTP 200"));
        assert!(runner.list_active().await.is_empty(), "cleared after run");
    }

    #[tokio::test]
    async fn test_probe_error_status_fails_attempt() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/"))
                .respond_with(status_code(503)),
        );

        let runner = HttpProbeRunner::new(Duration::from_secs(5));
        let config = probe_config(server.url("/").to_string());
        let result = runner.run("s1", &config, &ProxyRecord::direct()).await;
        assert!(result.is_err());
        assert!(runner.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_probe_routes_through_http_proxy() {
        // An HTTP proxy receives the absolute URL; a plain server observing
        // a GET for it behaves exactly like a forward proxy for this test.
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("GET"))
                .respond_with(status_code(200).body("proxied")),
        );

        let addr = server.addr();
        let proxy = ProxyRecord::new(addr.ip().to_string(), addr.port(), ProxyKind::Http);
        let runner = HttpProbeRunner::new(Duration::from_secs(5));
        let config = probe_config("http://target.invalid/".into());
        let result = runner.run("s1", &config, &proxy).await.unwrap();
        assert!(result.contains("HTTP 200"));
    }
}
