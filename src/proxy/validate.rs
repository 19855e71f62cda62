//! Live proxy validation.
//!
//! A proxy is validated by a real round-trip through it against a short
//! ordered list of known-reachable endpoints, stopping at the first
//! success. Batch validation runs in fixed-width waves with a pause
//! between waves so the test endpoints are not hammered.

use std::time::{Duration, Instant};

use futures::future::join_all;
use log::{debug, info};

use crate::config::{
    PROXY_TEST_TIMEOUT, RETEST_BACKOFF, SPEED_CEILING, VALIDATION_WAVE_WIDTH, WAVE_PAUSE,
};

use super::record::ProxyRecord;

/// Endpoints a proxy is tested against, in order. All cheap, all plain
/// HTTP so SOCKS and HTTP proxies are exercised the same way.
pub const TEST_ENDPOINTS: &[&str] = &[
    "http://www.gstatic.com/generate_204",
    "http://detectportal.firefox.com/success.txt",
    "http://example.com/",
];

/// Tuning knobs for validation; defaults mirror the config constants.
#[derive(Debug, Clone)]
pub struct ValidationSettings {
    /// Per-endpoint request timeout
    pub test_timeout: Duration,
    /// Round-trips slower than this leave the proxy unusable
    pub speed_ceiling: Duration,
    /// Skip proxies that failed a test more recently than this
    pub retest_backoff: Duration,
    /// Proxies tested concurrently per wave
    pub wave_width: usize,
    /// Pause between waves
    pub wave_pause: Duration,
    /// Endpoints to test against (ordered)
    pub endpoints: Vec<String>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        ValidationSettings {
            test_timeout: PROXY_TEST_TIMEOUT,
            speed_ceiling: SPEED_CEILING,
            retest_backoff: RETEST_BACKOFF,
            wave_width: VALIDATION_WAVE_WIDTH,
            wave_pause: WAVE_PAUSE,
            endpoints: TEST_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Tests a single proxy, mutating its health state in place.
///
/// Named (gateway/extension) records have nothing to dial; they are marked
/// working without a round-trip. Recently failed records are skipped so a
/// flapping proxy cannot trigger a retry storm.
pub async fn test_one(record: &mut ProxyRecord, settings: &ValidationSettings) {
    if record.kind.is_named() {
        record.mark_working(Duration::ZERO, settings.speed_ceiling);
        return;
    }

    if record.recently_failed(settings.retest_backoff) {
        debug!("Skipping recently failed proxy {}", record.describe());
        return;
    }

    let Some(proxy_url) = record.proxy_url() else {
        record.mark_failed();
        return;
    };

    let client = match reqwest::Proxy::all(&proxy_url)
        .map_err(anyhow::Error::from)
        .and_then(|proxy| {
            reqwest::Client::builder()
                .proxy(proxy)
                .timeout(settings.test_timeout)
                .build()
                .map_err(anyhow::Error::from)
        }) {
        Ok(client) => client,
        Err(e) => {
            debug!("Proxy {} rejected by client builder: {}", record.describe(), e);
            record.mark_failed();
            return;
        }
    };

    let started = Instant::now();
    for endpoint in &settings.endpoints {
        match client.get(endpoint).send().await {
            Ok(response) if response.status().is_success() => {
                let elapsed = started.elapsed();
                record.mark_working(elapsed, settings.speed_ceiling);
                debug!(
                    "Proxy {} ok via {} in {}ms (working={})",
                    record.describe(),
                    endpoint,
                    elapsed.as_millis(),
                    record.working
                );
                return;
            }
            Ok(response) => {
                debug!(
                    "Proxy {} got HTTP {} from {}",
                    record.describe(),
                    response.status(),
                    endpoint
                );
            }
            Err(e) => {
                debug!("Proxy {} failed {}: {}", record.describe(), endpoint, e);
            }
        }
    }

    record.mark_failed();
}

/// Validates a batch of proxies in fixed-width waves.
///
/// Individual test failures never abort the batch; results are aggregated
/// at the end. Returns the records with their health state updated.
pub async fn test_batch(
    records: Vec<ProxyRecord>,
    settings: &ValidationSettings,
) -> Vec<ProxyRecord> {
    let total = records.len();
    let mut tested: Vec<ProxyRecord> = Vec::with_capacity(total);
    let wave_width = settings.wave_width.max(1);

    let mut remaining = records;
    let mut wave_index = 0usize;
    while !remaining.is_empty() {
        let split = remaining.len().min(wave_width);
        let wave: Vec<ProxyRecord> = remaining.drain(..split).collect();

        let futures = wave.into_iter().map(|mut record| async move {
            test_one(&mut record, settings).await;
            record
        });
        let mut results = join_all(futures).await;
        tested.append(&mut results);

        wave_index += 1;
        if !remaining.is_empty() {
            tokio::time::sleep(settings.wave_pause).await;
        }
    }

    let working = tested.iter().filter(|r| r.working).count();
    info!(
        "Validated {} proxies in {} waves: {} working",
        total, wave_index, working
    );
    tested
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::record::ProxyKind;

    fn fast_settings(endpoint: String) -> ValidationSettings {
        ValidationSettings {
            test_timeout: Duration::from_secs(2),
            speed_ceiling: Duration::from_secs(2),
            retest_backoff: Duration::from_secs(300),
            wave_width: 4,
            wave_pause: Duration::from_millis(10),
            endpoints: vec![endpoint],
        }
    }

    #[tokio::test]
    async fn test_named_kinds_pass_without_network() {
        let settings = ValidationSettings::default();
        let mut record = ProxyRecord::named(ProxyKind::Gateway, "eu-west");
        test_one(&mut record, &settings).await;
        assert!(record.working);
        assert!(record.last_tested.is_some());
    }

    #[tokio::test]
    async fn test_recently_failed_proxy_is_skipped() {
        let settings = fast_settings("http://127.0.0.1:1/".into());
        let mut record = ProxyRecord::new("127.0.0.1", 1, ProxyKind::Http);
        record.mark_failed();
        let tested_at = record.last_tested;

        test_one(&mut record, &settings).await;
        assert_eq!(record.last_tested, tested_at, "no retest within backoff");
    }

    #[tokio::test]
    async fn test_unreachable_proxy_marked_failed() {
        // Port 1 on localhost refuses connections immediately.
        let settings = fast_settings("http://example.com/".into());
        let mut record = ProxyRecord::new("127.0.0.1", 1, ProxyKind::Http);
        test_one(&mut record, &settings).await;
        assert!(!record.working);
        assert!(record.last_tested.is_some());
    }

    #[tokio::test]
    async fn test_batch_aggregates_all_records() {
        let settings = fast_settings("http://127.0.0.1:1/".into());
        let records: Vec<ProxyRecord> = (1..=10)
            .map(|i| ProxyRecord::new("127.0.0.1", i, ProxyKind::Http))
            .collect();

        let tested = test_batch(records, &settings).await;
        assert_eq!(tested.len(), 10, "failures never drop records");
    }
}
