//! The proxy pool: discovery, caching, rotation, health.
//!
//! The pool owns three independently bounded collections (fresh host:port
//! proxies, named gateways, named extensions), a per-consumer round-robin
//! cursor map, and aggregate stats. Collection replacement is
//! copy-then-swap behind an `RwLock`: an `acquire` during a refresh sees
//! either the old collection or the fully-new one, never a partial state.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{
    CACHE_TTL, CURSOR_TTL, EXTENSION_POOL_CAP, FRESH_POOL_CAP, GATEWAY_POOL_CAP,
    MIN_WORKING_PROXIES, SOURCE_FETCH_TIMEOUT,
};
use crate::error_handling::{ErrorType, EventStats, InfoType, PoolError};

use super::cache::{self, PoolCache};
use super::parse::parse_source_text;
use super::record::{ProxyKind, ProxyRecord};
use super::sources::{default_sources, emergency_proxies, fetch_source, ProxySource};
use super::validate::{test_batch, ValidationSettings};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Discovery sources, fetched in shuffled order on refresh
    pub sources: Vec<ProxySource>,
    /// Symbolic gateway names configured for this deployment
    pub gateway_names: Vec<String>,
    /// Symbolic extension names configured for this deployment
    pub extension_names: Vec<String>,
    /// Cap on the fresh collection
    pub fresh_cap: usize,
    /// Cap on the gateway collection
    pub gateway_cap: usize,
    /// Cap on the extension collection
    pub extension_cap: usize,
    /// Cache file location; `None` disables persistence
    pub cache_path: Option<PathBuf>,
    /// Cache freshness window
    pub cache_ttl: Duration,
    /// Round-robin cursors unseen for this long are evicted
    pub cursor_ttl: Duration,
    /// Minimum working proxies a cache hit or health check requires
    pub min_working: usize,
    /// Per-source fetch timeout
    pub source_timeout: Duration,
    /// Validation tuning
    pub validation: ValidationSettings,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            sources: default_sources(),
            gateway_names: Vec::new(),
            extension_names: Vec::new(),
            fresh_cap: FRESH_POOL_CAP,
            gateway_cap: GATEWAY_POOL_CAP,
            extension_cap: EXTENSION_POOL_CAP,
            cache_path: None,
            cache_ttl: CACHE_TTL,
            cursor_ttl: CURSOR_TTL,
            min_working: MIN_WORKING_PROXIES,
            source_timeout: SOURCE_FETCH_TIMEOUT,
            validation: ValidationSettings::default(),
        }
    }
}

/// Point-in-time pool stats for reporting.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStatsSnapshot {
    /// Candidates seen by the last refresh
    pub fetched: usize,
    /// Working proxies currently held
    pub working: usize,
    /// Working / tested ratio of the last refresh
    pub last_success_rate: f64,
    /// Wall time of the last refresh in milliseconds
    pub last_fetch_ms: u64,
}

struct PoolStats {
    fetched: AtomicUsize,
    working: AtomicUsize,
    success_rate_bits: AtomicU64,
    last_fetch_ms: AtomicU64,
}

impl PoolStats {
    fn new() -> Self {
        PoolStats {
            fetched: AtomicUsize::new(0),
            working: AtomicUsize::new(0),
            success_rate_bits: AtomicU64::new(0f64.to_bits()),
            last_fetch_ms: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            fetched: self.fetched.load(Ordering::SeqCst),
            working: self.working.load(Ordering::SeqCst),
            last_success_rate: f64::from_bits(self.success_rate_bits.load(Ordering::SeqCst)),
            last_fetch_ms: self.last_fetch_ms.load(Ordering::SeqCst),
        }
    }
}

/// The three bounded collections plus the refresh timestamp.
#[derive(Default)]
struct Collections {
    fresh: Vec<ProxyRecord>,
    gateway: Vec<ProxyRecord>,
    extension: Vec<ProxyRecord>,
    last_refresh: Option<DateTime<Utc>>,
}

impl Collections {
    fn working_count(&self) -> usize {
        self.fresh
            .iter()
            .chain(self.gateway.iter())
            .chain(self.extension.iter())
            .filter(|p| p.working)
            .count()
    }
}

struct CursorEntry {
    per_kind: HashMap<ProxyKind, usize>,
    last_seen: Instant,
}

/// Rotating, health-checked proxy pool.
pub struct ProxyPool {
    config: PoolConfig,
    client: Arc<reqwest::Client>,
    state: RwLock<Collections>,
    cursors: Mutex<HashMap<String, CursorEntry>>,
    stats: PoolStats,
    events: Arc<EventStats>,
}

impl ProxyPool {
    /// Creates an empty pool.
    ///
    /// # Errors
    ///
    /// Fails only if the discovery HTTP client cannot be built.
    pub fn new(config: PoolConfig, events: Arc<EventStats>) -> Result<Self, PoolError> {
        let client = reqwest::Client::builder()
            .timeout(config.source_timeout)
            .build()?;

        Ok(ProxyPool {
            config,
            client: Arc::new(client),
            state: RwLock::new(Collections::default()),
            cursors: Mutex::new(HashMap::new()),
            stats: PoolStats::new(),
            events,
        })
    }

    /// Number of working proxies across all collections.
    pub async fn working_count(&self) -> usize {
        self.state.read().await.working_count()
    }

    /// When the pool content was last refreshed (live or from cache).
    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_refresh
    }

    /// Aggregate stats snapshot.
    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }

    /// Refreshes the pool.
    ///
    /// A non-expired cache with enough working proxies satisfies the
    /// refresh without network discovery. Otherwise every configured
    /// source is fetched (shuffled order, failures logged and skipped),
    /// candidates are deduplicated and validated in waves, and the
    /// surviving records replace the collections copy-then-swap.
    ///
    /// Returns the number of working proxies now held.
    ///
    /// # Errors
    ///
    /// `PoolError::NoProxiesFound` when every source failed or returned
    /// nothing. Callers fall back to [`ProxyPool::refresh_or_fallback`]
    /// semantics or direct mode.
    pub async fn refresh(&self) -> Result<usize, PoolError> {
        if let Some(working) = self.try_cache().await {
            return Ok(working);
        }
        self.discover().await
    }

    /// Like [`ProxyPool::refresh`], but on `NoProxiesFound` validates the
    /// hardcoded emergency list instead of failing. The pool may still end
    /// up empty (emergency proxies are validated like any others), in
    /// which case `acquire` serves the direct pseudo-proxy.
    pub async fn refresh_or_fallback(&self) -> usize {
        match self.refresh().await {
            Ok(working) => working,
            Err(PoolError::NoProxiesFound) => {
                warn!("All proxy sources empty; falling back to emergency list");
                self.events.increment_info(InfoType::EmergencyFallback);
                self.install_candidates(emergency_proxies(), Instant::now())
                    .await
            }
            Err(e) => {
                warn!("Proxy refresh failed: {}", e);
                0
            }
        }
    }

    /// Serves the refresh from the cache file if it is fresh enough and
    /// holds enough working proxies.
    async fn try_cache(&self) -> Option<usize> {
        let path = self.config.cache_path.as_ref()?;
        let cached = cache::load(path, self.config.cache_ttl).await?;

        let working = cached.working_count();
        if working < self.config.min_working {
            debug!(
                "Pool cache holds {} working proxies (< {}), refreshing live",
                working, self.config.min_working
            );
            return None;
        }

        let mut fresh = cached.fresh_proxies;
        let mut gateway = cached.gateway_proxies;
        fresh.truncate(self.config.fresh_cap);
        gateway.truncate(self.config.gateway_cap);
        let extension = self.named_records(ProxyKind::Extension);

        let mut state = self.state.write().await;
        state.fresh = fresh;
        state.gateway = gateway;
        state.extension = extension;
        state.last_refresh = cached.last_update;
        let working = state.working_count();
        drop(state);

        self.stats.working.store(working, Ordering::SeqCst);
        self.events.increment_info(InfoType::CacheHit);
        info!("Proxy pool restored from cache: {} working", working);
        Some(working)
    }

    /// Full network discovery: fetch, parse, dedup, validate, swap, persist.
    async fn discover(&self) -> Result<usize, PoolError> {
        let started = Instant::now();

        let mut sources = self.config.sources.clone();
        sources.shuffle(&mut rand::rng());

        let fetches = sources.iter().map(|source| {
            let client = Arc::clone(&self.client);
            let timeout = self.config.source_timeout;
            async move {
                let text = fetch_source(&client, source, timeout).await?;
                Ok::<(String, String), PoolError>((source.name.clone(), text))
            }
        });

        let mut candidates: Vec<ProxyRecord> = Vec::new();
        for result in join_all(fetches).await {
            match result {
                Ok((name, text)) => {
                    let parsed = parse_source_text(&text, &name);
                    debug!("Source '{}' parsed into {} candidates", name, parsed.len());
                    candidates.extend(parsed);
                }
                Err(e) => {
                    // One failing source must not abort the refresh.
                    warn!("{}", e);
                    self.events.increment_error(ErrorType::SourceFetchError);
                }
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        candidates.retain(|record| seen.insert(record.key()));

        if candidates.is_empty() {
            return Err(PoolError::NoProxiesFound);
        }

        // Carry health history across cycles, so the retest backoff applies
        // to proxies that already failed in the previous refresh.
        {
            let state = self.state.read().await;
            let known: HashMap<String, &ProxyRecord> = state
                .fresh
                .iter()
                .chain(state.gateway.iter())
                .chain(state.extension.iter())
                .map(|record| (record.key(), record))
                .collect();
            for candidate in candidates.iter_mut() {
                if let Some(prev) = known.get(&candidate.key()) {
                    candidate.working = prev.working;
                    candidate.last_tested = prev.last_tested;
                    candidate.response_time_ms = prev.response_time_ms;
                    candidate.use_count = prev.use_count;
                    candidate.last_used = prev.last_used;
                }
            }
        }

        candidates.extend(self.named_records(ProxyKind::Gateway));
        candidates.extend(self.named_records(ProxyKind::Extension));

        Ok(self.install_candidates(candidates, started).await)
    }

    /// Validates candidates and swaps the surviving records in. Returns
    /// the new working count.
    async fn install_candidates(&self, candidates: Vec<ProxyRecord>, started: Instant) -> usize {
        let fetched = candidates.len();
        let tested = test_batch(candidates, &self.config.validation).await;

        let failures = tested.iter().filter(|r| !r.working).count();
        for _ in 0..failures {
            self.events.increment_error(ErrorType::ProxyTestFailure);
        }

        let mut fresh: Vec<ProxyRecord> = Vec::new();
        let mut gateway: Vec<ProxyRecord> = Vec::new();
        let mut extension: Vec<ProxyRecord> = Vec::new();
        for record in tested.into_iter().filter(|r| r.working) {
            match record.kind {
                ProxyKind::Gateway => gateway.push(record),
                ProxyKind::Extension => extension.push(record),
                ProxyKind::Direct => {}
                _ => fresh.push(record),
            }
        }

        // Fastest first, then clamp to the caps.
        for collection in [&mut fresh, &mut gateway, &mut extension] {
            collection.sort_by_key(|r| r.response_time_ms.unwrap_or(u64::MAX));
        }
        fresh.truncate(self.config.fresh_cap);
        gateway.truncate(self.config.gateway_cap);
        extension.truncate(self.config.extension_cap);

        let working = fresh.len() + gateway.len() + extension.len();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let success_rate = if fetched > 0 {
            working as f64 / fetched as f64
        } else {
            0.0
        };

        let now = Utc::now();
        let snapshot = PoolCache {
            fresh_proxies: fresh.clone(),
            gateway_proxies: gateway.clone(),
            last_update: Some(now),
            saved_at: now,
        };

        {
            let mut state = self.state.write().await;
            state.fresh = fresh;
            state.gateway = gateway;
            state.extension = extension;
            state.last_refresh = Some(now);
        }
        self.evict_stale_cursors();

        self.stats.fetched.store(fetched, Ordering::SeqCst);
        self.stats.working.store(working, Ordering::SeqCst);
        self.stats
            .success_rate_bits
            .store(success_rate.to_bits(), Ordering::SeqCst);
        self.stats.last_fetch_ms.store(elapsed_ms, Ordering::SeqCst);

        if let Some(path) = &self.config.cache_path {
            if let Err(e) = cache::save(path, &snapshot).await {
                warn!("Failed to persist pool cache: {}", e);
                self.events.increment_error(ErrorType::CacheWriteError);
            }
        }

        info!(
            "Proxy refresh complete: {}/{} working in {}ms",
            working, fetched, elapsed_ms
        );
        working
    }

    /// Named records declared in the pool config for the given kind.
    fn named_records(&self, kind: ProxyKind) -> Vec<ProxyRecord> {
        let names = match kind {
            ProxyKind::Gateway => &self.config.gateway_names,
            ProxyKind::Extension => &self.config.extension_names,
            _ => return Vec::new(),
        };
        names
            .iter()
            .map(|name| {
                let mut record = ProxyRecord::named(kind, name.clone());
                record.mark_working(Duration::ZERO, self.config.validation.speed_ceiling);
                record.source_tag = "config".into();
                record
            })
            .collect()
    }

    /// Hands out the next working proxy for `kind` using the consumer's
    /// persisted round-robin cursor.
    ///
    /// When the requested kind has no working proxies, falls back through
    /// the fixed kind order; when every kind is empty, returns the direct
    /// pseudo-proxy. Never fails. The chosen record's `use_count` and
    /// `last_used` are updated.
    pub async fn acquire(&self, consumer_id: &str, kind: ProxyKind) -> ProxyRecord {
        if kind == ProxyKind::Direct {
            return ProxyRecord::direct();
        }

        let mut state = self.state.write().await;

        let mut kinds: Vec<ProxyKind> = vec![kind];
        kinds.extend(
            ProxyKind::fallback_order()
                .into_iter()
                .filter(|k| *k != kind),
        );

        for candidate_kind in kinds {
            if let Some(record) = Self::pick(&mut state, &self.cursors, consumer_id, candidate_kind)
            {
                if candidate_kind != kind {
                    debug!(
                        "Consumer {} fell back from {} to {}",
                        consumer_id,
                        kind.as_str(),
                        candidate_kind.as_str()
                    );
                }
                return record;
            }
        }
        drop(state);

        debug!("Pool empty for consumer {}; going direct", consumer_id);
        self.events.increment_info(InfoType::DirectFallback);
        ProxyRecord::direct()
    }

    /// Round-robin pick of a working record of `kind`, advancing the
    /// consumer's cursor for that kind.
    fn pick(
        state: &mut Collections,
        cursors: &Mutex<HashMap<String, CursorEntry>>,
        consumer_id: &str,
        kind: ProxyKind,
    ) -> Option<ProxyRecord> {
        let collection: &mut Vec<ProxyRecord> = match kind {
            ProxyKind::Gateway => &mut state.gateway,
            ProxyKind::Extension => &mut state.extension,
            ProxyKind::Direct => return None,
            _ => &mut state.fresh,
        };

        let indices: Vec<usize> = collection
            .iter()
            .enumerate()
            .filter(|(_, r)| r.working && r.kind == kind)
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            return None;
        }

        let mut cursors = cursors.lock().expect("cursor map poisoned");
        let entry = cursors
            .entry(consumer_id.to_string())
            .or_insert_with(|| CursorEntry {
                per_kind: HashMap::new(),
                last_seen: Instant::now(),
            });
        entry.last_seen = Instant::now();
        let cursor = entry.per_kind.entry(kind).or_insert(0);

        let record = &mut collection[indices[*cursor % indices.len()]];
        *cursor = cursor.wrapping_add(1);
        record.mark_used();
        Some(record.clone())
    }

    /// Drops cursors unseen for longer than the cursor TTL, bounding the
    /// map across long-lived processes.
    fn evict_stale_cursors(&self) {
        let ttl = self.config.cursor_ttl;
        let mut cursors = self.cursors.lock().expect("cursor map poisoned");
        let before = cursors.len();
        cursors.retain(|_, entry| entry.last_seen.elapsed() < ttl);
        let evicted = before - cursors.len();
        if evicted > 0 {
            debug!("Evicted {} stale round-robin cursors", evicted);
        }
    }

    /// Compares the working count against the configured minimum and
    /// triggers an unscheduled refresh when below it.
    ///
    /// Returns `true` if a refresh ran.
    pub async fn health_check(&self) -> bool {
        let working = self.working_count().await;
        if working >= self.config.min_working {
            return false;
        }
        info!(
            "Pool health check: {} working (< {}), refreshing",
            working, self.config.min_working
        );
        self.refresh_or_fallback().await;
        true
    }

    /// Spawns the periodic health-check loop. The loop exits when `token`
    /// is cancelled.
    pub fn spawn_health_loop(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so startup refresh
            // logic stays with the caller.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        pool.health_check().await;
                    }
                }
            }
        })
    }
}
