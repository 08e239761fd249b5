//! Bounded TTL cache of verified bearer tokens.
//!
//! Sits in front of a [`RemoteIdentityVerifier`] so that a token is only sent
//! to the identity provider on its first use, after it goes stale, or after
//! it was invalidated. Failed verifications are never remembered.
//!
//! Expiry is checked on every read; the background sweep only reclaims memory.
//! Capacity is enforced at insertion by evicting the oldest batch of entries.

use folio_config::TokenCacheConfig;
use metrics::{counter, gauge};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::{Clock, SystemClock};
use crate::verifier::{RemoteIdentityVerifier, Verified, VerifyFailure};

pub type SharedVerifier<I> = Arc<dyn RemoteIdentityVerifier<Identity = I>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("identity verifier unavailable: {0}")]
    VerifierUnavailable(String),
}

impl From<VerifyFailure> for VerificationError {
    fn from(failure: VerifyFailure) -> Self {
        match failure {
            VerifyFailure::Rejected(reason) => Self::InvalidToken(reason),
            VerifyFailure::Unavailable(reason) => Self::VerifierUnavailable(reason),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<I> {
    identity: I,
    /// Unix millis; the entry is stale once `now > expires_at`.
    expires_at: u64,
    /// Unix millis of the verification that produced this entry.
    cached_at: u64,
    /// Insertion order, breaks `cached_at` ties.
    seq: u64,
}

/// Point-in-time counters, served on the cache stats endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub verification_failures: u64,
    pub evicted: u64,
    pub swept: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    verification_failures: AtomicU64,
    evicted: AtomicU64,
    swept: AtomicU64,
}

struct Inner<I>
where
    I: Clone + Send + Sync + 'static,
{
    entries: RwLock<HashMap<String, CacheEntry<I>>>,
    verifier: SharedVerifier<I>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
    eviction_batch: usize,
    default_ttl_ms: u64,
    next_seq: AtomicU64,
    counters: Counters,
}

struct Sweeper {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Process-wide token cache. Construct one with [`TokenVerificationCache::start`]
/// and hand out `Arc`s to it; call [`TokenVerificationCache::shutdown`] to stop
/// the background sweep.
pub struct TokenVerificationCache<I>
where
    I: Clone + Send + Sync + 'static,
{
    inner: Arc<Inner<I>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<I> TokenVerificationCache<I>
where
    I: Clone + Send + Sync + 'static,
{
    /// Create the cache and spawn its sweep task on the current Tokio runtime.
    pub fn start(config: &TokenCacheConfig, verifier: SharedVerifier<I>) -> Self {
        Self::start_with_clock(config, verifier, Arc::new(SystemClock))
    }

    pub fn start_with_clock(
        config: &TokenCacheConfig,
        verifier: SharedVerifier<I>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let max_entries = config.max_entries.max(1);
        let inner = Arc::new(Inner {
            entries: RwLock::new(HashMap::new()),
            verifier,
            clock,
            max_entries,
            eviction_batch: eviction_batch(max_entries, config.eviction_fraction),
            default_ttl_ms: config.default_ttl_ms,
            next_seq: AtomicU64::new(0),
            counters: Counters::default(),
        });

        let every = Duration::from_millis(config.sweep_interval_ms.max(1));
        let (stop, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_sweeper(Arc::clone(&inner), every, stop_rx));

        tracing::debug!(
            max_entries,
            eviction_batch = inner.eviction_batch,
            default_ttl_ms = config.default_ttl_ms,
            sweep_interval_ms = config.sweep_interval_ms,
            "Token cache started"
        );

        Self {
            inner,
            sweeper: Mutex::new(Some(Sweeper { stop, handle })),
        }
    }

    /// Resolve a token to its identity, consulting the verifier at most once.
    pub async fn lookup_or_verify(&self, token: &str) -> Result<I, VerificationError> {
        if token.is_empty() {
            return Err(VerificationError::MissingToken);
        }

        let inner = &self.inner;
        match inner.clock.now_millis() {
            Ok(now) => {
                if let Some(identity) = inner.fresh_identity(token, now).await {
                    inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                    counter!("folio_token_cache_hits_total").increment(1);
                    return Ok(identity);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Clock unreadable, bypassing token cache"),
        }

        inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!("folio_token_cache_misses_total").increment(1);

        match inner.verifier.verify(token).await {
            Ok(verified) => {
                counter!("folio_token_verifications_total", "outcome" => "verified").increment(1);
                Ok(inner.admit(token, verified).await)
            }
            Err(failure) => {
                inner
                    .counters
                    .verification_failures
                    .fetch_add(1, Ordering::Relaxed);
                let outcome = match failure {
                    VerifyFailure::Rejected(_) => "rejected",
                    VerifyFailure::Unavailable(_) => "unavailable",
                };
                counter!("folio_token_verifications_total", "outcome" => outcome).increment(1);
                tracing::debug!(
                    token = %token_fingerprint(token),
                    error = %failure,
                    "Token verification failed"
                );
                Err(failure.into())
            }
        }
    }

    /// Drop the cached entry for `token`. Returns whether one was present.
    pub async fn invalidate(&self, token: &str) -> bool {
        let mut entries = self.inner.entries.write().await;
        let removed = entries.remove(token).is_some();
        record_size(entries.len());
        drop(entries);

        if removed {
            tracing::debug!(token = %token_fingerprint(token), "Token invalidated");
        }
        removed
    }

    pub async fn clear(&self) {
        let mut entries = self.inner.entries.write().await;
        entries.clear();
        record_size(0);
    }

    /// Remove every expired entry now, without waiting for the sweep timer.
    pub async fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired().await
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.entries.read().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            entries: self.len().await,
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            verification_failures: counters.verification_failures.load(Ordering::Relaxed),
            evicted: counters.evicted.load(Ordering::Relaxed),
            swept: counters.swept.load(Ordering::Relaxed),
        }
    }

    /// Stop the sweep task and wait for it to finish. Idempotent.
    pub async fn shutdown(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(Sweeper { stop, handle }) = sweeper {
            let _ = stop.send(());
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Token cache sweeper ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<I> Drop for TokenVerificationCache<I>
where
    I: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let sweeper = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.handle.abort();
        }
    }
}

impl<I> Inner<I>
where
    I: Clone + Send + Sync + 'static,
{
    async fn fresh_identity(&self, token: &str, now: u64) -> Option<I> {
        let entries = self.entries.read().await;
        entries
            .get(token)
            .filter(|entry| now <= entry.expires_at)
            .map(|entry| entry.identity.clone())
    }

    async fn admit(&self, token: &str, verified: Verified<I>) -> I {
        let now = match self.clock.now_millis() {
            Ok(now) => now,
            Err(e) => {
                tracing::warn!(error = %e, "Clock unreadable, not caching verified token");
                return verified.identity;
            }
        };

        let expires_at = verified.expiry_hint_secs.map_or_else(
            || now.saturating_add(self.default_ttl_ms),
            |secs| secs.saturating_mul(1000),
        );
        if expires_at < now {
            tracing::debug!(
                token = %token_fingerprint(token),
                "Verified token already past its expiry hint, not caching"
            );
            return verified.identity;
        }

        let entry = CacheEntry {
            identity: verified.identity.clone(),
            expires_at,
            cached_at: now,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        let mut entries = self.entries.write().await;
        if !entries.contains_key(token) && entries.len() >= self.max_entries {
            let evicted = evict_oldest(&mut entries, self.eviction_batch);
            self.counters
                .evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
            counter!("folio_token_cache_evictions_total").increment(evicted as u64);
            tracing::debug!(
                evicted,
                remaining = entries.len(),
                "Token cache full, evicted oldest entries"
            );
        }
        entries.insert(token.to_owned(), entry);
        record_size(entries.len());

        verified.identity
    }

    async fn sweep_expired(&self) -> usize {
        let now = match self.clock.now_millis() {
            Ok(now) => now,
            Err(e) => {
                tracing::warn!(error = %e, "Clock unreadable, skipping token cache sweep");
                return 0;
            }
        };

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at >= now);
        let removed = before - entries.len();
        record_size(entries.len());

        if removed > 0 {
            self.counters
                .swept
                .fetch_add(removed as u64, Ordering::Relaxed);
            counter!("folio_token_cache_sweep_removed_total").increment(removed as u64);
            tracing::debug!(removed, remaining = entries.len(), "Swept expired tokens");
        }
        removed
    }
}

async fn run_sweeper<I>(inner: Arc<Inner<I>>, every: Duration, mut stop: oneshot::Receiver<()>)
where
    I: Clone + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                inner.sweep_expired().await;
            }
        }
    }
    tracing::debug!("Token cache sweeper stopped");
}

/// Remove the `count` entries with the oldest `(cached_at, seq)`.
fn evict_oldest<I>(entries: &mut HashMap<String, CacheEntry<I>>, count: usize) -> usize {
    let mut by_age: Vec<(u64, u64, &String)> = entries
        .iter()
        .map(|(token, entry)| (entry.cached_at, entry.seq, token))
        .collect();
    by_age.sort_unstable();

    let victims: Vec<String> = by_age
        .into_iter()
        .take(count)
        .map(|(_, _, token)| token.clone())
        .collect();

    for token in &victims {
        entries.remove(token);
    }
    victims.len()
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn eviction_batch(max_entries: usize, fraction: f64) -> usize {
    let batch = (max_entries as f64 * fraction).ceil() as usize;
    batch.clamp(1, max_entries)
}

#[allow(clippy::cast_precision_loss)]
fn record_size(len: usize) {
    gauge!("folio_token_cache_entries").set(len as f64);
}

/// Short stable digest of a token, safe to put in logs.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
