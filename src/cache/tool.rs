//! The tool-result cache.
//!
//! [`ToolCache`] sits between the agent runtime and the key-value backends.
//! It asks the [`CachePolicy`] whether a tool is cacheable, derives the key,
//! picks a live backend through the [`ProviderRegistry`] and reads or writes
//! the entry.
//!
//! # Failure model
//!
//! Every backend call goes through one combinator (`fail_open`) that applies
//! the per-operation timeout, counts and logs the failure, and turns it into
//! `None`. Nothing in this module returns an error: a backend outage degrades
//! to "nothing is cached", never to a failed turn.
//!
//! # Reference passing
//!
//! Results larger than [`CacheConfig::size_threshold`] are not put in front
//! of the agent verbatim. The payload is stored under a fresh `ctx:task:`
//! key with a fixed TTL and a short summary naming that key is cached and
//! returned instead:
//!
//! ```text
//! [REFERENCE PASSED] 524,289 bytes stored at ctx:task:1f0c9a7be2d4. First 200 chars: ...
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use super::key::{REF_PREFIX, TOOL_PREFIX, derive_key, reference_key};
use super::policy::CachePolicy;
use super::stats::{CacheStats, CacheStatsSnapshot};
use crate::backend::KeyValueBackend;
use crate::providers::{Provider, ProviderRegistry};
use crate::{MuninError, Result, telemetry};

/// Marker opening every reference summary.
pub const REFERENCE_MARKER: &str = "[REFERENCE PASSED]";

/// Where writes go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    /// Write to the fastest healthy backend only.
    #[default]
    Fastest,
    /// Write to every healthy backend concurrently. A write succeeds if at
    /// least one backend accepted it.
    FanOut,
}

/// Tool-cache tuning.
///
/// ```rust
/// # use munin::cache::{CacheConfig, WriteStrategy};
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .size_threshold(256 * 1024)
///     .op_timeout(Duration::from_millis(500))
///     .write_strategy(WriteStrategy::FanOut);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Results above this many UTF-8 bytes are passed by reference.
    /// Default: 512 KiB.
    #[serde(default = "default_size_threshold")]
    pub size_threshold: usize,
    /// TTL of `ctx:task:` payloads, whatever the tool. Default: 1 hour.
    #[serde(default = "default_reference_ttl", with = "crate::backend::millis")]
    pub reference_ttl: Duration,
    /// Upper bound for a single GET/SET. Default: 2 s.
    #[serde(default = "default_op_timeout", with = "crate::backend::millis")]
    pub op_timeout: Duration,
    /// Upper bound for flushing one backend. Default: 30 s.
    #[serde(default = "default_flush_timeout", with = "crate::backend::millis")]
    pub flush_timeout: Duration,
    /// Characters of the payload quoted in a reference summary. Default: 200.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default)]
    pub write_strategy: WriteStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size_threshold: default_size_threshold(),
            reference_ttl: default_reference_ttl(),
            op_timeout: default_op_timeout(),
            flush_timeout: default_flush_timeout(),
            preview_chars: default_preview_chars(),
            write_strategy: WriteStrategy::default(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reference-passing threshold in bytes.
    pub fn size_threshold(mut self, bytes: usize) -> Self {
        self.size_threshold = bytes;
        self
    }

    /// Set the TTL of reference payloads.
    pub fn reference_ttl(mut self, ttl: Duration) -> Self {
        self.reference_ttl = ttl;
        self
    }

    /// Set the per-operation timeout.
    pub fn op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Set the per-backend flush timeout.
    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Set how many characters a reference summary quotes.
    pub fn preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    pub fn write_strategy(mut self, strategy: WriteStrategy) -> Self {
        self.write_strategy = strategy;
        self
    }
}

fn default_size_threshold() -> usize {
    512 * 1024
}

fn default_reference_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_op_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_flush_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_preview_chars() -> usize {
    200
}

// ============================================================================
// Targets
// ============================================================================

/// A backend chosen for one operation.
#[derive(Clone)]
enum Target {
    Provider(Arc<Provider>),
    Fallback(Arc<dyn KeyValueBackend>),
}

impl Target {
    fn name(&self) -> &str {
        match self {
            Target::Provider(p) => p.name(),
            Target::Fallback(_) => "fallback",
        }
    }

    fn client(&self) -> &Arc<dyn KeyValueBackend> {
        match self {
            Target::Provider(p) => p.client(),
            Target::Fallback(client) => client,
        }
    }

    fn redact(&self, message: &str) -> String {
        match self {
            Target::Provider(p) => p.redact(message),
            Target::Fallback(_) => message.to_string(),
        }
    }
}

// ============================================================================
// ToolCache
// ============================================================================

/// Builder for [`ToolCache`].
#[derive(Default)]
pub struct ToolCacheBuilder {
    registry: Option<Arc<ProviderRegistry>>,
    fallback: Option<Arc<dyn KeyValueBackend>>,
    policy: Option<CachePolicy>,
    config: Option<CacheConfig>,
}

impl ToolCacheBuilder {
    /// Route through the healthy providers of `registry`.
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Backend used when no provider is healthy (or no registry is set).
    pub fn fallback(mut self, backend: Arc<dyn KeyValueBackend>) -> Self {
        self.fallback = Some(backend);
        self
    }

    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> ToolCache {
        ToolCache {
            registry: self.registry,
            fallback: self.fallback,
            policy: self.policy.unwrap_or_default(),
            config: self.config.unwrap_or_default(),
            stats: CacheStats::new(),
        }
    }
}

/// Policy-driven, fail-open cache for tool results.
pub struct ToolCache {
    registry: Option<Arc<ProviderRegistry>>,
    fallback: Option<Arc<dyn KeyValueBackend>>,
    policy: CachePolicy,
    config: CacheConfig,
    stats: CacheStats,
}

impl std::fmt::Debug for ToolCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCache")
            .field("providers", &self.registry.as_ref().map(|r| r.len()))
            .field("fallback", &self.fallback.as_ref().map(|b| b.name().to_string()))
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl ToolCache {
    /// A cache over a single backend with the stock policy.
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self::builder().fallback(backend).build()
    }

    pub fn builder() -> ToolCacheBuilder {
        ToolCacheBuilder::default()
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn registry(&self) -> Option<&Arc<ProviderRegistry>> {
        self.registry.as_ref()
    }

    /// Whether results of `tool_name` are cached.
    pub fn is_cacheable(&self, tool_name: &str) -> bool {
        self.policy.is_cacheable(tool_name)
    }

    /// Current counter values.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Zero the counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Look up a cached tool result.
    ///
    /// `None` for non-cacheable tools (no I/O, no counter change), for
    /// misses, and for backend failures. A failure and a miss both mean
    /// "run the tool", so callers are not told which one happened.
    #[instrument(skip_all, fields(tool = tool_name))]
    pub async fn lookup(&self, tool_name: &str, input: &Value) -> Option<String> {
        if !self.policy.is_cacheable(tool_name) {
            return None;
        }
        let key = derive_key(tool_name, input);
        let Some(target) = self.read_target() else {
            self.record_failure("get", "none", &MuninError::NoBackend);
            return None;
        };

        let value = self
            .fail_open("get", &target, self.config.op_timeout, target.client().get(&key))
            .await?;

        match value {
            Some(value) => {
                self.stats.record_hit();
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tool" => tool_name.to_owned())
                    .increment(1);
                debug!(key = %key, backend = target.name(), "cache hit");
                Some(value)
            }
            None => {
                self.stats.record_miss();
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "tool" => tool_name.to_owned())
                    .increment(1);
                debug!(key = %key, backend = target.name(), "cache miss");
                None
            }
        }
    }

    /// Cache a tool result and return what the agent should see.
    ///
    /// Non-cacheable tools and backend failures return `result` unchanged.
    /// Oversized results are stored by reference and the summary is
    /// returned in their place.
    #[instrument(skip_all, fields(tool = tool_name, bytes = result.len()))]
    pub async fn store(&self, tool_name: &str, input: &Value, result: String) -> String {
        if !self.policy.is_cacheable(tool_name) {
            return result;
        }
        let key = derive_key(tool_name, input);
        let ttl = self.policy.ttl_for(tool_name);
        let targets = self.write_targets();
        if targets.is_empty() {
            self.record_failure("set", "none", &MuninError::NoBackend);
            return result;
        }

        let size = result.len();
        if size <= self.config.size_threshold {
            if self.write("set", &targets, &key, &result, ttl).await.is_empty() {
                return result;
            }
            self.record_set(tool_name);
            debug!(key = %key, ttl_secs = ttl.as_secs(), "cached");
            return result;
        }

        let ref_key = reference_key();
        let holders = self
            .write("set_ref", &targets, &ref_key, &result, self.config.reference_ttl)
            .await;
        if holders.is_empty() {
            return result;
        }

        self.stats.record_ref();
        metrics::counter!(telemetry::CACHE_REFS_TOTAL, "tool" => tool_name.to_owned())
            .increment(1);
        self.record_set(tool_name);

        let summary = reference_summary(size, &ref_key, &result, self.config.preview_chars);
        if self.write("set", &holders, &key, &summary, ttl).await.is_empty() {
            return result;
        }
        info!(key = %key, reference = %ref_key, bytes = size, "result passed by reference");
        summary
    }

    /// Read back a payload stored by reference.
    ///
    /// Only `ctx:` keys are served; anything else is `None`. Failures count
    /// as errors and yield `None`.
    #[instrument(skip(self))]
    pub async fn fetch_reference(&self, ref_key: &str) -> Option<String> {
        if !ref_key.starts_with(REF_PREFIX) {
            return None;
        }
        let Some(target) = self.read_target() else {
            self.record_failure("get_ref", "none", &MuninError::NoBackend);
            return None;
        };
        self.fail_open(
            "get_ref",
            &target,
            self.config.op_timeout,
            target.client().get(ref_key),
        )
        .await
        .flatten()
    }

    /// Delete every `tc:` and `ctx:` entry on the write targets.
    ///
    /// Returns the number of keys removed, or 0 if any backend failed.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> u64 {
        let targets = self.write_targets();
        if targets.is_empty() {
            self.record_failure("flush", "none", &MuninError::NoBackend);
            return 0;
        }

        let sweeps = targets.iter().map(|target| {
            self.fail_open(
                "flush",
                target,
                self.config.flush_timeout,
                flush_backend(target.client().as_ref()),
            )
        });
        let counts: Option<Vec<u64>> = join_all(sweeps).await.into_iter().collect();

        match counts {
            Some(counts) => {
                let removed: u64 = counts.iter().sum();
                info!(removed, backends = targets.len(), "cache flushed");
                removed
            }
            None => 0,
        }
    }

    // ------------------------------------------------------------------------

    /// The backend reads go to: fastest healthy provider, else the fallback.
    fn read_target(&self) -> Option<Target> {
        self.registry
            .as_ref()
            .and_then(|r| r.fastest_healthy())
            .map(Target::Provider)
            .or_else(|| self.fallback.clone().map(Target::Fallback))
    }

    /// The backends writes go to, per the write strategy.
    fn write_targets(&self) -> Vec<Target> {
        match self.config.write_strategy {
            WriteStrategy::Fastest => self.read_target().into_iter().collect(),
            WriteStrategy::FanOut => {
                let healthy: Vec<Target> = self
                    .registry
                    .as_ref()
                    .map(|r| r.all_healthy())
                    .unwrap_or_default()
                    .into_iter()
                    .map(Target::Provider)
                    .collect();
                if healthy.is_empty() {
                    self.fallback.clone().map(Target::Fallback).into_iter().collect()
                } else {
                    healthy
                }
            }
        }
    }

    /// SET on every target concurrently; returns the targets that accepted.
    async fn write(
        &self,
        operation: &'static str,
        targets: &[Target],
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Vec<Target> {
        let writes = targets.iter().map(|target| async move {
            self.fail_open(
                operation,
                target,
                self.config.op_timeout,
                target.client().set(key, value, ttl),
            )
            .await
            .map(|()| target.clone())
        });
        join_all(writes).await.into_iter().flatten().collect()
    }

    /// Run a backend call under `limit`; failures become `None`.
    async fn fail_open<T, F>(
        &self,
        operation: &'static str,
        target: &Target,
        limit: Duration,
        fut: F,
    ) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let outcome = match timeout(limit, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Err(MuninError::Timeout {
                operation,
                timeout: limit,
            }),
        };
        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                let message = target.redact(&e.to_string());
                self.record_failure(operation, target.name(), &message);
                None
            }
        }
    }

    fn record_failure(
        &self,
        operation: &'static str,
        backend: &str,
        error: &dyn std::fmt::Display,
    ) {
        self.stats.record_error();
        metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "operation" => operation).increment(1);
        debug!(operation, backend, error = %error, "cache operation failed open");
    }

    fn record_set(&self, tool_name: &str) {
        self.stats.record_set();
        metrics::counter!(telemetry::CACHE_SETS_TOTAL, "tool" => tool_name.to_owned())
            .increment(1);
    }
}

/// SCAN and DELETE both namespaces on one backend.
async fn flush_backend(backend: &dyn KeyValueBackend) -> Result<u64> {
    let mut removed = 0;
    for prefix in [TOOL_PREFIX, REF_PREFIX] {
        for key in backend.scan_prefix(prefix).await? {
            backend.delete(&key).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Summary cached and returned in place of an oversized result.
pub fn reference_summary(bytes: usize, ref_key: &str, result: &str, preview_chars: usize) -> String {
    let preview: String = result.chars().take(preview_chars).collect();
    format!(
        "{REFERENCE_MARKER} {} bytes stored at {ref_key}. First {preview_chars} chars: {preview}",
        group_thousands(bytes)
    )
}

/// `1234567` → `"1,234,567"`.
fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
