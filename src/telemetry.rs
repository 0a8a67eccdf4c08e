//! Telemetry metric name constants.
//!
//! Centralised metric names for munin operations. Consumers install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder installed,
//! all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `munin_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `tool`: tool name (e.g. "Read", "WebFetch")
//! - `provider`: backend provider name (e.g. "local", "upstash")
//! - `status`: probe outcome: "healthy", "degraded" or "down"
//! - `event`: hook event name (e.g. "PostToolUse")

/// Tool-cache lookups that found a value.
///
/// Labels: `tool`.
pub const CACHE_HITS_TOTAL: &str = "munin_cache_hits_total";

/// Tool-cache lookups that found nothing.
///
/// Labels: `tool`.
pub const CACHE_MISSES_TOTAL: &str = "munin_cache_misses_total";

/// Successful tool-cache writes.
///
/// Labels: `tool`.
pub const CACHE_SETS_TOTAL: &str = "munin_cache_sets_total";

/// Oversized results stored by reference.
///
/// Labels: `tool`.
pub const CACHE_REFS_TOTAL: &str = "munin_cache_refs_total";

/// Backend failures swallowed by the cache.
///
/// Labels: `operation`.
pub const CACHE_ERRORS_TOTAL: &str = "munin_cache_errors_total";

/// Health probes completed.
///
/// Labels: `provider`, `status`.
pub const PROVIDER_PROBES_TOTAL: &str = "munin_provider_probes_total";

/// Latency of the last successful probe, in milliseconds.
///
/// Labels: `provider`.
pub const PROVIDER_LATENCY_MS: &str = "munin_provider_latency_ms";

/// Hook handlers that failed inside a chain or dispatch.
///
/// Labels: `event`.
pub const HOOK_FAILURES_TOTAL: &str = "munin_hook_failures_total";
