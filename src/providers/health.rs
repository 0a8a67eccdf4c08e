//! Concurrent health probing.
//!
//! [`HealthMonitor::probe_all`] spawns one task per active provider and joins
//! them all. Each probe carries its own timeout, so a provider that never
//! answers costs at most one timeout and cannot stall the others.
//!
//! ```text
//!   probe_all ──┬── spawn probe(upstash) ──┐
//!               ├── spawn probe(aiven)   ──┤  join_all
//!               └── spawn probe(local)   ──┘
//!                                           ▼
//!                          Vec<ProviderHealth> (one per provider)
//! ```
//!
//! A probe writes its outcome into the provider (healthy flag, latency,
//! last-checked time). That is the only place provider health is mutated.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout};
use tracing::{debug, instrument, warn};

use super::registry::{Provider, ProviderRegistry};
use crate::config::BackendSpec;
use crate::{MuninError, telemetry};

/// Reported when the server diagnostics could not be fetched.
const FALLBACK_SERVER_INFO: &str = "connected";

/// Outcome class of a health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Answered below the degraded threshold.
    Healthy,
    /// Answered, but slowly.
    Degraded,
    /// Failed or timed out.
    Down,
    /// No connection string configured.
    Unconfigured,
}

impl ProviderStatus {
    /// Lowercase label, as used in metrics and serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Healthy => "healthy",
            ProviderStatus::Degraded => "degraded",
            ProviderStatus::Down => "down",
            ProviderStatus::Unconfigured => "unconfigured",
        }
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one provider. Returned, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub status: ProviderStatus,
    /// Probe round trip in milliseconds (rounded to 0.01). For `Down`
    /// results this is the time spent before giving up.
    pub latency_ms: f64,
    /// Failure description, empty on success. Never contains the
    /// connection string.
    pub error: String,
    /// Server version or similar, empty when down.
    pub server_info: String,
}

impl ProviderHealth {
    /// Entry for a backend with no connection string.
    pub fn unconfigured(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ProviderStatus::Unconfigured,
            latency_ms: 0.0,
            error: String::new(),
            server_info: String::new(),
        }
    }

    fn down(name: impl Into<String>, latency_ms: f64, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ProviderStatus::Down,
            latency_ms,
            error: error.into(),
            server_info: String::new(),
        }
    }

    /// Whether the provider answered (healthy or degraded).
    pub fn is_up(&self) -> bool {
        matches!(
            self.status,
            ProviderStatus::Healthy | ProviderStatus::Degraded
        )
    }
}

/// Probe timing configuration.
///
/// ```rust
/// # use munin::providers::HealthConfig;
/// # use std::time::Duration;
/// let config = HealthConfig::new()
///     .timeout(Duration::from_secs(1))
///     .degraded_threshold(Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HealthConfig {
    /// Upper bound for PING (and, separately, for INFO). Default: 3 s.
    #[serde(default = "default_probe_timeout", with = "crate::backend::millis")]
    pub timeout: Duration,
    /// Latency at or above which a live provider is `Degraded`. Default: 500 ms.
    #[serde(default = "default_degraded_threshold", with = "crate::backend::millis")]
    pub degraded_threshold: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout: default_probe_timeout(),
            degraded_threshold: default_degraded_threshold(),
        }
    }
}

impl HealthConfig {
    /// Create a config with the default timings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-probe timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the degraded threshold.
    pub fn degraded_threshold(mut self, threshold: Duration) -> Self {
        self.degraded_threshold = threshold;
        self
    }
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_degraded_threshold() -> Duration {
    Duration::from_millis(500)
}

/// Probes providers and records their health.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthMonitor {
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// PING one provider, classify the result and record it on the provider.
    #[instrument(skip_all, fields(provider = provider.name()))]
    pub async fn probe_one(&self, provider: &Provider) -> ProviderHealth {
        let client = provider.client();
        let start = Instant::now();

        let health = match timeout(self.config.timeout, client.ping()).await {
            Ok(Ok(())) => {
                let elapsed = start.elapsed();
                let latency_ms = elapsed.as_secs_f64() * 1000.0;
                provider.mark_healthy(latency_ms);

                let server_info = match timeout(self.config.timeout, client.info()).await {
                    Ok(Ok(info)) => info,
                    _ => FALLBACK_SERVER_INFO.to_string(),
                };

                let status = if elapsed < self.config.degraded_threshold {
                    ProviderStatus::Healthy
                } else {
                    ProviderStatus::Degraded
                };

                metrics::gauge!(telemetry::PROVIDER_LATENCY_MS,
                    "provider" => provider.name().to_owned(),
                )
                .set(latency_ms);

                ProviderHealth {
                    name: provider.name().to_string(),
                    status,
                    latency_ms: round2(latency_ms),
                    error: String::new(),
                    server_info,
                }
            }
            Ok(Err(e)) => {
                provider.mark_down();
                ProviderHealth::down(
                    provider.name(),
                    round2(start.elapsed().as_secs_f64() * 1000.0),
                    provider.redact(&e.to_string()),
                )
            }
            Err(_) => {
                provider.mark_down();
                let e = MuninError::Timeout {
                    operation: "PING",
                    timeout: self.config.timeout,
                };
                ProviderHealth::down(
                    provider.name(),
                    round2(start.elapsed().as_secs_f64() * 1000.0),
                    e.to_string(),
                )
            }
        };

        metrics::counter!(telemetry::PROVIDER_PROBES_TOTAL,
            "provider" => provider.name().to_owned(),
            "status" => health.status.as_str(),
        )
        .increment(1);

        if health.is_up() {
            debug!(
                status = %health.status,
                latency_ms = health.latency_ms,
                server_info = %health.server_info,
                "probe ok"
            );
        } else {
            warn!(error = %health.error, "probe failed");
        }
        health
    }

    /// Probe every active provider concurrently.
    ///
    /// Returns one entry per provider, in registry order. A probe task that
    /// dies (panic, cancellation) is reported as `Down` for its provider
    /// instead of failing the whole sweep. No providers → empty list.
    #[instrument(skip_all)]
    pub async fn probe_all(&self, registry: &ProviderRegistry) -> Vec<ProviderHealth> {
        let providers = registry.list_active();
        if providers.is_empty() {
            return Vec::new();
        }

        let monitor = *self;
        let tasks = providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            tokio::spawn(async move { monitor.probe_one(&provider).await })
        });
        let results = join_all(tasks).await;

        results
            .into_iter()
            .zip(&providers)
            .map(|(result, provider)| match result {
                Ok(health) => health,
                Err(e) => {
                    provider.mark_down();
                    warn!(provider = provider.name(), error = %e, "probe task failed");
                    ProviderHealth::down(
                        provider.name(),
                        f64::INFINITY,
                        format!("probe task failed: {e}"),
                    )
                }
            })
            .collect()
    }

    /// Probe every active provider and add an `Unconfigured` entry for each
    /// spec that has no active provider.
    ///
    /// Output follows `specs` order, with registered providers that match no
    /// spec appended at the end.
    pub async fn report(
        &self,
        registry: &ProviderRegistry,
        specs: &[BackendSpec],
    ) -> Vec<ProviderHealth> {
        let mut probed = self.probe_all(registry).await;
        let mut report = Vec::with_capacity(specs.len().max(probed.len()));

        for spec in specs {
            match probed.iter().position(|h| h.name == spec.name) {
                Some(idx) => report.push(probed.remove(idx)),
                None => report.push(ProviderHealth::unconfigured(&spec.name)),
            }
        }
        report.extend(probed);
        report
    }
}

fn round2(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels() {
        assert_eq!(ProviderStatus::Healthy.as_str(), "healthy");
        assert_eq!(ProviderStatus::Down.to_string(), "down");
        assert_eq!(
            serde_json::to_string(&ProviderStatus::Unconfigured).unwrap(),
            "\"unconfigured\""
        );
    }

    #[test]
    fn unconfigured_entry() {
        let h = ProviderHealth::unconfigured("aiven");
        assert_eq!(h.name, "aiven");
        assert_eq!(h.status, ProviderStatus::Unconfigured);
        assert!(!h.is_up());
    }

    #[test]
    fn health_config_defaults() {
        let config = HealthConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.degraded_threshold, Duration::from_millis(500));
    }

    #[test]
    fn round_to_hundredths() {
        assert_eq!(round2(12.3456), 12.35);
        assert!(round2(f64::INFINITY).is_infinite());
    }
}
