//! Provider registry: configured backends and their health state.
//!
//! The `ProviderRegistry` holds one [`Provider`] per configured backend, in
//! configuration order. It is an explicitly owned value (share it with
//! `Arc`), not a process global, so tests build a fresh registry each time.
//!
//! # Lifecycle
//!
//! ```text
//!   initialize(specs) ──► one lazy client per configured env key
//!          │                 (unset key = unconfigured, skipped)
//!          ▼
//!   HealthMonitor::probe_all ──► healthy / latency written in place
//!          │
//!          ▼
//!   fastest_healthy / all_healthy / by_name   (pure reads)
//!          │
//!          ▼
//!   close_all ──► every client closed, registry cleared
//! ```
//!
//! Only the health monitor writes the health fields. Everything else reads
//! them through the selector methods.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use super::routing;
use crate::backend::{self, ConnectOptions, KeyValueBackend};
use crate::config::{self, BackendSpec};

/// One configured key-value backend with its health state.
pub struct Provider {
    name: String,
    env_key: String,
    connection: String,
    client: Arc<dyn KeyValueBackend>,
    healthy: AtomicBool,
    /// Last probe latency in milliseconds, stored as f64 bits.
    /// `f64::INFINITY` until a probe succeeds.
    latency_bits: AtomicU64,
    last_checked: Mutex<Option<Instant>>,
}

impl Provider {
    /// Create a provider around an already constructed client.
    ///
    /// `connection` is kept only to scrub it from error messages; pass an
    /// empty string when there is none.
    pub fn new(
        name: impl Into<String>,
        env_key: impl Into<String>,
        connection: impl Into<String>,
        client: Arc<dyn KeyValueBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            env_key: env_key.into(),
            connection: connection.into(),
            client,
            healthy: AtomicBool::new(false),
            latency_bits: AtomicU64::new(f64::INFINITY.to_bits()),
            last_checked: Mutex::new(None),
        }
    }

    /// Provider name (e.g. "upstash", "local").
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration key the connection string was read from.
    pub fn env_key(&self) -> &str {
        &self.env_key
    }

    /// Backend client handle.
    pub fn client(&self) -> &Arc<dyn KeyValueBackend> {
        &self.client
    }

    /// Whether the last probe succeeded. `false` until probed.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Latency of the last successful probe in milliseconds, or
    /// `f64::INFINITY` when unknown or down.
    pub fn latency_ms(&self) -> f64 {
        f64::from_bits(self.latency_bits.load(Ordering::Acquire))
    }

    /// When the provider was last probed, if ever.
    pub fn last_checked(&self) -> Option<Instant> {
        *self
            .last_checked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the connection string with the env key name in `message`.
    pub fn redact(&self, message: &str) -> String {
        if self.connection.is_empty() {
            return message.to_string();
        }
        message.replace(&self.connection, &format!("${}", self.env_key))
    }

    pub(crate) fn mark_healthy(&self, latency_ms: f64) {
        self.latency_bits
            .store(latency_ms.to_bits(), Ordering::Release);
        self.healthy.store(true, Ordering::Release);
        self.touch();
    }

    pub(crate) fn mark_down(&self) {
        self.healthy.store(false, Ordering::Release);
        self.latency_bits
            .store(f64::INFINITY.to_bits(), Ordering::Release);
        self.touch();
    }

    fn touch(&self) {
        *self
            .last_checked
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The connection string may carry credentials; never print it.
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("env_key", &self.env_key)
            .field("backend", &self.client.name())
            .field("healthy", &self.is_healthy())
            .field("latency_ms", &self.latency_ms())
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    providers: Vec<Arc<Provider>>,
    initialized: bool,
}

/// Registry of configured backends.
///
/// Providers are kept in configuration order. Selection never depends on
/// that order except as a tie-breaker between equal latencies.
#[derive(Default)]
pub struct ProviderRegistry {
    state: RwLock<RegistryState>,
    options: ConnectOptions,
}

impl ProviderRegistry {
    /// Create an empty, uninitialized registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry whose clients use the given connection timeouts.
    pub fn with_options(options: ConnectOptions) -> Self {
        Self {
            state: RwLock::default(),
            options,
        }
    }

    /// Build a provider for every spec whose env key is set in the process
    /// environment.
    ///
    /// See [`initialize_with`](Self::initialize_with).
    pub fn initialize(&self, specs: &[BackendSpec]) -> usize {
        self.initialize_with(specs, config::env_var)
    }

    /// Build a provider for every spec whose key `resolve` can answer.
    ///
    /// An unanswered key means "not configured" and is skipped quietly. A
    /// connection string the backend cannot use is logged (by key name only)
    /// and skipped without affecting the others.
    ///
    /// Returns the number of providers that failed to construct. A second
    /// call without [`reset`](Self::reset) is a no-op returning `0`.
    #[instrument(skip_all, fields(specs = specs.len()))]
    pub fn initialize_with<F>(&self, specs: &[BackendSpec], resolve: F) -> usize
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.initialized {
            return 0;
        }

        let mut failures = 0;
        for spec in specs {
            let Some(connection) = resolve(&spec.env_key).filter(|c| !c.is_empty()) else {
                debug!(
                    provider = %spec.name,
                    env_key = %spec.env_key,
                    "provider not configured"
                );
                continue;
            };

            match backend::open(&connection, self.options) {
                Ok(client) => {
                    debug!(
                        provider = %spec.name,
                        env_key = %spec.env_key,
                        backend = client.name(),
                        "provider configured"
                    );
                    state.providers.push(Arc::new(Provider::new(
                        spec.name.clone(),
                        spec.env_key.clone(),
                        connection,
                        client,
                    )));
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        provider = %spec.name,
                        env_key = %spec.env_key,
                        error = %e,
                        "provider config error"
                    );
                }
            }
        }

        state.initialized = true;
        info!(
            active = state.providers.len(),
            failures, "provider registry initialized"
        );
        failures
    }

    /// Add an already constructed backend (appended after existing ones).
    ///
    /// Marks the registry initialized, so a later
    /// [`initialize`](Self::initialize) will not add configured backends on
    /// top of it.
    pub fn register(&self, name: impl Into<String>, client: Arc<dyn KeyValueBackend>) -> Arc<Provider> {
        let name = name.into();
        let provider = Arc::new(Provider::new(name, "", "", client));
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.providers.push(Arc::clone(&provider));
        state.initialized = true;
        provider
    }

    /// Whether [`initialize`](Self::initialize) (or [`register`](Self::register))
    /// has run since the last reset.
    pub fn is_initialized(&self) -> bool {
        self.read().initialized
    }

    /// All providers with a client handle.
    pub fn list_active(&self) -> Vec<Arc<Provider>> {
        self.read().providers.clone()
    }

    /// Number of active providers.
    pub fn len(&self) -> usize {
        self.read().providers.len()
    }

    /// Whether no provider is active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowest-latency healthy provider, or `None` if none is healthy
    /// (including when nothing has been probed yet).
    pub fn fastest_healthy(&self) -> Option<Arc<Provider>> {
        routing::fastest_healthy(&self.read().providers)
    }

    /// Every healthy provider, in configuration order.
    pub fn all_healthy(&self) -> Vec<Arc<Provider>> {
        routing::all_healthy(&self.read().providers)
    }

    /// Look up a provider by name.
    pub fn by_name(&self, name: &str) -> Option<Arc<Provider>> {
        routing::by_name(&self.read().providers, name)
    }

    /// Forget every provider without closing connections.
    ///
    /// Test escape hatch; production code should call
    /// [`close_all`](Self::close_all).
    pub fn reset(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.providers.clear();
        state.initialized = false;
    }

    /// Close every client and clear the registry.
    ///
    /// A failing close is logged and counted; it never stops the others from
    /// closing. Returns the number of failures.
    #[instrument(skip(self))]
    pub async fn close_all(&self) -> usize {
        let providers = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.initialized = false;
            std::mem::take(&mut state.providers)
        };

        let mut failures = 0;
        for provider in &providers {
            provider.mark_down();
            if let Err(e) = provider.client().close().await {
                failures += 1;
                warn!(
                    provider = provider.name(),
                    error = %provider.redact(&e.to_string()),
                    "provider close failed"
                );
            }
        }

        debug!(closed = providers.len(), failures, "provider registry closed");
        failures
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("ProviderRegistry")
            .field("providers", &state.providers)
            .field("initialized", &state.initialized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn spec(name: &str, key: &str) -> BackendSpec {
        BackendSpec::new(name, key)
    }

    #[test]
    fn unconfigured_keys_are_skipped() {
        let registry = ProviderRegistry::new();
        let failures = registry.initialize_with(&[spec("a", "A_URL"), spec("b", "B_URL")], |_| None);
        assert_eq!(failures, 0);
        assert!(registry.is_empty());
        assert!(registry.is_initialized());
    }

    #[test]
    fn empty_value_counts_as_unconfigured() {
        let registry = ProviderRegistry::new();
        registry.initialize_with(&[spec("a", "A_URL")], |_| Some(String::new()));
        assert!(registry.is_empty());
    }

    #[test]
    fn bad_connection_is_skipped_and_counted() {
        let registry = ProviderRegistry::new();
        let failures = registry.initialize_with(
            &[spec("bad", "BAD_URL"), spec("good", "GOOD_URL")],
            |key| match key {
                "BAD_URL" => Some("carrier-pigeon://coop".to_string()),
                _ => Some("memory://".to_string()),
            },
        );
        assert_eq!(failures, 1);
        let names: Vec<_> = registry
            .list_active()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, ["good"]);
    }

    #[test]
    fn second_initialize_is_noop() {
        let registry = ProviderRegistry::new();
        let specs = [spec("a", "A_URL")];
        registry.initialize_with(&specs, |_| Some("memory://".to_string()));
        registry.initialize_with(&specs, |_| Some("memory://".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reset_allows_reinitialize() {
        let registry = ProviderRegistry::new();
        let specs = [spec("a", "A_URL")];
        registry.initialize_with(&specs, |_| Some("memory://".to_string()));
        registry.reset();
        assert!(registry.is_empty());
        assert!(!registry.is_initialized());

        registry.initialize_with(&specs, |_| Some("memory://".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn new_provider_is_unhealthy_with_infinite_latency() {
        let registry = ProviderRegistry::new();
        let provider = registry.register("local", Arc::new(MemoryBackend::new()));
        assert!(!provider.is_healthy());
        assert!(provider.latency_ms().is_infinite());
        assert!(provider.last_checked().is_none());
        assert!(registry.fastest_healthy().is_none());
    }

    #[test]
    fn redact_replaces_connection_string() {
        let provider = Provider::new(
            "cloud",
            "CLOUD_URL",
            "redis://u:pw@host:6379",
            Arc::new(MemoryBackend::new()),
        );
        assert_eq!(
            provider.redact("cannot reach redis://u:pw@host:6379"),
            "cannot reach $CLOUD_URL"
        );
    }

    #[test]
    fn debug_hides_connection_string() {
        let provider = Provider::new(
            "cloud",
            "CLOUD_URL",
            "redis://u:pw@host:6379",
            Arc::new(MemoryBackend::new()),
        );
        let rendered = format!("{provider:?}");
        assert!(rendered.contains("CLOUD_URL"));
        assert!(!rendered.contains("pw@host"));
    }

    #[tokio::test]
    async fn close_all_clears_registry() {
        let registry = ProviderRegistry::new();
        registry.register("one", Arc::new(MemoryBackend::new()));
        registry.register("two", Arc::new(MemoryBackend::new()));
        assert_eq!(registry.close_all().await, 0);
        assert!(registry.is_empty());
        assert!(!registry.is_initialized());
    }
}
