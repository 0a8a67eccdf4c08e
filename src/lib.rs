//! Munin - tool-result cache for agent runtimes
//!
//! This crate sits between an agent runtime and a set of interchangeable
//! key-value backends (Redis, Dragonfly, in-memory). It decides which tool
//! results are worth caching, keeps oversized results out of the agent's
//! context by passing them by reference, routes to the fastest healthy
//! backend, and composes independently written lifecycle hooks.
//!
//! Every cache operation fails open: a backend outage means "nothing is
//! cached", never a failed agent turn.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use munin::config::MuninConfig;
//! use munin::hooks::{self, HookInput, ToolResult};
//!
//! #[tokio::main]
//! async fn main() -> munin::Result<()> {
//!     let config = MuninConfig::default();
//!
//!     let registry = Arc::new(config.registry());
//!     registry.initialize(&config.backends);
//!     config.health_monitor().probe_all(&registry).await;
//!
//!     let cache = Arc::new(config.tool_cache(Arc::clone(&registry))?);
//!     let merged = hooks::compose([hooks::cache_hooks(Arc::clone(&cache))]);
//!
//!     let input = serde_json::json!({"file_path": "/src/main.rs"});
//!     if cache.lookup("Read", &input).await.is_none() {
//!         let event = HookInput::PostToolUse(ToolResult {
//!             tool_name: "Read".into(),
//!             tool_input: input,
//!             tool_response: Some("fn main() {}".into()),
//!             session_id: None,
//!         });
//!         hooks::dispatch(&merged, &event).await;
//!     }
//!
//!     println!("{:?}", cache.stats());
//!     registry.close_all().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod hooks;
pub mod providers;
pub mod telemetry;

// Re-export main types at crate root
pub use backend::KeyValueBackend;
pub use cache::{CacheConfig, CachePolicy, CacheStatsSnapshot, ToolCache, WriteStrategy};
pub use config::{BackendSpec, MuninConfig};
pub use error::{MuninError, Result};
pub use hooks::{HookEvent, HookHandler, HookInput, HookMap, compose, dispatch};
pub use providers::{
    HealthConfig, HealthMonitor, Provider, ProviderHealth, ProviderRegistry, ProviderStatus,
};
