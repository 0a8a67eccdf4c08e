//! Backend providers: registry, health probing and selection.
//!
//! - [`ProviderRegistry`]: configured backends and their live health state
//! - [`HealthMonitor`]: concurrent PING/INFO probes that update that state
//! - [`routing`]: fastest-healthy / all-healthy / by-name selection

pub mod health;
pub mod registry;
pub mod routing;

pub use health::{HealthConfig, HealthMonitor, ProviderHealth, ProviderStatus};
pub use registry::{Provider, ProviderRegistry};
