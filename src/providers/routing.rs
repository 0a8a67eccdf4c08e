//! Backend selection over the registry's last known health state.
//!
//! Pure functions: no probing, no I/O. Until the health monitor has run at
//! least once every provider is unhealthy, so selection yields `None` /
//! empty and callers fall back to their default backend.

use std::sync::Arc;

use super::registry::Provider;

/// The healthy provider with the lowest latency.
///
/// Ties go to the provider configured first.
pub fn fastest_healthy(providers: &[Arc<Provider>]) -> Option<Arc<Provider>> {
    providers
        .iter()
        .filter(|p| p.is_healthy())
        .fold(None::<&Arc<Provider>>, |best, p| match best {
            Some(b) if b.latency_ms() <= p.latency_ms() => Some(b),
            _ => Some(p),
        })
        .cloned()
}

/// Every healthy provider, for fan-out writes.
pub fn all_healthy(providers: &[Arc<Provider>]) -> Vec<Arc<Provider>> {
    providers
        .iter()
        .filter(|p| p.is_healthy())
        .cloned()
        .collect()
}

/// The provider called `name`, healthy or not.
pub fn by_name(providers: &[Arc<Provider>], name: &str) -> Option<Arc<Provider>> {
    providers.iter().find(|p| p.name() == name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn provider(name: &str, latency: Option<f64>) -> Arc<Provider> {
        let p = Arc::new(Provider::new(name, "", "", Arc::new(MemoryBackend::new())));
        if let Some(ms) = latency {
            p.mark_healthy(ms);
        }
        p
    }

    #[test]
    fn fastest_picks_lowest_latency() {
        let providers = [
            provider("slow", Some(120.0)),
            provider("fast", Some(8.5)),
            provider("down", None),
        ];
        assert_eq!(fastest_healthy(&providers).unwrap().name(), "fast");
    }

    #[test]
    fn fastest_ignores_unhealthy() {
        let down = provider("was-fast", Some(1.0));
        down.mark_down();
        let providers = [down, provider("ok", Some(50.0))];
        assert_eq!(fastest_healthy(&providers).unwrap().name(), "ok");
    }

    #[test]
    fn fastest_tie_keeps_configuration_order() {
        let providers = [provider("first", Some(10.0)), provider("second", Some(10.0))];
        assert_eq!(fastest_healthy(&providers).unwrap().name(), "first");
    }

    #[test]
    fn nothing_probed_selects_nothing() {
        let providers = [provider("a", None), provider("b", None)];
        assert!(fastest_healthy(&providers).is_none());
        assert!(all_healthy(&providers).is_empty());
    }

    #[test]
    fn all_healthy_keeps_order() {
        let providers = [
            provider("a", Some(30.0)),
            provider("b", None),
            provider("c", Some(5.0)),
        ];
        let names: Vec<_> = all_healthy(&providers)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn by_name_finds_unhealthy_too() {
        let providers = [provider("a", None)];
        assert!(by_name(&providers, "a").is_some());
        assert!(by_name(&providers, "nonexistent").is_none());
    }
}
