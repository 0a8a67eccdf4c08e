//! Key-value backend contract.
//!
//! The cache core never talks to a store directly; it goes through
//! [`KeyValueBackend`]. Implementations must be cheap to share (`Arc`) and
//! must not perform I/O at construction time: the registry builds handles for
//! every configured backend up front and only the health monitor and the
//! cache ever touch the network.
//!
//! Every operation returns [`Result`] so callers decide how to degrade. The
//! tool cache wraps all of them in a single fail-open combinator, so a
//! backend only has to report failures faithfully, not hide them.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Backend for tool-result storage.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Backend kind for logging/debugging (e.g. "redis", "memory").
    fn name(&self) -> &str;

    /// Fetch a value. `Ok(None)` means the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value with a time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// List every key starting with `prefix`.
    ///
    /// Implementations must iterate incrementally (e.g. `SCAN`), never with
    /// a blocking "all keys" command.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Lightweight liveness check.
    async fn ping(&self) -> Result<()>;

    /// Short free-text diagnostic (server version or similar).
    async fn info(&self) -> Result<String>;

    /// Release any open connection.
    ///
    /// Default implementation does nothing.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
