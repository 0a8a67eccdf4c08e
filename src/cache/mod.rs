//! Tool-result caching.
//!
//! - [`key`]: `tc:`/`ctx:` key derivation
//! - [`CachePolicy`]: which tools are cached, and their TTLs
//! - [`ToolCache`]: lookup, store (with reference passing), flush
//! - [`CacheStats`]: per-cache hit/miss/set/ref/error counters

pub mod key;
pub mod policy;
pub mod stats;
pub mod tool;

pub use key::{REF_PREFIX, TASK_REF_PREFIX, TOOL_PREFIX, derive_key};
pub use policy::CachePolicy;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use tool::{
    CacheConfig, REFERENCE_MARKER, ToolCache, ToolCacheBuilder, WriteStrategy, reference_summary,
};
