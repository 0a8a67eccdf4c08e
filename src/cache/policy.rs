//! Which tools are cached, and for how long.
//!
//! Deny by default: a tool is cacheable only if it is listed as cacheable
//! and not listed as never-cache. Read-only lookups (file reads, searches,
//! fetches) are cacheable; anything that mutates state or talks to the user
//! is never cached, even if someone adds it to the cacheable list.
//!
//! ```toml
//! [policy]
//! default_ttl_secs = 300
//! cacheable = ["Read", "Grep", "Glob", "WebFetch", "WebSearch", "LSP"]
//! never_cache = ["Bash", "Write", "Edit"]
//!
//! [policy.tool_ttls]
//! WebFetch = 900
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Deserialize;

/// Tools cached by default, with their TTL in seconds.
const DEFAULT_TOOL_TTLS: &[(&str, u64)] = &[
    ("Read", 300),
    ("Grep", 300),
    ("Glob", 300),
    ("WebFetch", 900),
    ("WebSearch", 900),
];

/// Tools whose results must never be served from cache.
const DEFAULT_NEVER_CACHE: &[&str] = &[
    "Bash",
    "Write",
    "Edit",
    "NotebookEdit",
    "Task",
    "SendMessage",
    "TaskCreate",
    "TaskUpdate",
    "TaskList",
    "TaskGet",
    "AskUserQuestion",
    "EnterPlanMode",
    "ExitPlanMode",
    "TeamCreate",
    "TeamDelete",
    "Skill",
];

/// Per-tool cacheability and TTL.
#[derive(Debug, Clone, Deserialize)]
pub struct CachePolicy {
    /// Tools eligible for caching.
    #[serde(default = "default_cacheable")]
    pub cacheable: BTreeSet<String>,
    /// Tools never cached; wins over `cacheable`.
    #[serde(default = "default_never_cache")]
    pub never_cache: BTreeSet<String>,
    /// Per-tool TTL in seconds.
    #[serde(default = "default_tool_ttls")]
    pub tool_ttls: BTreeMap<String, u64>,
    /// TTL for a cacheable tool missing from `tool_ttls`. Default: 300 s.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            cacheable: default_cacheable(),
            never_cache: default_never_cache(),
            tool_ttls: default_tool_ttls(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl CachePolicy {
    /// The stock policy (read/search/fetch tools cached, mutating tools never).
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that caches nothing until tools are added.
    pub fn empty() -> Self {
        Self {
            cacheable: BTreeSet::new(),
            never_cache: BTreeSet::new(),
            tool_ttls: BTreeMap::new(),
            default_ttl_secs: default_ttl_secs(),
        }
    }

    /// Mark a tool cacheable, optionally with its own TTL.
    pub fn cache_tool(mut self, tool: impl Into<String>, ttl: Option<Duration>) -> Self {
        let tool = tool.into();
        if let Some(ttl) = ttl {
            self.tool_ttls.insert(tool.clone(), ttl.as_secs());
        }
        self.cacheable.insert(tool);
        self
    }

    /// Forbid caching a tool.
    pub fn never_cache(mut self, tool: impl Into<String>) -> Self {
        self.never_cache.insert(tool.into());
        self
    }

    /// Set the TTL used for cacheable tools without their own.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = ttl.as_secs();
        self
    }

    /// Whether results of `tool_name` may be cached.
    pub fn is_cacheable(&self, tool_name: &str) -> bool {
        self.cacheable.contains(tool_name) && !self.never_cache.contains(tool_name)
    }

    /// TTL for a tool's results.
    pub fn ttl_for(&self, tool_name: &str) -> Duration {
        Duration::from_secs(
            self.tool_ttls
                .get(tool_name)
                .copied()
                .unwrap_or(self.default_ttl_secs),
        )
    }
}

fn default_cacheable() -> BTreeSet<String> {
    DEFAULT_TOOL_TTLS
        .iter()
        .map(|(tool, _)| tool.to_string())
        .collect()
}

fn default_never_cache() -> BTreeSet<String> {
    DEFAULT_NEVER_CACHE.iter().map(|t| t.to_string()).collect()
}

fn default_tool_ttls() -> BTreeMap<String, u64> {
    DEFAULT_TOOL_TTLS
        .iter()
        .map(|(tool, ttl)| (tool.to_string(), *ttl))
        .collect()
}

fn default_ttl_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_cacheable_tools() {
        let policy = CachePolicy::new();
        for tool in ["Read", "Grep", "Glob", "WebFetch", "WebSearch"] {
            assert!(policy.is_cacheable(tool), "{tool} should be cacheable");
        }
    }

    #[test]
    fn mutating_tools_never_cached() {
        let policy = CachePolicy::new();
        for tool in ["Bash", "Write", "Edit", "Task", "AskUserQuestion"] {
            assert!(!policy.is_cacheable(tool), "{tool} must not be cacheable");
        }
    }

    #[test]
    fn unknown_tool_denied() {
        let policy = CachePolicy::new();
        assert!(!policy.is_cacheable("SomeNewTool"));
        assert!(!policy.is_cacheable(""));
        assert!(!policy.is_cacheable("read"));
    }

    #[test]
    fn never_cache_wins() {
        let policy = CachePolicy::new().cache_tool("Bash", None);
        assert!(!policy.is_cacheable("Bash"));
    }

    #[test]
    fn ttls() {
        let policy = CachePolicy::new();
        assert_eq!(policy.ttl_for("Read"), Duration::from_secs(300));
        assert_eq!(policy.ttl_for("WebFetch"), Duration::from_secs(900));
    }

    #[test]
    fn added_tool_without_ttl_uses_default() {
        let policy = CachePolicy::new()
            .cache_tool("LSP", None)
            .default_ttl(Duration::from_secs(60));
        assert!(policy.is_cacheable("LSP"));
        assert_eq!(policy.ttl_for("LSP"), Duration::from_secs(60));
    }

    #[test]
    fn empty_policy_caches_nothing() {
        let policy = CachePolicy::empty();
        assert!(!policy.is_cacheable("Read"));
    }

    #[test]
    fn deserialize_partial_policy_keeps_defaults() {
        let policy: CachePolicy = toml::from_str(
            r#"
            default_ttl_secs = 120
            [tool_ttls]
            Read = 30
            "#,
        )
        .unwrap();
        assert!(policy.is_cacheable("Grep"));
        assert_eq!(policy.ttl_for("Read"), Duration::from_secs(30));
        assert!(!policy.is_cacheable("Bash"));
        assert_eq!(policy.default_ttl_secs, 120);
    }
}
