//! Agent lifecycle hooks.
//!
//! The agent runtime fires one [`HookInput`] per lifecycle event. Side-effect
//! handlers (cache population, context-pressure tracking, activity logging)
//! are written independently, each contributing a [`HookMap`]; [`compose`]
//! merges those maps into one handler per event.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use munin::backend::MemoryBackend;
//! # use munin::cache::ToolCache;
//! # use munin::hooks::{self, ContextTracker, HookInput, ToolResult};
//! # async fn run() {
//! let cache = Arc::new(ToolCache::new(Arc::new(MemoryBackend::new())));
//! let context = Arc::new(ContextTracker::default());
//! let merged = hooks::compose([
//!     hooks::cache_hooks(cache),
//!     hooks::context_hooks(context),
//! ]);
//!
//! let input = HookInput::PostToolUse(ToolResult {
//!     tool_name: "Read".into(),
//!     tool_input: serde_json::json!({"file_path": "/a.py"}),
//!     tool_response: Some("data".into()),
//!     session_id: None,
//! });
//! hooks::dispatch(&merged, &input).await;
//! # }
//! ```

pub mod activity;
pub mod cache;
pub mod chain;
pub mod compose;
pub mod context;

pub use activity::{ActivityRecord, ActivitySink, ActivityTracker, TracingSink, activity_hooks};
pub use cache::{CachePopulator, cache_hooks};
pub use chain::{ChainDetector, ToolChainRegistry, chain_hooks};
pub use compose::{ChainHandler, compose, dispatch};
pub use context::{ContextStats, ContextThresholds, ContextTracker, context_hooks};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Lifecycle events a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HookEvent {
    PreToolUse,
    PostToolUse,
    SubagentStop,
    Stop,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::PreToolUse => "PreToolUse",
            HookEvent::PostToolUse => "PostToolUse",
            HookEvent::SubagentStop => "SubagentStop",
            HookEvent::Stop => "Stop",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `PreToolUse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Payload of `PostToolUse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub tool_response: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Payload of `SubagentStop` and `Stop`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionEnd {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub num_turns: Option<u32>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
}

/// One lifecycle event with its payload.
///
/// Deserializes from the runtime's JSON, tagged by `hook_event_name`:
///
/// ```json
/// {"hook_event_name": "PostToolUse", "tool_name": "Read",
///  "tool_input": {"file_path": "/a.py"}, "tool_response": "data"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hook_event_name")]
pub enum HookInput {
    PreToolUse(ToolUse),
    PostToolUse(ToolResult),
    SubagentStop(SessionEnd),
    Stop(SessionEnd),
}

impl HookInput {
    pub fn event(&self) -> HookEvent {
        match self {
            HookInput::PreToolUse(_) => HookEvent::PreToolUse,
            HookInput::PostToolUse(_) => HookEvent::PostToolUse,
            HookInput::SubagentStop(_) => HookEvent::SubagentStop,
            HookInput::Stop(_) => HookEvent::Stop,
        }
    }

    /// Tool name for tool events.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            HookInput::PreToolUse(u) => Some(&u.tool_name),
            HookInput::PostToolUse(r) => Some(&r.tool_name),
            HookInput::SubagentStop(_) | HookInput::Stop(_) => None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            HookInput::PreToolUse(u) => u.session_id.as_deref(),
            HookInput::PostToolUse(r) => r.session_id.as_deref(),
            HookInput::SubagentStop(s) | HookInput::Stop(s) => s.session_id.as_deref(),
        }
    }
}

/// A side-effect run on lifecycle events.
///
/// Handlers observe; they cannot alter or block tool execution. An error
/// returned here is logged by the composer and goes no further.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, input: &HookInput) -> Result<()>;
}

/// Event → handler.
pub type HookMap = HashMap<HookEvent, Arc<dyn HookHandler>>;

/// A [`HookHandler`] backed by a closure.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> HookHandler for FnHandler<F>
where
    F: Fn(HookInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, input: &HookInput) -> Result<()> {
        (self.f)(input.clone()).await
    }
}

/// Wrap an async closure as a handler.
///
/// ```rust
/// # use munin::hooks::{handler_fn, HookHandler};
/// let handler = handler_fn("noop", |_input| async { Ok(()) });
/// assert_eq!(handler.name(), "noop");
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn HookHandler>
where
    F: Fn(HookInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}
