//! Context-pressure tracking.
//!
//! Counts the bytes of tool output an agent run has accumulated. Past the
//! warning threshold it logs; past the prune threshold (or after too many
//! tool calls) it flags that the agent should summarise before continuing,
//! and says so on every following `PreToolUse`. Hooks cannot block a tool,
//! so the flag is advisory.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{HookEvent, HookHandler, HookInput, HookMap};
use crate::Result;

/// Pressure limits for one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ContextThresholds {
    /// Cumulative output bytes above which pressure is logged. Default: 50 000.
    #[serde(default = "default_warn_bytes")]
    pub warn_bytes: u64,
    /// Cumulative output bytes above which summarisation is requested.
    /// Default: 150 000.
    #[serde(default = "default_prune_bytes")]
    pub prune_bytes: u64,
    /// Tool calls after which summarisation is requested. Default: 25.
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,
}

impl Default for ContextThresholds {
    fn default() -> Self {
        Self {
            warn_bytes: default_warn_bytes(),
            prune_bytes: default_prune_bytes(),
            max_tool_calls: default_max_tool_calls(),
        }
    }
}

impl ContextThresholds {
    pub fn warn_bytes(mut self, bytes: u64) -> Self {
        self.warn_bytes = bytes;
        self
    }

    pub fn prune_bytes(mut self, bytes: u64) -> Self {
        self.prune_bytes = bytes;
        self
    }

    pub fn max_tool_calls(mut self, calls: u32) -> Self {
        self.max_tool_calls = calls;
        self
    }
}

fn default_warn_bytes() -> u64 {
    50_000
}

fn default_prune_bytes() -> u64 {
    150_000
}

fn default_max_tool_calls() -> u32 {
    25
}

/// Snapshot of a run's context pressure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContextStats {
    pub total_output_bytes: u64,
    pub tool_call_count: u32,
    pub summarization_requested: bool,
    /// Output bytes as a percentage of the prune threshold, one decimal.
    pub pressure_pct: f64,
}

#[derive(Debug, Default)]
struct ContextState {
    total_output_bytes: u64,
    tool_call_count: u32,
    summarization_requested: bool,
}

/// Tracks context pressure for one agent run.
#[derive(Debug, Default)]
pub struct ContextTracker {
    thresholds: ContextThresholds,
    state: Mutex<ContextState>,
}

impl ContextTracker {
    pub fn new(thresholds: ContextThresholds) -> Self {
        Self {
            thresholds,
            state: Mutex::default(),
        }
    }

    pub fn thresholds(&self) -> &ContextThresholds {
        &self.thresholds
    }

    /// Account for one tool response.
    pub fn observe(&self, response: Option<&str>) {
        let mut state = self.lock();
        state.total_output_bytes += response.map_or(0, |r| r.len() as u64);
        state.tool_call_count += 1;

        if state.total_output_bytes > self.thresholds.warn_bytes && !state.summarization_requested
        {
            info!(
                total_output_bytes = state.total_output_bytes,
                tool_calls = state.tool_call_count,
                "context pressure warning"
            );
        }

        if state.total_output_bytes > self.thresholds.prune_bytes {
            state.summarization_requested = true;
            warn!(
                total_output_bytes = state.total_output_bytes,
                threshold = self.thresholds.prune_bytes,
                "context pruning requested: output threshold exceeded"
            );
        }

        if state.tool_call_count >= self.thresholds.max_tool_calls {
            state.summarization_requested = true;
            warn!(
                tool_calls = state.tool_call_count,
                "context pruning requested: tool call limit reached"
            );
        }
    }

    /// Log the summarisation advisory if it is due. Returns whether it was.
    pub fn advise(&self) -> bool {
        let stats = self.stats();
        if stats.summarization_requested {
            info!(
                pressure_pct = stats.pressure_pct,
                "context pressure high, summarize before continuing"
            );
        }
        stats.summarization_requested
    }

    pub fn stats(&self) -> ContextStats {
        let state = self.lock();
        let pct = if self.thresholds.prune_bytes == 0 {
            0.0
        } else {
            state.total_output_bytes as f64 / self.thresholds.prune_bytes as f64 * 100.0
        };
        ContextStats {
            total_output_bytes: state.total_output_bytes,
            tool_call_count: state.tool_call_count,
            summarization_requested: state.summarization_requested,
            pressure_pct: (pct * 10.0).round() / 10.0,
        }
    }

    /// Start a new run.
    pub fn reset(&self) {
        *self.lock() = ContextState::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HookHandler for ContextTracker {
    fn name(&self) -> &str {
        "context_tracker"
    }

    async fn handle(&self, input: &HookInput) -> Result<()> {
        match input {
            HookInput::PostToolUse(result) => self.observe(result.tool_response.as_deref()),
            HookInput::PreToolUse(_) => {
                self.advise();
            }
            HookInput::SubagentStop(_) | HookInput::Stop(_) => {}
        }
        Ok(())
    }
}

/// `PostToolUse` observes, `PreToolUse` advises.
pub fn context_hooks(tracker: Arc<ContextTracker>) -> HookMap {
    let handler: Arc<dyn HookHandler> = tracker;
    HookMap::from([
        (HookEvent::PostToolUse, Arc::clone(&handler)),
        (HookEvent::PreToolUse, handler),
    ])
}
