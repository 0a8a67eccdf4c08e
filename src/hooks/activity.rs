//! Agent activity log.
//!
//! [`ActivityTracker`] turns every lifecycle event into an [`ActivityRecord`]
//! and hands it to an [`ActivitySink`]. Tool durations are measured from
//! `PreToolUse` to the matching `PostToolUse`, matched on
//! `(session_id, tool_name)`.
//!
//! The default sink, [`TracingSink`], emits each record as a structured
//! `tracing` event under the `munin::activity` target. Persisting records
//! elsewhere means implementing [`ActivitySink`]. A failing sink is logged
//! and otherwise ignored: losing an activity row must never affect the run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{HookEvent, HookHandler, HookInput, HookMap};
use crate::Result;

/// Longest summary kept for tool input and response, in characters.
pub const SUMMARY_MAX_CHARS: usize = 2000;

/// One logged lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRecord {
    pub task_id: Option<String>,
    pub agent_name: String,
    pub agent_role: Option<String>,
    pub session_id: Option<String>,
    pub hook_event: HookEvent,
    pub tool_name: Option<String>,
    pub tool_input_summary: Option<String>,
    pub tool_response_summary: Option<String>,
    pub duration_ms: Option<u64>,
    pub cost_usd: Option<f64>,
    pub num_turns: Option<u32>,
}

/// Destination for activity records.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, record: ActivityRecord) -> Result<()>;
}

/// Emits records as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl ActivitySink for TracingSink {
    async fn record(&self, record: ActivityRecord) -> Result<()> {
        info!(
            target: "munin::activity",
            task_id = record.task_id.as_deref(),
            agent = %record.agent_name,
            role = record.agent_role.as_deref(),
            session_id = record.session_id.as_deref(),
            event = %record.hook_event,
            tool = record.tool_name.as_deref(),
            duration_ms = record.duration_ms,
            cost_usd = record.cost_usd,
            num_turns = record.num_turns,
            "agent activity"
        );
        Ok(())
    }
}

type StartKey = (Option<String>, String);

/// Records agent activity for one agent.
pub struct ActivityTracker {
    task_id: Option<String>,
    agent_name: String,
    agent_role: Option<String>,
    sink: Arc<dyn ActivitySink>,
    started: Mutex<HashMap<StartKey, Instant>>,
}

impl std::fmt::Debug for ActivityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTracker")
            .field("task_id", &self.task_id)
            .field("agent_name", &self.agent_name)
            .field("agent_role", &self.agent_role)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl ActivityTracker {
    /// A tracker logging through [`TracingSink`].
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            task_id: None,
            agent_name: agent_name.into(),
            agent_role: None,
            sink: Arc::new(TracingSink),
            started: Mutex::default(),
        }
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn agent_role(mut self, role: impl Into<String>) -> Self {
        self.agent_role = Some(role.into());
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Tool calls started but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Build the record for `input`, updating in-flight timings.
    pub fn record_for(&self, input: &HookInput) -> ActivityRecord {
        let mut record = ActivityRecord {
            task_id: self.task_id.clone(),
            agent_name: self.agent_name.clone(),
            agent_role: self.agent_role.clone(),
            session_id: input.session_id().map(str::to_string),
            hook_event: input.event(),
            tool_name: input.tool_name().map(str::to_string),
            tool_input_summary: None,
            tool_response_summary: None,
            duration_ms: None,
            cost_usd: None,
            num_turns: None,
        };

        match input {
            HookInput::PreToolUse(usage) => {
                self.lock().insert(
                    (usage.session_id.clone(), usage.tool_name.clone()),
                    Instant::now(),
                );
                record.tool_input_summary = Some(truncate(&usage.tool_input.to_string()));
            }
            HookInput::PostToolUse(result) => {
                let start = self
                    .lock()
                    .remove(&(result.session_id.clone(), result.tool_name.clone()));
                record.duration_ms = start.map(|s| s.elapsed().as_millis() as u64);
                record.tool_input_summary = Some(truncate(&result.tool_input.to_string()));
                record.tool_response_summary = result.tool_response.as_deref().map(truncate);
            }
            HookInput::SubagentStop(end) => {
                self.forget_session(&end.session_id);
                record.num_turns = end.num_turns;
            }
            HookInput::Stop(end) => {
                self.forget_session(&end.session_id);
                record.num_turns = end.num_turns;
                record.cost_usd = end.cost_usd;
            }
        }
        record
    }

    /// Drop start times of tool calls that never finished in `session`.
    fn forget_session(&self, session: &Option<String>) {
        self.lock().retain(|(started_in, _), _| started_in != session);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<StartKey, Instant>> {
        self.started.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HookHandler for ActivityTracker {
    fn name(&self) -> &str {
        "activity_tracker"
    }

    async fn handle(&self, input: &HookInput) -> Result<()> {
        let record = self.record_for(input);
        if let Err(e) = self.sink.record(record).await {
            warn!(
                agent = %self.agent_name,
                event = %input.event(),
                error = %e,
                "failed to record agent activity"
            );
        }
        Ok(())
    }
}

/// All four events → the same tracker.
pub fn activity_hooks(tracker: Arc<ActivityTracker>) -> HookMap {
    let handler: Arc<dyn HookHandler> = tracker;
    [
        HookEvent::PreToolUse,
        HookEvent::PostToolUse,
        HookEvent::SubagentStop,
        HookEvent::Stop,
    ]
    .into_iter()
    .map(|event| (event, Arc::clone(&handler)))
    .collect()
}

/// Cut `text` to [`SUMMARY_MAX_CHARS`], ending in `...` when cut.
fn truncate(text: &str) -> String {
    if text.chars().count() <= SUMMARY_MAX_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(SUMMARY_MAX_CHARS - 3).collect();
    out.push_str("...");
    out
}
