//! Tests for hook composition and dispatch.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use munin::hooks::{
    self, ChainHandler, HookEvent, HookHandler, HookInput, HookMap, SessionEnd, ToolUse,
    handler_fn,
};
use munin::{MuninError, Result};

type Log = Arc<Mutex<Vec<String>>>;

/// Handler that appends its name to `log`.
fn recording(name: &'static str, log: &Log) -> Arc<dyn HookHandler> {
    let log = Arc::clone(log);
    handler_fn(name, move |_| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(name.to_string());
            Ok(())
        }
    })
}

fn failing(name: &'static str) -> Arc<dyn HookHandler> {
    handler_fn(name, move |_| async move {
        Err(MuninError::handler(name, "database unavailable"))
    })
}

struct Panicking;

#[async_trait]
impl HookHandler for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn handle(&self, _input: &HookInput) -> Result<()> {
        panic!("handler bug")
    }
}

fn pre_tool() -> HookInput {
    HookInput::PreToolUse(ToolUse {
        tool_name: "Read".into(),
        tool_input: json!({"file_path": "/a.py"}),
        session_id: Some("s1".into()),
    })
}

fn single(event: HookEvent, handler: Arc<dyn HookHandler>) -> HookMap {
    HookMap::from([(event, handler)])
}

#[tokio::test]
async fn failing_handler_does_not_stop_the_next() {
    let log = Log::default();
    let merged = hooks::compose([
        single(HookEvent::PreToolUse, failing("h1")),
        single(HookEvent::PreToolUse, recording("h2", &log)),
    ]);

    let chain = &merged[&HookEvent::PreToolUse];
    assert!(chain.handle(&pre_tool()).await.is_ok());
    assert_eq!(*log.lock().unwrap(), ["h2"]);
}

#[tokio::test]
async fn panicking_handler_is_isolated() {
    let log = Log::default();
    let merged = hooks::compose([
        single(HookEvent::Stop, recording("before", &log)),
        single(HookEvent::Stop, Arc::new(Panicking)),
        single(HookEvent::Stop, recording("after", &log)),
    ]);

    hooks::dispatch(&merged, &HookInput::Stop(SessionEnd::default())).await;

    assert_eq!(*log.lock().unwrap(), ["before", "after"]);
}

#[tokio::test]
async fn chain_runs_in_contribution_order() {
    let log = Log::default();
    let merged = hooks::compose([
        single(HookEvent::PostToolUse, recording("cache", &log)),
        single(HookEvent::PostToolUse, recording("context", &log)),
        single(HookEvent::PostToolUse, recording("activity", &log)),
    ]);

    assert_eq!(merged[&HookEvent::PostToolUse].name(), "chained_PostToolUse");
    let input = HookInput::PostToolUse(hooks::ToolResult {
        tool_name: "Read".into(),
        tool_input: json!({}),
        tool_response: None,
        session_id: None,
    });
    hooks::dispatch(&merged, &input).await;
    hooks::dispatch(&merged, &input).await;

    assert_eq!(
        *log.lock().unwrap(),
        ["cache", "context", "activity", "cache", "context", "activity"]
    );
}

#[test]
fn single_contributor_passes_through_unwrapped() {
    let log = Log::default();
    let handler = recording("only", &log);
    let other = recording("other", &log);

    let merged = hooks::compose([
        single(HookEvent::PreToolUse, Arc::clone(&handler)),
        single(HookEvent::Stop, other),
    ]);

    assert!(Arc::ptr_eq(&merged[&HookEvent::PreToolUse], &handler));
    assert_eq!(merged[&HookEvent::PreToolUse].name(), "only");
}

#[test]
fn events_from_different_maps_merge() {
    let log = Log::default();
    let merged = hooks::compose([
        HookMap::from([
            (HookEvent::PreToolUse, recording("a-pre", &log)),
            (HookEvent::PostToolUse, recording("a-post", &log)),
        ]),
        single(HookEvent::PostToolUse, recording("b-post", &log)),
        HookMap::new(),
    ]);

    assert_eq!(merged.len(), 2);
    assert_eq!(merged[&HookEvent::PreToolUse].name(), "a-pre");
    assert_eq!(merged[&HookEvent::PostToolUse].name(), "chained_PostToolUse");
}

#[tokio::test]
async fn dispatch_swallows_single_handler_failure() {
    let merged = hooks::compose([single(HookEvent::PreToolUse, failing("lonely"))]);
    hooks::dispatch(&merged, &pre_tool()).await;
}

#[tokio::test]
async fn dispatch_ignores_unregistered_events() {
    let log = Log::default();
    let merged = hooks::compose([single(HookEvent::Stop, recording("stop", &log))]);

    hooks::dispatch(&merged, &pre_tool()).await;

    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn chain_handler_built_directly() {
    let log = Log::default();
    let chain = ChainHandler::new(
        HookEvent::SubagentStop,
        vec![failing("x"), recording("y", &log), failing("z")],
    );

    chain
        .handle(&HookInput::SubagentStop(SessionEnd {
            session_id: Some("s".into()),
            num_turns: Some(3),
            cost_usd: None,
        }))
        .await
        .unwrap();

    assert_eq!(*log.lock().unwrap(), ["y"]);
}
