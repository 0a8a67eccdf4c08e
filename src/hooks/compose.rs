//! Merging handler maps.
//!
//! ```text
//!   {Post: cache}  {Post: context, Pre: context}  {Post: activity}
//!          └──────────────┬───────────────────────────┘
//!                     compose
//!                         ▼
//!   {Post: chain[cache, context, activity], Pre: context}
//! ```
//!
//! An event with one contributor keeps that exact handler. An event with
//! several gets a [`ChainHandler`] that runs them in contribution order and
//! isolates their failures from one another.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::warn;

use super::{HookEvent, HookHandler, HookInput, HookMap};
use crate::{Result, telemetry};

/// Merge handler maps, chaining handlers that share an event.
pub fn compose<I>(maps: I) -> HookMap
where
    I: IntoIterator<Item = HookMap>,
{
    let mut merged: Vec<(HookEvent, Vec<Arc<dyn HookHandler>>)> = Vec::new();
    for map in maps {
        for (event, handler) in map {
            match merged.iter_mut().find(|(e, _)| *e == event) {
                Some((_, handlers)) => handlers.push(handler),
                None => merged.push((event, vec![handler])),
            }
        }
    }

    merged
        .into_iter()
        .map(|(event, mut handlers)| {
            let handler = if handlers.len() == 1 {
                handlers.remove(0)
            } else {
                Arc::new(ChainHandler::new(event, handlers)) as Arc<dyn HookHandler>
            };
            (event, handler)
        })
        .collect()
}

/// Send `input` to the handler registered for its event.
///
/// No handler is a no-op. A failing handler is logged, never propagated.
pub async fn dispatch(map: &HookMap, input: &HookInput) {
    if let Some(handler) = map.get(&input.event()) {
        run_isolated(input.event(), handler.as_ref(), input).await;
    }
}

/// Several handlers for one event, run one after another.
pub struct ChainHandler {
    name: String,
    event: HookEvent,
    handlers: Vec<Arc<dyn HookHandler>>,
}

impl ChainHandler {
    pub fn new(event: HookEvent, handlers: Vec<Arc<dyn HookHandler>>) -> Self {
        Self {
            name: format!("chained_{event}"),
            event,
            handlers,
        }
    }

    pub fn handlers(&self) -> &[Arc<dyn HookHandler>] {
        &self.handlers
    }
}

#[async_trait]
impl HookHandler for ChainHandler {
    fn name(&self) -> &str {
        &self.name
    }

    /// Runs every handler in order. Never fails.
    async fn handle(&self, input: &HookInput) -> Result<()> {
        for handler in &self.handlers {
            run_isolated(self.event, handler.as_ref(), input).await;
        }
        Ok(())
    }
}

/// Await one handler, logging an error or panic instead of returning it.
async fn run_isolated(event: HookEvent, handler: &dyn HookHandler, input: &HookInput) {
    let failure = match AssertUnwindSafe(handler.handle(input)).catch_unwind().await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
    };

    metrics::counter!(telemetry::HOOK_FAILURES_TOTAL, "event" => event.as_str()).increment(1);
    warn!(
        event = %event,
        handler = handler.name(),
        error = %failure,
        "hook handler failed"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
