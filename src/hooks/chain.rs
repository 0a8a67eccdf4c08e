//! Tool chains.
//!
//! A chain is a named async routine standing in for a predictable sequence
//! of tool calls (e.g. read every file a glob matched). Chains live in a
//! [`ToolChainRegistry`]; the [`ChainDetector`] hook watches tool results and
//! logs when one looks like a chain opportunity.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use super::{HookEvent, HookHandler, HookInput, HookMap};
use crate::Result;

/// Chain that reads a short list of files in one go.
pub const BATCH_READ: &str = "batch_read";

/// Most glob matches still worth a batch read.
const BATCH_READ_MAX_FILES: usize = 5;

/// A registered chain: tool input in, combined output out.
pub type ChainFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Named chains, in registration order.
#[derive(Default)]
pub struct ToolChainRegistry {
    chains: RwLock<Vec<(String, ChainFn)>>,
}

impl std::fmt::Debug for ToolChainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolChainRegistry")
            .field("chains", &self.list())
            .finish()
    }
}

impl ToolChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `chain` under `name`, replacing any chain of that name.
    pub fn register<F, Fut>(&self, name: impl Into<String>, chain: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let name = name.into();
        let chain: ChainFn = Arc::new(move |input| chain(input).boxed());
        let mut chains = self.chains.write().unwrap_or_else(PoisonError::into_inner);
        match chains.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = chain,
            None => chains.push((name.clone(), chain)),
        }
        debug!(chain = %name, "registered tool chain");
    }

    pub fn get(&self, name: &str) -> Option<ChainFn> {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, chain)| Arc::clone(chain))
    }

    /// Run a chain. `None` if no chain has that name.
    pub async fn run(&self, name: &str, input: Value) -> Option<Result<String>> {
        let chain = self.get(name)?;
        Some(chain(input).await)
    }

    /// Chain names, in registration order.
    pub fn list(&self) -> Vec<String> {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.chains
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.chains.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of files a glob result lists, if few enough to batch-read.
pub fn batch_read_candidates(tool_name: &str, response: &str) -> Option<usize> {
    if tool_name != "Glob" {
        return None;
    }
    let files = response.lines().filter(|l| !l.trim().is_empty()).count();
    (1..=BATCH_READ_MAX_FILES).contains(&files).then_some(files)
}

/// Logs chain opportunities on `PostToolUse`. Never executes anything.
#[derive(Debug, Default)]
pub struct ChainDetector {
    registry: Option<Arc<ToolChainRegistry>>,
}

impl ChainDetector {
    pub fn new(registry: Option<Arc<ToolChainRegistry>>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl HookHandler for ChainDetector {
    fn name(&self) -> &str {
        "chain_detector"
    }

    async fn handle(&self, input: &HookInput) -> Result<()> {
        let HookInput::PostToolUse(result) = input else {
            return Ok(());
        };
        let Some(response) = result.tool_response.as_deref() else {
            return Ok(());
        };
        if let Some(files) = batch_read_candidates(&result.tool_name, response) {
            let registered = self
                .registry
                .as_ref()
                .is_some_and(|r| r.get(BATCH_READ).is_some());
            debug!(
                files,
                chain = BATCH_READ,
                registered,
                "chain opportunity: glob matched few files, consider batch read"
            );
        }
        Ok(())
    }
}

/// `PostToolUse` → [`ChainDetector`].
pub fn chain_hooks(registry: Option<Arc<ToolChainRegistry>>) -> HookMap {
    HookMap::from([(
        HookEvent::PostToolUse,
        Arc::new(ChainDetector::new(registry)) as Arc<dyn HookHandler>,
    )])
}
