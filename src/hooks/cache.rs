//! Cache population on `PostToolUse`.

use std::sync::Arc;

use async_trait::async_trait;

use super::{HookEvent, HookHandler, HookInput, HookMap};
use crate::Result;
use crate::cache::ToolCache;

/// Stores every non-empty, cacheable tool response.
#[derive(Debug)]
pub struct CachePopulator {
    cache: Arc<ToolCache>,
}

impl CachePopulator {
    pub fn new(cache: Arc<ToolCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl HookHandler for CachePopulator {
    fn name(&self) -> &str {
        "cache_populate"
    }

    async fn handle(&self, input: &HookInput) -> Result<()> {
        let HookInput::PostToolUse(result) = input else {
            return Ok(());
        };
        let Some(response) = result.tool_response.as_deref().filter(|r| !r.is_empty()) else {
            return Ok(());
        };
        if self.cache.is_cacheable(&result.tool_name) {
            self.cache
                .store(&result.tool_name, &result.tool_input, response.to_string())
                .await;
        }
        Ok(())
    }
}

/// `PostToolUse` → [`CachePopulator`].
pub fn cache_hooks(cache: Arc<ToolCache>) -> HookMap {
    HookMap::from([(
        HookEvent::PostToolUse,
        Arc::new(CachePopulator::new(cache)) as Arc<dyn HookHandler>,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::hooks::{ToolResult, ToolUse};
    use serde_json::json;

    fn post(tool: &str, response: Option<&str>) -> HookInput {
        HookInput::PostToolUse(ToolResult {
            tool_name: tool.to_string(),
            tool_input: json!({"file_path": "/a.py"}),
            tool_response: response.map(str::to_string),
            session_id: None,
        })
    }

    #[tokio::test]
    async fn populates_cacheable_response() {
        let cache = Arc::new(ToolCache::new(Arc::new(MemoryBackend::new())));
        let populator = CachePopulator::new(Arc::clone(&cache));

        populator.handle(&post("Read", Some("data"))).await.unwrap();

        let cached = cache.lookup("Read", &json!({"file_path": "/a.py"})).await;
        assert_eq!(cached.as_deref(), Some("data"));
        assert_eq!(cache.stats().sets, 1);
    }

    #[tokio::test]
    async fn skips_empty_missing_and_uncacheable() {
        let cache = Arc::new(ToolCache::new(Arc::new(MemoryBackend::new())));
        let populator = CachePopulator::new(Arc::clone(&cache));

        populator.handle(&post("Read", None)).await.unwrap();
        populator.handle(&post("Read", Some(""))).await.unwrap();
        populator.handle(&post("Bash", Some("out"))).await.unwrap();
        populator
            .handle(&HookInput::PreToolUse(ToolUse {
                tool_name: "Read".into(),
                tool_input: json!({}),
                session_id: None,
            }))
            .await
            .unwrap();

        assert_eq!(cache.stats().sets, 0);
    }
}
