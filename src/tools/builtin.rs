//! Builtin tools used by example workflows and the engine's own tests.
//!
//! Real integrations (HTTP fetch, parsers, model calls) live outside the
//! engine and register through the same [`ToolRegistry`] at process start.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tokio::time::{sleep, Duration};

use super::{Tool, ToolContext, ToolError, ToolRegistry};

/// Register `echo`, `delay`, and `always_fail`.
pub fn register_builtins(registry: &mut ToolRegistry) {
    // Names are unique here, so registration cannot fail.
    let _ = registry.register("echo", Echo);
    let _ = registry.register("delay", Delay);
    let _ = registry.register("always_fail", AlwaysFail);
}

/// Returns its `v` parameter, or the whole input mapping when `v` is absent.
pub struct Echo;

#[async_trait]
impl Tool for Echo {
    async fn run(
        &self,
        _ctx: ToolContext,
        input: FxHashMap<String, Value>,
    ) -> Result<Value, ToolError> {
        if let Some(v) = input.get("v") {
            return Ok(v.clone());
        }
        let map: Map<String, Value> = input.into_iter().collect();
        Ok(Value::Object(map))
    }
}

/// Sleeps `ms` milliseconds, then echoes `v`. Honors cancellation, so a
/// firing deadline stops the wait promptly.
pub struct Delay;

#[async_trait]
impl Tool for Delay {
    async fn run(
        &self,
        ctx: ToolContext,
        input: FxHashMap<String, Value>,
    ) -> Result<Value, ToolError> {
        let ms = input.get("ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::select! {
            _ = sleep(Duration::from_millis(ms)) => {}
            _ = ctx.cancelled() => return Err(ToolError::DeadlineExceeded),
        }
        Ok(input.get("v").cloned().unwrap_or(Value::Null))
    }
}

/// Always errors, with an optional `message` parameter.
pub struct AlwaysFail;

#[async_trait]
impl Tool for AlwaysFail {
    async fn run(
        &self,
        _ctx: ToolContext,
        input: FxHashMap<String, Value>,
    ) -> Result<Value, ToolError> {
        let message = input
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("always_fail invoked");
        Err(ToolError::failed(message))
    }
}
