//! Fixtures shared by unit and integration tests.
//!
//! Kept in the library (rather than `tests/common` alone) so doctests and
//! unit tests can reuse the same builders.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};

use crate::tools::{Tool, ToolContext, ToolError};
use crate::workflow::{ErrorPolicy, Step, StepBody, Workflow};

/// A task step with no gate, routing, messages, or inputs.
#[must_use]
pub fn task_step(id: &str, tool: &str) -> Step {
    Step {
        id: id.to_string(),
        when: None,
        next: None,
        messages: Vec::new(),
        output: None,
        error: ErrorPolicy::default(),
        body: StepBody::Task {
            tool: tool.to_string(),
            input: FxHashMap::default(),
        },
    }
}

/// A parallel step fanning out into `branches`.
#[must_use]
pub fn parallel_step(id: &str, branches: Vec<Step>) -> Step {
    Step {
        id: id.to_string(),
        when: None,
        next: None,
        messages: Vec::new(),
        output: None,
        error: ErrorPolicy::default(),
        body: StepBody::Parallel { branches },
    }
}

/// A workflow with no initial memory.
#[must_use]
pub fn workflow(name: &str, steps: Vec<Step>) -> Workflow {
    Workflow::new(name.to_string(), Vec::new(), steps)
}

/// Records every input mapping it is invoked with and returns `"ok"`.
#[derive(Clone, Default)]
pub struct RecordingTool {
    calls: Arc<Mutex<Vec<FxHashMap<String, Value>>>>,
}

impl RecordingTool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inputs seen so far, in invocation order.
    #[must_use]
    pub fn calls(&self) -> Vec<FxHashMap<String, Value>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    async fn run(
        &self,
        _ctx: ToolContext,
        input: FxHashMap<String, Value>,
    ) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push(input);
        Ok(json!("ok"))
    }
}

/// Fails a fixed number of times, then succeeds with `"recovered"`.
pub struct FlakyTool {
    remaining_failures: AtomicU32,
}

impl FlakyTool {
    #[must_use]
    pub fn failing(times: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(times),
        }
    }
}

#[async_trait]
impl Tool for FlakyTool {
    async fn run(
        &self,
        _ctx: ToolContext,
        _input: FxHashMap<String, Value>,
    ) -> Result<Value, ToolError> {
        let before = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if before > 0 {
            Err(ToolError::failed(format!(
                "transient failure ({} left)",
                before - 1
            )))
        } else {
            Ok(json!("recovered"))
        }
    }
}
