//! Workflow model: steps, error policies, and routing directives.
//!
//! A [`Workflow`] is immutable after load. Step order matters twice: the
//! first step is the entry point, and a step without an explicit `next`
//! directive falls through to the step that follows it in the list.
//!
//! Steps are a tagged variant over a shared header: [`StepBody::Task`]
//! invokes a named tool, [`StepBody::Parallel`] fans out into branches that
//! are themselves full steps.

pub mod loader;
pub mod routing;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub use loader::{
    discover_workflows, load_workflow_file, parse_workflow_yaml, WorkflowError,
};
pub use routing::{Routing, RoutingKind};

/// An immutable, validated workflow definition.
#[derive(Clone, Debug)]
pub struct Workflow {
    /// Display name from the document.
    pub name: String,
    /// Initial memory bindings in document order.
    pub initial_memory: Vec<(String, Value)>,
    /// Steps in document order.
    pub steps: Vec<Step>,
    index: FxHashMap<String, usize>,
}

impl Workflow {
    /// Build a workflow, indexing steps by id for scheduler lookups.
    #[must_use]
    pub fn new(name: String, initial_memory: Vec<(String, Value)>, steps: Vec<Step>) -> Self {
        let index = steps
            .iter()
            .enumerate()
            .map(|(i, step)| (step.id.clone(), i))
            .collect();
        Self {
            name,
            initial_memory,
            steps,
            index,
        }
    }

    /// Look up a top-level step by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    /// The step immediately following `id` in document order, if any.
    /// This is the sequential fallthrough used when a step has no `next`.
    #[must_use]
    pub fn step_after(&self, id: &str) -> Option<&Step> {
        self.index.get(id).and_then(|&i| self.steps.get(i + 1))
    }

    /// The entry step (first in document order).
    #[must_use]
    pub fn entry(&self) -> Option<&Step> {
        self.steps.first()
    }
}

/// A single workflow step: shared header plus a task or parallel body.
#[derive(Clone, Debug)]
pub struct Step {
    /// Unique non-empty identifier within the workflow.
    pub id: String,
    /// Optional boolean gate; a false or failing gate skips the step.
    pub when: Option<String>,
    /// Normalized routing directive, `None` for sequential fallthrough.
    pub next: Option<Routing>,
    /// Message templates resolved after successful execution, in document
    /// order (order defines the last-writer outcome on key collisions).
    pub messages: Vec<(String, String)>,
    /// Memory path for the step output; `global.<id>` when absent.
    pub output: Option<String>,
    /// Error handling policy.
    pub error: ErrorPolicy,
    /// Task or parallel body.
    pub body: StepBody,
}

impl Step {
    /// The step kind as it appears in workflow documents.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self.body {
            StepBody::Task { .. } => "task",
            StepBody::Parallel { .. } => "parallel",
        }
    }
}

/// The executable body of a step.
#[derive(Clone, Debug)]
pub enum StepBody {
    /// Invoke a registered tool with interpolated inputs.
    Task {
        tool: String,
        input: FxHashMap<String, Value>,
    },
    /// Run each branch concurrently as an independent single-step execution.
    Parallel { branches: Vec<Step> },
}

/// Per-step error handling configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub strategy: ErrorStrategy,
    /// Additional attempts after the first; `retries: 2` allows three
    /// attempts in total.
    pub retries: u32,
    /// Pause between retry attempts.
    pub delay_ms: u64,
    /// Per-attempt deadline; zero means effectively unbounded.
    pub timeout_ms: u64,
    /// Remediation step for the fallback strategy, or the re-route target
    /// after retry exhaustion.
    pub fallback: Option<String>,
}

impl ErrorPolicy {
    /// The per-attempt timeout, `None` when unbounded.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// The fallback id, filtered to non-empty.
    #[must_use]
    pub fn fallback_target(&self) -> Option<&str> {
        self.fallback.as_deref().filter(|id| !id.is_empty())
    }
}

/// What to do when a step attempt fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStrategy {
    /// Retry up to `retries` times, then fall back or fail.
    Retry,
    /// Terminate the step with the error; the workflow path ends here.
    #[default]
    Fail,
    /// Swallow the error and continue as if the step succeeded.
    Ignore,
    /// Immediately schedule the configured fallback step.
    Fallback,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str) -> Step {
        Step {
            id: id.to_string(),
            when: None,
            next: None,
            messages: Vec::new(),
            output: None,
            error: ErrorPolicy::default(),
            body: StepBody::Task {
                tool: "echo".to_string(),
                input: FxHashMap::default(),
            },
        }
    }

    #[test]
    fn lookup_and_fallthrough() {
        let wf = Workflow::new(
            "test".to_string(),
            Vec::new(),
            vec![step("a"), step("b"), step("c")],
        );
        assert_eq!(wf.entry().unwrap().id, "a");
        assert_eq!(wf.step("b").unwrap().id, "b");
        assert_eq!(wf.step_after("a").unwrap().id, "b");
        assert!(wf.step_after("c").is_none());
        assert!(wf.step("missing").is_none());
    }

    #[test]
    fn policy_timeout_zero_is_unbounded() {
        let policy = ErrorPolicy::default();
        assert!(policy.timeout().is_none());

        let policy = ErrorPolicy {
            timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(policy.timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn empty_fallback_is_no_target() {
        let policy = ErrorPolicy {
            fallback: Some(String::new()),
            ..Default::default()
        };
        assert!(policy.fallback_target().is_none());
    }
}
