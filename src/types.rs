//! Core result types shared by the executor, scheduler, and trace store.
//!
//! A [`StepResult`] is the complete record of one step's fate in a
//! superstep: its output and messages on success, the error-policy outcome
//! on failure, and the diagnostic traces ([`ConditionTrace`],
//! [`RoutingTrace`]) that explain why the step was skipped or where it
//! routed next.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Whether a step's body actually ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The body ran (possibly failing) at least once.
    Executed,
    /// The gate short-circuited the step before dispatch.
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Executed => write!(f, "executed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Record of a gate evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionTrace {
    /// The gate expression as written in the document.
    pub raw: String,
    /// The outcome; evaluation errors record `false`.
    pub result: bool,
}

/// Record of a routing decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTrace {
    /// Stringified original directive.
    pub raw: String,
    /// The chosen target id, empty when no route matched.
    pub result: String,
}

/// Error-policy outcome tags recorded on results and trace rows.
pub mod strategy {
    pub const FAIL: &str = "fail";
    pub const IGNORE: &str = "ignore";
    pub const FALLBACK: &str = "fallback";
    pub const RETRY_FALLBACK: &str = "retry-fallback";
}

/// The outcome of executing (or skipping) a single step.
#[derive(Clone, Debug)]
pub struct StepResult {
    /// Id of the step this result belongs to.
    pub node_name: String,
    /// Tool return value on success; absent for parallel and failed steps.
    pub output: Option<Value>,
    /// Resolved message templates, in document order.
    pub messages: Vec<(String, String)>,
    /// Terminal error, set only when the step counts as failed.
    pub err: Option<String>,
    /// Additional attempts performed after the first.
    pub retries: u32,
    /// The error was swallowed by the `ignore` strategy.
    pub ignored: bool,
    /// Fallback step to schedule with exclusive priority.
    pub fallback: Option<String>,
    /// Error-policy tag (`strategy` module constants), absent on success.
    pub strategy: Option<&'static str>,
    /// Original failure text, kept even when the error was cleared.
    pub error_msg: String,
    pub status: StepStatus,
    /// Gate trace, present when a `when` expression was evaluated.
    pub condition: Option<ConditionTrace>,
    /// Routing trace, back-filled by the scheduling decision that follows.
    pub routing: Option<RoutingTrace>,
}

impl StepResult {
    /// A successful execution.
    #[must_use]
    pub fn success(
        node_name: impl Into<String>,
        output: Option<Value>,
        messages: Vec<(String, String)>,
        retries: u32,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            output,
            messages,
            retries,
            ..Self::empty()
        }
    }

    /// A terminal failure under the `fail` strategy.
    #[must_use]
    pub fn failed(node_name: impl Into<String>, error: impl Into<String>, retries: u32) -> Self {
        let error = error.into();
        Self {
            node_name: node_name.into(),
            err: Some(error.clone()),
            error_msg: error,
            retries,
            strategy: Some(strategy::FAIL),
            ..Self::empty()
        }
    }

    /// A swallowed failure under the `ignore` strategy.
    #[must_use]
    pub fn ignored(node_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            ignored: true,
            error_msg: error.into(),
            strategy: Some(strategy::IGNORE),
            ..Self::empty()
        }
    }

    /// An immediate fallback under the `fallback` strategy.
    #[must_use]
    pub fn fallback(
        node_name: impl Into<String>,
        target: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        Self {
            node_name: node_name.into(),
            err: Some(format!("fallback triggered: {error}")),
            error_msg: error,
            fallback: Some(target.into()),
            strategy: Some(strategy::FALLBACK),
            ..Self::empty()
        }
    }

    /// A fallback after retry exhaustion.
    #[must_use]
    pub fn retry_fallback(
        node_name: impl Into<String>,
        target: impl Into<String>,
        error: impl Into<String>,
        retries: u32,
    ) -> Self {
        let error = error.into();
        Self {
            node_name: node_name.into(),
            err: Some(format!("max retries exceeded, triggering fallback: {error}")),
            error_msg: error,
            fallback: Some(target.into()),
            retries,
            strategy: Some(strategy::RETRY_FALLBACK),
            ..Self::empty()
        }
    }

    /// A synthetic result for a gate-skipped step.
    #[must_use]
    pub fn skipped(node_name: impl Into<String>, condition: ConditionTrace) -> Self {
        Self {
            node_name: node_name.into(),
            status: StepStatus::Skipped,
            condition: Some(condition),
            ..Self::empty()
        }
    }

    /// Whether this step's routing should be followed by the scheduler:
    /// it succeeded, its error was ignored, or its gate skipped it.
    #[must_use]
    pub fn advances(&self) -> bool {
        self.err.is_none() || self.ignored || self.status == StepStatus::Skipped
    }

    fn empty() -> Self {
        Self {
            node_name: String::new(),
            output: None,
            messages: Vec::new(),
            err: None,
            retries: 0,
            ignored: false,
            fallback: None,
            strategy: None,
            error_msg: String::new(),
            status: StepStatus::Executed,
            condition: None,
            routing: None,
        }
    }
}
