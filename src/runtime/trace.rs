//! Append-only execution trace and its file serialization.
//!
//! One [`TraceEvent`] is appended per merged [`StepResult`], in merge
//! order. Routing traces are only known at the *next* scheduling decision,
//! so they are back-filled by step name, write-once, before new rows are
//! appended.

use std::path::Path;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{ConditionTrace, RoutingTrace, StepResult, StepStatus};

/// Errors raised while persisting the trace. Non-fatal to the run.
#[derive(Debug, Error, Diagnostic)]
pub enum TraceError {
    #[error("failed to serialize trace: {0}")]
    #[diagnostic(code(skein::trace::serialize))]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(skein::trace::io))]
    Io(#[from] std::io::Error),
}

/// One step outcome as recorded in the trace file.
///
/// The `memory` field is a deep snapshot taken at merge time, before this
/// step's own writes are applied. Absent or empty fields are omitted from
/// the serialized form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceEvent {
    pub step_name: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub memory: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub messages: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub error: String,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fallback: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub ignored: bool,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub condition: Option<ConditionTrace>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub routing: Option<RoutingTrace>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl TraceEvent {
    /// Build a trace row from a merged result and a fresh memory snapshot.
    #[must_use]
    pub fn from_result(result: &StepResult, memory: Value) -> Self {
        Self {
            step_name: result.node_name.clone(),
            memory,
            output: result.output.clone(),
            messages: result
                .messages
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                .collect(),
            timestamp: Utc::now(),
            error: result.err.clone().unwrap_or_default(),
            retries: result.retries,
            strategy: result.strategy.map(str::to_string),
            fallback: result.fallback.clone(),
            ignored: result.ignored,
            status: result.status,
            condition: result.condition.clone(),
            routing: result.routing.clone(),
        }
    }
}

#[derive(Serialize)]
struct TraceFile<'a> {
    steps: &'a [TraceEvent],
}

/// Ordered, append-only record of step events for one run.
#[derive(Debug, Default)]
pub struct TraceStore {
    steps: Vec<TraceEvent>,
}

impl TraceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row in merge order.
    pub fn append(&mut self, event: TraceEvent) {
        self.steps.push(event);
    }

    /// Back-fill the routing decision for `step_name`, write-once.
    ///
    /// Targets the most recent row for that step without a routing trace,
    /// so a step revisited as a fallback target gets its latest row.
    pub fn backfill_routing(&mut self, step_name: &str, routing: RoutingTrace) {
        let row = self
            .steps
            .iter_mut()
            .rev()
            .find(|event| event.step_name == step_name && event.routing.is_none());
        match row {
            Some(event) => event.routing = Some(routing),
            None => {
                tracing::debug!(step_name, "no trace row awaiting a routing back-fill");
            }
        }
    }

    /// All rows, in merge order.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Serialize the full trace as pretty JSON (`{"steps": [...]}`).
    pub fn save(&self, path: &Path) -> Result<(), TraceError> {
        let rendered = serde_json::to_string_pretty(&TraceFile { steps: &self.steps })?;
        std::fs::write(path, rendered)?;
        Ok(())
    }
}
