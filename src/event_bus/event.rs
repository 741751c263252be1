use std::fmt;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{StepResult, StepStatus};

/// Lifecycle event kinds emitted during a workflow run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WorkflowStarted,
    SuperstepStart,
    StepStart,
    StepEnd,
    StepSkipped,
    MemoryUpdate,
    WorkflowEnd,
    TraceSnapshot,
    Log,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventKind::WorkflowStarted => "workflow_started",
            EventKind::SuperstepStart => "superstep_start",
            EventKind::StepStart => "step_start",
            EventKind::StepEnd => "step_end",
            EventKind::StepSkipped => "step_skipped",
            EventKind::MemoryUpdate => "memory_update",
            EventKind::WorkflowEnd => "workflow_end",
            EventKind::TraceSnapshot => "trace_snapshot",
            EventKind::Log => "log",
        };
        write!(f, "{label}")
    }
}

/// A timestamped lifecycle event with a free-form payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: FxHashMap<String, Value>,
}

impl Event {
    /// Build an event with the current timestamp.
    #[must_use]
    pub fn new(kind: EventKind, payload: FxHashMap<String, Value>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn workflow_started(name: &str) -> Self {
        Self::new(
            EventKind::WorkflowStarted,
            payload([("workflow", Value::from(name))]),
        )
    }

    pub fn superstep_start(step: u64, cohort: &[String]) -> Self {
        Self::new(
            EventKind::SuperstepStart,
            payload([
                ("superstep", Value::from(step)),
                ("cohort", Value::from(cohort.to_vec())),
            ]),
        )
    }

    pub fn step_start(step_id: &str, kind: &str, tool: Option<&str>) -> Self {
        let mut p = payload([("step_id", Value::from(step_id)), ("kind", Value::from(kind))]);
        if let Some(tool) = tool {
            p.insert("tool".to_string(), Value::from(tool));
        }
        Self::new(EventKind::StepStart, p)
    }

    /// Terminal event for a merged result, carrying its diagnostic fields.
    /// Gate-skipped results map to `step_skipped`.
    pub fn step_end(result: &StepResult) -> Self {
        let mut p = payload([
            ("step_id", Value::from(result.node_name.as_str())),
            ("status", Value::from(result.status.to_string())),
        ]);
        if let Some(output) = &result.output {
            p.insert("output".to_string(), output.clone());
        }
        if let Some(err) = &result.err {
            p.insert("error".to_string(), Value::from(err.as_str()));
        }
        if result.retries > 0 {
            p.insert("retries".to_string(), Value::from(result.retries));
        }
        if let Some(strategy) = result.strategy {
            p.insert("strategy".to_string(), Value::from(strategy));
        }
        if let Some(fallback) = &result.fallback {
            p.insert("fallback".to_string(), Value::from(fallback.as_str()));
        }
        if result.ignored {
            p.insert("ignored".to_string(), Value::from(true));
        }
        if let Some(condition) = &result.condition {
            p.insert(
                "condition".to_string(),
                serde_json::json!({"raw": condition.raw, "result": condition.result}),
            );
        }
        let kind = match result.status {
            StepStatus::Executed => EventKind::StepEnd,
            StepStatus::Skipped => EventKind::StepSkipped,
        };
        Self::new(kind, p)
    }

    pub fn memory_update(path: &str, value: &Value) -> Self {
        Self::new(
            EventKind::MemoryUpdate,
            payload([("path", Value::from(path)), ("value", value.clone())]),
        )
    }

    pub fn workflow_end(name: &str, supersteps: u64, failed: bool) -> Self {
        Self::new(
            EventKind::WorkflowEnd,
            payload([
                ("workflow", Value::from(name)),
                ("supersteps", Value::from(supersteps)),
                ("failed", Value::from(failed)),
            ]),
        )
    }

    pub fn trace_snapshot(path: &str, steps_recorded: usize) -> Self {
        Self::new(
            EventKind::TraceSnapshot,
            payload([
                ("path", Value::from(path)),
                ("steps_recorded", Value::from(steps_recorded)),
            ]),
        )
    }

    pub fn log(scope: &str, message: &str) -> Self {
        Self::new(
            EventKind::Log,
            payload([("scope", Value::from(scope)), ("message", Value::from(message))]),
        )
    }

    fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::WorkflowStarted => {
                write!(f, "workflow started: {}", self.payload_str("workflow").unwrap_or("?"))
            }
            EventKind::SuperstepStart => {
                let cohort = self
                    .payload
                    .get("cohort")
                    .and_then(Value::as_array)
                    .map(|steps| {
                        steps
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                let step = self
                    .payload
                    .get("superstep")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                write!(f, "-- superstep {step} [{cohort}] --")
            }
            EventKind::StepStart => {
                write!(f, "[{}] start", self.payload_str("step_id").unwrap_or("?"))?;
                if let Some(tool) = self.payload_str("tool") {
                    write!(f, " tool={tool}")?;
                }
                Ok(())
            }
            EventKind::StepEnd => {
                let id = self.payload_str("step_id").unwrap_or("?");
                match self.payload_str("error") {
                    Some(error) => write!(f, "[{id}] failed: {error}"),
                    None => write!(f, "[{id}] done"),
                }
            }
            EventKind::StepSkipped => {
                write!(f, "[{}] skipped", self.payload_str("step_id").unwrap_or("?"))
            }
            EventKind::MemoryUpdate => {
                let value = self.payload.get("value").cloned().unwrap_or(Value::Null);
                write!(f, "memory {} = {value}", self.payload_str("path").unwrap_or("?"))
            }
            EventKind::WorkflowEnd => {
                let failed = self
                    .payload
                    .get("failed")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let status = if failed { "failed" } else { "completed" };
                write!(f, "workflow {}: {status}", self.payload_str("workflow").unwrap_or("?"))
            }
            EventKind::TraceSnapshot => {
                write!(f, "trace written to {}", self.payload_str("path").unwrap_or("?"))
            }
            EventKind::Log => write!(
                f,
                "[{}] {}",
                self.payload_str("scope").unwrap_or("log"),
                self.payload_str("message").unwrap_or("")
            ),
        }
    }
}

fn payload<const N: usize>(entries: [(&str, Value); N]) -> FxHashMap<String, Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
