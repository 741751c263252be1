//! The orchestrator: the top-level superstep loop.
//!
//! Each iteration asks the [`Scheduler`] for the next cohort, filters it
//! through the per-step gates, runs the survivors concurrently, and merges
//! every result back into memory and the trace before looping. The run
//! ends when the scheduler returns an empty cohort.
//!
//! The orchestrator is the only writer of memory during the merge phase;
//! within a superstep, observable effects are applied sequentially in
//! dispatch order, so same-path writes have a well-defined last-writer
//! outcome and every effect of superstep N is visible to superstep N+1.

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashSet;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::instrument;

use crate::event_bus::{Event, EventBus, EventBusMetrics, EventSender, EventSink};
use crate::executor::StepExecutor;
use crate::expr;
use crate::memory::Memory;
use crate::scheduler::Scheduler;
use crate::tools::ToolRegistry;
use crate::types::{ConditionTrace, StepResult};
use crate::workflow::{Step, Workflow};

use super::config::RuntimeConfig;
use super::superstep;
use super::trace::{TraceEvent, TraceStore};

/// Errors that abort a run. Step failures never do; they are folded into
/// results and the run ends at the next scheduling decision instead.
#[derive(Debug, Error, Diagnostic)]
pub enum RuntimeError {
    /// A dispatched step task could not be joined (it panicked or was
    /// cancelled by the runtime).
    #[error("workflow task join error: {0}")]
    #[diagnostic(code(skein::runtime::join))]
    Join(#[from] JoinError),
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Number of supersteps executed.
    pub supersteps: u64,
    /// Step ids in merge order (skipped steps included).
    pub executed: Vec<String>,
    /// Steps that failed terminally (error set, not ignored, no fallback).
    pub failed_steps: Vec<String>,
}

impl RunReport {
    /// Whether any step failed terminally.
    #[must_use]
    pub fn failed(&self) -> bool {
        !self.failed_steps.is_empty()
    }
}

/// Owns memory, scheduler, trace, and event bus for one workflow run.
pub struct WorkflowRuntime {
    workflow: Arc<Workflow>,
    memory: Arc<Memory>,
    scheduler: Scheduler,
    executor: StepExecutor,
    trace: TraceStore,
    event_bus: EventBus,
    events: EventSender,
    executed: FxHashSet<String>,
    config: RuntimeConfig,
}

impl WorkflowRuntime {
    /// Runtime with the default configuration (stdout events, `trace.json`).
    #[must_use]
    pub fn new(workflow: Workflow, tools: ToolRegistry) -> Self {
        Self::with_config(workflow, tools, RuntimeConfig::default())
    }

    #[must_use]
    pub fn with_config(workflow: Workflow, tools: ToolRegistry, config: RuntimeConfig) -> Self {
        let workflow = Arc::new(workflow);
        let memory = Arc::new(Memory::new());
        memory.seed(
            workflow
                .initial_memory
                .iter()
                .map(|(path, value)| (path.as_str(), value.clone())),
        );

        let event_bus = config.event_bus.build_event_bus();
        let events = event_bus.sender();
        let executor = StepExecutor::new(
            Arc::clone(&memory),
            Arc::new(tools),
            events.clone(),
        );

        Self {
            scheduler: Scheduler::new(Arc::clone(&workflow)),
            workflow,
            memory,
            executor,
            trace: TraceStore::new(),
            event_bus,
            events,
            executed: FxHashSet::default(),
            config,
        }
    }

    /// Attach an additional event consumer (e.g. a live renderer).
    pub fn add_event_sink<T: EventSink + 'static>(&self, sink: T) {
        self.event_bus.add_sink(sink);
    }

    /// Shared memory, readable after the run for assertions and summaries.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// The trace accumulated so far.
    #[must_use]
    pub fn trace(&self) -> &TraceStore {
        &self.trace
    }

    /// Event buffer capacity and drop count.
    #[must_use]
    pub fn bus_metrics(&self) -> EventBusMetrics {
        self.event_bus.metrics()
    }

    /// Drive the workflow to completion.
    ///
    /// Runs supersteps until the scheduler yields an empty cohort, then
    /// saves the trace (non-fatal on error) and stops the event listener
    /// after draining buffered events.
    #[instrument(skip(self), fields(workflow = %self.workflow.name), err)]
    pub async fn run(&mut self) -> Result<RunReport, RuntimeError> {
        self.event_bus.listen_for_events();
        self.events.emit(Event::workflow_started(&self.workflow.name));

        let mut last_results: Vec<StepResult> = Vec::new();
        let mut supersteps: u64 = 0;
        let mut executed_order: Vec<String> = Vec::new();
        let mut failed_steps: Vec<String> = Vec::new();

        loop {
            let (cohort, routing_traces) =
                self.scheduler
                    .next_cohort(&self.memory, &self.executed, &last_results);
            // Routing decisions describe the previous superstep; back-fill
            // them before new rows are appended.
            for (step_name, routing) in routing_traces {
                self.trace.backfill_routing(&step_name, routing);
            }
            if cohort.is_empty() {
                break;
            }

            supersteps += 1;
            let cohort_ids: Vec<String> = cohort.iter().map(|step| step.id.clone()).collect();
            self.events.emit(Event::superstep_start(supersteps, &cohort_ids));
            tracing::debug!(superstep = supersteps, cohort = ?cohort_ids, "dispatching cohort");

            // Gate filtering. Skipped steps keep their cohort position so
            // the merge happens in dispatch order.
            let mut slots: Vec<Slot> = Vec::with_capacity(cohort.len());
            let mut dispatch: Vec<Step> = Vec::new();
            for step in cohort {
                match self.evaluate_gate(&step) {
                    Gate::Run(condition) => {
                        slots.push(Slot::Run { condition });
                        dispatch.push(step);
                    }
                    Gate::Skip(result) => slots.push(Slot::Skipped(result)),
                }
            }

            let run_results = superstep::run_cohort(&self.executor, &dispatch).await?;

            let mut merged: Vec<StepResult> = Vec::with_capacity(slots.len());
            let mut run_iter = run_results.into_iter();
            for slot in slots {
                let result = match slot {
                    Slot::Run { condition } => {
                        let mut result = run_iter
                            .next()
                            .expect("one result per dispatched step");
                        if result.condition.is_none() {
                            result.condition = condition;
                        }
                        result
                    }
                    Slot::Skipped(result) => result,
                };
                self.merge_result(&result);
                executed_order.push(result.node_name.clone());
                if result.err.is_some() && !result.ignored && result.fallback.is_none() {
                    failed_steps.push(result.node_name.clone());
                }
                merged.push(result);
            }
            last_results = merged;
        }

        let failed = !failed_steps.is_empty();
        self.events
            .emit(Event::workflow_end(&self.workflow.name, supersteps, failed));
        self.save_trace();
        self.event_bus.stop_listener().await;

        Ok(RunReport {
            supersteps,
            executed: executed_order,
            failed_steps,
        })
    }

    /// Evaluate a step's gate. False or a failing evaluation short-circuits
    /// the step into a synthetic skipped result; skipped steps still
    /// participate in routing.
    fn evaluate_gate(&self, step: &Step) -> Gate {
        let Some(when) = &step.when else {
            return Gate::Run(None);
        };
        match expr::evaluate_bool(when, &self.memory) {
            Ok(true) => Gate::Run(Some(ConditionTrace {
                raw: when.clone(),
                result: true,
            })),
            Ok(false) => Gate::Skip(StepResult::skipped(
                &step.id,
                ConditionTrace {
                    raw: when.clone(),
                    result: false,
                },
            )),
            Err(err) => {
                tracing::warn!(step = %step.id, %err, "gate evaluation failed; skipping step");
                Gate::Skip(StepResult::skipped(
                    &step.id,
                    ConditionTrace {
                        raw: when.clone(),
                        result: false,
                    },
                ))
            }
        }
    }

    /// Apply one result: record it, trace it, and place its output and
    /// messages into memory. A failing placement is logged and the step
    /// still counts as executed.
    fn merge_result(&mut self, result: &StepResult) {
        self.executed.insert(result.node_name.clone());

        let snapshot = self.memory.snapshot();
        self.trace.append(TraceEvent::from_result(result, snapshot));

        if let Some(output) = &result.output {
            let default_path = format!("global.{}", result.node_name);
            let path = self
                .workflow
                .step(&result.node_name)
                .and_then(|step| step.output.as_deref())
                .unwrap_or(&default_path);
            match self.memory.set(path, output.clone()) {
                Ok(()) => self.events.emit(Event::memory_update(path, output)),
                Err(err) => {
                    tracing::warn!(step = %result.node_name, %err, "failed to store step output");
                }
            }
        }

        for (key, text) in &result.messages {
            let path = format!("messages.{key}");
            let value = Value::from(text.clone());
            match self.memory.set(&path, value.clone()) {
                Ok(()) => self.events.emit(Event::memory_update(&path, &value)),
                Err(err) => {
                    tracing::warn!(step = %result.node_name, %err, "failed to store step message");
                }
            }
        }

        self.events.emit(Event::step_end(result));
    }

    fn save_trace(&self) {
        let path = &self.config.trace_path;
        match self.trace.save(path) {
            Ok(()) => {
                self.events.emit(Event::trace_snapshot(
                    &path.display().to_string(),
                    self.trace.len(),
                ));
            }
            Err(err) => {
                tracing::warn!(%err, path = %path.display(), "failed to save trace");
            }
        }
    }
}

enum Gate {
    Run(Option<ConditionTrace>),
    Skip(StepResult),
}

enum Slot {
    Run { condition: Option<ConditionTrace> },
    Skipped(StepResult),
}
