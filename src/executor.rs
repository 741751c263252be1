//! Per-step execution under the retry/timeout/fallback state machine.
//!
//! The executor owns one step attempt loop: resolve inputs (fresh
//! interpolation on every retry), run the body under the step's deadline,
//! and on failure consult the [`ErrorPolicy`](crate::workflow::ErrorPolicy)
//! to retry, ignore, fall back, or fail. Parallel steps recurse: each branch
//! runs as an independent single-step execution and branch effects merge
//! into memory when all branches have joined.
//!
//! The executor emits `step_start` (and `memory_update` for branch merges);
//! the orchestrator emits `step_end` after the barrier merge.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Duration};

use crate::event_bus::{Event, EventSender};
use crate::memory::Memory;
use crate::tools::{ToolContext, ToolError, ToolRegistry};
use crate::types::StepResult;
use crate::workflow::{ErrorStrategy, Step, StepBody};

/// Executes single steps against shared memory and the tool registry.
///
/// Cloning is cheap; clones share the same memory, registry, and event
/// sender, which is what allows parallel branches to run on spawned tasks.
#[derive(Clone)]
pub struct StepExecutor {
    memory: Arc<Memory>,
    tools: Arc<ToolRegistry>,
    events: EventSender,
}

impl StepExecutor {
    #[must_use]
    pub fn new(memory: Arc<Memory>, tools: Arc<ToolRegistry>, events: EventSender) -> Self {
        Self {
            memory,
            tools,
            events,
        }
    }

    /// Run one step to a terminal [`StepResult`].
    ///
    /// Never returns an `Err`: every failure mode is folded into the result
    /// by the step's error policy, so a whole cohort always merges.
    pub async fn execute(&self, step: &Step) -> StepResult {
        let tool = match &step.body {
            StepBody::Task { tool, .. } => Some(tool.as_str()),
            StepBody::Parallel { .. } => None,
        };
        self.events.emit(Event::step_start(&step.id, step.kind(), tool));

        let policy = &step.error;
        let mut retries: u32 = 0;
        loop {
            match self.run_attempt(step).await {
                Ok(output) => {
                    let messages = step
                        .messages
                        .iter()
                        .map(|(key, template)| {
                            (key.clone(), self.memory.resolve_interpolation(template))
                        })
                        .collect();
                    return StepResult::success(&step.id, output, messages, retries);
                }
                Err(error) => match policy.strategy {
                    ErrorStrategy::Retry => {
                        if retries < policy.retries {
                            retries += 1;
                            if policy.delay_ms > 0 {
                                sleep(Duration::from_millis(policy.delay_ms)).await;
                            }
                            continue;
                        }
                        if let Some(target) = policy.fallback_target() {
                            return StepResult::retry_fallback(
                                &step.id,
                                target,
                                error.to_string(),
                                retries,
                            );
                        }
                        return StepResult::failed(
                            &step.id,
                            format!("max retries exceeded: {error}"),
                            retries,
                        );
                    }
                    ErrorStrategy::Ignore => {
                        return StepResult::ignored(&step.id, error.to_string())
                    }
                    ErrorStrategy::Fallback => {
                        // Load-time validation guarantees a target here.
                        let target = policy.fallback_target().unwrap_or_default();
                        return StepResult::fallback(&step.id, target, error.to_string());
                    }
                    ErrorStrategy::Fail => {
                        return StepResult::failed(&step.id, error.to_string(), retries)
                    }
                },
            }
        }
    }

    /// One attempt under the step's deadline. A firing deadline cancels the
    /// attempt's context so tool I/O stops promptly, and the resulting
    /// deadline error feeds the policy machine like any other failure.
    async fn run_attempt(&self, step: &Step) -> Result<Option<Value>, ToolError> {
        let ctx = ToolContext::with_timeout(step.error.timeout());
        match step.error.timeout() {
            Some(limit) => match timeout(limit, self.attempt_body(step, ctx.clone())).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    ctx.cancellation.cancel();
                    Err(ToolError::DeadlineExceeded)
                }
            },
            None => self.attempt_body(step, ctx).await,
        }
    }

    async fn attempt_body(
        &self,
        step: &Step,
        ctx: ToolContext,
    ) -> Result<Option<Value>, ToolError> {
        match &step.body {
            StepBody::Task { tool, input } => {
                let tool = self.tools.get(tool)?;
                let resolved = self.resolve_input(input);
                Ok(Some(tool.run(ctx, resolved).await?))
            }
            StepBody::Parallel { branches } => {
                self.run_branches(branches).await?;
                // The parallel step itself has no output; branch outputs
                // were merged into memory at branch completion.
                Ok(None)
            }
        }
    }

    /// Run branches concurrently, merge their effects in branch order, and
    /// surface the first branch error (also in branch order).
    async fn run_branches(&self, branches: &[Step]) -> Result<(), ToolError> {
        let mut set: JoinSet<(usize, StepResult)> = JoinSet::new();
        for (idx, branch) in branches.iter().enumerate() {
            let fut = self.execute_owned(branch.clone());
            set.spawn(async move { (idx, fut.await) });
        }

        let mut results: Vec<Option<StepResult>> = (0..branches.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(err) => return Err(ToolError::failed(format!("branch task failed: {err}"))),
            }
        }

        let mut first_error: Option<String> = None;
        for (branch, result) in branches.iter().zip(results) {
            let result = result.expect("joined branch reported no result");
            self.merge_branch(branch, &result);
            if first_error.is_none() {
                if let Some(err) = &result.err {
                    first_error = Some(err.clone());
                }
            }
        }
        match first_error {
            Some(error) => Err(ToolError::failed(error)),
            None => Ok(()),
        }
    }

    /// Boxed recursion seam: branches are themselves steps, so execution
    /// recurses through spawned tasks.
    fn execute_owned(&self, step: Step) -> BoxFuture<'static, StepResult> {
        let executor = self.clone();
        Box::pin(async move { executor.execute(&step).await })
    }

    /// Apply a branch result to memory with the same placement convention
    /// as the orchestrator merge.
    fn merge_branch(&self, branch: &Step, result: &StepResult) {
        if let Some(output) = &result.output {
            let default_path = format!("global.{}", branch.id);
            let path = branch.output.as_deref().unwrap_or(&default_path);
            match self.memory.set(path, output.clone()) {
                Ok(()) => self.events.emit(Event::memory_update(path, output)),
                Err(err) => {
                    tracing::warn!(step = %branch.id, %err, "failed to store branch output");
                }
            }
        }
        for (key, text) in &result.messages {
            let path = format!("messages.{key}");
            let value = Value::from(text.clone());
            match self.memory.set(&path, value.clone()) {
                Ok(()) => self.events.emit(Event::memory_update(&path, &value)),
                Err(err) => {
                    tracing::warn!(step = %branch.id, %err, "failed to store branch message");
                }
            }
        }
    }

    /// Interpolate string-valued inputs; other values pass through.
    fn resolve_input(&self, input: &FxHashMap<String, Value>) -> FxHashMap<String, Value> {
        input
            .iter()
            .map(|(key, value)| {
                let resolved = match value {
                    Value::String(template) => {
                        Value::String(self.memory.resolve_interpolation(template))
                    }
                    other => other.clone(),
                };
                (key.clone(), resolved)
            })
            .collect()
    }
}
