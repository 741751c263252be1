//! Cohort selection over the implicit workflow DAG.
//!
//! The scheduler is a pure function of workflow structure, memory, the set
//! of already-executed steps, and the previous superstep's results. It
//! never mutates anything, so identical inputs always yield the identical
//! cohort and routing traces.
//!
//! Selection order:
//! 1. **Fallback priority**: if any previous result carries a fallback id,
//!    the next cohort is exactly those fallback steps, alone. Remediation
//!    must run before anything else re-establishes downstream state.
//! 2. **Entry**: an empty executed set selects the first step.
//! 3. **Routing**: every result that advanced (success, ignored error, or
//!    gate skip) routes via its normalized `next` directive, falling
//!    through to the following step in document order when absent.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::expr;
use crate::memory::Memory;
use crate::types::{RoutingTrace, StepResult};
use crate::workflow::{RoutingKind, Step, Workflow};

/// Chooses the next cohort of steps to dispatch.
pub struct Scheduler {
    workflow: Arc<Workflow>,
}

impl Scheduler {
    #[must_use]
    pub fn new(workflow: Arc<Workflow>) -> Self {
        Self { workflow }
    }

    /// Compute the next cohort and the routing traces for the results that
    /// advanced. An empty cohort terminates the run.
    ///
    /// Cohort members are deduplicated preserving first appearance. Targets
    /// that do not name a known step are dropped with a warning (the
    /// routing trace is still recorded); targets already in `executed` are
    /// not re-dispatched.
    pub fn next_cohort(
        &self,
        mem: &Memory,
        executed: &FxHashSet<String>,
        last_results: &[StepResult],
    ) -> (Vec<Step>, FxHashMap<String, RoutingTrace>) {
        let mut cohort: Vec<Step> = Vec::new();
        let mut seen: FxHashSet<String> = FxHashSet::default();

        // 1. Fallback priority: remediation runs alone.
        for result in last_results {
            let Some(target) = result.fallback.as_deref().filter(|t| !t.is_empty()) else {
                continue;
            };
            match self.workflow.step(target) {
                Some(step) => {
                    if seen.insert(step.id.clone()) {
                        cohort.push(step.clone());
                    }
                }
                None => {
                    tracing::warn!(
                        step = %result.node_name,
                        target,
                        "unknown fallback target; treating as no successor"
                    );
                }
            }
        }
        if !cohort.is_empty() {
            return (cohort, FxHashMap::default());
        }

        // 2. Entry.
        if executed.is_empty() {
            let entry: Vec<Step> = self.workflow.entry().cloned().into_iter().collect();
            return (entry, FxHashMap::default());
        }

        // 3. Follow routing from every result that advanced.
        let mut traces: FxHashMap<String, RoutingTrace> = FxHashMap::default();
        for result in last_results {
            if !result.advances() {
                continue;
            }
            let Some(step) = self.workflow.step(&result.node_name) else {
                continue;
            };
            let (raw, target) = self.route(step, mem);
            traces.insert(
                result.node_name.clone(),
                RoutingTrace {
                    raw,
                    result: target.clone(),
                },
            );
            if target.is_empty() {
                continue;
            }
            match self.workflow.step(&target) {
                Some(next) => {
                    if !executed.contains(&next.id) && seen.insert(next.id.clone()) {
                        cohort.push(next.clone());
                    }
                }
                None => {
                    tracing::warn!(
                        from = %result.node_name,
                        target = %target,
                        "routing target does not exist; ignoring"
                    );
                }
            }
        }

        (cohort, traces)
    }

    /// Resolve a step's routing directive to `(raw, target)`. An empty
    /// target means the step advances nowhere.
    fn route(&self, step: &Step, mem: &Memory) -> (String, String) {
        let Some(routing) = &step.next else {
            // Sequential fallthrough; at the end of the list the workflow
            // simply completes.
            let target = self
                .workflow
                .step_after(&step.id)
                .map(|next| next.id.clone())
                .unwrap_or_default();
            return (String::new(), target);
        };

        let target = match &routing.kind {
            RoutingKind::Static(id) => id.clone(),
            RoutingKind::Expr(text) => match expr::evaluate_string(text, mem) {
                Ok(target) => target,
                Err(err) => {
                    tracing::warn!(step = %step.id, %err, "routing expression failed");
                    String::new()
                }
            },
            RoutingKind::Map(pairs) => {
                let mut chosen = String::new();
                for (condition, target) in pairs {
                    match expr::evaluate_bool(condition, mem) {
                        Ok(true) => {
                            chosen = target.clone();
                            break;
                        }
                        Ok(false) => {}
                        Err(err) => {
                            // A failing condition does not match; later
                            // pairs still get their chance.
                            tracing::warn!(
                                step = %step.id,
                                condition,
                                %err,
                                "routing condition failed"
                            );
                        }
                    }
                }
                chosen
            }
            RoutingKind::Invalid => {
                tracing::warn!(
                    step = %step.id,
                    raw = %routing.raw,
                    "unsupported routing directive shape; step advances nowhere"
                );
                String::new()
            }
        };
        (routing.raw.clone(), target)
    }
}
