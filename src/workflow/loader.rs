//! Workflow document parsing, validation, and discovery.
//!
//! Converts YAML documents into the validated [`Workflow`] model. The
//! document shape is a top-level `workflow` mapping with `name`,
//! `memory.initial`, and `steps`; step fields mirror the model
//! (`kind` defaults to `task`). Routing directives are normalized here so
//! the engine never sees the raw document shape.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Deserialize;
use serde_json::Value;
use serde_yaml_ng::{Mapping, Value as YamlValue};
use thiserror::Error;

use super::{routing, ErrorPolicy, ErrorStrategy, Step, StepBody, Workflow};

/// Errors raised while loading a workflow document.
#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowError {
    /// The document is not valid YAML or misses required structure.
    #[error("parse error: {0}")]
    #[diagnostic(code(skein::workflow::parse))]
    Parse(String),

    /// The document parsed but violates a structural constraint.
    #[error("validation error: {0}")]
    #[diagnostic(code(skein::workflow::validation))]
    Validation(String),

    /// Filesystem failure while reading the document.
    #[error(transparent)]
    #[diagnostic(code(skein::workflow::io))]
    Io(#[from] std::io::Error),
}

#[derive(Deserialize)]
struct Document {
    workflow: RawWorkflow,
}

#[derive(Deserialize)]
struct RawWorkflow {
    name: String,
    #[serde(default)]
    memory: RawMemory,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Deserialize, Default)]
struct RawMemory {
    #[serde(default)]
    initial: Mapping,
}

#[derive(Deserialize)]
struct RawStep {
    id: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    input: Mapping,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    branches: Vec<RawStep>,
    #[serde(default)]
    next: Option<YamlValue>,
    #[serde(default)]
    when: Option<String>,
    #[serde(default)]
    messages: Mapping,
    #[serde(default)]
    error: RawErrorPolicy,
}

#[derive(Deserialize, Default)]
struct RawErrorPolicy {
    #[serde(default)]
    strategy: ErrorStrategy,
    #[serde(default)]
    retries: u32,
    #[serde(default)]
    delay_ms: u64,
    #[serde(default)]
    timeout_ms: u64,
    #[serde(default)]
    fallback: Option<String>,
}

/// Parse a YAML string into a validated [`Workflow`].
pub fn parse_workflow_yaml(yaml: &str) -> Result<Workflow, WorkflowError> {
    let doc: Document =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::Parse(e.to_string()))?;
    build_workflow(doc.workflow)
}

/// Load and validate a workflow from a YAML file.
pub fn load_workflow_file(path: &Path) -> Result<Workflow, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Scan `dir` for `*.yaml`/`*.yml` workflow files.
///
/// Files that fail to parse are skipped with a warning; results are sorted
/// by path for stable presentation.
pub fn discover_workflows(dir: &Path) -> Result<Vec<(PathBuf, Workflow)>, WorkflowError> {
    let mut results = Vec::new();
    if !dir.exists() {
        return Ok(results);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !path.is_file() || !is_yaml {
            continue;
        }
        match load_workflow_file(&path) {
            Ok(workflow) => results.push((path, workflow)),
            Err(err) => {
                tracing::warn!(?path, %err, "skipping unparseable workflow file");
            }
        }
    }
    results.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(results)
}

fn build_workflow(raw: RawWorkflow) -> Result<Workflow, WorkflowError> {
    if raw.name.is_empty() {
        return Err(WorkflowError::Validation(
            "workflow name must not be empty".to_string(),
        ));
    }

    let mut initial_memory = Vec::with_capacity(raw.memory.initial.len());
    for (key, value) in raw.memory.initial {
        let path = key.as_str().ok_or_else(|| {
            WorkflowError::Validation("initial memory keys must be strings".to_string())
        })?;
        initial_memory.push((path.to_string(), yaml_to_json(value)?));
    }

    let steps: Vec<Step> = raw
        .steps
        .into_iter()
        .map(build_step)
        .collect::<Result<_, _>>()?;

    validate_step_ids(&steps)?;
    Ok(Workflow::new(raw.name, initial_memory, steps))
}

fn build_step(raw: RawStep) -> Result<Step, WorkflowError> {
    if raw.id.is_empty() {
        return Err(WorkflowError::Validation(
            "step ids must not be empty".to_string(),
        ));
    }
    let id = raw.id;

    let body = match raw.kind.as_deref().unwrap_or("task") {
        "task" => {
            if !raw.branches.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "step '{id}': branches are only valid on parallel steps"
                )));
            }
            let tool = raw.tool.filter(|t| !t.is_empty()).ok_or_else(|| {
                WorkflowError::Validation(format!("step '{id}': task steps require a tool"))
            })?;
            let mut input = rustc_hash::FxHashMap::default();
            for (key, value) in raw.input {
                let name = key.as_str().ok_or_else(|| {
                    WorkflowError::Validation(format!(
                        "step '{id}': input parameter names must be strings"
                    ))
                })?;
                input.insert(name.to_string(), yaml_to_json(value)?);
            }
            StepBody::Task { tool, input }
        }
        "parallel" => {
            let branches: Vec<Step> = raw
                .branches
                .into_iter()
                .map(build_step)
                .collect::<Result<_, _>>()?;
            StepBody::Parallel { branches }
        }
        other => {
            return Err(WorkflowError::Validation(format!(
                "step '{id}': unknown kind '{other}'"
            )))
        }
    };

    let mut messages = Vec::with_capacity(raw.messages.len());
    for (key, value) in raw.messages {
        match (key.as_str(), value.as_str()) {
            (Some(k), Some(template)) => messages.push((k.to_string(), template.to_string())),
            _ => {
                return Err(WorkflowError::Validation(format!(
                    "step '{id}': messages must map string keys to string templates"
                )))
            }
        }
    }

    let error = ErrorPolicy {
        strategy: raw.error.strategy,
        retries: raw.error.retries,
        delay_ms: raw.error.delay_ms,
        timeout_ms: raw.error.timeout_ms,
        fallback: raw.error.fallback,
    };
    if error.strategy == ErrorStrategy::Fallback && error.fallback_target().is_none() {
        return Err(WorkflowError::Validation(format!(
            "step '{id}': the fallback strategy requires a fallback step id"
        )));
    }

    Ok(Step {
        id,
        when: raw.when,
        next: raw.next.as_ref().and_then(routing::normalize),
        messages,
        output: raw.output.filter(|o| !o.is_empty()),
        error,
        body,
    })
}

fn validate_step_ids(steps: &[Step]) -> Result<(), WorkflowError> {
    fn collect<'a>(
        steps: &'a [Step],
        seen: &mut rustc_hash::FxHashSet<&'a str>,
    ) -> Result<(), WorkflowError> {
        for step in steps {
            if !seen.insert(step.id.as_str()) {
                return Err(WorkflowError::Validation(format!(
                    "duplicate step id: '{}'",
                    step.id
                )));
            }
            if let StepBody::Parallel { branches } = &step.body {
                collect(branches, seen)?;
            }
        }
        Ok(())
    }
    let mut seen = rustc_hash::FxHashSet::default();
    collect(steps, &mut seen)
}

fn yaml_to_json(value: YamlValue) -> Result<Value, WorkflowError> {
    serde_json::to_value(value).map_err(|e| WorkflowError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::RoutingKind;
    use serde_json::json;

    const FULL_DOC: &str = r#"
workflow:
  name: demo
  memory:
    initial:
      x: 1
      greeting: hello
  steps:
    - id: fetch
      tool: echo
      input:
        v: "${greeting} world"
      output: global.fetched
      next:
        "${x} > 0": positive
        "${x} <= 0": negative
      error:
        strategy: retry
        retries: 2
        delay_ms: 10
        timeout_ms: 500
        fallback: recover
    - id: positive
      tool: echo
      when: "${x} > 0"
      messages:
        note: "x was ${x}"
    - id: negative
      tool: echo
    - id: recover
      tool: echo
    - id: fan
      kind: parallel
      branches:
        - id: left
          tool: echo
        - id: right
          tool: echo
"#;

    #[test]
    fn parses_a_full_document() {
        let wf = parse_workflow_yaml(FULL_DOC).unwrap();
        assert_eq!(wf.name, "demo");
        assert_eq!(
            wf.initial_memory,
            vec![
                ("x".to_string(), json!(1)),
                ("greeting".to_string(), json!("hello")),
            ]
        );
        assert_eq!(wf.steps.len(), 5);

        let fetch = wf.step("fetch").unwrap();
        assert_eq!(fetch.kind(), "task");
        assert_eq!(fetch.output.as_deref(), Some("global.fetched"));
        assert_eq!(fetch.error.retries, 2);
        assert_eq!(fetch.error.fallback_target(), Some("recover"));
        match &fetch.next.as_ref().unwrap().kind {
            RoutingKind::Map(pairs) => assert_eq!(pairs.len(), 2),
            other => panic!("expected map routing, got {other:?}"),
        }

        let fan = wf.step("fan").unwrap();
        match &fan.body {
            StepBody::Parallel { branches } => assert_eq!(branches.len(), 2),
            other => panic!("expected parallel body, got {other:?}"),
        }
    }

    #[test]
    fn kind_defaults_to_task() {
        let wf = parse_workflow_yaml(
            "workflow:\n  name: w\n  steps:\n    - id: a\n      tool: echo\n",
        )
        .unwrap();
        assert_eq!(wf.steps[0].kind(), "task");
    }

    #[test]
    fn task_without_tool_is_rejected() {
        let err = parse_workflow_yaml("workflow:\n  name: w\n  steps:\n    - id: a\n")
            .unwrap_err();
        assert!(err.to_string().contains("require a tool"), "got: {err}");
    }

    #[test]
    fn branches_on_task_are_rejected() {
        let doc = r#"
workflow:
  name: w
  steps:
    - id: a
      tool: echo
      branches:
        - id: b
          tool: echo
"#;
        let err = parse_workflow_yaml(doc).unwrap_err();
        assert!(err.to_string().contains("only valid on parallel"), "got: {err}");
    }

    #[test]
    fn duplicate_ids_are_rejected_across_branches() {
        let doc = r#"
workflow:
  name: w
  steps:
    - id: a
      tool: echo
    - id: fan
      kind: parallel
      branches:
        - id: a
          tool: echo
"#;
        let err = parse_workflow_yaml(doc).unwrap_err();
        assert!(err.to_string().contains("duplicate step id"), "got: {err}");
    }

    #[test]
    fn fallback_strategy_requires_target() {
        let doc = r#"
workflow:
  name: w
  steps:
    - id: a
      tool: echo
      error:
        strategy: fallback
"#;
        let err = parse_workflow_yaml(doc).unwrap_err();
        assert!(err.to_string().contains("requires a fallback"), "got: {err}");
    }

    #[test]
    fn empty_steps_are_allowed() {
        let wf = parse_workflow_yaml("workflow:\n  name: empty\n").unwrap();
        assert!(wf.steps.is_empty());
        assert!(wf.entry().is_none());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err =
            parse_workflow_yaml("workflow:\n  name: w\n  steps:\n    - id: a\n      kind: loop\n")
                .unwrap_err();
        assert!(err.to_string().contains("unknown kind"), "got: {err}");
    }
}
