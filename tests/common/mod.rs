//! Shared fixtures for integration tests.

#![allow(dead_code)] // not every test binary uses every helper

use skein::event_bus::{EventKind, MemorySink};
use skein::runtime::{EventBusConfig, RuntimeConfig, WorkflowRuntime};
use skein::tools::ToolRegistry;
use skein::workflow::{parse_workflow_yaml, Workflow};

/// A runtime wired to an in-memory event sink and a tempdir-backed trace
/// path, so tests never touch the working directory.
pub fn runtime_with(
    workflow: Workflow,
    tools: ToolRegistry,
    dir: &tempfile::TempDir,
) -> (WorkflowRuntime, MemorySink) {
    let sink = MemorySink::new();
    let config = RuntimeConfig::default()
        .with_trace_path(dir.path().join("trace.json"))
        .with_event_bus(EventBusConfig::silent());
    let runtime = WorkflowRuntime::with_config(workflow, tools, config);
    runtime.add_event_sink(sink.clone());
    (runtime, sink)
}

/// Parse a YAML document and wire it with the builtin tools.
pub fn runtime_for(yaml: &str, dir: &tempfile::TempDir) -> (WorkflowRuntime, MemorySink) {
    let workflow = parse_workflow_yaml(yaml).expect("workflow should parse");
    runtime_with(workflow, ToolRegistry::with_builtins(), dir)
}

/// The event kinds captured by a sink, in FIFO order.
pub fn event_kinds(sink: &MemorySink) -> Vec<EventKind> {
    sink.snapshot().iter().map(|event| event.kind).collect()
}

/// Payload `step_id`s of all events of the given kind, in FIFO order.
pub fn step_ids_of_kind(sink: &MemorySink, kind: EventKind) -> Vec<String> {
    sink.snapshot()
        .iter()
        .filter(|event| event.kind == kind)
        .filter_map(|event| event.payload.get("step_id"))
        .filter_map(|id| id.as_str().map(str::to_string))
        .collect()
}
