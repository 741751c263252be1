//! Step executor policy-machine behavior.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use skein::event_bus::EventSender;
use skein::executor::StepExecutor;
use skein::memory::Memory;
use skein::tools::ToolRegistry;
use skein::types::{strategy, StepStatus};
use skein::utils::testing::{parallel_step, task_step, FlakyTool, RecordingTool};
use skein::workflow::{ErrorPolicy, ErrorStrategy, Step, StepBody};

fn executor_with(tools: ToolRegistry) -> (StepExecutor, Arc<Memory>) {
    let memory = Arc::new(Memory::new());
    let executor = StepExecutor::new(
        Arc::clone(&memory),
        Arc::new(tools),
        EventSender::disconnected(),
    );
    (executor, memory)
}

fn builtin_executor() -> (StepExecutor, Arc<Memory>) {
    executor_with(ToolRegistry::with_builtins())
}

fn retry_policy(retries: u32) -> ErrorPolicy {
    ErrorPolicy {
        strategy: ErrorStrategy::Retry,
        retries,
        ..Default::default()
    }
}

fn set_input(step: &mut Step, key: &str, value: serde_json::Value) {
    if let StepBody::Task { input, .. } = &mut step.body {
        input.insert(key.to_string(), value);
    }
}

#[tokio::test]
async fn retry_recovers_within_budget() {
    let mut tools = ToolRegistry::new();
    tools.register("flaky", FlakyTool::failing(2)).unwrap();
    let (executor, _) = executor_with(tools);

    let mut step = task_step("a", "flaky");
    step.error = retry_policy(3);

    let result = executor.execute(&step).await;
    assert!(result.err.is_none());
    assert_eq!(result.output, Some(json!("recovered")));
    // Two failures, so two additional attempts.
    assert_eq!(result.retries, 2);
}

#[tokio::test]
async fn retry_exhaustion_reports_the_attempt_count() {
    let mut tools = ToolRegistry::new();
    tools.register("flaky", FlakyTool::failing(10)).unwrap();
    let (executor, _) = executor_with(tools);

    let mut step = task_step("a", "flaky");
    step.error = retry_policy(2);

    let result = executor.execute(&step).await;
    assert_eq!(result.retries, 2);
    assert_eq!(result.strategy, Some(strategy::FAIL));
    assert!(result.err.as_deref().unwrap().contains("max retries exceeded"));
}

#[tokio::test]
async fn retry_delay_paces_the_attempts() {
    let mut tools = ToolRegistry::new();
    tools.register("flaky", FlakyTool::failing(10)).unwrap();
    let (executor, _) = executor_with(tools);

    let mut step = task_step("a", "flaky");
    step.error = ErrorPolicy {
        strategy: ErrorStrategy::Retry,
        retries: 2,
        delay_ms: 50,
        ..Default::default()
    };

    let started = Instant::now();
    let _ = executor.execute(&step).await;
    // Two retries with a 50ms pause each.
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn timeout_is_a_policy_failure() {
    let (executor, _) = builtin_executor();

    let mut step = task_step("slow", "delay");
    set_input(&mut step, "ms", json!(10_000));
    step.error = ErrorPolicy {
        timeout_ms: 50,
        ..Default::default()
    };

    let started = Instant::now();
    let result = executor.execute(&step).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.strategy, Some(strategy::FAIL));
    assert!(result.err.as_deref().unwrap().contains("deadline exceeded"));
}

#[tokio::test]
async fn timeout_can_be_retried() {
    let (executor, _) = builtin_executor();

    let mut step = task_step("slow", "delay");
    set_input(&mut step, "ms", json!(10_000));
    step.error = ErrorPolicy {
        strategy: ErrorStrategy::Retry,
        retries: 1,
        timeout_ms: 30,
        ..Default::default()
    };

    let result = executor.execute(&step).await;
    // Both attempts timed out; the retry was still made.
    assert_eq!(result.retries, 1);
    assert!(result.err.as_deref().unwrap().contains("deadline exceeded"));
}

#[tokio::test]
async fn immediate_fallback_keeps_the_original_failure() {
    let (executor, _) = builtin_executor();

    let mut step = task_step("a", "always_fail");
    set_input(&mut step, "message", json!("boom"));
    step.error = ErrorPolicy {
        strategy: ErrorStrategy::Fallback,
        fallback: Some("recover".to_string()),
        ..Default::default()
    };

    let result = executor.execute(&step).await;
    assert_eq!(result.status, StepStatus::Executed);
    assert_eq!(result.fallback.as_deref(), Some("recover"));
    assert_eq!(result.strategy, Some(strategy::FALLBACK));
    assert_eq!(result.error_msg, "boom");
    assert!(result.err.as_deref().unwrap().contains("fallback triggered"));
}

#[tokio::test]
async fn custom_tools_receive_interpolated_inputs() {
    let recorder = RecordingTool::new();
    let mut tools = ToolRegistry::new();
    tools.register("record", recorder.clone()).unwrap();
    let (executor, memory) = executor_with(tools);
    memory.set("x", json!("hello")).unwrap();

    let mut step = task_step("a", "record");
    set_input(&mut step, "v", json!("${x} world"));
    set_input(&mut step, "n", json!(42));

    let result = executor.execute(&step).await;
    assert!(result.err.is_none());

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    // String inputs are interpolated; other values pass through unchanged.
    assert_eq!(calls[0]["v"], json!("hello world"));
    assert_eq!(calls[0]["n"], json!(42));
}

#[tokio::test]
async fn parallel_branches_merge_outputs_into_memory() {
    let (executor, memory) = builtin_executor();

    let mut left = task_step("left", "echo");
    set_input(&mut left, "v", json!("L"));
    left.output = Some("results.left".to_string());
    let mut right = task_step("right", "echo");
    set_input(&mut right, "v", json!("R"));

    let step = parallel_step("fan", vec![left, right]);
    let result = executor.execute(&step).await;

    assert!(result.err.is_none());
    // The parallel step itself has no output.
    assert!(result.output.is_none());
    // Branch outputs land at the explicit path or the default.
    assert_eq!(memory.get("results.left").unwrap(), json!("L"));
    assert_eq!(memory.get("global.right").unwrap(), json!("R"));
}

#[tokio::test]
async fn first_branch_error_in_branch_order_wins() {
    let (executor, memory) = builtin_executor();

    let mut okay = task_step("okay", "echo");
    set_input(&mut okay, "v", json!(1));
    let mut fail_a = task_step("fail_a", "always_fail");
    set_input(&mut fail_a, "message", json!("first"));
    let mut fail_b = task_step("fail_b", "always_fail");
    set_input(&mut fail_b, "message", json!("second"));

    let step = parallel_step("fan", vec![okay, fail_a, fail_b]);
    let result = executor.execute(&step).await;

    // Branch order, not completion order, selects the surfaced error.
    assert!(result.err.as_deref().unwrap().contains("first"));
    // Successful branches still merged before the error surfaced.
    assert_eq!(memory.get("global.okay").unwrap(), json!(1));
}

#[tokio::test]
async fn branches_apply_their_own_error_policies() {
    let mut tools = ToolRegistry::new();
    tools.register("flaky", FlakyTool::failing(1)).unwrap();
    let (executor, memory) = executor_with(tools);

    let mut branch = task_step("b", "flaky");
    branch.error = retry_policy(1);

    let step = parallel_step("fan", vec![branch]);
    let result = executor.execute(&step).await;

    assert!(result.err.is_none());
    assert_eq!(memory.get("global.b").unwrap(), json!("recovered"));
}
