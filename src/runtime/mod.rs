//! Workflow runtime: orchestration loop, cohort execution, and tracing.
//!
//! The runtime layer wires the engine components together for one run:
//!
//! - **[`WorkflowRuntime`]** owns memory, the scheduler, the trace store,
//!   and the event bus, and drives the superstep loop.
//! - **[`TraceStore`]** records one row per merged result and serializes
//!   the run to a JSON file at the end.
//! - **[`RuntimeConfig`]** selects the trace path and event sinks.
//!
//! # Usage
//!
//! ```rust,no_run
//! use skein::runtime::WorkflowRuntime;
//! use skein::tools::ToolRegistry;
//! use skein::workflow::parse_workflow_yaml;
//!
//! # async fn example() -> miette::Result<()> {
//! let workflow = parse_workflow_yaml(
//!     "workflow:\n  name: demo\n  steps:\n    - id: a\n      tool: echo\n",
//! )?;
//! let mut runtime = WorkflowRuntime::new(workflow, ToolRegistry::with_builtins());
//! let report = runtime.run().await?;
//! println!("ran {} supersteps", report.supersteps);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod runner;
mod superstep;
pub mod trace;

pub use config::{EventBusConfig, RuntimeConfig, SinkConfig};
pub use runner::{RunReport, RuntimeError, WorkflowRuntime};
pub use trace::{TraceError, TraceEvent, TraceStore};
