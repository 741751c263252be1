//! Tool contract and registry.
//!
//! A [`Tool`] is the unit of work a task step invokes: it receives
//! already-interpolated inputs and a [`ToolContext`] carrying the step's
//! deadline and cancellation signal, and returns an arbitrary JSON value
//! that becomes the step's output. Tools never see workflow memory.
//!
//! Registration happens once at process start via [`ToolRegistry`];
//! lookups are by unique name and an unknown name fails before any
//! execution attempt.
//!
//! # Examples
//!
//! ```rust
//! use async_trait::async_trait;
//! use rustc_hash::FxHashMap;
//! use serde_json::{json, Value};
//! use skein::tools::{Tool, ToolContext, ToolError, ToolRegistry};
//!
//! struct Upper;
//!
//! #[async_trait]
//! impl Tool for Upper {
//!     async fn run(
//!         &self,
//!         _ctx: ToolContext,
//!         input: FxHashMap<String, Value>,
//!     ) -> Result<Value, ToolError> {
//!         let text = input
//!             .get("v")
//!             .and_then(Value::as_str)
//!             .ok_or(ToolError::MissingInput { name: "v" })?;
//!         Ok(json!(text.to_uppercase()))
//!     }
//! }
//!
//! let mut registry = ToolRegistry::new();
//! registry.register("upper", Upper).unwrap();
//! assert!(registry.get("upper").is_ok());
//! ```

pub mod builtin;
mod registry;

use std::time::Instant;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use registry::ToolRegistry;

/// Deadline and cancellation signal passed to every tool invocation.
///
/// Cancellation is cooperative: tools doing I/O or long waits should select
/// against [`ToolContext::cancelled`] so a firing deadline stops the work
/// promptly.
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    /// Absolute deadline for this attempt, when the step has a timeout.
    pub deadline: Option<Instant>,
    /// Cancelled when the deadline fires or the attempt is abandoned.
    pub cancellation: CancellationToken,
}

impl ToolContext {
    /// Context with a deadline `timeout` from now. A `None` timeout means
    /// the attempt is effectively unbounded.
    #[must_use]
    pub fn with_timeout(timeout: Option<std::time::Duration>) -> Self {
        Self {
            deadline: timeout.map(|t| Instant::now() + t),
            cancellation: CancellationToken::new(),
        }
    }

    /// Resolves when the attempt is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }
}

/// A named unit of work invocable from a task step.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute with resolved inputs. The returned value becomes the step's
    /// output; an error enters the step's error policy.
    async fn run(
        &self,
        ctx: ToolContext,
        input: FxHashMap<String, Value>,
    ) -> Result<Value, ToolError>;
}

/// Errors surfaced by tool lookup and execution.
#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    /// No tool is registered under the requested name.
    #[error("tool '{name}' not found")]
    #[diagnostic(
        code(skein::tool::not_found),
        help("Register the tool before running the workflow.")
    )]
    NotFound { name: String },

    /// A tool with this name is already registered.
    #[error("tool '{name}' is already registered")]
    #[diagnostic(code(skein::tool::duplicate))]
    Duplicate { name: String },

    /// The step's deadline fired before the tool finished.
    #[error("deadline exceeded")]
    #[diagnostic(code(skein::tool::deadline))]
    DeadlineExceeded,

    /// A required input parameter is absent or has the wrong shape.
    #[error("missing required input '{name}'")]
    #[diagnostic(code(skein::tool::missing_input))]
    MissingInput { name: &'static str },

    /// Free-form execution failure.
    #[error("{0}")]
    #[diagnostic(code(skein::tool::failed))]
    Failed(String),
}

impl ToolError {
    /// Convenience constructor for execution failures.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
