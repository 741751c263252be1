//! Rendering of lifecycle events for terminal output.

use crate::event_bus::{Event, EventKind};
use std::io::IsTerminal;

pub const CONTEXT_COLOR: &str = "\x1b[36m"; // cyan
pub const ERROR_COLOR: &str = "\x1b[31m"; // red
pub const DIM_COLOR: &str = "\x1b[2m";
pub const RESET_COLOR: &str = "\x1b[0m";

/// Formatter color mode for telemetry output.
///
/// - [`FormatterMode::Auto`]: detects TTY capability via `stdout.is_terminal()`
/// - [`FormatterMode::Colored`]: always include color codes
/// - [`FormatterMode::Plain`]: never include color codes (logs/files)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterMode {
    #[default]
    Auto,
    Colored,
    Plain,
}

impl FormatterMode {
    /// Returns true if this mode should use colored output.
    pub fn is_colored(&self) -> bool {
        match self {
            FormatterMode::Auto => std::io::stdout().is_terminal(),
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
        }
    }
}

pub trait TelemetryFormatter: Send + Sync {
    /// Render an event as a displayable line (with trailing newline).
    fn render_event(&self, event: &Event) -> String;
}

/// Plain text formatter with optional ANSI color codes.
pub struct PlainFormatter {
    mode: FormatterMode,
}

impl PlainFormatter {
    /// Formatter with auto-detected color mode.
    pub fn new() -> Self {
        Self {
            mode: FormatterMode::Auto,
        }
    }

    /// Formatter with explicit color mode.
    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> String {
        if !self.mode.is_colored() {
            return format!("{event}\n");
        }
        let color = match event.kind {
            EventKind::WorkflowStarted | EventKind::WorkflowEnd | EventKind::SuperstepStart => {
                CONTEXT_COLOR
            }
            EventKind::StepEnd if event.payload.contains_key("error") => ERROR_COLOR,
            EventKind::MemoryUpdate | EventKind::TraceSnapshot | EventKind::Log => DIM_COLOR,
            _ => "",
        };
        if color.is_empty() {
            format!("{event}\n")
        } else {
            format!("{color}{event}{RESET_COLOR}\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mode_has_no_ansi_codes() {
        let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
        let line = formatter.render_event(&Event::workflow_started("demo"));
        assert!(!line.contains("\x1b["));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn colored_mode_wraps_lifecycle_events() {
        let formatter = PlainFormatter::with_mode(FormatterMode::Colored);
        let line = formatter.render_event(&Event::workflow_started("demo"));
        assert!(line.starts_with(CONTEXT_COLOR));
        assert!(line.contains(RESET_COLOR));
    }
}
