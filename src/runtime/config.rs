use std::path::PathBuf;

use crate::event_bus::{EventBus, EventSink, MemorySink, StdOutSink, DEFAULT_BUFFER_CAPACITY};

/// Runtime knobs: where the trace lands and how events are consumed.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Destination for the serialized trace at workflow end.
    pub trace_path: PathBuf,
    pub event_bus: EventBusConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trace_path: PathBuf::from("trace.json"),
            event_bus: EventBusConfig::default(),
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn with_trace_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_path = path.into();
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }
}

/// Which sinks an [`EventBus`] is built with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    StdOut,
    Memory,
}

/// Buffer capacity and sink selection for the event bus.
#[derive(Clone, Debug)]
pub struct EventBusConfig {
    pub buffer_capacity: usize,
    pub sinks: Vec<SinkConfig>,
}

impl EventBusConfig {
    #[must_use]
    pub fn new(buffer_capacity: usize, sinks: Vec<SinkConfig>) -> Self {
        Self {
            buffer_capacity: if buffer_capacity == 0 {
                DEFAULT_BUFFER_CAPACITY
            } else {
                buffer_capacity
            },
            sinks,
        }
    }

    /// Stdout only, the default for headless runs.
    #[must_use]
    pub fn with_stdout_only() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, vec![SinkConfig::StdOut])
    }

    /// No sinks; consumers attach their own via
    /// [`WorkflowRuntime::add_event_sink`](super::WorkflowRuntime::add_event_sink).
    #[must_use]
    pub fn silent() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, Vec::new())
    }

    pub(crate) fn build_event_bus(&self) -> EventBus {
        let sinks: Vec<Box<dyn EventSink>> = self
            .sinks
            .iter()
            .map(|sink| match sink {
                SinkConfig::StdOut => Box::new(StdOutSink::default()) as Box<dyn EventSink>,
                SinkConfig::Memory => Box::new(MemorySink::new()) as Box<dyn EventSink>,
            })
            .collect();
        EventBus::with_sinks(self.buffer_capacity, sinks)
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::with_stdout_only()
    }
}
