//! Bounded, drop-on-overflow broadcast of workflow lifecycle events.
//!
//! Producers emit through [`EventSender`] (never blocking the engine);
//! a background listener forwards each event to every registered
//! [`EventSink`] in FIFO order. Slow consumers cause drops, not stalls,
//! and drops are counted in [`EventBusMetrics`].

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::{EventBus, EventBusMetrics, EventSender, DEFAULT_BUFFER_CAPACITY};
pub use event::{Event, EventKind};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
