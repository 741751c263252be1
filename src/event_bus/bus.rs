use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::{sync::oneshot, task};

use super::event::Event;
use super::sink::{EventSink, StdOutSink};

/// Default number of events buffered before publishers start dropping.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Snapshot of bus health for monitoring and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBusMetrics {
    /// Size of the bounded event buffer.
    pub capacity: usize,
    /// Total count of events dropped because the buffer was full.
    pub dropped: usize,
}

/// Bounded, non-blocking broadcast of lifecycle events to registered sinks.
///
/// Publishers use [`EventSender::emit`], which never blocks the engine: when
/// the buffer is full the event is dropped and a diagnostic counter
/// incremented. A background listener task forwards buffered events to every
/// sink in FIFO order, so all sinks observe the same sequence.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    sender: flume::Sender<Event>,
    receiver: flume::Receiver<Event>,
    dropped: Arc<AtomicUsize>,
    capacity: usize,
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(DEFAULT_BUFFER_CAPACITY, StdOutSink::default())
    }
}

impl EventBus {
    /// Create a bus with a single sink.
    pub fn with_sink<T>(capacity: usize, sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(capacity, vec![Box::new(sink)])
    }

    /// Create a bus with multiple sinks.
    pub fn with_sinks(capacity: usize, sinks: Vec<Box<dyn EventSink>>) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = flume::bounded(capacity);
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            sender,
            receiver,
            dropped: Arc::new(AtomicUsize::new(0)),
            capacity,
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Dynamically add a sink (useful for per-run streaming consumers).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().unwrap().push(Box::new(sink));
    }

    /// A cloneable handle for producers to emit events.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.sender.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Buffer capacity and drop count.
    #[must_use]
    pub fn metrics(&self) -> EventBusMetrics {
        EventBusMetrics {
            capacity: self.capacity,
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Spawn the background task that forwards events to all sinks.
    /// Idempotent: calling multiple times has no effect.
    pub fn listen_for_events(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return; // Already listening
        }

        let receiver = self.receiver.clone();
        let sinks = Arc::clone(&self.sinks);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        // Drain whatever is already buffered before stopping
                        // so a clean shutdown never loses accepted events.
                        while let Ok(event) = receiver.try_recv() {
                            broadcast(&sinks, &event);
                        }
                        break;
                    }
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => broadcast(&sinks, &event),
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener, draining buffered events first.
    pub async fn stop_listener(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

fn broadcast(sinks: &Arc<Mutex<Vec<Box<dyn EventSink>>>>, event: &Event) {
    let mut guard = sinks.lock().unwrap();
    for sink in guard.iter_mut() {
        if let Err(err) = sink.handle(event) {
            tracing::warn!(target: "skein::event_bus", %err, "event sink error");
        }
    }
}

/// Non-blocking producer handle with drop accounting.
#[derive(Clone)]
pub struct EventSender {
    tx: flume::Sender<Event>,
    dropped: Arc<AtomicUsize>,
}

impl EventSender {
    /// Emit an event without blocking. A full buffer drops the event and
    /// records a diagnostic.
    pub fn emit(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(event)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    target: "skein::event_bus",
                    kind = %event.kind,
                    total_dropped = total,
                    "event buffer full; dropping event"
                );
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                tracing::debug!(target: "skein::event_bus", "event bus disconnected");
            }
        }
    }

    /// Total events dropped by this bus so far.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// A sender not connected to any bus, for isolated executor tests.
    #[must_use]
    pub fn disconnected() -> Self {
        let (tx, _rx) = flume::bounded(1);
        Self {
            tx,
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}
