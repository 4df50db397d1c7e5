//! Lifecycle event bus
//!
//! Publishers push [`LifecycleEvent`]s into a bounded channel consumed by a
//! single registry-owned worker thread (`choreo-registry`). The worker:
//!
//! 1. evicts the entity from the registry when the event announces a deletion
//! 2. hands the event to every subscribed listener, in subscription order
//!
//! One consumer draining one FIFO channel keeps delivery order equal to
//! publication order; entities publish while holding their operation lock,
//! so the events of one entity arrive in the order they happened.
//!
//! After shutdown, events are dispatched inline on the publishing thread.

use crate::registry::Registry;
use choreo_core::{LifecycleEvent, LifecycleListener, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

/// Name of the worker thread
pub const WORKER_THREAD_NAME: &str = "choreo-registry";

enum WorkerMessage {
    Event(LifecycleEvent),
    Flush(SyncSender<()>),
}

struct Dispatcher {
    registry: Arc<Registry>,
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
}

impl Dispatcher {
    fn dispatch(&self, event: &LifecycleEvent) {
        if event.is_deletion() {
            self.registry.evict(event.kind, event.id);
        }
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_event(event);
        }
    }
}

/// Bounded event bus with a single consuming worker
pub struct EventBus {
    dispatcher: Arc<Dispatcher>,
    sender: Mutex<Option<SyncSender<WorkerMessage>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    /// Start the bus and its worker thread
    ///
    /// # Errors
    /// `Io` if the worker thread cannot be spawned.
    pub fn start(registry: Arc<Registry>, capacity: usize) -> Result<Self> {
        let dispatcher = Arc::new(Dispatcher {
            registry,
            listeners: RwLock::new(Vec::new()),
        });
        let (tx, rx) = sync_channel(capacity);
        let worker_dispatcher = Arc::clone(&dispatcher);
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop(&worker_dispatcher, rx))?;
        info!(target: "choreo::registry", capacity, "Event worker started");
        Ok(Self {
            dispatcher,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Add a listener; it sees every event published from now on
    pub fn subscribe(&self, listener: Arc<dyn LifecycleListener>) {
        self.dispatcher.listeners.write().push(listener);
    }

    /// Publish an event
    ///
    /// Blocks while the channel is full.
    pub fn publish(&self, event: LifecycleEvent) {
        let sender = self.sender.lock().clone();
        match sender {
            Some(tx) => {
                if let Err(returned) = tx.send(WorkerMessage::Event(event)) {
                    if let WorkerMessage::Event(event) = returned.0 {
                        self.dispatcher.dispatch(&event);
                    }
                }
            }
            None => self.dispatcher.dispatch(&event),
        }
    }

    /// Wait until every event published before this call has been dispatched
    pub fn flush(&self) {
        let sender = self.sender.lock().clone();
        if let Some(tx) = sender {
            let (ack_tx, ack_rx) = sync_channel(1);
            if tx.send(WorkerMessage::Flush(ack_tx)).is_ok() {
                let _ = ack_rx.recv();
            }
        }
    }

    /// Check if the worker thread is still consuming
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Drain the channel and join the worker; idempotent
    pub fn shutdown(&self) {
        // Dropping the last sender ends the worker loop once the queue drains
        let sender = self.sender.lock().take();
        drop(sender);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
            info!(target: "choreo::registry", "Event worker stopped");
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(dispatcher: &Dispatcher, rx: Receiver<WorkerMessage>) {
    while let Ok(message) = rx.recv() {
        match message {
            WorkerMessage::Event(event) => {
                debug!(
                    target: "choreo::registry",
                    kind = %event.kind,
                    id = %event.id,
                    new_state = %event.new_state,
                    "Dispatching event"
                );
                dispatcher.dispatch(&event);
            }
            WorkerMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
