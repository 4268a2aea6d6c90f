//! Process-local transports.
//!
//! Useful for building a service-style system inside one process during
//! development and testing; splitting the services out later only means
//! swapping the transport. Both variants are built on a hub: a bounded
//! inbound queue owned by a single dispatch task, plus a registry of live
//! transport instances. The dispatch task fans each message out to
//! handlers in freshly spawned tasks, so a slow handler never blocks the
//! hub.
//!
//! Transports constructed with [`InProcDirect::new`]/[`InProcPubSub::new`]
//! share the process-wide default hubs; tests or embedded setups that
//! need isolation construct their own hub and use `with_hub`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use tokio::sync::mpsc;

use crate::common::QpError;
use crate::dispatch::PubSubDispatcher;
use crate::envelope::Message;
use crate::lifecycle::{Lifecycle, StopChan};
use crate::transport::{DirectTransport, MessageHandler, PubSubTransport};

/// Capacity of each hub's inbound dispatch queue.
const DISPATCH_QUEUE_CAPACITY: usize = 1024;

lazy_static! {
    static ref DEFAULT_DIRECT_HUB: Arc<DirectHub> = Arc::new(DirectHub::new());
    static ref DEFAULT_PUBSUB_HUB: Arc<PubSubHub> = Arc::new(PubSubHub::new());
}

// =============================================================================
// DIRECT HUB
// =============================================================================

#[allow(missing_debug_implementations)]
struct DirectSlot {
    id: u64,
    handlers: RwLock<HashMap<String, MessageHandler>>,
}

/// The shared dispatch queue and instance registry behind
/// [`InProcDirect`] transports.
#[allow(missing_debug_implementations)]
pub struct DirectHub {
    queue: mpsc::Sender<Message>,
    inbox: Mutex<Option<mpsc::Receiver<Message>>>,
    instances: RwLock<Vec<Arc<DirectSlot>>>,
    next_slot: AtomicU64,
    cursor: AtomicUsize,
    dispatching: AtomicBool,
}

impl DirectHub {
    pub fn new() -> Self {
        let (queue, inbox) = mpsc::channel(DISPATCH_QUEUE_CAPACITY);
        DirectHub {
            queue,
            inbox: Mutex::new(Some(inbox)),
            instances: RwLock::new(Vec::new()),
            next_slot: AtomicU64::new(0),
            cursor: AtomicUsize::new(0),
            dispatching: AtomicBool::new(false),
        }
    }

    /// The process-wide default hub.
    pub fn default_hub() -> Arc<DirectHub> {
        DEFAULT_DIRECT_HUB.clone()
    }

    fn join(&self) -> Arc<DirectSlot> {
        let slot = Arc::new(DirectSlot {
            id: self.next_slot.fetch_add(1, Ordering::Relaxed),
            handlers: RwLock::new(HashMap::new()),
        });
        self.instances.write().unwrap().push(slot.clone());
        slot
    }

    fn leave(&self, id: u64) {
        self.instances.write().unwrap().retain(|slot| slot.id != id);
    }

    /// Spawn the dispatch task on first use. Sends happen inside a Tokio
    /// runtime, so the task can be spawned here rather than at hub
    /// construction.
    fn ensure_dispatcher(self: &Arc<Self>) {
        if self.dispatching.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inbox) = self.inbox.lock().unwrap().take() {
            let hub = Arc::clone(self);
            tokio::spawn(async move { hub.dispatch(inbox).await });
        }
    }

    async fn enqueue(self: &Arc<Self>, msg: Message) -> Result<(), QpError> {
        self.ensure_dispatcher();
        self.queue
            .send(msg)
            .await
            .map_err(|_| QpError::Transport("dispatch queue closed".into()))
    }

    /// Deliver each message to exactly one live instance with a handler
    /// for the channel. A rotating cursor spreads consecutive messages
    /// across the matching instances; which instance wins any particular
    /// message is not part of the contract.
    async fn dispatch(&self, mut inbox: mpsc::Receiver<Message>) {
        while let Some(msg) = inbox.recv().await {
            let instances: Vec<Arc<DirectSlot>> = self.instances.read().unwrap().clone();
            let matching: Vec<MessageHandler> = instances
                .iter()
                .filter_map(|slot| slot.handlers.read().unwrap().get(&msg.source).cloned())
                .collect();
            if matching.is_empty() {
                tracing::debug!(channel = %msg.source, "dropping message: no handler");
                continue;
            }
            let offset = self.cursor.fetch_add(1, Ordering::Relaxed);
            let h = matching[offset % matching.len()].clone();
            tokio::spawn(h(msg));
        }
    }
}

impl Default for DirectHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-local point-to-point transport.
///
/// Instances registered on the same channel compete for messages,
/// simulating broker-side competing consumers.
#[allow(missing_debug_implementations)]
pub struct InProcDirect {
    hub: Arc<DirectHub>,
    slot: Arc<DirectSlot>,
    lifecycle: Lifecycle,
}

impl InProcDirect {
    /// A transport on the process-wide default hub.
    pub fn new() -> Self {
        Self::with_hub(DirectHub::default_hub())
    }

    /// A transport on an explicitly owned hub.
    pub fn with_hub(hub: Arc<DirectHub>) -> Self {
        let slot = hub.join();
        InProcDirect {
            hub,
            slot,
            lifecycle: Lifecycle::new(),
        }
    }
}

impl Default for InProcDirect {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DirectTransport for InProcDirect {
    async fn send(&self, channel: &str, data: Vec<u8>) -> Result<(), QpError> {
        if !self.lifecycle.is_running() {
            return Err(QpError::NotRunning);
        }
        self.hub
            .enqueue(Message {
                source: channel.to_string(),
                data,
            })
            .await
    }

    fn on_message(&self, channel: &str, handler: MessageHandler) -> Result<(), QpError> {
        if self.lifecycle.is_running() {
            return Err(QpError::AlreadyRunning);
        }
        self.slot
            .handlers
            .write()
            .unwrap()
            .insert(channel.to_string(), handler);
        Ok(())
    }

    fn start(&self) -> Result<(), QpError> {
        self.lifecycle.start()
    }

    async fn stop(&self, grace: Duration) {
        self.lifecycle.halt();
        tokio::time::sleep(grace).await;
        self.hub.leave(self.slot.id);
        self.lifecycle.mark_stopped();
    }

    fn stop_chan(&self) -> StopChan {
        self.lifecycle.stop_chan()
    }
}

// =============================================================================
// PUBSUB HUB
// =============================================================================

#[allow(missing_debug_implementations)]
struct PubSubSlot {
    id: u64,
    handlers: PubSubDispatcher<MessageHandler>,
}

/// The shared dispatch queue and instance registry behind
/// [`InProcPubSub`] transports.
#[allow(missing_debug_implementations)]
pub struct PubSubHub {
    queue: mpsc::Sender<Message>,
    inbox: Mutex<Option<mpsc::Receiver<Message>>>,
    instances: RwLock<Vec<Arc<PubSubSlot>>>,
    next_slot: AtomicU64,
    dispatching: AtomicBool,
}

impl PubSubHub {
    pub fn new() -> Self {
        let (queue, inbox) = mpsc::channel(DISPATCH_QUEUE_CAPACITY);
        PubSubHub {
            queue,
            inbox: Mutex::new(Some(inbox)),
            instances: RwLock::new(Vec::new()),
            next_slot: AtomicU64::new(0),
            dispatching: AtomicBool::new(false),
        }
    }

    /// The process-wide default hub.
    pub fn default_hub() -> Arc<PubSubHub> {
        DEFAULT_PUBSUB_HUB.clone()
    }

    fn join(&self) -> Arc<PubSubSlot> {
        let slot = Arc::new(PubSubSlot {
            id: self.next_slot.fetch_add(1, Ordering::Relaxed),
            handlers: PubSubDispatcher::new(),
        });
        self.instances.write().unwrap().push(slot.clone());
        slot
    }

    fn leave(&self, id: u64) {
        self.instances.write().unwrap().retain(|slot| slot.id != id);
    }

    fn ensure_dispatcher(self: &Arc<Self>) {
        if self.dispatching.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inbox) = self.inbox.lock().unwrap().take() {
            let hub = Arc::clone(self);
            tokio::spawn(async move { hub.dispatch(inbox).await });
        }
    }

    async fn enqueue(self: &Arc<Self>, msg: Message) -> Result<(), QpError> {
        self.ensure_dispatcher();
        self.queue
            .send(msg)
            .await
            .map_err(|_| QpError::Transport("dispatch queue closed".into()))
    }

    /// Deliver each message to every matching handler of every live
    /// instance, each in its own task. Subscription keys ending in `*`
    /// match the prefix and all its descendants.
    async fn dispatch(&self, mut inbox: mpsc::Receiver<Message>) {
        while let Some(msg) = inbox.recv().await {
            let instances: Vec<Arc<PubSubSlot>> = self.instances.read().unwrap().clone();
            for slot in instances.iter() {
                for h in slot.handlers.find(&msg.source) {
                    tokio::spawn(h(msg.clone()));
                }
            }
        }
    }
}

impl Default for PubSubHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-local broadcast transport.
#[allow(missing_debug_implementations)]
pub struct InProcPubSub {
    hub: Arc<PubSubHub>,
    slot: Arc<PubSubSlot>,
    lifecycle: Lifecycle,
}

impl InProcPubSub {
    /// A transport on the process-wide default hub.
    pub fn new() -> Self {
        Self::with_hub(PubSubHub::default_hub())
    }

    /// A transport on an explicitly owned hub.
    pub fn with_hub(hub: Arc<PubSubHub>) -> Self {
        let slot = hub.join();
        InProcPubSub {
            hub,
            slot,
            lifecycle: Lifecycle::new(),
        }
    }
}

impl Default for InProcPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubTransport for InProcPubSub {
    async fn publish(&self, channel: &str, data: Vec<u8>) -> Result<(), QpError> {
        if !self.lifecycle.is_running() {
            return Err(QpError::NotRunning);
        }
        self.hub
            .enqueue(Message {
                source: channel.to_string(),
                data,
            })
            .await
    }

    fn subscribe(&self, channel: &str, handler: MessageHandler) -> Result<(), QpError> {
        if self.lifecycle.is_running() {
            return Err(QpError::AlreadyRunning);
        }
        self.slot.handlers.set(channel, handler);
        Ok(())
    }

    fn start(&self) -> Result<(), QpError> {
        self.lifecycle.start()
    }

    async fn stop(&self, grace: Duration) {
        self.lifecycle.halt();
        tokio::time::sleep(grace).await;
        self.hub.leave(self.slot.id);
        self.lifecycle.mark_stopped();
    }

    fn stop_chan(&self) -> StopChan {
        self.lifecycle.stop_chan()
    }
}
