//! In-memory message bus.
//!
//! Each channel gets its own FIFO queue and a dedicated dispatcher thread that
//! invokes the installed handlers in publish order. Channels are created
//! lazily on first publish or first handler installation.
//!
//! Handlers installed by a State or Kernel usually hold a clone of the bus to
//! publish replies, which keeps the bus alive; call [`LocalBus::close`] to stop
//! the dispatcher threads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::bus::{Bus, Handler};
use crate::channel::ChannelId;
use crate::error::BusError;
use crate::message::{Message, MessageKind};

enum Envelope {
    Deliver(Message),
    Stop,
}

type HandlerTable = Arc<RwLock<HashMap<MessageKind, Handler>>>;

struct ChannelSlot {
    tx: Sender<Envelope>,
    handlers: HandlerTable,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct Inner {
    channels: Mutex<HashMap<ChannelId, Arc<ChannelSlot>>>,
    closed: AtomicBool,
}

/// Thread-backed in-memory [`Bus`].
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<Inner>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`LocalBus::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of channels created so far.
    pub fn channel_count(&self) -> usize {
        self.inner.channels.lock().len()
    }

    /// Stop all dispatcher threads.
    ///
    /// Messages already queued are delivered before each dispatcher exits.
    /// Further publishes and installations fail with [`BusError::Closed`].
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let slots: Vec<Arc<ChannelSlot>> = self.inner.channels.lock().values().cloned().collect();
        for slot in &slots {
            let _ = slot.tx.send(Envelope::Stop);
        }
        for slot in slots {
            let worker = slot.worker.lock().take();
            if let Some(worker) = worker {
                // A handler closing the bus must not join its own dispatcher.
                if worker.thread().id() != thread::current().id() {
                    let _ = worker.join();
                }
            }
        }
        debug!("local bus closed");
    }

    fn slot(&self, channel: &ChannelId) -> Result<Arc<ChannelSlot>, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let mut channels = self.inner.channels.lock();
        if let Some(slot) = channels.get(channel) {
            return Ok(Arc::clone(slot));
        }

        let (tx, rx) = unbounded();
        let handlers: HandlerTable = Arc::new(RwLock::new(HashMap::new()));
        let worker = spawn_dispatcher(channel, rx, Arc::clone(&handlers))?;
        let slot = Arc::new(ChannelSlot {
            tx,
            handlers,
            worker: Mutex::new(Some(worker)),
        });
        channels.insert(channel.clone(), Arc::clone(&slot));
        trace!(%channel, "channel created");
        Ok(slot)
    }
}

fn spawn_dispatcher(
    channel: &ChannelId,
    rx: Receiver<Envelope>,
    handlers: HandlerTable,
) -> Result<JoinHandle<()>, BusError> {
    let label = channel.to_string();
    thread::Builder::new()
        .name(format!("asm-bus:{}", channel.consumer))
        .spawn(move || dispatch_loop(&label, rx, handlers))
        .map_err(|e| BusError::Delivery {
            channel: channel.to_string(),
            reason: e.to_string(),
        })
}

fn dispatch_loop(channel: &str, rx: Receiver<Envelope>, handlers: HandlerTable) {
    while let Ok(envelope) = rx.recv() {
        let message = match envelope {
            Envelope::Deliver(message) => message,
            Envelope::Stop => break,
        };
        let kind = message.kind();
        // Clone out of the lock so a handler may install callbacks itself.
        let handler = handlers.read().get(&kind).cloned();
        match handler {
            Some(handler) => handler(message),
            None => trace!(channel, %kind, "no handler installed, message dropped"),
        }
    }
}

impl Bus for LocalBus {
    fn publish(&self, channel: &ChannelId, message: Message) -> Result<(), BusError> {
        let slot = self.slot(channel)?;
        slot.tx
            .send(Envelope::Deliver(message))
            .map_err(|_| {
                warn!(%channel, "dispatcher is gone");
                BusError::Delivery {
                    channel: channel.to_string(),
                    reason: "dispatcher stopped".to_string(),
                }
            })
    }

    fn install_callback(
        &self,
        channel: &ChannelId,
        kind: MessageKind,
        handler: Handler,
    ) -> Result<(), BusError> {
        let slot = self.slot(channel)?;
        slot.handlers.write().insert(kind, handler);
        trace!(%channel, %kind, "handler installed");
        Ok(())
    }
}
