//! Message bus seam
//!
//! The orchestrator only needs two operations from a transport: publish a
//! message on a channel, and install a handler for one message kind on a
//! channel. How messages physically move is up to the implementation.
//!
//! # Delivery Contract
//!
//! Implementations must deliver messages on a given channel exactly once and
//! in publish order. No ordering is required across different channels.
//! Handlers may run on a different thread than the publisher.

use std::sync::Arc;

use crate::channel::ChannelId;
use crate::error::BusError;
use crate::message::{Message, MessageKind};

/// Handler invoked for each delivered message of the kind it was installed for.
pub type Handler = Arc<dyn Fn(Message) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(Message) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Publish/subscribe transport between a State and its Kernel.
pub trait Bus: Send + Sync {
    /// Publish `message` on `channel`.
    fn publish(&self, channel: &ChannelId, message: Message) -> Result<(), BusError>;

    /// Install `handler` for messages of `kind` arriving on `channel`.
    ///
    /// Installing a second handler for the same `(channel, kind)` replaces
    /// the first.
    fn install_callback(
        &self,
        channel: &ChannelId,
        kind: MessageKind,
        handler: Handler,
    ) -> Result<(), BusError>;
}

impl<B: Bus + ?Sized> Bus for Arc<B> {
    fn publish(&self, channel: &ChannelId, message: Message) -> Result<(), BusError> {
        (**self).publish(channel, message)
    }

    fn install_callback(
        &self,
        channel: &ChannelId,
        kind: MessageKind,
        handler: Handler,
    ) -> Result<(), BusError> {
        (**self).install_callback(channel, kind, handler)
    }
}
