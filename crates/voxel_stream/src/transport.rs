//! Narrow interface to the network layer.
//!
//! The scheduler only ever hands finished [`ClientMessage`]s to a
//! [`Transport`]; framing, compression and the socket belong to the host.
//! Inbound messages may arrive on another thread, so they travel through an
//! unbounded channel and are drained on the frame thread.

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{Result, StreamError};
use crate::protocol::{ClientMessage, ServerMessage};

/// Outbound side of the connection.
///
/// Delivery is expected to be in order and at most once; lost requests are
/// recovered by the scheduler's retry counter, not by the transport.
pub trait Transport {
    fn send(&mut self, message: ClientMessage) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        (**self).send(message)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        (**self).send(message)
    }
}

/// Hands messages to a network task running elsewhere.
impl Transport for UnboundedSender<ClientMessage> {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        self.unbounded_send(message)
            .map_err(|_| StreamError::TransportClosed)
    }
}

/// Collects outbound packets until the host takes them.
#[derive(Clone, Debug, Default)]
pub struct PacketBuffer {
    packets: Vec<ClientMessage>,
    closed: bool,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every buffered packet, oldest first.
    pub fn drain(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.packets)
    }

    /// Take every buffered packet as JSON text.
    pub fn drain_json(&mut self) -> Result<Vec<String>> {
        self.drain().iter().map(ClientMessage::to_json).collect()
    }

    pub fn packets(&self) -> &[ClientMessage] {
        &self.packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Refuse further sends.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl Transport for PacketBuffer {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        if self.closed {
            return Err(StreamError::TransportClosed);
        }
        log::trace!("queued outbound {}", message.kind());
        self.packets.push(message);
        Ok(())
    }
}

/// Sending half for inbound server messages. Cheap to clone, usable from any thread.
#[derive(Clone, Debug)]
pub struct InboundSender {
    tx: UnboundedSender<ServerMessage>,
}

impl InboundSender {
    pub fn send(&self, message: ServerMessage) -> Result<()> {
        self.tx
            .unbounded_send(message)
            .map_err(|_| StreamError::TransportClosed)
    }

    /// Parse and enqueue a JSON message.
    pub fn send_json(&self, text: &str) -> Result<()> {
        self.send(ServerMessage::from_json(text)?)
    }
}

/// Receiving half, drained once per frame on the thread that owns the world.
#[derive(Debug)]
pub struct InboundReceiver {
    rx: UnboundedReceiver<ServerMessage>,
}

impl InboundReceiver {
    /// Take every message that has arrived so far without waiting.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// Create a connected inbound sender/receiver pair.
pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    let (tx, rx) = mpsc::unbounded();
    (InboundSender { tx }, InboundReceiver { rx })
}
