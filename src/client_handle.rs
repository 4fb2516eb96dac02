use crate::{
    connection::ConnectionId,
    protocol::{
        layout::FieldLayout,
        packet::server::{Disconnect, ServerPacket},
    },
};
use bytes::Bytes;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

/// Cheap, cloneable handle to send packets to one connection from any task.
///
/// Frames are queued to the connection's write task; the transport
/// serializes them. Sending never blocks and never fails: once the
/// connection is closed, sends are silently dropped.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    id: ConnectionId,
    frames: flume::Sender<Bytes>,
    /// Layout of the peer; replaced once when negotiation finishes.
    layout: RwLock<FieldLayout>,
    close: CancellationToken,
}

impl ClientHandle {
    pub(crate) fn new(
        id: ConnectionId,
        frames: flume::Sender<Bytes>,
        close: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                frames,
                layout: RwLock::new(FieldLayout::CLASSIC),
                close,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn layout(&self) -> FieldLayout {
        *self
            .inner
            .layout
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_layout(&self, layout: FieldLayout) {
        *self
            .inner
            .layout
            .write()
            .unwrap_or_else(PoisonError::into_inner) = layout;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.close.is_cancelled()
    }

    /// Encodes `packet` for this peer and queues it.
    pub fn send(&self, packet: impl Into<ServerPacket>) {
        if self.is_closed() {
            return;
        }
        let packet = packet.into();
        self.send_frame(packet.to_frame(self.layout()).into());
    }

    /// Queues an already-encoded frame.
    pub fn send_frame(&self, frame: Bytes) {
        if self.is_closed() {
            return;
        }
        if self.inner.frames.send(frame).is_err() {
            tracing::debug!(id = %self.inner.id, "Write task gone; closing connection");
            self.close();
        }
    }

    /// Sends a disconnect reason, then closes the connection.
    pub fn kick(&self, reason: &str) {
        self.send(Disconnect {
            reason: reason.to_owned(),
        });
        self.close();
    }

    /// Stops the connection. Frames already queued are still flushed.
    /// Idempotent.
    pub fn close(&self) {
        self.inner.close.cancel();
    }
}
