//! Drives one TCP connection from accept to close.
//!
//! The read side runs on the connection's own task and owns the frame
//! reader and the session. Writes go through a flume channel to a second
//! task, so packet handlers never wait on the socket.

use crate::{
    client_handle::ClientHandle,
    error::ConnectionError,
    protocol::{frame_reader::FrameReader, packet::server::ServerPacket},
    server::ServerContext,
    session::Session,
};
use bytes::Bytes;
use std::{fmt, future, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::{self, Instant, Interval},
};
use tokio_util::sync::CancellationToken;

const READ_BUFFER_SIZE: usize = 4096;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u32);

impl ConnectionId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Runs a connection until either side closes it. Never fails: errors are
/// logged, reported to the peer where possible, and end only this
/// connection.
pub async fn drive_connection(stream: TcpStream, id: ConnectionId, server: Arc<ServerContext>) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%id, "Failed to set TCP_NODELAY: {e}");
    }
    let (mut reader, writer) = stream.into_split();

    let (frames, outbound) = flume::unbounded();
    let close = CancellationToken::new();
    let handle = ClientHandle::new(id, frames, close.clone());
    let write_task = tokio::spawn(write_frames(writer, outbound, close.clone(), id));

    let mut session = Session::new(handle.clone(), Arc::clone(&server));
    let result = read_frames(&mut reader, &mut session, &server, &close).await;

    match result {
        Ok(()) => tracing::info!(%id, "Connection closed"),
        Err(e) => {
            tracing::warn!(%id, category = e.category(), "Closing connection: {e}");
            if let Some(reason) = e.disconnect_reason() {
                handle.kick(&reason);
            }
        }
    }

    session.shutdown();
    if let Err(e) = write_task.await {
        tracing::warn!(%id, "Write task failed: {e}");
    }
}

async fn read_frames(
    reader: &mut OwnedReadHalf,
    session: &mut Session,
    server: &ServerContext,
    close: &CancellationToken,
) -> Result<(), ConnectionError> {
    let registry = server.dispatcher.registry();
    let mut frame_reader = FrameReader::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut ping = server.ping_interval.map(keep_alive);

    loop {
        tokio::select! {
            () = close.cancelled() => return Ok(()),
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                frame_reader.append(&buf[..n], registry, session)?;
            }
            () = tick(&mut ping) => {
                if session.is_active() {
                    session.handle().send(ServerPacket::Ping);
                }
            }
        }
    }
}

fn keep_alive(period: Duration) -> Interval {
    time::interval_at(Instant::now() + period, period)
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

/// Writes queued frames in order. After the connection is closed, frames
/// already queued are flushed before the socket is shut down.
async fn write_frames(
    mut writer: OwnedWriteHalf,
    frames: flume::Receiver<Bytes>,
    close: CancellationToken,
    id: ConnectionId,
) {
    if let Err(e) = write_until_closed(&mut writer, &frames, &close).await {
        tracing::debug!(%id, category = "TransportError", "Write failed: {e}");
    }
    // Unblocks the read side if the write side failed first.
    close.cancel();
}

async fn write_until_closed(
    writer: &mut OwnedWriteHalf,
    frames: &flume::Receiver<Bytes>,
    close: &CancellationToken,
) -> std::io::Result<()> {
    loop {
        let frame = tokio::select! {
            biased;
            frame = frames.recv_async() => match frame {
                Ok(frame) => frame,
                Err(_) => break,
            },
            () = close.cancelled() => break,
        };
        writer.write_all(&frame).await?;
    }

    for frame in frames.drain() {
        writer.write_all(&frame).await?;
    }
    writer.shutdown().await
}
