//! Socket tasks
//!
//! Each connection gets a receive task, which frames and decodes bytes into
//! the inbound queue, and a send task, which writes whatever the tick flushed.
//! Neither task touches connection state beyond the shared [`Link`].

use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use super::Link;
use crate::context::Context;
use crate::network::codec::{self, Packet};
use crate::network::throttle::{FloodGuard, FloodVerdict};
use crate::protocol::types::DisconnectReason;
use crate::protocol::ClientPacket;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Receive-side state: the partial-frame accumulator and the flood guard.
pub struct PacketReceiver {
    ctx: Arc<Context>,
    link: Arc<Link>,
    partial: BytesMut,
    guard: FloodGuard,
}

impl PacketReceiver {
    pub fn new(ctx: Arc<Context>, link: Arc<Link>) -> Self {
        let guard = FloodGuard::new(
            ctx.config.max_packet,
            ctx.config.flood_window(),
            ctx.config.recent_packets,
        );
        Self {
            ctx,
            link,
            partial: BytesMut::new(),
            guard,
        }
    }

    pub fn buffered(&self) -> usize {
        self.partial.len()
    }

    /// Appends `data` and decodes every complete frame into the inbound
    /// queue. Returns false once the connection should stop reading.
    pub fn receive(&mut self, data: &[u8], now: Instant) -> bool {
        if !self.link.is_connected() || self.link.is_disconnecting() {
            return false;
        }
        self.partial.extend_from_slice(data);

        loop {
            match codec::decode::<ClientPacket>(&mut self.partial, self.ctx.config.max_frame_size) {
                Ok(Some(packet)) => {
                    let id = packet.id();
                    self.link.push_inbound(packet);

                    if self.guard.record(id, now) == FloodVerdict::Tripped {
                        let names: Vec<&str> = self
                            .guard
                            .recent()
                            .distinct()
                            .into_iter()
                            .map(|id| ClientPacket::name_of(id).unwrap_or("Unknown"))
                            .collect();
                        self.abuse(format!(
                            "{} Disconnected, Large amount of Packets. LastPackets: {}.",
                            self.link.ip(),
                            names.join(",")
                        ));
                        return false;
                    }
                }
                Ok(None) => return true,
                Err(e) => {
                    tracing::debug!(
                        "[session] [decode_failed] id={} ip={} err={}",
                        self.link.session_id(),
                        self.link.ip(),
                        e
                    );
                    self.abuse(format!("{} Disconnected, Invalid packet.", self.link.ip()));
                    return false;
                }
            }
        }
    }

    fn abuse(&mut self, line: String) {
        self.ctx
            .ip_reputation
            .block_ip(self.link.ip(), self.ctx.config.flood_block());
        self.ctx.diagnostics.send(line);
        self.link.mark_disconnecting(DisconnectReason::Abuse);
        self.partial.clear();
    }
}

/// Starts the receive and send tasks for an accepted socket.
pub fn spawn(
    stream: TcpStream,
    ctx: Arc<Context>,
    link: Arc<Link>,
    outgoing: mpsc::UnboundedReceiver<Bytes>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("[session] [nodelay_failed] id={} err={}", link.session_id(), e);
    }
    let (read_half, write_half) = stream.into_split();

    let receiver = PacketReceiver::new(ctx, Arc::clone(&link));
    tokio::spawn(receive_loop(read_half, receiver));
    tokio::spawn(send_loop(write_half, link, outgoing));
}

/// Resolves once the link is closed. The borrow of the watched value ends
/// here, so the caller's future stays `Send`.
async fn until_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

async fn receive_loop(mut read_half: OwnedReadHalf, mut receiver: PacketReceiver) {
    let link = Arc::clone(&receiver.link);
    let mut closed = link.closed();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = until_closed(&mut closed) => break,
            result = read_half.read(&mut buf) => match result {
                Ok(0) => {
                    tracing::debug!("[session] [peer_closed] id={}", link.session_id());
                    link.mark_socket_closed();
                    break;
                }
                Ok(n) => {
                    tracing::trace!("[session] [read] id={} bytes={}", link.session_id(), n);
                    if !receiver.receive(&buf[..n], Instant::now()) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("[session] [read_failed] id={} err={}", link.session_id(), e);
                    link.mark_socket_closed();
                    break;
                }
            }
        }
    }
}

async fn send_loop(
    mut write_half: OwnedWriteHalf,
    link: Arc<Link>,
    mut outgoing: mpsc::UnboundedReceiver<Bytes>,
) {
    let mut closed = link.closed();

    loop {
        tokio::select! {
            biased;
            bytes = outgoing.recv() => match bytes {
                Some(bytes) => {
                    if let Err(e) = write_half.write_all(&bytes).await {
                        tracing::debug!("[session] [write_failed] id={} err={}", link.session_id(), e);
                        link.mark_socket_closed();
                        break;
                    }
                }
                None => break,
            },
            _ = until_closed(&mut closed) => break,
        }
    }

    let _ = write_half.shutdown().await;
}
