//! State shared between a connection's I/O tasks and the tick loop.
//!
//! The receive task produces into `inbound`, the tick consumes it. The tick
//! and the simulation produce into `outbound`, the tick's flush consumes it.
//! Encoded bytes reach the socket through the writer channel, so the tick
//! never awaits.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use super::SessionId;
use crate::protocol::types::DisconnectReason;
use crate::protocol::{ClientPacket, ServerPacket};
use crate::world::Player;

pub struct Link {
    session_id: SessionId,
    ip: IpAddr,
    inbound: SegQueue<ClientPacket>,
    outbound: SegQueue<ServerPacket>,
    /// False once the connection has been torn down.
    connected: AtomicBool,
    socket_usable: AtomicBool,
    disconnecting: AtomicBool,
    /// Why `disconnecting` was raised; reported when the grace runs out.
    reason: Mutex<Option<DisconnectReason>>,
    /// The in-world player, reachable by a connection that takes the
    /// account over.
    player: Mutex<Option<Box<dyn Player>>>,
    writer: mpsc::UnboundedSender<Bytes>,
    close: watch::Sender<bool>,
}

impl Link {
    /// Creates the link and the receiving end of its socket writer.
    pub fn new(session_id: SessionId, ip: IpAddr) -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        let (writer, outgoing) = mpsc::unbounded_channel();
        let (close, _) = watch::channel(false);
        let link = Arc::new(Self {
            session_id,
            ip,
            inbound: SegQueue::new(),
            outbound: SegQueue::new(),
            connected: AtomicBool::new(true),
            socket_usable: AtomicBool::new(true),
            disconnecting: AtomicBool::new(false),
            reason: Mutex::new(None),
            player: Mutex::new(None),
            writer,
            close,
        });
        (link, outgoing)
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn push_inbound(&self, packet: ClientPacket) {
        if self.is_connected() {
            self.inbound.push(packet);
        }
    }

    pub fn pop_inbound(&self) -> Option<ClientPacket> {
        self.inbound.pop()
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Queues a packet for the next flush. Dropped once torn down.
    pub fn enqueue(&self, packet: ServerPacket) {
        if self.is_connected() {
            self.outbound.push(packet);
        }
    }

    pub fn pop_outbound(&self) -> Option<ServerPacket> {
        self.outbound.pop()
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Hands encoded bytes straight to the socket writer.
    pub fn send_raw(&self, bytes: Bytes) -> bool {
        if bytes.is_empty() || !self.is_connected() || !self.socket_usable() {
            return false;
        }
        self.writer.send(bytes).is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn socket_usable(&self) -> bool {
        self.socket_usable.load(Ordering::Acquire)
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::Acquire)
    }

    /// Returns true for the call that set the flag. Only that call's
    /// reason is kept.
    pub fn mark_disconnecting(&self, reason: DisconnectReason) -> bool {
        let first = !self.disconnecting.swap(true, Ordering::AcqRel);
        if first {
            *self.reason.lock() = Some(reason);
        }
        first
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        *self.reason.lock()
    }

    /// Peer closed or the socket failed.
    pub fn mark_socket_closed(&self) {
        self.socket_usable.store(false, Ordering::Release);
        self.mark_disconnecting(DisconnectReason::SocketClosed);
    }

    pub fn has_player(&self) -> bool {
        self.player.lock().is_some()
    }

    pub fn set_player(&self, player: Box<dyn Player>) {
        *self.player.lock() = Some(player);
    }

    pub fn take_player(&self) -> Option<Box<dyn Player>> {
        self.player.lock().take()
    }

    /// Runs `f` on the player, if there is one. `f` must not reach back into
    /// this link's player.
    pub fn with_player<R>(&self, f: impl FnOnce(&mut Box<dyn Player>) -> R) -> Option<R> {
        self.player.lock().as_mut().map(f)
    }

    /// Tears the link down: stops both I/O tasks and drops queued packets.
    /// Returns false if it was already closed.
    pub fn close(&self) -> bool {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.close.send_replace(true);
        while self.inbound.pop().is_some() {}
        while self.outbound.pop().is_some() {}
        true
    }

    /// Resolves once the link is closed.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.close.subscribe()
    }
}
