//! Connection lifecycle
//!
//! A [`Connection`] is owned by the tick loop and advanced once per tick by
//! [`Connection::process`]. Everything its I/O tasks need lives in the shared
//! [`Link`]; the tick side owns the retry queue, timers, stage and the
//! simulation handles.

pub mod io;
pub mod link;
pub mod registry;
pub mod retry;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::context::Context;
use crate::network::codec::{self, Packet};
use crate::network::throttle::RecentPackets;
use crate::protocol::server;
use crate::protocol::types::DisconnectReason;
use crate::protocol::{ClientPacket, GameStage, ServerPacket};
use crate::world::{Player, SharedAccount};

pub use link::Link;
pub use registry::Registry;
pub use retry::{Gate, Readiness, RetryQueue};

/// Process-unique connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error types for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Maximum sessions exceeded (limit: {limit})")]
    MaxSessionsExceeded { limit: usize },

    #[error("Session id overflow")]
    IdOverflow,
}

/// What the simulation keeps to talk back to a connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    ctx: Arc<Context>,
    link: Arc<Link>,
}

impl ConnectionHandle {
    pub fn session_id(&self) -> SessionId {
        self.link.session_id()
    }

    pub fn ip(&self) -> IpAddr {
        self.link.ip()
    }

    pub fn ctx(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn send(&self, packet: impl Into<ServerPacket>) {
        self.link.enqueue(packet.into());
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }
}

pub struct Connection {
    ctx: Arc<Context>,
    link: Arc<Link>,
    stage: GameStage,
    time_connected: i64,
    time_out_time: i64,
    time_disconnected: Option<i64>,
    grace_applied: bool,
    retry: RetryQueue,
    recent: RecentPackets,
    account: Option<SharedAccount>,
    observing: Option<SessionId>,
}

impl Connection {
    /// Registers a freshly accepted peer.
    ///
    /// Returns the connection and the receiving end of its socket writer,
    /// which the send task drains.
    pub fn open(
        ctx: Arc<Context>,
        addr: SocketAddr,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Bytes>), SessionError> {
        let id = ctx.registry.allocate_id()?;
        let ip = addr.ip();
        let (link, outgoing) = Link::new(id, ip);
        ctx.registry.insert(Arc::clone(&link))?;

        ctx.ip_reputation.block_ip(ip, ctx.config.ip_block());
        ctx.diagnostics.send(format!("{}, Connected.", ip));
        tracing::info!("[session] [connected] id={} addr={}", id, addr);

        let now = ctx.clock.time();
        let conn = Self {
            time_connected: now,
            time_out_time: now + ctx.config.timeout_ms,
            time_disconnected: None,
            grace_applied: false,
            retry: RetryQueue::new(),
            recent: RecentPackets::new(ctx.config.recent_packets),
            stage: GameStage::None,
            account: None,
            observing: None,
            ctx,
            link,
        };
        conn.enqueue(server::Connected {});
        Ok((conn, outgoing))
    }

    pub fn session_id(&self) -> SessionId {
        self.link.session_id()
    }

    pub fn ip(&self) -> IpAddr {
        self.link.ip()
    }

    pub fn ctx(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            ctx: Arc::clone(&self.ctx),
            link: Arc::clone(&self.link),
        }
    }

    pub fn stage(&self) -> GameStage {
        self.stage
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn is_disconnecting(&self) -> bool {
        self.link.is_disconnecting()
    }

    pub fn time_connected(&self) -> i64 {
        self.time_connected
    }

    pub fn time_out_time(&self) -> i64 {
        self.time_out_time
    }

    pub fn time_disconnected(&self) -> Option<i64> {
        self.time_disconnected
    }

    pub fn account(&self) -> Option<&SharedAccount> {
        self.account.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.account.as_ref().is_some_and(|a| a.lock().admin)
    }

    pub fn has_player(&self) -> bool {
        self.link.has_player()
    }

    pub fn with_player<R>(&self, f: impl FnOnce(&mut Box<dyn Player>) -> R) -> Option<R> {
        self.link.with_player(f)
    }

    pub fn set_player(&mut self, player: Box<dyn Player>) {
        self.link.set_player(player);
    }

    pub fn take_player(&mut self) -> Option<Box<dyn Player>> {
        self.link.take_player()
    }

    pub fn observing(&self) -> Option<SessionId> {
        self.observing
    }

    pub fn recent_packets(&self) -> &RecentPackets {
        &self.recent
    }

    pub fn retry_len(&self) -> usize {
        self.retry.len()
    }

    /// Queues a reply for this tick's flush.
    pub fn enqueue(&self, packet: impl Into<ServerPacket>) {
        self.link.enqueue(packet.into());
    }

    /// Writes `packet` ahead of anything queued.
    ///
    /// Bypasses the outbound queue, so it reaches the client before any
    /// queued packet, including the `Connected` queued by [`Connection::open`]
    /// if no tick has flushed it yet.
    pub fn send_immediate(&self, packet: impl Into<ServerPacket>) -> bool {
        send_now(&self.link, packet.into())
    }

    /// Parks a packet until the next tick.
    pub fn defer(&mut self, packet: ClientPacket) {
        self.retry.push(packet);
    }

    /// Moves to `next` if the stage machine allows it.
    pub fn set_stage(&mut self, next: GameStage) -> bool {
        if !self.stage.can_transition_to(next) {
            tracing::debug!(
                "[session] [stage_rejected] id={} from={:?} to={:?}",
                self.session_id(),
                self.stage,
                next
            );
            return false;
        }
        self.stage = next;
        true
    }

    /// Binds `account` to this connection. A different connection still
    /// holding the account is told so, starts disconnecting and loses its
    /// player before this call returns.
    pub fn bind_account(&mut self, account: SharedAccount) {
        let index = account.lock().index;
        let me = self.session_id();
        let previous = self.ctx.accounts.bind(index, me);
        if let Some(previous) = previous.filter(|previous| *previous != me) {
            if let Some(other) = self.ctx.registry.get(previous) {
                kick_duplicate(&self.ctx, &other);
            }
        }
        self.account = Some(account);
    }

    /// Starts spectating `target`, leaving any previous target.
    pub fn start_observing(&mut self, target: SessionId) -> bool {
        let me = self.session_id();
        if !self.ctx.registry.attach_observer(target, me) {
            return false;
        }
        if let Some(previous) = self.observing.replace(target) {
            if previous != target {
                self.ctx.registry.detach_observer(previous, me);
            }
        }
        if let Some(mut player) = self.link.take_player() {
            player.stop_game(DisconnectReason::LogOut);
        }
        self.stage = GameStage::Observer;
        true
    }

    /// Enters graceful teardown: no more inbound work, output keeps
    /// flushing until the grace deadline.
    pub fn begin_disconnecting(&mut self, reason: DisconnectReason) {
        self.link.mark_disconnecting(reason);
        self.apply_grace();
    }

    /// The first time `disconnecting` is seen, the deadline moves to
    /// `now + grace` regardless of which side set the flag.
    fn apply_grace(&mut self) {
        if self.grace_applied || !self.link.is_disconnecting() {
            return;
        }
        self.grace_applied = true;
        self.time_out_time = self.ctx.clock.time() + self.ctx.config.disconnect_grace_ms;
    }

    /// Runs one tick for this connection.
    pub fn process(&mut self) {
        if !self.link.is_connected() {
            return;
        }

        if !self.link.socket_usable() {
            self.disconnect(DisconnectReason::SocketClosed);
            return;
        }

        self.apply_grace();

        let ctx = Arc::clone(&self.ctx);
        while !self.link.is_disconnecting() {
            let Some(packet) = self.link.pop_inbound() else {
                break;
            };

            self.recent.push(packet.id());
            self.time_out_time = ctx.clock.time() + ctx.config.timeout_ms;
            ctx.dispatcher.dispatch(self, packet);

            if !self.link.is_connected() {
                return;
            }
            self.apply_grace();
        }

        for packet in self.retry.drain() {
            self.link.push_inbound(packet);
        }

        if ctx.clock.time() > self.time_out_time {
            // A connection already on its way out reports why it started.
            let reason = self
                .link
                .disconnect_reason()
                .filter(|_| self.link.is_disconnecting())
                .unwrap_or(DisconnectReason::TimedOut);
            self.disconnect(reason);
            return;
        }

        self.flush();
    }

    /// Serializes every queued packet into one buffer and hands it to the
    /// writer. Observable packets are copied to this connection's spectators.
    pub fn flush(&mut self) {
        if self.link.outbound_len() == 0 {
            return;
        }

        let mut buf = BytesMut::new();
        let mut spectators = None;
        while let Some(packet) = self.link.pop_outbound() {
            if packet.is_observable() {
                let links = spectators.get_or_insert_with(|| self.ctx.registry.observers_of(self.session_id()));
                for link in links.iter() {
                    link.enqueue(packet.clone());
                }
            }
            if let Err(e) = codec::encode(&packet, &mut buf) {
                tracing::warn!(
                    "[session] [encode_failed] id={} packet={} err={}",
                    self.session_id(),
                    packet.name(),
                    e
                );
            }
        }

        if !buf.is_empty() {
            self.link.send_raw(buf.freeze());
        }
    }

    /// Leaves the game without touching the socket: queued output still
    /// flushes.
    pub fn soft_disconnect(&mut self, reason: DisconnectReason) {
        self.stage = GameStage::Disconnected;
        self.time_disconnected = Some(self.ctx.clock.time());

        let me = self.session_id();
        let mut bindings = self.ctx.accounts.lock();
        if let Some(mut player) = self.link.take_player() {
            player.stop_game(reason);
        }
        if let Some(account) = self.account.take() {
            let index = account.lock().index;
            if bindings.get(&index) == Some(&me) {
                bindings.remove(&index);
            }
        }
    }

    /// Tears the connection down. Safe to call more than once.
    pub fn disconnect(&mut self, reason: DisconnectReason) {
        if !self.link.close() {
            return;
        }

        let me = self.session_id();
        self.soft_disconnect(reason);

        self.ctx.registry.remove(me);
        if let Some(target) = self.observing.take() {
            self.ctx.registry.detach_observer(target, me);
        }
        self.retry.clear();

        self.ctx
            .diagnostics
            .send(format!("{}, {}, Disconnected. Reason: {}", me, self.ip(), reason.code()));
        tracing::info!(
            "[session] [disconnected] id={} ip={} reason={:?}",
            me,
            self.ip(),
            reason
        );
    }

    /// Sends `Disconnect { reason }` ahead of anything queued, then leaves
    /// the game without waiting for the send.
    pub fn send_disconnect(&mut self, reason: DisconnectReason) {
        self.begin_disconnecting(reason);
        self.send_immediate(server::Disconnect { reason });
        self.soft_disconnect(reason);
    }
}

/// Tells the connection holding an account that was just taken over, and
/// takes its player out of the world. The accounts lock must not be held.
fn kick_duplicate(ctx: &Context, other: &Link) {
    send_now(
        other,
        server::Disconnect {
            reason: DisconnectReason::DuplicateLogin,
        }
        .into(),
    );
    other.mark_disconnecting(DisconnectReason::DuplicateLogin);
    if let Some(mut player) = other.take_player() {
        player.stop_game(DisconnectReason::DuplicateLogin);
    }
    ctx.diagnostics.send(format!(
        "{}, {}, Account logged in elsewhere.",
        other.session_id(),
        other.ip()
    ));
    tracing::info!(
        "[session] [duplicate_login] id={} ip={}",
        other.session_id(),
        other.ip()
    );
}

fn send_now(link: &Link, packet: ServerPacket) -> bool {
    match codec::encode_to_bytes(&packet) {
        Ok(bytes) => link.send_raw(bytes),
        Err(e) => {
            tracing::warn!(
                "[session] [encode_failed] id={} packet={} err={}",
                link.session_id(),
                packet.name(),
                e
            );
            false
        }
    }
}
