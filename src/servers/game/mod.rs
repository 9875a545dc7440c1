//! Game server: accept loop plus the fixed-rate tick loop
//!
//! The accept loop registers connections and starts their socket tasks, then
//! hands them to the tick loop, which owns every [`Connection`] and calls
//! `process()` on each once per tick in arrival order.

pub mod account;
pub mod dispatch;
pub mod play;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::context::Context;
use crate::protocol::types::DisconnectReason;
use crate::session::{io, Connection};

/// How often expired IP blocks are dropped.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Pause after a failed accept, so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct GameServer {
    ctx: Arc<Context>,
    listener: TcpListener,
}

impl GameServer {
    /// Binds the configured listen address.
    pub async fn bind(ctx: Arc<Context>) -> Result<Self> {
        let addr = ctx.config.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        Ok(Self::from_listener(ctx, listener))
    }

    pub fn from_listener(ctx: Arc<Context>, listener: TcpListener) -> Self {
        Self { ctx, listener }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn ctx(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Serves until `shutdown` resolves, then tells every client the server
    /// is closing.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Self { ctx, listener } = self;
        tracing::info!(
            "[game] [ready] addr={} tick_ms={}",
            listener.local_addr()?,
            ctx.config.tick_interval_ms
        );

        let (incoming_tx, mut incoming) = mpsc::unbounded_channel();
        let acceptor = tokio::spawn(accept_loop(Arc::clone(&ctx), listener, incoming_tx));

        let mut interval = tokio::time::interval(ctx.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut connections: Vec<Connection> = Vec::new();
        let mut last_prune = Instant::now();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {}
            }

            while let Ok(conn) = incoming.try_recv() {
                connections.push(conn);
            }

            ctx.clock.update();
            for conn in connections.iter_mut() {
                conn.process();
            }
            connections.retain(Connection::is_connected);

            if last_prune.elapsed() >= PRUNE_INTERVAL {
                last_prune = Instant::now();
                let remaining = ctx.ip_reputation.prune();
                tracing::debug!("[game] [prune] blocked_ips={}", remaining);
            }
        }

        acceptor.abort();
        while let Ok(conn) = incoming.try_recv() {
            connections.push(conn);
        }
        shutdown_connections(&ctx, connections).await;
        Ok(())
    }
}

async fn accept_loop(
    ctx: Arc<Context>,
    listener: TcpListener,
    incoming: mpsc::UnboundedSender<Connection>,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!("[game] [accept_failed] err={}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        if ctx.ip_reputation.is_blocked(addr.ip()) {
            tracing::debug!("[game] [refused] addr={} reason=blocked", addr);
            continue;
        }
        if ctx.registry.is_full() {
            tracing::warn!(
                "[game] [refused] addr={} reason=full limit={}",
                addr,
                ctx.config.max_connections
            );
            continue;
        }

        match Connection::open(Arc::clone(&ctx), addr) {
            Ok((conn, outgoing)) => {
                io::spawn(stream, Arc::clone(&ctx), Arc::clone(conn.link()), outgoing);
                if incoming.send(conn).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("[game] [open_failed] addr={} err={}", addr, e),
        }
    }
}

async fn shutdown_connections(ctx: &Context, mut connections: Vec<Connection>) {
    tracing::info!("[game] [shutdown] connections={}", connections.len());

    for conn in connections.iter_mut() {
        conn.send_disconnect(DisconnectReason::ServerClosing);
        conn.flush();
    }

    // Let the send tasks drain before the sockets close.
    let grace = u64::try_from(ctx.config.disconnect_grace_ms).unwrap_or(0);
    tokio::time::sleep(Duration::from_millis(grace)).await;

    for conn in connections.iter_mut() {
        conn.disconnect(DisconnectReason::ServerClosing);
    }
}
