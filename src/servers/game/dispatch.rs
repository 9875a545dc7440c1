//! Packet id -> handler table
//!
//! Built once at startup. Every route carries the stage the connection must
//! be in; the check happens here, so handlers never re-check it.

use std::collections::HashMap;

use crate::network::codec::Packet;
use crate::protocol::types::DisconnectReason;
use crate::protocol::{CatalogEntry, ClientPacket, GameStage};
use crate::session::Connection;

use super::{account, play};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRequirement {
    Any,
    None,
    Login,
    Select,
    Game,
    GameOrObserver,
}

impl StageRequirement {
    pub fn admits(self, stage: GameStage) -> bool {
        match self {
            StageRequirement::Any => true,
            StageRequirement::None => stage == GameStage::None,
            StageRequirement::Login => stage == GameStage::Login,
            StageRequirement::Select => stage == GameStage::Select,
            StageRequirement::Game => stage == GameStage::Game,
            StageRequirement::GameOrObserver => {
                matches!(stage, GameStage::Game | GameStage::Observer)
            }
        }
    }
}

type Handler = Box<dyn Fn(&mut Connection, ClientPacket) + Send + Sync>;

struct Route {
    stage: StageRequirement,
    handler: Handler,
}

#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<u16, Route>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full game protocol table.
    pub fn game() -> Self {
        let mut dispatcher = Self::new();
        account::register(&mut dispatcher);
        play::register(&mut dispatcher);
        dispatcher
    }

    /// Routes packets of type `P` to `handler` while the stage admits them.
    pub fn register<P>(&mut self, stage: StageRequirement, handler: fn(&mut Connection, P))
    where
        P: CatalogEntry + TryFrom<ClientPacket, Error = ClientPacket> + 'static,
    {
        let handler: Handler = Box::new(move |conn, packet| match P::try_from(packet) {
            Ok(packet) => handler(conn, packet),
            Err(other) => tracing::warn!(
                "[dispatch] [route_mismatch] expected={} got={}",
                P::NAME,
                other.name()
            ),
        });
        if self.routes.insert(P::ID, Route { stage, handler }).is_some() {
            tracing::warn!("[dispatch] [duplicate_route] packet={}", P::NAME);
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn stage_for(&self, id: u16) -> Option<StageRequirement> {
        self.routes.get(&id).map(|route| route.stage)
    }

    pub fn dispatch(&self, conn: &mut Connection, packet: ClientPacket) {
        if conn.is_disconnecting() {
            return;
        }

        if exceeds_limits(conn, &packet) {
            conn.ctx().ip_reputation.block_ip(conn.ip(), conn.ctx().config.flood_block());
            conn.ctx().diagnostics.send(format!(
                "{}, {}, Disconnected, oversized {}.",
                conn.session_id(),
                conn.ip(),
                packet.name()
            ));
            conn.send_disconnect(DisconnectReason::Abuse);
            return;
        }

        let id = packet.id();
        let Some(route) = self.routes.get(&id) else {
            conn.ctx()
                .diagnostics
                .send(format!("Invalid packet received. Index : {}", id));
            return;
        };

        if !route.stage.admits(conn.stage()) {
            tracing::trace!(
                "[dispatch] [stage_mismatch] id={} packet={} stage={:?}",
                conn.session_id(),
                packet.name(),
                conn.stage()
            );
            return;
        }

        (route.handler)(conn, packet);
    }
}

/// Payload size checks that apply in every stage.
fn exceeds_limits(conn: &Connection, packet: &ClientPacket) -> bool {
    let config = &conn.ctx().config;
    match packet {
        ClientPacket::Chat(p) => p.message.chars().count() > config.max_chat_length,
        ClientPacket::CallNpc(p) => p.key.chars().count() > config.max_npc_key_length,
        _ => false,
    }
}
