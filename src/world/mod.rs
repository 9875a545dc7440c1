//! Boundary between the connection core and the game simulation
//!
//! Handlers never touch game objects directly. Environment-level requests go
//! through [`World`], in-game requests through the connection's [`Player`]
//! as exactly one [`Action`] each.

pub mod action;
pub mod lobby;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::protocol::client;
use crate::protocol::types::{Class, DisconnectReason, Gender, SelectInfo};
use crate::session::{Connection, ConnectionHandle, SessionId};

pub use action::{Action, NpcTarget, Parcel};

/// Account record shared between the simulation and the connection that is
/// logged into it.
pub type SharedAccount = Arc<Mutex<AccountInfo>>;

#[derive(Debug, Clone, Default)]
pub struct AccountInfo {
    pub index: i32,
    pub account_id: String,
    pub admin: bool,
    pub characters: Vec<CharacterInfo>,
}

impl AccountInfo {
    /// Character-select rows, deleted characters excluded.
    pub fn select_info(&self) -> Vec<SelectInfo> {
        self.characters
            .iter()
            .filter(|c| !c.deleted)
            .map(CharacterInfo::select_info)
            .collect()
    }

    pub fn character(&self, index: i32) -> Option<&CharacterInfo> {
        self.characters.iter().find(|c| c.index == index)
    }

    pub fn character_mut(&mut self, index: i32) -> Option<&mut CharacterInfo> {
        self.characters.iter_mut().find(|c| c.index == index)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CharacterInfo {
    pub index: i32,
    pub name: String,
    pub level: u16,
    pub class: Class,
    pub gender: Gender,
    pub deleted: bool,
    pub delete_date: Option<DateTime<Utc>>,
    pub banned: bool,
    pub ban_reason: String,
    pub expiry_date: Option<DateTime<Utc>>,
    pub last_logout: Option<DateTime<Utc>>,
}

impl CharacterInfo {
    pub fn select_info(&self) -> SelectInfo {
        SelectInfo {
            index: self.index,
            name: self.name.clone(),
            level: self.level,
            class: self.class,
            gender: self.gender,
            last_access: self.last_logout.unwrap_or_default(),
        }
    }
}

/// Readiness timestamps on the tick clock, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerTimers {
    pub action_time: i64,
    pub attack_time: i64,
    pub spell_time: i64,
    /// Logging out is refused before this time.
    pub log_time: i64,
    pub dead: bool,
}

/// The in-world object bound to a connection in the `Game` stage.
pub trait Player: Send {
    fn name(&self) -> &str;

    fn timers(&self) -> PlayerTimers;

    /// Object id of the NPC the player is currently talking to.
    fn npc_object_id(&self) -> u32;

    fn perform(&mut self, action: Action);

    fn mail_cost(&self, items: &[u64], gold: u32, stamped: bool) -> u32;

    /// Leaves the world. Called at most once.
    fn stop_game(&mut self, reason: DisconnectReason);
}

/// Environment-level operations of the simulation.
pub trait World: Send + Sync {
    fn new_account(&self, conn: &mut Connection, packet: client::NewAccount);

    fn change_password(&self, conn: &mut Connection, packet: client::ChangePassword);

    /// Validates credentials. On success the world binds the account to the
    /// connection, replies and moves it to `Select`.
    fn login(&self, conn: &mut Connection, packet: client::Login);

    fn new_character(&self, conn: &mut Connection, packet: client::NewCharacter, admin: bool);

    /// Called after the core marked a character deleted.
    fn character_deleted(&self, character: &CharacterInfo);

    /// Creates the player for `character`, or `None` when it cannot enter.
    fn start_game(&self, conn: ConnectionHandle, character: &CharacterInfo) -> Option<Box<dyn Player>>;

    /// Resolves the connection playing the character called `name`.
    fn observe(&self, observer: SessionId, name: &str) -> Option<SessionId>;

    fn get_ranking(&self, conn: &mut Connection, packet: client::GetRanking);

    fn default_npc_id(&self) -> u32;
}
