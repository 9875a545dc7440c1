//! Standalone in-memory world
//!
//! Enough simulation to run the server without the real game: accounts and
//! characters live in memory, and players can walk, turn and talk on an empty
//! map with the usual movement cooldowns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{AccountInfo, Action, CharacterInfo, Player, PlayerTimers, SharedAccount, World};
use crate::protocol::server;
use crate::protocol::types::{ChatType, DisconnectReason, Direction, Point};
use crate::protocol::{client, GameStage};
use crate::session::{Connection, ConnectionHandle, SessionId};

pub const TURN_DELAY_MS: i64 = 300;
pub const WALK_DELAY_MS: i64 = 600;
pub const ATTACK_DELAY_MS: i64 = 1_400;
pub const SPELL_DELAY_MS: i64 = 1_800;
/// Logging out is refused for this long after combat.
pub const COMBAT_LOG_DELAY_MS: i64 = 10_000;

pub const MAX_CHARACTERS: usize = 4;
pub const DEFAULT_NPC_ID: u32 = 1;

const MIN_ACCOUNT_ID_LENGTH: usize = 3;
const MAX_ACCOUNT_ID_LENGTH: usize = 15;
const MIN_PASSWORD_LENGTH: usize = 5;
const MAX_PASSWORD_LENGTH: usize = 15;

// NewAccount results
const NEW_ACCOUNT_BAD_ID: u8 = 1;
const NEW_ACCOUNT_BAD_PASSWORD: u8 = 2;
const NEW_ACCOUNT_EXISTS: u8 = 7;
const NEW_ACCOUNT_OK: u8 = 8;

// ChangePassword results
const CHANGE_PASSWORD_BAD_NEW: u8 = 3;
const CHANGE_PASSWORD_NO_ACCOUNT: u8 = 4;
const CHANGE_PASSWORD_WRONG: u8 = 5;
const CHANGE_PASSWORD_OK: u8 = 6;

// Login results
const LOGIN_NO_ACCOUNT: u8 = 3;
const LOGIN_WRONG_PASSWORD: u8 = 4;

// NewCharacter results
const NEW_CHARACTER_TOO_MANY: u8 = 4;
const NEW_CHARACTER_NAME_TAKEN: u8 = 5;

fn valid_credential(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.chars().count()) && value.chars().all(|c| c.is_ascii_alphanumeric())
}

struct LobbyAccount {
    password: String,
    info: SharedAccount,
}

type OnlineMap = Arc<Mutex<HashMap<String, SessionId>>>;

pub struct LobbyWorld {
    /// Keyed by lowercase account id.
    accounts: Mutex<HashMap<String, LobbyAccount>>,
    /// Character index -> owning account.
    owners: Mutex<HashMap<i32, SharedAccount>>,
    /// Lowercase character name -> session playing it.
    online: OnlineMap,
    next_account: AtomicI32,
    next_character: AtomicI32,
    next_object: AtomicU32,
    auto_create: bool,
    spawn: Point,
}

impl LobbyWorld {
    /// `auto_create` lets an unknown account id log in, creating the account
    /// with the password it presented.
    pub fn new(auto_create: bool) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            owners: Mutex::new(HashMap::new()),
            online: Arc::new(Mutex::new(HashMap::new())),
            next_account: AtomicI32::new(1),
            next_character: AtomicI32::new(1),
            next_object: AtomicU32::new(1),
            auto_create,
            spawn: Point::new(300, 300),
        }
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().len()
    }

    pub fn online_count(&self) -> usize {
        self.online.lock().len()
    }

    fn create_account(&self, account_id: &str, password: &str) -> SharedAccount {
        let info = Arc::new(Mutex::new(AccountInfo {
            index: self.next_account.fetch_add(1, Ordering::Relaxed),
            account_id: account_id.to_string(),
            admin: false,
            characters: Vec::new(),
        }));
        self.accounts.lock().insert(
            account_id.to_lowercase(),
            LobbyAccount {
                password: password.to_string(),
                info: Arc::clone(&info),
            },
        );
        tracing::info!("[lobby] [account_created] account={}", account_id);
        info
    }

    fn name_taken(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.owners
            .lock()
            .values()
            .any(|account| {
                account
                    .lock()
                    .characters
                    .iter()
                    .any(|c| !c.deleted && c.name.to_lowercase() == name)
            })
    }
}

impl Default for LobbyWorld {
    fn default() -> Self {
        Self::new(true)
    }
}

impl World for LobbyWorld {
    fn new_account(&self, conn: &mut Connection, packet: client::NewAccount) {
        let result = if !valid_credential(&packet.account_id, MIN_ACCOUNT_ID_LENGTH, MAX_ACCOUNT_ID_LENGTH) {
            NEW_ACCOUNT_BAD_ID
        } else if !valid_credential(&packet.password, MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH) {
            NEW_ACCOUNT_BAD_PASSWORD
        } else if self.accounts.lock().contains_key(&packet.account_id.to_lowercase()) {
            NEW_ACCOUNT_EXISTS
        } else {
            self.create_account(&packet.account_id, &packet.password);
            NEW_ACCOUNT_OK
        };
        conn.enqueue(server::NewAccount { result });
    }

    fn change_password(&self, conn: &mut Connection, packet: client::ChangePassword) {
        let result = {
            let mut accounts = self.accounts.lock();
            match accounts.get_mut(&packet.account_id.to_lowercase()) {
                None => CHANGE_PASSWORD_NO_ACCOUNT,
                Some(account) if account.password != packet.current_password => CHANGE_PASSWORD_WRONG,
                Some(_) if !valid_credential(&packet.new_password, MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH) => {
                    CHANGE_PASSWORD_BAD_NEW
                }
                Some(account) => {
                    account.password = packet.new_password;
                    CHANGE_PASSWORD_OK
                }
            }
        };
        conn.enqueue(server::ChangePassword { result });
    }

    fn login(&self, conn: &mut Connection, packet: client::Login) {
        let existing = self
            .accounts
            .lock()
            .get(&packet.account_id.to_lowercase())
            .map(|account| (account.password.clone(), Arc::clone(&account.info)));

        let account = match existing {
            Some((password, _)) if password != packet.password => {
                conn.enqueue(server::Login {
                    result: LOGIN_WRONG_PASSWORD,
                });
                return;
            }
            Some((_, info)) => info,
            None if self.auto_create => self.create_account(&packet.account_id, &packet.password),
            None => {
                conn.enqueue(server::Login {
                    result: LOGIN_NO_ACCOUNT,
                });
                return;
            }
        };

        let characters = account.lock().select_info();
        conn.bind_account(account);
        conn.enqueue(server::LoginSuccess { characters });
        conn.set_stage(GameStage::Select);
    }

    fn new_character(&self, conn: &mut Connection, packet: client::NewCharacter, admin: bool) {
        let Some(account) = conn.account().cloned() else {
            return;
        };

        let live = account.lock().characters.iter().filter(|c| !c.deleted).count();
        if live >= MAX_CHARACTERS && !admin {
            conn.enqueue(server::NewCharacter {
                result: NEW_CHARACTER_TOO_MANY,
            });
            return;
        }
        if self.name_taken(&packet.name) {
            conn.enqueue(server::NewCharacter {
                result: NEW_CHARACTER_NAME_TAKEN,
            });
            return;
        }

        let character = CharacterInfo {
            index: self.next_character.fetch_add(1, Ordering::Relaxed),
            name: packet.name,
            level: 1,
            class: packet.class,
            gender: packet.gender,
            ..Default::default()
        };
        let select = character.select_info();
        self.owners.lock().insert(character.index, Arc::clone(&account));
        account.lock().characters.push(character);

        tracing::info!(
            "[lobby] [character_created] id={} character={}",
            conn.session_id(),
            select.name
        );
        conn.enqueue(server::NewCharacterSuccess { character: select });
    }

    fn character_deleted(&self, character: &CharacterInfo) {
        tracing::debug!("[lobby] [character_deleted] character={}", character.name);
    }

    fn start_game(&self, conn: ConnectionHandle, character: &CharacterInfo) -> Option<Box<dyn Player>> {
        let account = self.owners.lock().get(&character.index).cloned()?;
        self.online
            .lock()
            .insert(character.name.to_lowercase(), conn.session_id());

        let player = LobbyPlayer {
            object_id: self.next_object.fetch_add(1, Ordering::Relaxed),
            name: character.name.clone(),
            character_index: character.index,
            location: self.spawn,
            direction: Direction::Down,
            timers: PlayerTimers::default(),
            account,
            online: Arc::clone(&self.online),
            stopped: false,
            conn,
        };
        player.conn.send(server::UserLocation {
            location: player.location,
            direction: player.direction,
        });
        Some(Box::new(player))
    }

    fn observe(&self, observer: SessionId, name: &str) -> Option<SessionId> {
        self.online
            .lock()
            .get(&name.to_lowercase())
            .copied()
            .filter(|target| *target != observer)
    }

    fn get_ranking(&self, conn: &mut Connection, packet: client::GetRanking) {
        tracing::debug!(
            "[lobby] [ranking] id={} type={} index={}",
            conn.session_id(),
            packet.rank_type,
            packet.rank_index
        );
    }

    fn default_npc_id(&self) -> u32 {
        DEFAULT_NPC_ID
    }
}

pub struct LobbyPlayer {
    conn: ConnectionHandle,
    account: SharedAccount,
    online: OnlineMap,
    object_id: u32,
    name: String,
    character_index: i32,
    location: Point,
    direction: Direction,
    timers: PlayerTimers,
    stopped: bool,
}

impl LobbyPlayer {
    pub fn location(&self) -> Point {
        self.location
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn send_location(&self) {
        self.conn.send(server::UserLocation {
            location: self.location,
            direction: self.direction,
        });
    }
}

impl Player for LobbyPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn timers(&self) -> PlayerTimers {
        self.timers
    }

    fn npc_object_id(&self) -> u32 {
        0
    }

    fn perform(&mut self, action: Action) {
        let now = self.conn.ctx().clock.time();
        match action {
            Action::Turn(direction) => {
                self.direction = direction;
                self.timers.action_time = now + TURN_DELAY_MS;
                self.conn.send(server::ObjectTurn {
                    object_id: self.object_id,
                    location: self.location,
                    direction,
                });
                self.send_location();
            }
            Action::Walk(direction) => {
                self.direction = direction;
                self.location = self.location.step(direction);
                self.timers.action_time = now + WALK_DELAY_MS;
                self.conn.send(server::ObjectWalk {
                    object_id: self.object_id,
                    location: self.location,
                    direction,
                });
                self.send_location();
            }
            Action::Attack { direction, .. } | Action::RangeAttack { direction, .. } => {
                self.direction = direction;
                self.timers.attack_time = now + ATTACK_DELAY_MS;
                self.timers.action_time = now + ATTACK_DELAY_MS;
                self.timers.log_time = now + COMBAT_LOG_DELAY_MS;
            }
            Action::BeginMagic { direction, .. } => {
                self.direction = direction;
                self.timers.spell_time = now + SPELL_DELAY_MS;
                self.timers.action_time = now + SPELL_DELAY_MS;
                self.timers.log_time = now + COMBAT_LOG_DELAY_MS;
            }
            Action::Chat { message, .. } => {
                self.conn.send(server::Chat {
                    message: format!("{}:{}", self.name, message),
                    chat_type: ChatType::Normal,
                });
            }
            other => {
                tracing::trace!(
                    "[lobby] [ignored] id={} action={:?}",
                    self.conn.session_id(),
                    other
                );
            }
        }
    }

    fn mail_cost(&self, items: &[u64], gold: u32, stamped: bool) -> u32 {
        if stamped {
            return 0;
        }
        let item_cost = u32::try_from(items.len()).unwrap_or(u32::MAX).saturating_mul(50);
        (gold / 1_000).saturating_add(item_cost)
    }

    fn stop_game(&mut self, reason: DisconnectReason) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        {
            let mut online = self.online.lock();
            let key = self.name.to_lowercase();
            if online.get(&key) == Some(&self.conn.session_id()) {
                online.remove(&key);
            }
        }

        let now = self.conn.ctx().clock.now();
        if let Some(character) = self.account.lock().character_mut(self.character_index) {
            character.last_logout = Some(now);
        }
        tracing::info!(
            "[lobby] [left] id={} character={} reason={}",
            self.conn.session_id(),
            self.name,
            reason.code()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::ServerConfig;
    use crate::context::testing::sent_packets;
    use crate::context::Context;
    use crate::core::Clock;
    use crate::diagnostics::Diagnostics;
    use crate::network::ddos::{IpBlockList, IpReputation};
    use crate::protocol::types::{Class, Gender};
    use crate::protocol::ServerPacket;

    struct Lobby {
        ctx: Arc<Context>,
        world: Arc<LobbyWorld>,
    }

    impl Lobby {
        fn new(auto_create: bool) -> Self {
            let world = Arc::new(LobbyWorld::new(auto_create));
            let (diagnostics, _rx) = Diagnostics::channel();
            let config = ServerConfig {
                ip_block_secs: 0,
                ..Default::default()
            };
            let ctx = Context::new(
                config,
                Clock::manual(),
                Arc::clone(&world) as Arc<dyn World>,
                Arc::new(IpBlockList::new()) as Arc<dyn IpReputation>,
                diagnostics,
            )
            .unwrap();
            Self {
                ctx: Arc::new(ctx),
                world,
            }
        }

        fn open(&self) -> (Connection, mpsc::UnboundedReceiver<Bytes>) {
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 40_001));
            Connection::open(Arc::clone(&self.ctx), addr).unwrap()
        }

        fn login(&self, conn: &mut Connection, account_id: &str, password: &str) {
            conn.link().push_inbound(client::ClientVersion::default().into());
            conn.link().push_inbound(
                client::Login {
                    account_id: account_id.to_string(),
                    password: password.to_string(),
                }
                .into(),
            );
            conn.process();
        }

        fn create_character(&self, conn: &mut Connection, name: &str) {
            conn.link().push_inbound(
                client::NewCharacter {
                    name: name.to_string(),
                    gender: Gender::Female,
                    class: Class::Wizard,
                }
                .into(),
            );
            conn.process();
        }

        fn playing(&self, account_id: &str, name: &str) -> (Connection, mpsc::UnboundedReceiver<Bytes>) {
            let (mut conn, mut rx) = self.open();
            self.login(&mut conn, account_id, "secret1");
            self.create_character(&mut conn, name);
            let index = conn.account().unwrap().lock().characters[0].index;
            conn.link()
                .push_inbound(client::StartGame { character_index: index }.into());
            conn.process();
            assert_eq!(conn.stage(), GameStage::Game);
            sent_packets(&mut rx);
            (conn, rx)
        }
    }

    #[test]
    fn test_login_auto_creates_account() {
        let lobby = Lobby::new(true);
        let (mut conn, mut rx) = lobby.open();
        lobby.login(&mut conn, "newbie", "secret1");

        assert_eq!(conn.stage(), GameStage::Select);
        assert_eq!(lobby.world.account_count(), 1);
        assert!(sent_packets(&mut rx).contains(&ServerPacket::from(server::LoginSuccess {
            characters: Vec::new()
        })));
    }

    #[test]
    fn test_login_without_auto_create() {
        let lobby = Lobby::new(false);
        let (mut conn, mut rx) = lobby.open();
        lobby.login(&mut conn, "nobody", "secret1");

        assert_eq!(conn.stage(), GameStage::Login);
        assert!(sent_packets(&mut rx).contains(&ServerPacket::from(server::Login {
            result: LOGIN_NO_ACCOUNT
        })));
    }

    #[test]
    fn test_wrong_password_refused() {
        let lobby = Lobby::new(true);
        let (mut first, _first_rx) = lobby.open();
        lobby.login(&mut first, "hero", "secret1");

        let (mut second, mut rx) = lobby.open();
        lobby.login(&mut second, "HERO", "wrong12");
        assert_eq!(second.stage(), GameStage::Login);
        assert!(sent_packets(&mut rx).contains(&ServerPacket::from(server::Login {
            result: LOGIN_WRONG_PASSWORD
        })));
        assert!(!first.is_disconnecting());
    }

    #[test]
    fn test_new_account_results() {
        let lobby = Lobby::new(false);
        let (mut conn, mut rx) = lobby.open();
        conn.link().push_inbound(client::ClientVersion::default().into());
        for (account_id, password) in [("ab", "secret1"), ("player", "x"), ("player", "secret1"), ("Player", "secret1")] {
            conn.link().push_inbound(
                client::NewAccount {
                    account_id: account_id.to_string(),
                    password: password.to_string(),
                    ..Default::default()
                }
                .into(),
            );
        }
        conn.process();

        let results: Vec<u8> = sent_packets(&mut rx)
            .into_iter()
            .filter_map(|p| match p {
                ServerPacket::NewAccount(p) => Some(p.result),
                _ => None,
            })
            .collect();
        assert_eq!(
            results,
            vec![NEW_ACCOUNT_BAD_ID, NEW_ACCOUNT_BAD_PASSWORD, NEW_ACCOUNT_OK, NEW_ACCOUNT_EXISTS]
        );
    }

    #[test]
    fn test_change_password() {
        let lobby = Lobby::new(true);
        let (mut first, _first_rx) = lobby.open();
        lobby.login(&mut first, "hero", "secret1");

        let (mut conn, mut rx) = lobby.open();
        conn.link().push_inbound(client::ClientVersion::default().into());
        for current in ["wrong12", "secret1"] {
            conn.link().push_inbound(
                client::ChangePassword {
                    account_id: "hero".to_string(),
                    current_password: current.to_string(),
                    new_password: "secret2".to_string(),
                }
                .into(),
            );
        }
        conn.process();
        let packets = sent_packets(&mut rx);
        assert!(packets.contains(&ServerPacket::from(server::ChangePassword {
            result: CHANGE_PASSWORD_WRONG
        })));
        assert!(packets.contains(&ServerPacket::from(server::ChangePassword {
            result: CHANGE_PASSWORD_OK
        })));

        let (mut again, _again_rx) = lobby.open();
        lobby.login(&mut again, "hero", "secret2");
        assert_eq!(again.stage(), GameStage::Select);
    }

    #[test]
    fn test_character_names_are_unique() {
        let lobby = Lobby::new(true);
        let (mut conn, mut rx) = lobby.open();
        lobby.login(&mut conn, "hero", "secret1");
        lobby.create_character(&mut conn, "Mage");
        lobby.create_character(&mut conn, "mage");

        let packets = sent_packets(&mut rx);
        assert!(packets.iter().any(|p| matches!(p, ServerPacket::NewCharacterSuccess(s) if s.character.name == "Mage")));
        assert!(packets.contains(&ServerPacket::from(server::NewCharacter {
            result: NEW_CHARACTER_NAME_TAKEN
        })));
        assert_eq!(conn.account().unwrap().lock().characters.len(), 1);
    }

    #[test]
    fn test_character_limit() {
        let lobby = Lobby::new(true);
        let (mut conn, mut rx) = lobby.open();
        lobby.login(&mut conn, "hero", "secret1");
        for name in ["Aaa", "Bbb", "Ccc", "Ddd", "Eee"] {
            lobby.create_character(&mut conn, name);
        }
        assert_eq!(conn.account().unwrap().lock().characters.len(), MAX_CHARACTERS);
        assert!(sent_packets(&mut rx).contains(&ServerPacket::from(server::NewCharacter {
            result: NEW_CHARACTER_TOO_MANY
        })));
    }

    #[test]
    fn test_walk_moves_and_defers_second_step() {
        let lobby = Lobby::new(true);
        let (mut conn, mut rx) = lobby.playing("hero", "Walker");

        conn.link().push_inbound(
            client::Walk {
                direction: Direction::Right,
            }
            .into(),
        );
        conn.link().push_inbound(
            client::Walk {
                direction: Direction::Right,
            }
            .into(),
        );
        conn.process();

        let locations = |packets: Vec<ServerPacket>| -> Vec<Point> {
            packets
                .into_iter()
                .filter_map(|p| match p {
                    ServerPacket::UserLocation(p) => Some(p.location),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(locations(sent_packets(&mut rx)), vec![Point::new(301, 300)]);
        // The second step waits for the cooldown.
        assert_eq!(conn.link().inbound_len(), 1);

        lobby.ctx.clock.advance(WALK_DELAY_MS);
        conn.process();
        conn.process();
        assert_eq!(locations(sent_packets(&mut rx)), vec![Point::new(302, 300)]);
    }

    #[test]
    fn test_chat_echoes_with_name() {
        let lobby = Lobby::new(true);
        let (mut conn, mut rx) = lobby.playing("hero", "Talker");
        conn.link().push_inbound(
            client::Chat {
                message: "hello".to_string(),
                linked_items: Vec::new(),
            }
            .into(),
        );
        conn.process();
        assert!(sent_packets(&mut rx).contains(&ServerPacket::from(server::Chat {
            message: "Talker:hello".to_string(),
            chat_type: ChatType::Normal,
        })));
    }

    #[test]
    fn test_logout_records_last_logout_and_goes_offline() {
        let lobby = Lobby::new(true);
        let (mut conn, mut rx) = lobby.playing("hero", "Leaver");
        assert_eq!(lobby.world.online_count(), 1);
        assert_eq!(lobby.world.observe(SessionId(999), "leaver"), Some(conn.session_id()));

        conn.link().push_inbound(client::LogOut {}.into());
        conn.process();

        assert_eq!(conn.stage(), GameStage::Select);
        assert_eq!(lobby.world.online_count(), 0);
        assert_eq!(lobby.world.observe(SessionId(999), "Leaver"), None);
        let account = conn.account().unwrap().lock().clone();
        assert!(account.characters[0].last_logout.is_some());
        assert!(sent_packets(&mut rx)
            .iter()
            .any(|p| matches!(p, ServerPacket::LogOutSuccess(s) if s.characters.len() == 1)));
    }

    #[test]
    fn test_observe_never_resolves_self() {
        let lobby = Lobby::new(true);
        let (conn, _rx) = lobby.playing("hero", "Solo");
        assert_eq!(lobby.world.observe(conn.session_id(), "Solo"), None);
    }

    #[test]
    fn test_combat_delays_logout() {
        let lobby = Lobby::new(true);
        let (mut conn, mut rx) = lobby.playing("hero", "Fighter");
        conn.link().push_inbound(
            client::Attack {
                direction: Direction::Up,
                ..Default::default()
            }
            .into(),
        );
        conn.link().push_inbound(client::LogOut {}.into());
        conn.process();

        assert_eq!(conn.stage(), GameStage::Game);
        assert!(sent_packets(&mut rx).contains(&ServerPacket::from(server::LogOutFailed {})));
    }
}
