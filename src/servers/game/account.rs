//! Handshake, login and character-select handlers
//!
//! Everything before a player exists: version check, keep-alive, the
//! login-stage account requests, character management and the transitions
//! into and out of the game.

use std::sync::Arc;

use crate::protocol::server::{self, START_GAME_OK};
use crate::protocol::types::DisconnectReason;
use crate::protocol::{client, GameStage};
use crate::session::Connection;

use super::dispatch::{Dispatcher, StageRequirement};

pub const MIN_CHARACTER_NAME_LENGTH: usize = 3;
pub const MAX_CHARACTER_NAME_LENGTH: usize = 15;

/// `StartGame` result when the world refused to create the player.
pub const START_GAME_REFUSED: u8 = 3;

pub fn register(d: &mut Dispatcher) {
    d.register(StageRequirement::None, client_version);
    d.register(StageRequirement::Any, disconnect);
    d.register(StageRequirement::Any, keep_alive);

    d.register(StageRequirement::Login, new_account);
    d.register(StageRequirement::Login, change_password);
    d.register(StageRequirement::Login, login);

    d.register(StageRequirement::Select, new_character);
    d.register(StageRequirement::Select, delete_character);
    d.register(StageRequirement::Select, start_game);

    d.register(StageRequirement::Game, log_out);
}

/// Letters and digits (including CJK ideographs), 3 to 15 characters.
pub fn is_valid_character_name(name: &str) -> bool {
    let len = name.chars().count();
    (MIN_CHARACTER_NAME_LENGTH..=MAX_CHARACTER_NAME_LENGTH).contains(&len)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ('\u{4e00}'..='\u{9fa5}').contains(&c))
}

fn client_version(conn: &mut Connection, p: client::ClientVersion) {
    let ctx = Arc::clone(conn.ctx());

    if ctx.config.check_version && !ctx.version_hashes.iter().any(|h| *h == p.version_hash) {
        tracing::info!(
            "[login] [version_mismatch] id={} hash={}",
            conn.session_id(),
            hex::encode(&p.version_hash)
        );
        conn.begin_disconnecting(DisconnectReason::WrongVersion);
        conn.send_immediate(server::ClientVersion { result: 0 });
        ctx.diagnostics.send(format!(
            "{}, Disconnected - Wrong Client Version.",
            conn.session_id()
        ));
        return;
    }

    ctx.diagnostics.send(format!(
        "{}, {}, Client version matched.",
        conn.session_id(),
        conn.ip()
    ));
    conn.enqueue(server::ClientVersion { result: 1 });
    conn.set_stage(GameStage::Login);
}

fn disconnect(conn: &mut Connection, _p: client::Disconnect) {
    conn.disconnect(DisconnectReason::ClientRequested);
}

fn keep_alive(conn: &mut Connection, p: client::KeepAlive) {
    conn.enqueue(server::KeepAlive { time: p.time });
}

fn new_account(conn: &mut Connection, p: client::NewAccount) {
    let ctx = Arc::clone(conn.ctx());
    if !ctx.config.allow_new_account {
        conn.enqueue(server::NewAccount { result: 0 });
        return;
    }
    ctx.diagnostics.send(format!(
        "{}, {}, New account being created.",
        conn.session_id(),
        conn.ip()
    ));
    ctx.world.new_account(conn, p);
}

fn change_password(conn: &mut Connection, p: client::ChangePassword) {
    let ctx = Arc::clone(conn.ctx());
    if !ctx.config.allow_change_password {
        conn.enqueue(server::ChangePassword { result: 0 });
        return;
    }
    ctx.diagnostics.send(format!(
        "{}, {}, Password being changed.",
        conn.session_id(),
        conn.ip()
    ));
    ctx.world.change_password(conn, p);
}

fn login(conn: &mut Connection, p: client::Login) {
    let ctx = Arc::clone(conn.ctx());
    if !ctx.config.allow_login {
        conn.enqueue(server::Login { result: 0 });
        return;
    }
    ctx.diagnostics.send(format!(
        "{}, {}, User logging in.",
        conn.session_id(),
        conn.ip()
    ));
    ctx.world.login(conn, p);
}

fn new_character(conn: &mut Connection, p: client::NewCharacter) {
    let ctx = Arc::clone(conn.ctx());
    let admin = conn.is_admin();

    if !ctx.config.allow_new_character && !admin {
        conn.enqueue(server::NewCharacter { result: 0 });
        return;
    }
    if !is_valid_character_name(&p.name) {
        conn.enqueue(server::NewCharacter { result: 1 });
        return;
    }
    ctx.world.new_character(conn, p, admin);
}

fn delete_character(conn: &mut Connection, p: client::DeleteCharacter) {
    let ctx = Arc::clone(conn.ctx());
    if !ctx.config.allow_delete_character {
        conn.enqueue(server::DeleteCharacter { result: 0 });
        return;
    }

    let Some(account) = conn.account().cloned() else {
        conn.enqueue(server::DeleteCharacter { result: 1 });
        return;
    };

    let deleted = {
        let mut account = account.lock();
        match account
            .character_mut(p.character_index)
            .filter(|c| !c.deleted)
        {
            Some(character) => {
                character.deleted = true;
                character.delete_date = Some(ctx.clock.now());
                Some(character.clone())
            }
            None => None,
        }
    };

    match deleted {
        Some(character) => {
            tracing::info!(
                "[select] [character_deleted] id={} character={}",
                conn.session_id(),
                character.name
            );
            ctx.world.character_deleted(&character);
            conn.enqueue(server::DeleteCharacterSuccess {
                character_index: character.index,
            });
        }
        None => conn.enqueue(server::DeleteCharacter { result: 1 }),
    }
}

fn start_game(conn: &mut Connection, p: client::StartGame) {
    let ctx = Arc::clone(conn.ctx());

    if !ctx.config.allow_start_game && !conn.is_admin() {
        conn.enqueue(server::StartGame {
            result: 0,
            resolution: 0,
        });
        return;
    }

    let Some(account) = conn.account().cloned() else {
        conn.enqueue(server::StartGame {
            result: 1,
            resolution: 0,
        });
        return;
    };

    let now = ctx.clock.now();
    let character = {
        let mut account = account.lock();
        let Some(info) = account
            .character_mut(p.character_index)
            .filter(|c| !c.deleted)
        else {
            conn.enqueue(server::StartGame {
                result: 2,
                resolution: 0,
            });
            return;
        };

        if info.banned {
            if let Some(expiry_date) = info.expiry_date.filter(|expiry| *expiry > now) {
                let reason = info.ban_reason.clone();
                conn.enqueue(server::StartGameBanned {
                    reason,
                    expiry_date,
                });
                return;
            }
            info.banned = false;
        }
        info.ban_reason.clear();
        info.expiry_date = None;

        if ctx.config.relog_delay_ms > 0 {
            if let Some(last_logout) = info.last_logout {
                let elapsed = (now - last_logout).num_milliseconds();
                if elapsed < ctx.config.relog_delay_ms {
                    let milliseconds = ctx.config.relog_delay_ms - elapsed;
                    conn.enqueue(server::StartGameDelay { milliseconds });
                    return;
                }
            }
        }

        info.clone()
    };

    match ctx.world.start_game(conn.handle(), &character) {
        Some(player) => {
            conn.set_player(player);
            conn.set_stage(GameStage::Game);
            conn.enqueue(server::StartGame {
                result: START_GAME_OK,
                resolution: ctx.config.resolution,
            });
            tracing::info!(
                "[select] [start_game] id={} character={}",
                conn.session_id(),
                character.name
            );
        }
        None => conn.enqueue(server::StartGame {
            result: START_GAME_REFUSED,
            resolution: 0,
        }),
    }
}

fn log_out(conn: &mut Connection, _p: client::LogOut) {
    let now = conn.ctx().clock.time();
    let Some(log_time) = conn.with_player(|player| player.timers().log_time) else {
        return;
    };

    if now < log_time {
        conn.enqueue(server::LogOutFailed {});
        return;
    }

    if let Some(mut player) = conn.take_player() {
        player.stop_game(DisconnectReason::LogOut);
    }
    conn.set_stage(GameStage::Select);

    let characters = conn
        .account()
        .map(|account| account.lock().select_info())
        .unwrap_or_default();
    conn.enqueue(server::LogOutSuccess { characters });
}
