//! Server -> client packet catalog.

use chrono::{DateTime, Utc};

use super::types::{AttackMode, ChatType, DisconnectReason, Direction, PetMode, Point, SelectInfo};

crate::protocol::packets! {
    /// Every packet the server may send.
    pub enum ServerPacket {
        0 => Connected {},
        /// `result` is 1 on a hash match, 0 otherwise.
        1 => ClientVersion { result: u8 },
        2 => Disconnect { reason: DisconnectReason },
        3 => KeepAlive { time: i64 },

        4 => NewAccount { result: u8 },
        5 => ChangePassword { result: u8 },
        6 => ChangePasswordBanned { reason: String, expiry_date: DateTime<Utc> },
        7 => Login { result: u8 },
        8 => LoginBanned { reason: String, expiry_date: DateTime<Utc> },
        9 => LoginSuccess { characters: Vec<SelectInfo> },
        10 => NewCharacter { result: u8 },
        11 => NewCharacterSuccess { character: SelectInfo },
        12 => DeleteCharacter { result: u8 },
        13 => DeleteCharacterSuccess { character_index: i32 },
        14 => StartGame { result: u8, resolution: i32 },
        15 => StartGameBanned { reason: String, expiry_date: DateTime<Utc> },
        16 => StartGameDelay { milliseconds: i64 },
        17 => LogOutSuccess { characters: Vec<SelectInfo> },
        18 => LogOutFailed {},

        19 => ChangeAMode { mode: AttackMode },
        20 => ChangePMode { mode: PetMode },
        21 => MailLockedItem { unique_id: u64, locked: bool },
        22 => MailCost { cost: u32 },

        23 => ObjectTurn { object_id: u32, location: Point, direction: Direction },
        24 => ObjectWalk { object_id: u32, location: Point, direction: Direction },
        25 => UserLocation { location: Point, direction: Direction },
        26 => Chat { message: String, chat_type: ChatType },
    }
}

impl ServerPacket {
    /// Packets mirrored to everyone observing the connection that sends them.
    pub fn is_observable(&self) -> bool {
        matches!(
            self,
            ServerPacket::ChangeAMode(_)
                | ServerPacket::ChangePMode(_)
                | ServerPacket::ObjectTurn(_)
                | ServerPacket::ObjectWalk(_)
                | ServerPacket::UserLocation(_)
                | ServerPacket::Chat(_)
        )
    }
}

/// `StartGame` result when the character entered the world.
pub const START_GAME_OK: u8 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observable_subset() {
        assert!(ServerPacket::from(UserLocation::default()).is_observable());
        assert!(ServerPacket::from(Chat::default()).is_observable());
        assert!(!ServerPacket::from(Connected {}).is_observable());
        assert!(!ServerPacket::from(LoginSuccess::default()).is_observable());
        assert!(!ServerPacket::from(Disconnect::default()).is_observable());
    }

    #[test]
    fn test_catalog_names() {
        assert_eq!(ServerPacket::name_of(2), Some("Disconnect"));
        assert_eq!(ServerPacket::name_of(26), Some("Chat"));
        assert_eq!(ServerPacket::name_of(27), None);
    }
}
