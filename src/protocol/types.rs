//! Value types carried inside packet payloads.

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};

use crate::network::wire::{wire_enum, PacketReader, Wire, WireError};

wire_enum! {
    /// Eight-way facing.
    pub enum Direction {
        #[default]
        Up = 0,
        UpRight = 1,
        Right = 2,
        DownRight = 3,
        Down = 4,
        DownLeft = 5,
        Left = 6,
        UpLeft = 7,
    }
}

impl Direction {
    /// Unit step for this facing, y grows downwards.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::UpRight => (1, -1),
            Direction::Right => (1, 0),
            Direction::DownRight => (1, 1),
            Direction::Down => (0, 1),
            Direction::DownLeft => (-1, 1),
            Direction::Left => (-1, 0),
            Direction::UpLeft => (-1, -1),
        }
    }
}

wire_enum! {
    pub enum GridType {
        #[default]
        Inventory = 0,
        Equipment = 1,
        Storage = 2,
        BuyBack = 3,
        DropPanel = 4,
        Inspect = 5,
        TrustMerchant = 6,
        GuildStorage = 7,
        GuestTrade = 8,
        Mount = 9,
        Fishing = 10,
        QuestInventory = 11,
        AwakenItem = 12,
        Mail = 13,
        Refine = 14,
        Renting = 15,
        GuestRenting = 16,
        Craft = 17,
    }
}

wire_enum! {
    pub enum AttackMode {
        #[default]
        Peace = 0,
        Group = 1,
        Guild = 2,
        EnemyGuild = 3,
        RedBrown = 4,
        All = 5,
    }
}

wire_enum! {
    pub enum PetMode {
        #[default]
        Both = 0,
        MoveOnly = 1,
        AttackOnly = 2,
        None = 3,
    }
}

wire_enum! {
    pub enum Class {
        #[default]
        Warrior = 0,
        Wizard = 1,
        Taoist = 2,
        Assassin = 3,
        Archer = 4,
    }
}

wire_enum! {
    pub enum Gender {
        #[default]
        Male = 0,
        Female = 1,
    }
}

wire_enum! {
    pub enum ChatType {
        #[default]
        Normal = 0,
        Shout = 1,
        System = 2,
        Hint = 3,
        Announcement = 4,
        Group = 5,
        WhisperIn = 6,
        WhisperOut = 7,
        Guild = 8,
        Trainer = 9,
        LevelUp = 10,
        System2 = 11,
        Relationship = 12,
        Mentor = 13,
        Shout2 = 14,
        Shout3 = 15,
    }
}

wire_enum! {
    pub enum SpellToggleState {
        #[default]
        None = 0,
        Off = 1,
        On = 2,
    }
}

wire_enum! {
    /// Which NPC shop panel a purchase came from.
    pub enum PanelType {
        #[default]
        Buy = 0,
        BuySub = 1,
        Craft = 2,
    }
}

wire_enum! {
    pub enum MarketPanelType {
        #[default]
        Market = 0,
        Consign = 1,
        Auction = 2,
        GameShop = 3,
    }
}

wire_enum! {
    /// Reason code carried by the server `Disconnect` packet.
    pub enum DisconnectReason {
        #[default]
        ServerClosing = 0,
        DuplicateLogin = 1,
        Abuse = 2,
        WrongVersion = 10,
        SocketClosed = 20,
        TimedOut = 21,
        ClientRequested = 22,
        LogOut = 23,
    }
}

impl DisconnectReason {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Spell identifier. The catalog of spells belongs to the simulation, so the
/// core only carries the raw id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Spell(pub u8);

impl Spell {
    pub const NONE: Spell = Spell(0);
}

impl Wire for Spell {
    fn read(r: &mut PacketReader<'_>) -> Result<Self, WireError> {
        u8::read(r).map(Spell)
    }

    fn write(&self, out: &mut BytesMut) {
        out.put_u8(self.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        Self::new(self.x + dx, self.y + dy)
    }
}

impl Wire for Point {
    fn read(r: &mut PacketReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            x: i32::read(r)?,
            y: i32::read(r)?,
        })
    }

    fn write(&self, out: &mut BytesMut) {
        self.x.write(out);
        self.y.write(out);
    }
}

/// An item linked into a chat line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatItem {
    pub unique_id: u64,
    pub title: String,
    pub grid: GridType,
}

impl Wire for ChatItem {
    fn read(r: &mut PacketReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            unique_id: u64::read(r)?,
            title: String::read(r)?,
            grid: GridType::read(r)?,
        })
    }

    fn write(&self, out: &mut BytesMut) {
        self.unique_id.write(out);
        self.title.write(out);
        self.grid.write(out);
    }
}

/// One row of the character-select list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectInfo {
    pub index: i32,
    pub name: String,
    pub level: u16,
    pub class: Class,
    pub gender: Gender,
    pub last_access: DateTime<Utc>,
}

impl Wire for SelectInfo {
    fn read(r: &mut PacketReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            index: i32::read(r)?,
            name: String::read(r)?,
            level: u16::read(r)?,
            class: Class::read(r)?,
            gender: Gender::read(r)?,
            last_access: DateTime::<Utc>::read(r)?,
        })
    }

    fn write(&self, out: &mut BytesMut) {
        self.index.write(out);
        self.name.write(out);
        self.level.write(out);
        self.class.write(out);
        self.gender.write(out);
        self.last_access.write(out);
    }
}
