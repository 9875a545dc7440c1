//! In-world operations a player can be asked to perform.

use crate::protocol::types::{
    AttackMode, ChatItem, Direction, GridType, MarketPanelType, PanelType, PetMode, Point, Spell,
    SpellToggleState,
};

/// Mail attachment; only present when gold or items are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parcel {
    pub gold: u32,
    pub items: Vec<u64>,
    pub stamped: bool,
}

/// Which script an NPC input reply continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpcTarget {
    Default,
    Current,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // movement & combat
    Turn(Direction),
    Walk(Direction),
    Attack { direction: Direction, spell: Spell },
    RangeAttack { direction: Direction, location: Point, target_id: u32, target_location: Point },
    Harvest(Direction),
    BeginMagic { spell: Spell, direction: Direction, target_id: u32, location: Point, target_lock: bool },
    SetMagicKey { spell: Spell, key: u8 },
    SpellToggle { spell: Spell, state: SpellToggleState },
    TownRevive,

    Chat { message: String, linked_items: Vec<ChatItem> },
    SetAttackMode(AttackMode),
    SetPetMode(PetMode),
    SetAllowTrade(bool),

    // items
    MoveItem { grid: GridType, from: i32, to: i32 },
    StoreItem { from: i32, to: i32 },
    DepositRefineItem { from: i32, to: i32 },
    RetrieveRefineItem { from: i32, to: i32 },
    RefineCancel,
    RefineItem(u64),
    CheckRefine(u64),
    ReplaceWeddingRing(u64),
    DepositTradeItem { from: i32, to: i32 },
    RetrieveTradeItem { from: i32, to: i32 },
    TakeBackItem { from: i32, to: i32 },
    MergeItem { grid_from: GridType, grid_to: GridType, id_from: u64, id_to: u64 },
    EquipItem { grid: GridType, unique_id: u64, to: i32 },
    RemoveItem { grid: GridType, unique_id: u64, to: i32 },
    SplitItem { grid: GridType, unique_id: u64, count: u16 },
    UseItem(u64),
    DropItem { unique_id: u64, count: u16 },
    DropGold(u32),
    PickUp,
    CombineItem { grid: GridType, id_from: u64, id_to: u64 },

    // npcs & shops
    CallDefaultNpc { key: String },
    CallClientScript,
    CallNpc { object_id: u32, key: String },
    NpcConfirmInput { value: String, page_name: String, target: NpcTarget },
    BuyItem { item_index: u64, count: u16, panel: PanelType },
    SellItem { unique_id: u64, count: u16 },
    RepairItem { unique_id: u64, special: bool },
    GameshopBuy { g_index: i32, quantity: u8 },

    // market
    ConsignItem { unique_id: u64, price: u32, market_type: MarketPanelType },
    MarketSearch {
        match_text: String,
        item_type: u8,
        user_mode: bool,
        min_shape: i16,
        max_shape: i16,
        market_type: MarketPanelType,
    },
    MarketRefresh,
    MarketPage(i32),
    MarketBuy { auction_id: u64, bid_price: u32 },
    MarketGetBack(u64),
    MarketSellNow(u64),

    RequestUserName(u32),
    RequestChatItem(u64),

    // group
    SwitchGroup(bool),
    AddMember(String),
    DelMember(String),
    GroupInvite(bool),

    // guild
    EditGuildMember { name: String, rank_name: String, rank_index: u8, change_type: u8 },
    EditGuildNotice(Vec<String>),
    GuildInvite(bool),
    RequestGuildInfo(u8),
    GuildNameReturn(String),
    GuildStorageGoldChange { change_type: u8, amount: u32 },
    GuildStorageItemChange { change_type: u8, from: i32, to: i32 },
    GuildWarReturn(String),
    GuildBuffUpdate { action: u8, id: i32 },

    // relationships
    MarriageRequest,
    MarriageReply(bool),
    ChangeMarriage,
    DivorceRequest,
    DivorceReply(bool),
    AddFriend { name: String, blocked: bool },
    RemoveFriend(i32),
    RefreshFriends,
    AddMemo { character_index: i32, memo: String },

    // trade
    TradeRequest,
    TradeGold(u32),
    TradeReply(bool),
    TradeConfirm(bool),
    TradeCancel,

    // quests
    AcceptQuest { npc_index: u32, quest_index: i32 },
    FinishQuest { quest_index: i32, selected_item_index: i32 },
    AbandonQuest(i32),
    ShareQuest(i32),

    // mail
    SendMail { name: String, message: String, parcel: Option<Parcel> },
    ReadMail(u64),
    CollectMail(u64),
    DeleteMail(u64),
    LockMail { mail_id: u64, lock: bool },
}
