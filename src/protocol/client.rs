//! Client -> server packet catalog.

use chrono::{DateTime, Utc};

use super::types::{
    AttackMode, ChatItem, Class, Direction, Gender, GridType, MarketPanelType, PanelType, PetMode,
    Point, Spell, SpellToggleState,
};

crate::protocol::packets! {
    /// Every packet a client may send.
    pub enum ClientPacket {
        /// Handshake, first packet on every connection.
        0 => ClientVersion { version_hash: Vec<u8> },
        1 => Disconnect {},
        2 => KeepAlive { time: i64 },

        3 => NewAccount {
            account_id: String,
            password: String,
            birth_date: DateTime<Utc>,
            user_name: String,
            secret_question: String,
            secret_answer: String,
            email_address: String,
        },
        4 => ChangePassword { account_id: String, current_password: String, new_password: String },
        5 => Login { account_id: String, password: String },
        6 => NewCharacter { name: String, gender: Gender, class: Class },
        7 => DeleteCharacter { character_index: i32 },
        8 => StartGame { character_index: i32 },
        9 => LogOut {},

        10 => Turn { direction: Direction },
        11 => Walk { direction: Direction },
        12 => Chat { message: String, linked_items: Vec<ChatItem> },

        13 => MoveItem { grid: GridType, from: i32, to: i32 },
        14 => StoreItem { from: i32, to: i32 },
        15 => DepositRefineItem { from: i32, to: i32 },
        16 => RetrieveRefineItem { from: i32, to: i32 },
        17 => RefineCancel {},
        18 => RefineItem { unique_id: u64 },
        19 => CheckRefine { unique_id: u64 },
        20 => ReplaceWedRing { unique_id: u64 },
        21 => DepositTradeItem { from: i32, to: i32 },
        22 => RetrieveTradeItem { from: i32, to: i32 },
        23 => TakeBackItem { from: i32, to: i32 },
        24 => MergeItem { grid_from: GridType, grid_to: GridType, id_from: u64, id_to: u64 },
        25 => EquipItem { grid: GridType, unique_id: u64, to: i32 },
        26 => RemoveItem { grid: GridType, unique_id: u64, to: i32 },
        27 => SplitItem { grid: GridType, unique_id: u64, count: u16 },
        28 => UseItem { unique_id: u64, grid: GridType },
        29 => DropItem { unique_id: u64, count: u16 },
        30 => DropGold { amount: u32 },
        31 => PickUp {},

        32 => Observe { name: String },
        33 => ChangeAMode { mode: AttackMode },
        34 => ChangePMode { mode: PetMode },
        35 => ChangeTrade { allow_trade: bool },

        36 => Attack { direction: Direction, spell: Spell },
        37 => RangeAttack { direction: Direction, location: Point, target_id: u32, target_location: Point },
        38 => Harvest { direction: Direction },

        39 => CallNpc { object_id: u32, key: String },
        40 => BuyItem { item_index: u64, count: u16, panel: PanelType },
        41 => SellItem { unique_id: u64, count: u16 },
        42 => RepairItem { unique_id: u64 },
        43 => BuyItemBack { unique_id: u64, count: u16 },
        44 => SRepairItem { unique_id: u64 },

        45 => MagicKey { spell: Spell, key: u8 },
        46 => Magic { spell: Spell, direction: Direction, target_id: u32, location: Point, spell_target_lock: bool },

        47 => SwitchGroup { allow_group: bool },
        48 => AddMember { name: String },
        49 => DelMember { name: String },
        50 => GroupInvite { accept_invite: bool },
        51 => TownRevive {},
        52 => SpellToggle { spell: Spell, can_use: SpellToggleState },

        53 => ConsignItem { unique_id: u64, price: u32, market_type: MarketPanelType },
        54 => MarketSearch {
            match_text: String,
            item_type: u8,
            user_mode: bool,
            min_shape: i16,
            max_shape: i16,
            market_type: MarketPanelType,
        },
        55 => MarketRefresh {},
        56 => MarketPage { page: i32 },
        57 => MarketBuy { auction_id: u64, bid_price: u32 },
        58 => MarketGetBack { auction_id: u64 },
        59 => MarketSellNow { auction_id: u64 },
        60 => RequestUserName { user_id: u32 },
        61 => RequestChatItem { chat_item_id: u64 },

        62 => EditGuildMember { name: String, rank_name: String, rank_index: u8, change_type: u8 },
        63 => EditGuildNotice { notice: Vec<String> },
        64 => GuildInvite { accept_invite: bool },
        65 => RequestGuildInfo { info_type: u8 },
        66 => GuildNameReturn { name: String },
        67 => GuildStorageGoldChange { change_type: u8, amount: u32 },
        68 => GuildStorageItemChange { change_type: u8, from: i32, to: i32 },
        69 => GuildWarReturn { name: String },

        70 => MarriageRequest {},
        71 => MarriageReply { accept_invite: bool },
        72 => ChangeMarriage {},
        73 => DivorceRequest {},
        74 => DivorceReply { accept_invite: bool },

        75 => TradeRequest {},
        76 => TradeGold { amount: u32 },
        77 => TradeReply { accept_invite: bool },
        78 => TradeConfirm { locked: bool },
        79 => TradeCancel {},

        80 => AcceptQuest { npc_index: u32, quest_index: i32 },
        81 => FinishQuest { quest_index: i32, selected_item_index: i32 },
        82 => AbandonQuest { quest_index: i32 },
        83 => ShareQuest { quest_index: i32 },
        84 => CombineItem { grid: GridType, id_from: u64, id_to: u64 },

        85 => SendMail { name: String, message: String, gold: u32, items_idx: Vec<u64>, stamped: bool },
        86 => ReadMail { mail_id: u64 },
        87 => CollectParcel { mail_id: u64 },
        88 => DeleteMail { mail_id: u64 },
        89 => LockMail { mail_id: u64, lock: bool },
        90 => MailLockedItem { unique_id: u64, locked: bool },
        91 => MailCost { gold: u32, items_idx: Vec<u64>, stamped: bool },

        92 => AddFriend { name: String, blocked: bool },
        93 => RemoveFriend { character_index: i32 },
        94 => RefreshFriends {},
        95 => AddMemo { character_index: i32, memo: String },

        96 => GuildBuffUpdate { action: u8, id: i32 },
        97 => GameshopBuy { g_index: i32, quantity: u8 },
        98 => NpcConfirmInput { npc_id: u32, page_name: String, value: String },
        99 => ReportIssue { image: Vec<u8>, image_size: i32, image_chunk: i32 },
        100 => GetRanking { rank_type: u8, rank_index: i32, online_only: bool },
    }
}
