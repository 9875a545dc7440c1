//! In-game handlers
//!
//! Each packet becomes at most one [`Action`] on the connection's player.
//! Movement, combat and magic wait on the player's readiness timers; a packet
//! that arrives early is parked in the retry queue and re-dispatched next tick.

use std::sync::Arc;

use crate::protocol::types::{GridType, SpellToggleState};
use crate::protocol::{client, server, ClientPacket};
use crate::session::{Connection, Gate, Readiness};
use crate::world::{Action, NpcTarget, Parcel};

use super::dispatch::{Dispatcher, StageRequirement};

/// NPC object id the client uses to run its own script.
pub const CLIENT_SCRIPT_NPC: u32 = u32::MAX;

fn perform(conn: &mut Connection, action: Action) {
    conn.with_player(|player| player.perform(action));
}

/// Performs the packet's action once `gate` opens for the player.
fn perform_gated<P>(conn: &mut Connection, gate: Gate, packet: P, action: impl FnOnce(&P) -> Action)
where
    P: Into<ClientPacket>,
{
    let now = conn.ctx().clock.time();
    let Some(timers) = conn.with_player(|player| player.timers()) else {
        return;
    };

    match gate.check(&timers, now) {
        Readiness::Ready => perform(conn, action(&packet)),
        Readiness::Defer => conn.defer(packet.into()),
        Readiness::Drop => {}
    }
}

pub fn register(d: &mut Dispatcher) {
    use StageRequirement::{Game, GameOrObserver};

    // movement & combat
    d.register::<client::Turn>(Game, |conn, p| {
        perform_gated(conn, Gate::Action, p, |p| Action::Turn(p.direction))
    });
    d.register::<client::Walk>(Game, |conn, p| {
        perform_gated(conn, Gate::Action, p, |p| Action::Walk(p.direction))
    });
    d.register::<client::Attack>(Game, |conn, p| {
        perform_gated(conn, Gate::Attack, p, |p| Action::Attack {
            direction: p.direction,
            spell: p.spell,
        })
    });
    d.register::<client::RangeAttack>(Game, |conn, p| {
        perform_gated(conn, Gate::Attack, p, |p| Action::RangeAttack {
            direction: p.direction,
            location: p.location,
            target_id: p.target_id,
            target_location: p.target_location,
        })
    });
    d.register::<client::Harvest>(Game, |conn, p| {
        perform_gated(conn, Gate::Harvest, p, |p| Action::Harvest(p.direction))
    });
    d.register::<client::Magic>(Game, |conn, p| {
        perform_gated(conn, Gate::Spell, p, |p| Action::BeginMagic {
            spell: p.spell,
            direction: p.direction,
            target_id: p.target_id,
            location: p.location,
            target_lock: p.spell_target_lock,
        })
    });
    d.register::<client::MagicKey>(Game, |conn, p| {
        perform(conn, Action::SetMagicKey { spell: p.spell, key: p.key })
    });
    d.register(Game, spell_toggle);
    d.register::<client::TownRevive>(Game, |conn, _| perform(conn, Action::TownRevive));

    d.register::<client::Chat>(Game, |conn, p| {
        perform(
            conn,
            Action::Chat {
                message: p.message,
                linked_items: p.linked_items,
            },
        )
    });
    d.register(Game, change_attack_mode);
    d.register(Game, change_pet_mode);
    d.register::<client::ChangeTrade>(Game, |conn, p| {
        perform(conn, Action::SetAllowTrade(p.allow_trade))
    });
    d.register(GameOrObserver, observe);

    // items
    d.register::<client::MoveItem>(Game, |conn, p| {
        perform(conn, Action::MoveItem { grid: p.grid, from: p.from, to: p.to })
    });
    d.register::<client::StoreItem>(Game, |conn, p| {
        perform(conn, Action::StoreItem { from: p.from, to: p.to })
    });
    d.register::<client::DepositRefineItem>(Game, |conn, p| {
        perform(conn, Action::DepositRefineItem { from: p.from, to: p.to })
    });
    d.register::<client::RetrieveRefineItem>(Game, |conn, p| {
        perform(conn, Action::RetrieveRefineItem { from: p.from, to: p.to })
    });
    d.register::<client::RefineCancel>(Game, |conn, _| perform(conn, Action::RefineCancel));
    d.register::<client::RefineItem>(Game, |conn, p| perform(conn, Action::RefineItem(p.unique_id)));
    d.register::<client::CheckRefine>(Game, |conn, p| perform(conn, Action::CheckRefine(p.unique_id)));
    d.register::<client::ReplaceWedRing>(Game, |conn, p| {
        perform(conn, Action::ReplaceWeddingRing(p.unique_id))
    });
    d.register::<client::DepositTradeItem>(Game, |conn, p| {
        perform(conn, Action::DepositTradeItem { from: p.from, to: p.to })
    });
    d.register::<client::RetrieveTradeItem>(Game, |conn, p| {
        perform(conn, Action::RetrieveTradeItem { from: p.from, to: p.to })
    });
    d.register::<client::TakeBackItem>(Game, |conn, p| {
        perform(conn, Action::TakeBackItem { from: p.from, to: p.to })
    });
    d.register::<client::MergeItem>(Game, |conn, p| {
        perform(
            conn,
            Action::MergeItem {
                grid_from: p.grid_from,
                grid_to: p.grid_to,
                id_from: p.id_from,
                id_to: p.id_to,
            },
        )
    });
    d.register::<client::EquipItem>(Game, |conn, p| {
        perform(conn, Action::EquipItem { grid: p.grid, unique_id: p.unique_id, to: p.to })
    });
    d.register::<client::RemoveItem>(Game, |conn, p| {
        perform(conn, Action::RemoveItem { grid: p.grid, unique_id: p.unique_id, to: p.to })
    });
    d.register::<client::SplitItem>(Game, |conn, p| {
        perform(conn, Action::SplitItem { grid: p.grid, unique_id: p.unique_id, count: p.count })
    });
    d.register::<client::UseItem>(Game, |conn, p| {
        // Only inventory items can be used from the client.
        if p.grid == GridType::Inventory {
            perform(conn, Action::UseItem(p.unique_id));
        }
    });
    d.register::<client::DropItem>(Game, |conn, p| {
        perform(conn, Action::DropItem { unique_id: p.unique_id, count: p.count })
    });
    d.register::<client::DropGold>(Game, |conn, p| perform(conn, Action::DropGold(p.amount)));
    d.register::<client::PickUp>(Game, |conn, _| perform(conn, Action::PickUp));
    d.register::<client::CombineItem>(Game, |conn, p| {
        perform(conn, Action::CombineItem { grid: p.grid, id_from: p.id_from, id_to: p.id_to })
    });

    // npcs & shops
    d.register(Game, call_npc);
    d.register(Game, npc_confirm_input);
    d.register::<client::BuyItem>(Game, |conn, p| {
        perform(
            conn,
            Action::BuyItem {
                item_index: p.item_index,
                count: p.count,
                panel: p.panel,
            },
        )
    });
    d.register::<client::SellItem>(Game, |conn, p| {
        perform(conn, Action::SellItem { unique_id: p.unique_id, count: p.count })
    });
    d.register::<client::RepairItem>(Game, |conn, p| {
        perform(conn, Action::RepairItem { unique_id: p.unique_id, special: false })
    });
    d.register::<client::SRepairItem>(Game, |conn, p| {
        perform(conn, Action::RepairItem { unique_id: p.unique_id, special: true })
    });
    d.register::<client::BuyItemBack>(Game, |_, _| {});
    d.register::<client::GameshopBuy>(Game, |conn, p| {
        perform(conn, Action::GameshopBuy { g_index: p.g_index, quantity: p.quantity })
    });

    // market
    d.register::<client::ConsignItem>(Game, |conn, p| {
        perform(
            conn,
            Action::ConsignItem {
                unique_id: p.unique_id,
                price: p.price,
                market_type: p.market_type,
            },
        )
    });
    d.register::<client::MarketSearch>(Game, |conn, p| {
        perform(
            conn,
            Action::MarketSearch {
                match_text: p.match_text,
                item_type: p.item_type,
                user_mode: p.user_mode,
                min_shape: p.min_shape,
                max_shape: p.max_shape,
                market_type: p.market_type,
            },
        )
    });
    d.register::<client::MarketRefresh>(Game, |conn, _| perform(conn, Action::MarketRefresh));
    d.register::<client::MarketPage>(Game, |conn, p| perform(conn, Action::MarketPage(p.page)));
    d.register::<client::MarketBuy>(Game, |conn, p| {
        perform(conn, Action::MarketBuy { auction_id: p.auction_id, bid_price: p.bid_price })
    });
    d.register::<client::MarketGetBack>(Game, |conn, p| {
        perform(conn, Action::MarketGetBack(p.auction_id))
    });
    d.register::<client::MarketSellNow>(Game, |conn, p| {
        perform(conn, Action::MarketSellNow(p.auction_id))
    });
    d.register::<client::RequestUserName>(Game, |conn, p| {
        perform(conn, Action::RequestUserName(p.user_id))
    });
    d.register::<client::RequestChatItem>(Game, |conn, p| {
        perform(conn, Action::RequestChatItem(p.chat_item_id))
    });

    // group
    d.register::<client::SwitchGroup>(Game, |conn, p| perform(conn, Action::SwitchGroup(p.allow_group)));
    d.register::<client::AddMember>(Game, |conn, p| perform(conn, Action::AddMember(p.name)));
    d.register::<client::DelMember>(Game, |conn, p| perform(conn, Action::DelMember(p.name)));
    d.register::<client::GroupInvite>(Game, |conn, p| {
        perform(conn, Action::GroupInvite(p.accept_invite))
    });

    // guild
    d.register::<client::EditGuildMember>(Game, |conn, p| {
        perform(
            conn,
            Action::EditGuildMember {
                name: p.name,
                rank_name: p.rank_name,
                rank_index: p.rank_index,
                change_type: p.change_type,
            },
        )
    });
    d.register::<client::EditGuildNotice>(Game, |conn, p| perform(conn, Action::EditGuildNotice(p.notice)));
    d.register::<client::GuildInvite>(Game, |conn, p| {
        perform(conn, Action::GuildInvite(p.accept_invite))
    });
    d.register::<client::RequestGuildInfo>(Game, |conn, p| {
        perform(conn, Action::RequestGuildInfo(p.info_type))
    });
    d.register::<client::GuildNameReturn>(Game, |conn, p| perform(conn, Action::GuildNameReturn(p.name)));
    d.register::<client::GuildStorageGoldChange>(Game, |conn, p| {
        perform(
            conn,
            Action::GuildStorageGoldChange {
                change_type: p.change_type,
                amount: p.amount,
            },
        )
    });
    d.register::<client::GuildStorageItemChange>(Game, |conn, p| {
        perform(
            conn,
            Action::GuildStorageItemChange {
                change_type: p.change_type,
                from: p.from,
                to: p.to,
            },
        )
    });
    d.register::<client::GuildWarReturn>(Game, |conn, p| perform(conn, Action::GuildWarReturn(p.name)));
    d.register::<client::GuildBuffUpdate>(Game, |conn, p| {
        perform(conn, Action::GuildBuffUpdate { action: p.action, id: p.id })
    });

    // relationships
    d.register::<client::MarriageRequest>(Game, |conn, _| perform(conn, Action::MarriageRequest));
    d.register::<client::MarriageReply>(Game, |conn, p| {
        perform(conn, Action::MarriageReply(p.accept_invite))
    });
    d.register::<client::ChangeMarriage>(Game, |conn, _| perform(conn, Action::ChangeMarriage));
    d.register::<client::DivorceRequest>(Game, |conn, _| perform(conn, Action::DivorceRequest));
    d.register::<client::DivorceReply>(Game, |conn, p| {
        perform(conn, Action::DivorceReply(p.accept_invite))
    });
    d.register::<client::AddFriend>(Game, |conn, p| {
        perform(conn, Action::AddFriend { name: p.name, blocked: p.blocked })
    });
    d.register::<client::RemoveFriend>(Game, |conn, p| {
        perform(conn, Action::RemoveFriend(p.character_index))
    });
    d.register::<client::RefreshFriends>(Game, |conn, _| perform(conn, Action::RefreshFriends));
    d.register::<client::AddMemo>(Game, |conn, p| {
        perform(
            conn,
            Action::AddMemo {
                character_index: p.character_index,
                memo: p.memo,
            },
        )
    });

    // trade
    d.register::<client::TradeRequest>(Game, |conn, _| perform(conn, Action::TradeRequest));
    d.register::<client::TradeGold>(Game, |conn, p| perform(conn, Action::TradeGold(p.amount)));
    d.register::<client::TradeReply>(Game, |conn, p| perform(conn, Action::TradeReply(p.accept_invite)));
    d.register::<client::TradeConfirm>(Game, |conn, p| perform(conn, Action::TradeConfirm(p.locked)));
    d.register::<client::TradeCancel>(Game, |conn, _| perform(conn, Action::TradeCancel));

    // quests
    d.register::<client::AcceptQuest>(Game, |conn, p| {
        perform(
            conn,
            Action::AcceptQuest {
                npc_index: p.npc_index,
                quest_index: p.quest_index,
            },
        )
    });
    d.register::<client::FinishQuest>(Game, |conn, p| {
        perform(
            conn,
            Action::FinishQuest {
                quest_index: p.quest_index,
                selected_item_index: p.selected_item_index,
            },
        )
    });
    d.register::<client::AbandonQuest>(Game, |conn, p| perform(conn, Action::AbandonQuest(p.quest_index)));
    d.register::<client::ShareQuest>(Game, |conn, p| perform(conn, Action::ShareQuest(p.quest_index)));

    // mail
    d.register(Game, send_mail);
    d.register::<client::ReadMail>(Game, |conn, p| perform(conn, Action::ReadMail(p.mail_id)));
    d.register::<client::CollectParcel>(Game, |conn, p| perform(conn, Action::CollectMail(p.mail_id)));
    d.register::<client::DeleteMail>(Game, |conn, p| perform(conn, Action::DeleteMail(p.mail_id)));
    d.register::<client::LockMail>(Game, |conn, p| {
        perform(conn, Action::LockMail { mail_id: p.mail_id, lock: p.lock })
    });
    d.register::<client::MailLockedItem>(Game, |conn, p| {
        conn.enqueue(server::MailLockedItem {
            unique_id: p.unique_id,
            locked: p.locked,
        })
    });
    d.register(Game, mail_cost);

    d.register::<client::ReportIssue>(Game, |_, _| {});
    d.register(GameOrObserver, get_ranking);
}

fn spell_toggle(conn: &mut Connection, p: client::SpellToggle) {
    if p.can_use == SpellToggleState::None {
        return;
    }
    perform(
        conn,
        Action::SpellToggle {
            spell: p.spell,
            state: p.can_use,
        },
    );
}

fn change_attack_mode(conn: &mut Connection, p: client::ChangeAMode) {
    perform(conn, Action::SetAttackMode(p.mode));
    conn.enqueue(server::ChangeAMode { mode: p.mode });
}

fn change_pet_mode(conn: &mut Connection, p: client::ChangePMode) {
    perform(conn, Action::SetPetMode(p.mode));
    conn.enqueue(server::ChangePMode { mode: p.mode });
}

fn observe(conn: &mut Connection, p: client::Observe) {
    let ctx = Arc::clone(conn.ctx());
    let Some(target) = ctx.world.observe(conn.session_id(), &p.name) else {
        return;
    };
    if conn.start_observing(target) {
        tracing::info!(
            "[game] [observe] id={} target={} name={}",
            conn.session_id(),
            target,
            p.name
        );
    }
}

fn call_npc(conn: &mut Connection, p: client::CallNpc) {
    let default_npc = conn.ctx().world.default_npc_id();
    let Some(current_npc) = conn.with_player(|player| player.npc_object_id()) else {
        return;
    };

    let action = if p.object_id == default_npc && current_npc == default_npc {
        Action::CallDefaultNpc { key: p.key }
    } else if p.object_id == CLIENT_SCRIPT_NPC {
        Action::CallClientScript
    } else {
        Action::CallNpc {
            object_id: p.object_id,
            key: p.key,
        }
    };
    perform(conn, action);
}

fn npc_confirm_input(conn: &mut Connection, p: client::NpcConfirmInput) {
    let default_npc = conn.ctx().world.default_npc_id();
    let Some(current_npc) = conn.with_player(|player| player.npc_object_id()) else {
        return;
    };

    let target = if p.npc_id == default_npc && current_npc == default_npc {
        NpcTarget::Default
    } else {
        NpcTarget::Current
    };
    perform(
        conn,
        Action::NpcConfirmInput {
            value: p.value,
            page_name: p.page_name,
            target,
        },
    );
}

fn send_mail(conn: &mut Connection, p: client::SendMail) {
    let parcel = (p.gold > 0 || !p.items_idx.is_empty()).then(|| Parcel {
        gold: p.gold,
        items: p.items_idx,
        stamped: p.stamped,
    });
    perform(
        conn,
        Action::SendMail {
            name: p.name,
            message: p.message,
            parcel,
        },
    );
}

fn mail_cost(conn: &mut Connection, p: client::MailCost) {
    let Some(cost) = conn.with_player(|player| player.mail_cost(&p.items_idx, p.gold, p.stamped)) else {
        return;
    };
    conn.enqueue(server::MailCost { cost });
}

fn get_ranking(conn: &mut Connection, p: client::GetRanking) {
    let ctx = Arc::clone(conn.ctx());
    ctx.world.get_ranking(conn, p);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{sent_packets, TestBed};
    use crate::protocol::types::{AttackMode, DisconnectReason, Direction, Spell};
    use crate::protocol::{GameStage, ServerPacket};
    use crate::world::testing::{Call, DEFAULT_NPC};
    use crate::world::PlayerTimers;

    fn in_game() -> (TestBed, Connection, tokio::sync::mpsc::UnboundedReceiver<bytes::Bytes>) {
        let bed = TestBed::new();
        let (mut conn, mut rx) = bed.open();
        bed.enter_game(&mut conn);
        sent_packets(&mut rx);
        (bed, conn, rx)
    }

    fn run(conn: &mut Connection, packet: impl Into<ClientPacket>) {
        conn.link().push_inbound(packet.into());
        conn.process();
    }

    #[test]
    fn test_attack_waits_for_attack_timer() {
        let (bed, mut conn, _rx) = in_game();
        bed.ctx.clock.set(1_000);
        bed.world.set_timers(PlayerTimers {
            attack_time: 1_050,
            ..Default::default()
        });
        let attack = client::Attack {
            direction: Direction::Down,
            spell: Spell::NONE,
        };

        run(&mut conn, attack.clone());
        assert!(bed.world.performed().is_empty());
        assert_eq!(conn.retry_len(), 0);
        assert_eq!(conn.link().inbound_len(), 1);

        bed.ctx.clock.set(1_050);
        conn.process();
        assert_eq!(
            bed.world.performed(),
            vec![Action::Attack {
                direction: Direction::Down,
                spell: Spell::NONE,
            }]
        );
    }

    #[test]
    fn test_dead_player_attacks_immediately() {
        let (bed, mut conn, _rx) = in_game();
        bed.ctx.clock.set(1_000);
        bed.world.set_timers(PlayerTimers {
            action_time: 5_000,
            attack_time: 5_000,
            dead: true,
            ..Default::default()
        });
        run(&mut conn, client::Harvest { direction: Direction::Up });
        assert_eq!(bed.world.performed(), vec![Action::Harvest(Direction::Up)]);
    }

    #[test]
    fn test_magic_dropped_when_dead() {
        let (bed, mut conn, _rx) = in_game();
        bed.world.set_timers(PlayerTimers {
            dead: true,
            ..Default::default()
        });
        run(&mut conn, client::Magic::default());
        conn.process();
        assert!(bed.world.performed().is_empty());
        assert_eq!(conn.link().inbound_len(), 0);
    }

    #[test]
    fn test_magic_waits_for_spell_timer() {
        let (bed, mut conn, _rx) = in_game();
        bed.ctx.clock.set(100);
        bed.world.set_timers(PlayerTimers {
            spell_time: 300,
            ..Default::default()
        });
        run(&mut conn, client::Magic::default());
        bed.ctx.clock.set(200);
        conn.process();
        assert!(bed.world.performed().is_empty());

        bed.ctx.clock.set(300);
        conn.process();
        assert_eq!(bed.world.performed().len(), 1);
    }

    #[test]
    fn test_call_npc_routing() {
        let bed = TestBed::new();
        *bed.world.npc_object_id.lock() = DEFAULT_NPC;
        let (mut conn, _rx) = bed.open();
        bed.enter_game(&mut conn);

        let key = "[@MAIN]".to_string();
        run(&mut conn, client::CallNpc { object_id: DEFAULT_NPC, key: key.clone() });
        run(&mut conn, client::CallNpc { object_id: CLIENT_SCRIPT_NPC, key: key.clone() });
        run(&mut conn, client::CallNpc { object_id: 42, key: key.clone() });

        assert_eq!(
            bed.world.performed(),
            vec![
                Action::CallDefaultNpc { key: key.clone() },
                Action::CallClientScript,
                Action::CallNpc { object_id: 42, key },
            ]
        );
    }

    #[test]
    fn test_default_npc_needs_current_npc() {
        let (bed, mut conn, _rx) = in_game();
        run(&mut conn, client::CallNpc { object_id: DEFAULT_NPC, key: "k".to_string() });
        assert_eq!(
            bed.world.performed(),
            vec![Action::CallNpc { object_id: DEFAULT_NPC, key: "k".to_string() }]
        );
    }

    #[test]
    fn test_npc_confirm_input_target() {
        let (bed, mut conn, _rx) = in_game();
        run(
            &mut conn,
            client::NpcConfirmInput {
                npc_id: DEFAULT_NPC,
                page_name: "[@NEXT]".to_string(),
                value: "yes".to_string(),
            },
        );
        assert_eq!(
            bed.world.performed(),
            vec![Action::NpcConfirmInput {
                value: "yes".to_string(),
                page_name: "[@NEXT]".to_string(),
                target: NpcTarget::Current,
            }]
        );
    }

    #[test]
    fn test_filtered_forwards() {
        let (bed, mut conn, _rx) = in_game();
        run(&mut conn, client::SpellToggle { spell: Spell(3), can_use: SpellToggleState::None });
        run(&mut conn, client::UseItem { unique_id: 5, grid: GridType::QuestInventory });
        run(&mut conn, client::BuyItemBack { unique_id: 5, count: 1 });
        run(&mut conn, client::ReportIssue::default());
        assert!(bed.world.performed().is_empty());

        run(&mut conn, client::SpellToggle { spell: Spell(3), can_use: SpellToggleState::On });
        run(&mut conn, client::UseItem { unique_id: 5, grid: GridType::Inventory });
        assert_eq!(
            bed.world.performed(),
            vec![
                Action::SpellToggle { spell: Spell(3), state: SpellToggleState::On },
                Action::UseItem(5),
            ]
        );
    }

    #[test]
    fn test_attack_mode_echoed() {
        let (bed, mut conn, mut rx) = in_game();
        run(&mut conn, client::ChangeAMode { mode: AttackMode::Guild });
        assert_eq!(bed.world.performed(), vec![Action::SetAttackMode(AttackMode::Guild)]);
        assert_eq!(
            sent_packets(&mut rx),
            vec![ServerPacket::from(server::ChangeAMode { mode: AttackMode::Guild })]
        );
    }

    #[test]
    fn test_mail_replies() {
        let (bed, mut conn, mut rx) = in_game();
        run(&mut conn, client::MailLockedItem { unique_id: 9, locked: true });
        run(&mut conn, client::MailCost { gold: 1_000, items_idx: vec![1, 2], stamped: false });
        assert!(bed.world.performed().is_empty());
        assert_eq!(
            sent_packets(&mut rx),
            vec![
                ServerPacket::from(server::MailLockedItem { unique_id: 9, locked: true }),
                ServerPacket::from(server::MailCost { cost: 130 }),
            ]
        );
    }

    #[test]
    fn test_send_mail_parcel_only_with_contents() {
        let (bed, mut conn, _rx) = in_game();
        run(
            &mut conn,
            client::SendMail {
                name: "Alt".to_string(),
                message: "hi".to_string(),
                ..Default::default()
            },
        );
        run(
            &mut conn,
            client::SendMail {
                name: "Alt".to_string(),
                message: "gift".to_string(),
                gold: 10,
                items_idx: Vec::new(),
                stamped: true,
            },
        );
        assert_eq!(
            bed.world.performed(),
            vec![
                Action::SendMail { name: "Alt".to_string(), message: "hi".to_string(), parcel: None },
                Action::SendMail {
                    name: "Alt".to_string(),
                    message: "gift".to_string(),
                    parcel: Some(Parcel { gold: 10, items: Vec::new(), stamped: true }),
                },
            ]
        );
    }

    #[test]
    fn test_observe_links_spectator() {
        let bed = TestBed::new();
        let (mut target, _target_rx) = bed.open();
        let (mut spectator, mut spectator_rx) = bed.open();
        bed.enter_game(&mut target);
        bed.enter_game_as(&mut spectator, "watcher");
        sent_packets(&mut spectator_rx);
        *bed.world.observe_target.lock() = Some(target.session_id());

        run(&mut spectator, client::Observe { name: "Hero".to_string() });
        assert_eq!(spectator.stage(), GameStage::Observer);
        assert_eq!(spectator.observing(), Some(target.session_id()));
        assert!(!spectator.has_player());
        assert!(bed.world.calls().contains(&Call::StopGame(DisconnectReason::LogOut)));
        assert_eq!(
            bed.ctx.registry.observer_ids(target.session_id()),
            vec![spectator.session_id()]
        );

        target.enqueue(server::ChangeAMode { mode: AttackMode::All });
        target.process();
        spectator.process();
        assert_eq!(
            sent_packets(&mut spectator_rx),
            vec![ServerPacket::from(server::ChangeAMode { mode: AttackMode::All })]
        );

        run(&mut spectator, client::GetRanking::default());
        run(&mut spectator, client::Walk::default());
        assert!(bed.world.calls().contains(&Call::Ranking));
        assert!(bed.world.performed().is_empty());
    }

    #[test]
    fn test_observe_unknown_name() {
        let (bed, mut conn, _rx) = in_game();
        run(&mut conn, client::Observe { name: "Nobody".to_string() });
        assert_eq!(conn.stage(), GameStage::Game);
        assert!(bed.world.calls().contains(&Call::Observe("Nobody".to_string())));
    }

    #[test]
    fn test_spectator_teardown_detaches() {
        let bed = TestBed::new();
        let (mut target, _target_rx) = bed.open();
        let (mut spectator, _spectator_rx) = bed.open();
        bed.enter_game(&mut target);
        bed.enter_game_as(&mut spectator, "watcher");
        *bed.world.observe_target.lock() = Some(target.session_id());
        run(&mut spectator, client::Observe { name: "Hero".to_string() });

        spectator.disconnect(DisconnectReason::SocketClosed);
        assert!(bed.ctx.registry.observer_ids(target.session_id()).is_empty());
    }
}
