//! Cooldown gating and the per-connection retry queue.

use std::collections::VecDeque;

use crate::protocol::ClientPacket;
use crate::world::PlayerTimers;

/// Precondition an action-gated packet waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Turn and walk.
    Action,
    /// Melee and ranged attacks.
    Attack,
    Harvest,
    Spell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Defer,
    Drop,
}

impl Gate {
    pub fn check(self, timers: &PlayerTimers, now: i64) -> Readiness {
        let busy = timers.action_time > now;
        let deferred = match self {
            Gate::Action => busy,
            Gate::Attack => !timers.dead && (busy || timers.attack_time > now),
            Gate::Harvest => !timers.dead && busy,
            Gate::Spell => {
                if timers.dead {
                    return Readiness::Drop;
                }
                busy || timers.spell_time > now
            }
        };
        if deferred {
            Readiness::Defer
        } else {
            Readiness::Ready
        }
    }
}

/// Packets whose preconditions were not met this tick, oldest first.
#[derive(Debug, Default)]
pub struct RetryQueue {
    packets: VecDeque<ClientPacket>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: ClientPacket) {
        self.packets.push_back(packet);
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Empties the queue in order.
    pub fn drain(&mut self) -> impl Iterator<Item = ClientPacket> + '_ {
        self.packets.drain(..)
    }

    pub fn clear(&mut self) {
        self.packets.clear();
    }
}
