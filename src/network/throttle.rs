//! Per-connection packet throttle
//!
//! Counts decoded packets inside a fixed wall-clock window and keeps a short
//! ring of the most recent packet ids for the abuse report. The guard trips
//! at most once; after that the connection is expected to stop receiving.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Bounded ring of recent packet ids, oldest first.
#[derive(Debug, Clone)]
pub struct RecentPackets {
    ids: VecDeque<u16>,
    capacity: usize,
}

impl RecentPackets {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, id: u16) {
        if self.capacity == 0 {
            return;
        }
        if self.ids.len() == self.capacity {
            self.ids.pop_front();
        }
        self.ids.push_back(id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.ids.iter().copied()
    }

    /// Ids in order of first appearance, duplicates removed.
    pub fn distinct(&self) -> Vec<u16> {
        let mut seen = Vec::with_capacity(self.ids.len());
        for id in self.iter() {
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        seen
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodVerdict {
    Ok,
    /// The ceiling was crossed by this packet. Reported once per guard.
    Tripped,
}

#[derive(Debug)]
pub struct FloodGuard {
    max_packets: u32,
    window: Duration,
    window_ends: Option<Instant>,
    count: u32,
    tripped: bool,
    recent: RecentPackets,
}

impl FloodGuard {
    pub fn new(max_packets: u32, window: Duration, recent_capacity: usize) -> Self {
        Self {
            max_packets,
            window,
            window_ends: None,
            count: 0,
            tripped: false,
            recent: RecentPackets::new(recent_capacity),
        }
    }

    /// Records one decoded packet.
    pub fn record(&mut self, id: u16, now: Instant) -> FloodVerdict {
        self.recent.push(id);

        if self.window_ends.map_or(true, |end| now >= end) {
            self.window_ends = Some(now + self.window);
            self.count = 0;
        }
        self.count = self.count.saturating_add(1);

        if self.count > self.max_packets && !self.tripped {
            self.tripped = true;
            tracing::debug!(
                "[throttle] tripped count={} max={}",
                self.count,
                self.max_packets
            );
            return FloodVerdict::Tripped;
        }
        FloodVerdict::Ok
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Packets counted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn recent(&self) -> &RecentPackets {
        &self.recent
    }
}
