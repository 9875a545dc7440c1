//! IP block list
//!
//! Addresses are blocked until an expiry instant. The connection core only
//! ever adds blocks; the accept loop consults them and the server prunes
//! expired entries periodically.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Reputation store the connection core reports abuse to.
pub trait IpReputation: Send + Sync {
    /// Blocks `ip` for `duration` from now. An existing longer block wins.
    fn block_ip(&self, ip: IpAddr, duration: Duration);

    fn is_blocked(&self, ip: IpAddr) -> bool;

    /// Drops expired entries, returning how many remain.
    fn prune(&self) -> usize {
        0
    }
}

#[derive(Default)]
pub struct IpBlockList {
    entries: Mutex<HashMap<IpAddr, Instant>>,
}

impl IpBlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expiry of the block on `ip`, if any is still active.
    pub fn blocked_until(&self, ip: IpAddr) -> Option<Instant> {
        let now = Instant::now();
        self.entries.lock().get(&ip).copied().filter(|until| *until > now)
    }

    /// Drops expired entries, returning how many remain.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, until| *until > now);
        entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IpReputation for IpBlockList {
    fn block_ip(&self, ip: IpAddr, duration: Duration) {
        let until = Instant::now() + duration;
        let mut entries = self.entries.lock();
        let entry = entries.entry(ip).or_insert(until);
        if *entry < until {
            *entry = until;
        }
        if duration >= Duration::from_secs(60) {
            tracing::info!("[ddos] lockout ip={} secs={}", ip, duration.as_secs());
        } else {
            tracing::debug!("[ddos] block ip={} ms={}", ip, duration.as_millis());
        }
    }

    fn is_blocked(&self, ip: IpAddr) -> bool {
        self.blocked_until(ip).is_some()
    }

    fn prune(&self) -> usize {
        IpBlockList::prune(self)
    }
}
